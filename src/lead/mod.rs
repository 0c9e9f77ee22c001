//! Lead-capture dialogue for professional inspection requests
//!
//! A text chat with a tool-calling model that collects five contact fields
//! and then "submits" them through the `sendLead` action. Delivery is
//! simulated: the record is kept locally and logged.

mod agent;
mod gemini_chat;

pub use agent::{ChatMessage, DialogueStatus, LeadAgent, LeadRecord, Speaker};
pub use gemini_chat::{send_lead_declaration, GeminiDialogueModel, DEFAULT_CHAT_MODEL};

use async_trait::async_trait;

use crate::gemini::{Content, FunctionCall, GeminiError, GenerateContentResponse};

/// Where inspection requests are addressed
pub const LEAD_RECIPIENT: &str = "info@pfminspections.co.uk";

/// Name of the callable action the model uses to submit a lead
pub const SEND_LEAD: &str = "sendLead";

pub const GREETING: &str = "Hello! I'm the NestCheck UK Professional Assistant. To get started with your professional inspection request, could you please provide your full name?";

pub const SYSTEM_INSTRUCTION: &str = "You are a professional assistant for NestCheck UK. Your objective is to collect details for a professional property inspection request.
You must collect exactly:
1. Full Name
2. Company Name
3. Property Address
4. Postcode
5. Email

Ask for these details politely, one or two at a time. Once you have captured all 5 items, immediately call the 'sendLead' function with all the collected information.
After the function is called, inform the user that their request has been successfully sent to info@pfminspections.co.uk and that they will be contacted shortly.";

/// Synthetic turn sent after a lead is recorded
pub const FOLLOW_UP_INSTRUCTION: &str =
    "The lead has been recorded internally. Confirm to the user that it was sent to info@pfminspections.co.uk.";

/// Appended when a turn fails on the network
pub const CONNECTION_TROUBLE_MESSAGE: &str =
    "I'm having trouble connecting. Please check your connection and try again.";

/// Appended when the model answers with no text
pub const EMPTY_REPLY_MESSAGE: &str = "I'm sorry, I encountered an issue. Please try again.";

/// Shown if the lead was recorded but the confirmation turn failed
pub const LOCAL_CONFIRMATION: &str = "Your request has been sent to info@pfminspections.co.uk. You will be contacted shortly.";

#[derive(Debug, Clone, thiserror::Error)]
pub enum DialogueError {
    #[error("message is empty")]
    EmptyInput,
    #[error("the request has already been submitted")]
    Submitted,
    #[error("dialogue model failed: {0}")]
    Remote(#[from] GeminiError),
}

impl DialogueError {
    pub fn user_message(&self) -> &'static str {
        match self {
            DialogueError::EmptyInput => "Please type a message.",
            DialogueError::Submitted => "Your request has already been sent.",
            DialogueError::Remote(_) => CONNECTION_TROUBLE_MESSAGE,
        }
    }
}

/// One model reply, reduced to what the dialogue needs
#[derive(Debug, Clone, PartialEq)]
pub struct ModelTurn {
    /// The reply as it must be appended to the history
    pub content: Content,
    pub text: Option<String>,
    pub function_calls: Vec<FunctionCall>,
}

impl ModelTurn {
    pub fn from_response(response: &GenerateContentResponse) -> Self {
        let content = response.first_content().unwrap_or_else(|| Content {
            role: Some("model".to_string()),
            parts: Vec::new(),
        });
        Self {
            content,
            text: response.text(),
            function_calls: response.function_calls(),
        }
    }
}

/// A chat model that answers a full conversation history
#[async_trait]
pub trait DialogueModel: Send + Sync {
    async fn respond(&self, history: &[Content]) -> Result<ModelTurn, DialogueError>;
}
