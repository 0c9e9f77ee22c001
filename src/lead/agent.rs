//! Dialogue state: visible transcript, model history and submission

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};

use super::{
    DialogueError, DialogueModel, ModelTurn, CONNECTION_TROUBLE_MESSAGE, EMPTY_REPLY_MESSAGE,
    FOLLOW_UP_INSTRUCTION, GREETING, LEAD_RECIPIENT, LOCAL_CONFIRMATION, SEND_LEAD,
};
use crate::gemini::{Content, FunctionCall, Part};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    User,
    Agent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub speaker: Speaker,
    pub text: String,
}

impl ChatMessage {
    fn agent(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Agent,
            text: text.into(),
        }
    }

    fn user(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::User,
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogueStatus {
    Open,
    Submitted,
}

/// A captured inspection request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeadRecord {
    pub name: String,
    pub company: String,
    pub address: String,
    pub postcode: String,
    pub email: String,
    pub recorded_at: DateTime<Utc>,
}

impl LeadRecord {
    const FIELDS: [&'static str; 5] = ["name", "company", "address", "postcode", "email"];

    /// Build a record from `sendLead` arguments.
    ///
    /// Fails with the names of missing or blank fields.
    pub fn from_args(args: &Value) -> Result<Self, Vec<&'static str>> {
        let field = |key: &str| {
            args.get(key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        let missing: Vec<&'static str> = Self::FIELDS
            .iter()
            .copied()
            .filter(|key| field(key).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(missing);
        }

        Ok(Self {
            name: field("name").unwrap_or_default(),
            company: field("company").unwrap_or_default(),
            address: field("address").unwrap_or_default(),
            postcode: field("postcode").unwrap_or_default(),
            email: field("email").unwrap_or_default(),
            recorded_at: Utc::now(),
        })
    }
}

/// Drives one lead-capture conversation
pub struct LeadAgent<M> {
    model: M,
    history: Vec<Content>,
    transcript: Vec<ChatMessage>,
    status: DialogueStatus,
    lead: Option<LeadRecord>,
}

impl<M: DialogueModel> LeadAgent<M> {
    /// New dialogue, seeded with the greeting
    pub fn new(model: M) -> Self {
        Self {
            model,
            history: Vec::new(),
            transcript: vec![ChatMessage::agent(GREETING)],
            status: DialogueStatus::Open,
            lead: None,
        }
    }

    pub fn transcript(&self) -> &[ChatMessage] {
        &self.transcript
    }

    pub fn status(&self) -> DialogueStatus {
        self.status
    }

    pub fn is_submitted(&self) -> bool {
        self.status == DialogueStatus::Submitted
    }

    pub fn lead(&self) -> Option<&LeadRecord> {
        self.lead.as_ref()
    }

    fn push_agent(&mut self, text: impl Into<String>) -> &ChatMessage {
        self.transcript.push(ChatMessage::agent(text));
        &self.transcript[self.transcript.len() - 1]
    }

    /// Send one user message and append the agent's reply.
    ///
    /// Network failures do not return an error: the dialogue stays open and
    /// the reply is a connection-trouble message.
    pub async fn send(&mut self, input: &str) -> Result<&ChatMessage, DialogueError> {
        if self.is_submitted() {
            return Err(DialogueError::Submitted);
        }
        let input = input.trim();
        if input.is_empty() {
            return Err(DialogueError::EmptyInput);
        }

        self.transcript.push(ChatMessage::user(input));
        self.history.push(Content::user_text(input));

        let turn = match self.model.respond(&self.history).await {
            Ok(turn) => turn,
            Err(e) => {
                log::error!("Lead dialogue turn failed: {}", e);
                // The failed turn never happened as far as the model knows
                self.history.pop();
                return Ok(self.push_agent(CONNECTION_TROUBLE_MESSAGE));
            }
        };

        let lead = self.accept_turn(turn.clone());
        match lead {
            Some(record) => Ok(self.submit(record).await),
            None => {
                let text = turn.text.unwrap_or_else(|| EMPTY_REPLY_MESSAGE.to_string());
                Ok(self.push_agent(text))
            }
        }
    }

    /// Record the model turn in the history and pick out a valid lead.
    ///
    /// Invalid `sendLead` calls are dropped from the history so the model is
    /// never left waiting on an unanswered call.
    fn accept_turn(&mut self, turn: ModelTurn) -> Option<LeadRecord> {
        let mut lead = None;
        let mut content = turn.content;

        content.parts.retain(|part| {
            let Some(FunctionCall { name, args }) = &part.function_call else {
                return true;
            };
            if name != SEND_LEAD {
                log::warn!("Lead dialogue: ignoring unknown action {:?}", name);
                return false;
            }
            if lead.is_some() {
                return false;
            }
            match LeadRecord::from_args(args) {
                Ok(record) => {
                    lead = Some(record);
                    true
                }
                Err(missing) => {
                    log::warn!("Lead dialogue: ignoring sendLead missing {:?}", missing);
                    false
                }
            }
        });

        if !content.parts.is_empty() {
            self.history.push(content);
        }
        lead
    }

    async fn submit(&mut self, record: LeadRecord) -> &ChatMessage {
        log::info!(
            "Lead recorded for {}: {} <{}> ({}, {} {})",
            LEAD_RECIPIENT,
            record.name,
            record.email,
            record.company,
            record.address,
            record.postcode
        );

        self.history.push(Content {
            role: Some("user".to_string()),
            parts: vec![
                Part::function_response(SEND_LEAD, json!({ "result": "recorded" })),
                Part::text(FOLLOW_UP_INSTRUCTION),
            ],
        });
        self.lead = Some(record);
        self.status = DialogueStatus::Submitted;

        let confirmation = match self.model.respond(&self.history).await {
            Ok(turn) => {
                let text = turn.text.clone();
                self.history.push(turn.content);
                text.unwrap_or_else(|| LOCAL_CONFIRMATION.to_string())
            }
            Err(e) => {
                log::error!("Lead confirmation turn failed: {}", e);
                LOCAL_CONFIRMATION.to_string()
            }
        };
        self.push_agent(confirmation)
    }
}
