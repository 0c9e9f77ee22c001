//! [`DialogueModel`] backed by Gemini `generateContent` with tool calling

use async_trait::async_trait;
use serde_json::json;

use super::{DialogueError, DialogueModel, ModelTurn, SEND_LEAD, SYSTEM_INSTRUCTION};
use crate::gemini::{Content, FunctionDeclaration, GeminiClient, GenerateContentRequest, Tool};

pub const DEFAULT_CHAT_MODEL: &str = "gemini-3-flash-preview";

/// Declaration of `sendLead`; all five fields are required
pub fn send_lead_declaration() -> FunctionDeclaration {
    FunctionDeclaration {
        name: SEND_LEAD.to_string(),
        description: "Submits the professional property inspection request data.".to_string(),
        parameters: json!({
            "type": "OBJECT",
            "properties": {
                "name": { "type": "STRING", "description": "Full name of the enquirer" },
                "company": { "type": "STRING", "description": "Company name" },
                "address": { "type": "STRING", "description": "Full property address" },
                "postcode": { "type": "STRING", "description": "Property postcode" },
                "email": { "type": "STRING", "description": "Email address" }
            },
            "required": ["name", "company", "address", "postcode", "email"]
        }),
    }
}

#[derive(Debug, Clone)]
pub struct GeminiDialogueModel {
    client: GeminiClient,
    model: String,
}

impl GeminiDialogueModel {
    pub fn new(client: GeminiClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }

    fn build_request(&self, history: &[Content]) -> GenerateContentRequest {
        GenerateContentRequest {
            contents: history.to_vec(),
            system_instruction: Some(Content::text(SYSTEM_INSTRUCTION)),
            tools: Some(vec![Tool {
                function_declarations: vec![send_lead_declaration()],
            }]),
            generation_config: None,
        }
    }
}

#[async_trait]
impl DialogueModel for GeminiDialogueModel {
    async fn respond(&self, history: &[Content]) -> Result<ModelTurn, DialogueError> {
        let response = self
            .client
            .generate_content(&self.model, &self.build_request(history))
            .await?;
        Ok(ModelTurn::from_response(&response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gemini::DEFAULT_API_BASE_URL;

    #[test]
    fn test_request_declares_send_lead() {
        let client = GeminiClient::new(DEFAULT_API_BASE_URL, "k").unwrap();
        let model = GeminiDialogueModel::new(client, DEFAULT_CHAT_MODEL);
        let json = serde_json::to_value(model.build_request(&[Content::user_text("Ann")])).unwrap();

        let declaration = &json["tools"][0]["functionDeclarations"][0];
        assert_eq!(declaration["name"], "sendLead");
        assert_eq!(declaration["parameters"]["required"].as_array().unwrap().len(), 5);
        assert!(json["systemInstruction"]["parts"][0]["text"]
            .as_str()
            .unwrap()
            .contains("info@pfminspections.co.uk"));
        assert_eq!(json["contents"][0]["parts"][0]["text"], "Ann");
    }

    #[tokio::test]
    async fn test_network_failure_is_remote_error() {
        let client = GeminiClient::new("http://127.0.0.1:9/v1beta", "k").unwrap();
        let model = GeminiDialogueModel::new(client, DEFAULT_CHAT_MODEL);
        let err = model.respond(&[Content::user_text("hi")]).await.unwrap_err();
        assert!(matches!(err, DialogueError::Remote(_)));
    }
}
