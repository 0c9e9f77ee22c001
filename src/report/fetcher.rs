//! Structured report fetch

use crate::gemini::{Content, GeminiClient, GenerateContentRequest, GenerationConfig};

use super::model::PropertyReport;
use super::schema::report_schema;
use super::ReportError;

pub const DEFAULT_REPORT_MODEL: &str = "gemini-3-flash-preview";
pub const DEFAULT_REPORT_TEMPERATURE: f32 = 0.2;

pub fn report_prompt(address: &str) -> String {
    format!(
        "Generate a detailed property area report for the address: \"{}\" in England.",
        address
    )
}

/// Deserialize model output into a report. Every field must be present.
pub fn parse_report(text: &str) -> Result<PropertyReport, ReportError> {
    serde_json::from_str(text).map_err(|e| ReportError::SchemaParseFailure(e.to_string()))
}

/// Fetches a complete [`PropertyReport`] for one address per call
#[derive(Debug, Clone)]
pub struct ReportFetcher {
    client: GeminiClient,
    model: String,
    temperature: f32,
}

impl ReportFetcher {
    pub fn new(client: GeminiClient, model: impl Into<String>, temperature: f32) -> Self {
        Self {
            client,
            model: model.into(),
            temperature,
        }
    }

    fn build_request(&self, address: &str) -> GenerateContentRequest {
        GenerateContentRequest {
            contents: vec![Content::user_text(report_prompt(address))],
            generation_config: Some(GenerationConfig {
                temperature: Some(self.temperature),
                response_mime_type: Some("application/json".to_string()),
                response_schema: Some(report_schema()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    /// Generate the report for `address`.
    ///
    /// All-or-nothing: the caller gets the whole report or an error.
    pub async fn fetch(&self, address: &str) -> Result<PropertyReport, ReportError> {
        let address = address.trim();
        if address.is_empty() {
            return Err(ReportError::UserInputInvalid);
        }

        log::info!("Fetching report for {:?}", address);
        let request = self.build_request(address);

        let response = self
            .client
            .generate_content(&self.model, &request)
            .await
            .map_err(|e| {
                log::error!("Report request failed: {}", e);
                ReportError::from(e)
            })?;

        let text = response.text().unwrap_or_default();
        let report = parse_report(&text).map_err(|e| {
            log::error!("Report response rejected: {}", e);
            e
        })?;

        log::info!("Report ready for {} ({})", report.address, report.postcode);
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gemini::DEFAULT_API_BASE_URL;
    use crate::report::model::fixtures::sample_report;

    fn fetcher() -> ReportFetcher {
        let client = GeminiClient::new(DEFAULT_API_BASE_URL, "test-key").unwrap();
        ReportFetcher::new(client, DEFAULT_REPORT_MODEL, DEFAULT_REPORT_TEMPERATURE)
    }

    #[test]
    fn test_request_shape() {
        let request = fetcher().build_request("1 High St");
        let json = serde_json::to_value(&request).unwrap();

        assert!(json["contents"][0]["parts"][0]["text"]
            .as_str()
            .unwrap()
            .contains("\"1 High St\" in England"));
        let temperature = json["generationConfig"]["temperature"].as_f64().unwrap();
        assert!((temperature - 0.2).abs() < 1e-6);
        assert_eq!(json["generationConfig"]["responseMimeType"], "application/json");
        assert_eq!(json["generationConfig"]["responseSchema"]["type"], "OBJECT");
    }

    #[tokio::test]
    async fn test_blank_address_rejected_locally() {
        let err = fetcher().fetch("   ").await.unwrap_err();
        assert!(matches!(err, ReportError::UserInputInvalid));
    }

    #[test]
    fn test_parse_complete_report() {
        let text = serde_json::to_string(&sample_report()).unwrap();
        assert_eq!(parse_report(&text).unwrap(), sample_report());
    }

    #[test]
    fn test_parse_missing_field_is_schema_failure() {
        let mut json = serde_json::to_value(sample_report()).unwrap();
        json.as_object_mut().unwrap().remove("floodRisk");
        let err = parse_report(&json.to_string()).unwrap_err();

        assert!(matches!(err, ReportError::SchemaParseFailure(_)));
        assert_eq!(
            err.user_message(),
            "Failed to generate report. Please check the address and try again."
        );
    }

    #[test]
    fn test_parse_empty_or_garbage() {
        assert!(matches!(parse_report(""), Err(ReportError::SchemaParseFailure(_))));
        assert!(matches!(parse_report("{}"), Err(ReportError::SchemaParseFailure(_))));
        assert!(matches!(parse_report("not json"), Err(ReportError::SchemaParseFailure(_))));
    }
}
