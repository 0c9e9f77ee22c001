//! Property area reports: one-shot structured fetch plus the streamed
//! long-form deep dive.

mod deep_dive;
mod fetcher;
pub mod model;
pub mod schema;

pub use deep_dive::{
    deep_dive_prompt, text_chunks, DeepDiveStreamer, DEEP_DIVE_FALLBACK, DEFAULT_DEEP_DIVE_MODEL,
    DEFAULT_THINKING_BUDGET,
};
pub use fetcher::{
    parse_report, report_prompt, ReportFetcher, DEFAULT_REPORT_MODEL, DEFAULT_REPORT_TEMPERATURE,
};
pub use model::{Amenity, Broadband, Crime, FloodRisk, FloodRiskLevel, PropertyReport, School};

use crate::gemini::GeminiError;

/// The only failure text users ever see for a report request
pub const REPORT_FAILURE_MESSAGE: &str =
    "Failed to generate report. Please check the address and try again.";

#[derive(Debug, Clone, thiserror::Error)]
pub enum ReportError {
    #[error("address is empty")]
    UserInputInvalid,
    #[error("report generation failed: {0}")]
    RemoteGenerationFailure(#[from] GeminiError),
    #[error("report did not match the expected shape: {0}")]
    SchemaParseFailure(String),
}

impl ReportError {
    /// Short message for display; causes stay in the log
    pub fn user_message(&self) -> &'static str {
        match self {
            ReportError::UserInputInvalid => "Please enter an address.",
            ReportError::RemoteGenerationFailure(_) | ReportError::SchemaParseFailure(_) => {
                REPORT_FAILURE_MESSAGE
            }
        }
    }
}
