//! NestCheck UK: area reports for a UK property address, with a streamed
//! deep dive, narration, a live voice advisor and an inspection request
//! assistant.

pub mod app_state;
pub mod audio;
pub mod cli;
pub mod gemini;
pub mod identity;
pub mod lead;
pub mod live;
pub mod logging;
pub mod report;
pub mod settings;
pub mod speech;
