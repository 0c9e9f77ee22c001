use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::audio::capture::DEFAULT_FRAME_SAMPLES;
use crate::gemini::DEFAULT_API_BASE_URL;
use crate::lead::DEFAULT_CHAT_MODEL;
use crate::live::{DEFAULT_LIVE_MODEL, DEFAULT_LIVE_VOICE, LIVE_API_URL};
use crate::report::{
    DEFAULT_DEEP_DIVE_MODEL, DEFAULT_REPORT_MODEL, DEFAULT_REPORT_TEMPERATURE,
    DEFAULT_THINKING_BUDGET,
};
use crate::speech::{DEFAULT_TTS_MODEL, DEFAULT_TTS_VOICE};

const SETTINGS_DIR_NAME: &str = "nestcheck";
const SETTINGS_FILE_NAME: &str = "settings.json";

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("could not determine config directory")]
    NoConfigDir,
    #[error("failed to create config directory {path:?}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("serialize settings: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("write temp settings {path:?}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("rename temp settings to {path:?}: {source}")]
    Rename {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl SettingsError {
    pub fn user_message(&self) -> &'static str {
        match self {
            SettingsError::NoConfigDir => "No configuration directory is available.",
            _ => "Could not save settings.",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Gemini REST base URL (up to and including the API version)
    pub api_base_url: String,

    /// WebSocket endpoint for live voice sessions
    pub live_url: String,

    pub report_model: String,
    pub deep_dive_model: String,
    pub tts_model: String,
    pub live_model: String,
    pub chat_model: String,

    /// Sampling temperature for report generation. Low keeps the
    /// structured output stable between runs.
    pub report_temperature: f32,

    /// Token budget for the deep-dive model's thinking phase.
    pub thinking_budget: u32,

    pub tts_voice: String,
    pub live_voice: String,

    /// Samples per outbound live frame, counted at 16kHz.
    pub capture_frame_samples: usize,

    /// Web API key for the identity service. `FIREBASE_API_KEY` wins when set.
    pub firebase_api_key: Option<String>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            live_url: LIVE_API_URL.to_string(),
            report_model: DEFAULT_REPORT_MODEL.to_string(),
            deep_dive_model: DEFAULT_DEEP_DIVE_MODEL.to_string(),
            tts_model: DEFAULT_TTS_MODEL.to_string(),
            live_model: DEFAULT_LIVE_MODEL.to_string(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            report_temperature: DEFAULT_REPORT_TEMPERATURE,
            thinking_budget: DEFAULT_THINKING_BUDGET,
            tts_voice: DEFAULT_TTS_VOICE.to_string(),
            live_voice: DEFAULT_LIVE_VOICE.to_string(),
            capture_frame_samples: DEFAULT_FRAME_SAMPLES,
            firebase_api_key: None,
        }
    }
}

impl AppSettings {
    /// Identity service key: environment first, then the settings file
    pub fn resolve_firebase_api_key(&self) -> Option<String> {
        std::env::var("FIREBASE_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| self.firebase_api_key.clone())
            .filter(|k| !k.trim().is_empty())
    }
}

/// `<config_dir>/nestcheck/settings.json`
pub fn default_settings_path() -> Result<PathBuf, SettingsError> {
    let dir = dirs::config_dir().ok_or(SettingsError::NoConfigDir)?;
    Ok(dir.join(SETTINGS_DIR_NAME).join(SETTINGS_FILE_NAME))
}

/// Load settings, falling back to defaults when the file is missing or bad
pub fn load_from(path: &Path) -> AppSettings {
    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str::<AppSettings>(&contents) {
            Ok(settings) => settings,
            Err(e) => {
                log::warn!("Settings: failed to parse {:?}: {}", path, e);
                AppSettings::default()
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => AppSettings::default(),
        Err(e) => {
            log::warn!("Settings: failed to read {:?}: {}", path, e);
            AppSettings::default()
        }
    }
}

pub fn save_to(path: &Path, settings: &AppSettings) -> Result<(), SettingsError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| SettingsError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let contents = serde_json::to_string_pretty(settings)?;

    // Write to a sibling temp file, then rename over the target so a crash
    // mid-write never leaves a truncated settings.json.
    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, &contents).map_err(|source| SettingsError::Write {
        path: tmp_path.clone(),
        source,
    })?;

    // Windows refuses to rename over an existing file
    if cfg!(windows) && path.exists() {
        if let Err(source) = std::fs::remove_file(path) {
            if source.kind() != std::io::ErrorKind::NotFound {
                return Err(SettingsError::Rename {
                    path: path.to_path_buf(),
                    source,
                });
            }
        }
    }

    std::fs::rename(&tmp_path, path).map_err(|source| SettingsError::Rename {
        path: path.to_path_buf(),
        source,
    })?;
    log::debug!("Settings saved to {:?}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load_from(&dir.path().join("absent.json"));
        assert_eq!(settings, AppSettings::default());
    }

    #[test]
    fn test_corrupt_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE_NAME);
        std::fs::write(&path, "{ not json").unwrap();
        assert_eq!(load_from(&path), AppSettings::default());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE_NAME);
        std::fs::write(&path, r#"{"tts_voice": "Puck"}"#).unwrap();

        let settings = load_from(&path);
        assert_eq!(settings.tts_voice, "Puck");
        assert_eq!(settings.report_model, DEFAULT_REPORT_MODEL);
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(SETTINGS_FILE_NAME);

        let settings = AppSettings {
            live_voice: "Puck".to_string(),
            thinking_budget: 2048,
            firebase_api_key: Some("fb-key".to_string()),
            ..Default::default()
        };
        save_to(&path, &settings).unwrap();

        assert_eq!(load_from(&path), settings);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_save_overwrites_existing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE_NAME);

        save_to(&path, &AppSettings::default()).unwrap();
        let changed = AppSettings {
            report_temperature: 0.5,
            ..Default::default()
        };
        save_to(&path, &changed).unwrap();

        assert_eq!(load_from(&path).report_temperature, 0.5);
    }
}
