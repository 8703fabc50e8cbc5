//! Configuration reading and data directory paths.

pub mod paths;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::VoiceError;
use paths::get_data_dir;

/// Settings the frontend writes to settings.json. Every field is
/// optional; missing or malformed files fall back to defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default)]
    pub voice: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub input_device: Option<String>,
    #[serde(default)]
    pub system_instruction: Option<String>,
}

/// Resolved process configuration: the required credential plus the
/// optional settings file contents.
#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: String,
    pub settings: Settings,
}

impl Config {
    /// Load the API key from the environment and settings from disk.
    ///
    /// A missing credential is the only fatal case; the settings file is
    /// tolerated absent or broken.
    pub fn load() -> Result<Self, VoiceError> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                VoiceError::Config("GEMINI_API_KEY environment variable is not set".to_string())
            })?;
        Ok(Self {
            api_key,
            settings: read_settings(),
        })
    }
}

/// Read settings.json from the data directory.
pub fn read_settings() -> Settings {
    read_json_file(&get_settings_path()).unwrap_or_default()
}

/// Path to settings.json.
pub fn get_settings_path() -> PathBuf {
    get_data_dir().join("settings.json")
}

/// Generic helper: read a JSON file and deserialize it.
fn read_json_file<T: serde::de::DeserializeOwned>(path: &PathBuf) -> Option<T> {
    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str(&contents) {
            Ok(val) => Some(val),
            Err(e) => {
                warn!("Failed to parse {}: {}", path.display(), e);
                None
            }
        },
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to read {}: {}", path.display(), e);
            }
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_default_when_fields_missing() {
        let settings: Settings = serde_json::from_str("{}").unwrap();
        assert!(settings.voice.is_none());
        assert!(settings.input_device.is_none());
    }

    #[test]
    fn test_settings_parse_camel_case() {
        let settings: Settings =
            serde_json::from_str(r#"{"voice":"Puck","inputDevice":"USB Mic"}"#).unwrap();
        assert_eq!(settings.voice.as_deref(), Some("Puck"));
        assert_eq!(settings.input_device.as_deref(), Some("USB Mic"));
    }

    #[test]
    fn test_read_json_file_missing_is_none() {
        let path = PathBuf::from("/nonexistent/serene-settings.json");
        let parsed: Option<Settings> = read_json_file(&path);
        assert!(parsed.is_none());
    }
}
