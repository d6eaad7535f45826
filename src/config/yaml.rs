use serde::Deserialize;
use std::path::PathBuf;

use super::ConfigError;

/// Complete YAML configuration structure
///
/// All fields are optional to allow partial configuration. Values present
/// here override environment variables.
///
/// # Example YAML structure
/// ```yaml
/// live:
///   endpoint_url: "wss://generativelanguage.googleapis.com/ws/..."
///   api_key: "your-api-key"
///   api_key_header: "x-goog-api-key"
///   model: "models/gemini-2.5-flash-native-audio-preview-09-2025"
///   connect_timeout_seconds: 10
///
/// audio:
///   capture_block_size: 4096
///
/// tutor:
///   teacher: "Amelia"
///   language: "French"
///   level: "Basic"
///   practice_mode: "Role-play"
///   mode_specifics: "ordering at a bakery"
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub live: Option<LiveYaml>,
    pub audio: Option<AudioYaml>,
    pub tutor: Option<TutorYaml>,
}

/// Live endpoint configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct LiveYaml {
    pub endpoint_url: Option<String>,
    pub api_key: Option<String>,
    pub api_key_header: Option<String>,
    pub model: Option<String>,
    pub connect_timeout_seconds: Option<u64>,
}

/// Audio configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AudioYaml {
    pub capture_block_size: Option<usize>,
}

/// Session choices from YAML
///
/// Kept as strings so they parse with the same case-insensitive rules as
/// environment variables.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TutorYaml {
    pub teacher: Option<String>,
    pub language: Option<String>,
    pub level: Option<String>,
    pub practice_mode: Option<String>,
    pub mode_specifics: Option<String>,
}

impl YamlConfig {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or the YAML is malformed.
    pub fn from_file(path: &PathBuf) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;

        let config: YamlConfig = serde_yaml::from_str(&contents)?;

        Ok(config)
    }
}
