//! Configuration module for the tutor client
//!
//! Configuration comes from .env files, environment variables and an optional
//! YAML file. Priority: YAML > ENV vars > .env values > defaults.
//!
//! # Modules
//! - `yaml`: YAML configuration file loading
//! - `env`: Environment variable loading
//! - `merge`: Merging YAML and environment configurations
//! - `validation`: Configuration validation logic
//!
//! # Example
//! ```rust,no_run
//! use waav_tutor::config::TutorConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = TutorConfig::from_env()?;
//!
//! // Load from YAML file with environment variable overrides
//! let config = TutorConfig::from_file(&PathBuf::from("config.yaml"))?;
//!
//! println!("Practising {} with {}", config.language, config.teacher);
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::core::live::websocket::LiveTransportConfig;
use crate::tutor::{ConversationLevel, Language, PracticeMode, SessionBlueprint, TeacherName};
use crate::utils::endpoint_validation::EndpointValidationError;

mod env;
mod merge;
mod validation;
mod yaml;

pub use yaml::{AudioYaml, LiveYaml, TutorYaml, YamlConfig};

/// Errors raised while loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Missing required setting {field} ({hint})")]
    Missing {
        field: &'static str,
        hint: &'static str,
    },

    #[error("Invalid value for {field}: {message}")]
    InvalidValue {
        field: &'static str,
        message: String,
    },

    #[error("Invalid live endpoint: {0}")]
    Endpoint(#[from] EndpointValidationError),
}

/// Client configuration
#[derive(Clone)]
pub struct TutorConfig {
    // Live endpoint
    pub endpoint_url: String,
    pub api_key: Option<String>,
    pub api_key_header: String,
    pub model: String,
    pub connect_timeout_seconds: u64,

    // Audio
    pub capture_block_size: usize,

    // Session choices
    pub teacher: TeacherName,
    pub language: Language,
    pub level: ConversationLevel,
    pub practice_mode: PracticeMode,
    pub mode_specifics: String,
}

impl fmt::Debug for TutorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TutorConfig")
            .field("endpoint_url", &self.endpoint_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("api_key_header", &self.api_key_header)
            .field("model", &self.model)
            .field("connect_timeout_seconds", &self.connect_timeout_seconds)
            .field("capture_block_size", &self.capture_block_size)
            .field("teacher", &self.teacher)
            .field("language", &self.language)
            .field("level", &self.level)
            .field("practice_mode", &self.practice_mode)
            .field("mode_specifics", &self.mode_specifics)
            .finish()
    }
}

/// Zeroize the API key when the configuration is dropped.
impl Drop for TutorConfig {
    fn drop(&mut self) {
        use zeroize::Zeroize;

        if let Some(ref mut key) = self.api_key {
            key.zeroize();
        }
    }
}

impl TutorConfig {
    /// Load configuration from environment variables and defaults
    ///
    /// # Errors
    /// Returns an error if a variable has an invalid format or validation
    /// fails.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = merge::merge_config(None)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file with environment variable base
    ///
    /// Priority order (highest to lowest):
    /// 1. YAML file values
    /// 2. Environment variables (actual ENV vars override .env values)
    /// 3. .env file values
    /// 4. Default values
    ///
    /// # Errors
    /// Returns an error if:
    /// - The YAML file cannot be read or is malformed
    /// - Environment variables have invalid formats
    /// - Configuration validation fails
    pub fn from_file(path: &PathBuf) -> Result<Self, ConfigError> {
        // .env is loaded in main.rs at startup, so it already sits beneath
        // the actual environment here
        let yaml_config = yaml::YamlConfig::from_file(path)?;
        let config = merge::merge_config(Some(yaml_config))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        validation::validate_api_key(self.api_key.as_deref())?;
        validation::validate_api_key_header(&self.api_key_header)?;
        validation::validate_endpoint(&self.endpoint_url)?;
        validation::validate_connect_timeout(self.connect_timeout_seconds)?;
        validation::validate_capture_block_size(self.capture_block_size)?;
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }

    /// Settings for the WebSocket transport.
    pub fn transport_config(&self) -> LiveTransportConfig {
        let mut transport = LiveTransportConfig::new(self.api_key.clone().unwrap_or_default());
        transport.endpoint_url = self.endpoint_url.clone();
        transport.api_key_header = self.api_key_header.clone();
        transport.model = self.model.clone();
        transport.connect_timeout = self.connect_timeout();
        transport
    }

    /// Session choices as a blueprint.
    pub fn blueprint(&self) -> SessionBlueprint {
        SessionBlueprint {
            teacher: self.teacher,
            language: self.language,
            level: self.level,
            practice_mode: self.practice_mode,
            mode_specifics: self.mode_specifics.clone(),
        }
    }
}
