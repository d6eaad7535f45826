use std::env;
use std::str::FromStr;

use super::ConfigError;

pub(crate) const LIVE_ENDPOINT_URL: &str = "LIVE_ENDPOINT_URL";
pub(crate) const LIVE_API_KEY: &str = "LIVE_API_KEY";
pub(crate) const LIVE_API_KEY_HEADER: &str = "LIVE_API_KEY_HEADER";
pub(crate) const LIVE_MODEL: &str = "LIVE_MODEL";
pub(crate) const LIVE_CONNECT_TIMEOUT_SECONDS: &str = "LIVE_CONNECT_TIMEOUT_SECONDS";
pub(crate) const CAPTURE_BLOCK_SIZE: &str = "CAPTURE_BLOCK_SIZE";
pub(crate) const TUTOR_TEACHER: &str = "TUTOR_TEACHER";
pub(crate) const TUTOR_LANGUAGE: &str = "TUTOR_LANGUAGE";
pub(crate) const TUTOR_LEVEL: &str = "TUTOR_LEVEL";
pub(crate) const TUTOR_PRACTICE_MODE: &str = "TUTOR_PRACTICE_MODE";
pub(crate) const TUTOR_MODE_SPECIFICS: &str = "TUTOR_MODE_SPECIFICS";

/// Values read from the process environment. Unset and blank variables are
/// `None`.
#[derive(Debug, Default)]
pub(crate) struct EnvValues {
    pub endpoint_url: Option<String>,
    pub api_key: Option<String>,
    pub api_key_header: Option<String>,
    pub model: Option<String>,
    pub connect_timeout_seconds: Option<u64>,
    pub capture_block_size: Option<usize>,
    pub teacher: Option<String>,
    pub language: Option<String>,
    pub level: Option<String>,
    pub practice_mode: Option<String>,
    pub mode_specifics: Option<String>,
}

fn env_string(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_parsed<T: FromStr>(name: &'static str) -> Result<Option<T>, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match env_string(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::InvalidValue {
                field: name,
                message: format!("'{raw}': {e}"),
            }),
        None => Ok(None),
    }
}

/// Read every recognised variable.
pub(crate) fn read_env() -> Result<EnvValues, ConfigError> {
    Ok(EnvValues {
        endpoint_url: env_string(LIVE_ENDPOINT_URL),
        api_key: env_string(LIVE_API_KEY),
        api_key_header: env_string(LIVE_API_KEY_HEADER),
        model: env_string(LIVE_MODEL),
        connect_timeout_seconds: env_parsed(LIVE_CONNECT_TIMEOUT_SECONDS)?,
        capture_block_size: env_parsed(CAPTURE_BLOCK_SIZE)?,
        teacher: env_string(TUTOR_TEACHER),
        language: env_string(TUTOR_LANGUAGE),
        level: env_string(TUTOR_LEVEL),
        practice_mode: env_string(TUTOR_PRACTICE_MODE),
        // Blank is a valid value here
        mode_specifics: env::var(TUTOR_MODE_SPECIFICS).ok(),
    })
}
