use std::str::FromStr;

use super::env::{self, EnvValues};
use super::yaml::YamlConfig;
use super::{ConfigError, TutorConfig};
use crate::core::live::DEFAULT_CAPTURE_BLOCK_SIZE;
use crate::core::live::websocket::{
    DEFAULT_API_KEY_HEADER, DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_LIVE_ENDPOINT,
    DEFAULT_LIVE_MODEL,
};
use crate::tutor::UnknownOption;

fn parse_choice<T>(value: Option<String>, field: &'static str) -> Result<T, ConfigError>
where
    T: FromStr<Err = UnknownOption> + Default,
{
    match value {
        Some(raw) => raw.parse().map_err(|e: UnknownOption| ConfigError::InvalidValue {
            field,
            message: e.to_string(),
        }),
        None => Ok(T::default()),
    }
}

/// Merge environment values (base) with YAML overrides, then defaults.
pub(crate) fn merge_config(yaml: Option<YamlConfig>) -> Result<TutorConfig, ConfigError> {
    let env = env::read_env()?;
    merge_values(env, yaml.unwrap_or_default())
}

pub(crate) fn merge_values(env: EnvValues, yaml: YamlConfig) -> Result<TutorConfig, ConfigError> {
    let live = yaml.live.unwrap_or_default();
    let audio = yaml.audio.unwrap_or_default();
    let tutor = yaml.tutor.unwrap_or_default();

    let endpoint_url = live
        .endpoint_url
        .or(env.endpoint_url)
        .unwrap_or_else(|| DEFAULT_LIVE_ENDPOINT.to_string());
    let api_key = live.api_key.or(env.api_key);
    let api_key_header = live
        .api_key_header
        .or(env.api_key_header)
        .unwrap_or_else(|| DEFAULT_API_KEY_HEADER.to_string());
    let model = live
        .model
        .or(env.model)
        .unwrap_or_else(|| DEFAULT_LIVE_MODEL.to_string());
    let connect_timeout_seconds = live
        .connect_timeout_seconds
        .or(env.connect_timeout_seconds)
        .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS);
    let capture_block_size = audio
        .capture_block_size
        .or(env.capture_block_size)
        .unwrap_or(DEFAULT_CAPTURE_BLOCK_SIZE);

    let teacher = parse_choice(tutor.teacher.or(env.teacher), "tutor.teacher")?;
    let language = parse_choice(tutor.language.or(env.language), "tutor.language")?;
    let level = parse_choice(tutor.level.or(env.level), "tutor.level")?;
    let practice_mode = parse_choice(
        tutor.practice_mode.or(env.practice_mode),
        "tutor.practice_mode",
    )?;
    let mode_specifics = tutor
        .mode_specifics
        .or(env.mode_specifics)
        .unwrap_or_default();

    Ok(TutorConfig {
        endpoint_url,
        api_key,
        api_key_header,
        model,
        connect_timeout_seconds,
        capture_block_size,
        teacher,
        language,
        level,
        practice_mode,
        mode_specifics,
    })
}
