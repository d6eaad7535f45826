use super::ConfigError;
use crate::utils::endpoint_validation::validate_endpoint_url;

pub(crate) const MIN_CAPTURE_BLOCK_SIZE: usize = 256;
pub(crate) const MAX_CAPTURE_BLOCK_SIZE: usize = 16384;

/// The API key must be present and non-blank.
pub(crate) fn validate_api_key(api_key: Option<&str>) -> Result<(), ConfigError> {
    match api_key {
        Some(key) if !key.trim().is_empty() => Ok(()),
        _ => Err(ConfigError::Missing {
            field: "live.api_key",
            hint: "set LIVE_API_KEY or live.api_key",
        }),
    }
}

pub(crate) fn validate_endpoint(endpoint_url: &str) -> Result<(), ConfigError> {
    validate_endpoint_url(endpoint_url)?;
    Ok(())
}

/// Block size must be a power of two within the supported range.
pub(crate) fn validate_capture_block_size(block_size: usize) -> Result<(), ConfigError> {
    if !(MIN_CAPTURE_BLOCK_SIZE..=MAX_CAPTURE_BLOCK_SIZE).contains(&block_size)
        || !block_size.is_power_of_two()
    {
        return Err(ConfigError::InvalidValue {
            field: "audio.capture_block_size",
            message: format!(
                "{block_size} must be a power of two between {MIN_CAPTURE_BLOCK_SIZE} and {MAX_CAPTURE_BLOCK_SIZE}"
            ),
        });
    }
    Ok(())
}

pub(crate) fn validate_connect_timeout(seconds: u64) -> Result<(), ConfigError> {
    if seconds == 0 {
        return Err(ConfigError::InvalidValue {
            field: "live.connect_timeout_seconds",
            message: "must be greater than zero".to_string(),
        });
    }
    Ok(())
}

pub(crate) fn validate_api_key_header(header: &str) -> Result<(), ConfigError> {
    http::HeaderName::from_bytes(header.as_bytes()).map_err(|e| ConfigError::InvalidValue {
        field: "live.api_key_header",
        message: format!("'{header}': {e}"),
    })?;
    Ok(())
}
