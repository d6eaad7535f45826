//! Endpoint URL validation
//!
//! The live endpoint carries the API key and the student's voice, so it must
//! be encrypted. Plain `ws://` is accepted only for a loopback host, which is
//! how local mock agents are reached.

use std::net::IpAddr;
use thiserror::Error;
use url::{Host, Url};

/// Errors that can occur during endpoint validation
#[derive(Debug, Error)]
pub enum EndpointValidationError {
    #[error("Invalid URL format: {0}")]
    InvalidFormat(#[from] url::ParseError),

    #[error("Endpoint scheme must be wss, got: {0}")]
    SecureWebSocketRequired(String),

    #[error("Plain ws:// is only allowed for loopback hosts, got: {0}")]
    InsecureRemoteHost(String),

    #[error("URL must have a host")]
    MissingHost,
}

/// Checks whether a URL host refers to the local machine
pub fn is_loopback_host(host: &Host<&str>) -> bool {
    match host {
        Host::Domain(domain) => domain.eq_ignore_ascii_case("localhost"),
        Host::Ipv4(ip) => ip.is_loopback(),
        Host::Ipv6(ip) => ip.is_loopback(),
    }
}

/// Checks whether an IP address is loopback
pub fn is_loopback_ip(ip: &IpAddr) -> bool {
    ip.is_loopback()
}

/// Validates a live endpoint URL
///
/// # Rules
/// - Scheme must be `wss`, or `ws` when the host is loopback
/// - A host must be present
pub fn validate_endpoint_url(url_str: &str) -> Result<Url, EndpointValidationError> {
    let url = Url::parse(url_str)?;
    let host = url.host().ok_or(EndpointValidationError::MissingHost)?;

    match url.scheme() {
        "wss" => Ok(url),
        "ws" if is_loopback_host(&host) => Ok(url),
        "ws" => Err(EndpointValidationError::InsecureRemoteHost(host.to_string())),
        other => Err(EndpointValidationError::SecureWebSocketRequired(
            other.to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wss_accepted() {
        assert!(validate_endpoint_url("wss://example.com/ws/live").is_ok());
    }

    #[test]
    fn test_ws_loopback_accepted() {
        assert!(validate_endpoint_url("ws://localhost:8080/live").is_ok());
        assert!(validate_endpoint_url("ws://127.0.0.1:8080/live").is_ok());
        assert!(validate_endpoint_url("ws://[::1]:8080/live").is_ok());
    }

    #[test]
    fn test_ws_remote_rejected() {
        let result = validate_endpoint_url("ws://example.com/live");
        assert!(matches!(
            result,
            Err(EndpointValidationError::InsecureRemoteHost(_))
        ));
        let result = validate_endpoint_url("ws://10.0.0.5/live");
        assert!(matches!(
            result,
            Err(EndpointValidationError::InsecureRemoteHost(_))
        ));
    }

    #[test]
    fn test_other_schemes_rejected() {
        assert!(matches!(
            validate_endpoint_url("https://example.com/live"),
            Err(EndpointValidationError::SecureWebSocketRequired(_))
        ));
    }

    #[test]
    fn test_invalid_url() {
        assert!(matches!(
            validate_endpoint_url("not a url"),
            Err(EndpointValidationError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_loopback_ip() {
        assert!(is_loopback_ip(&"127.0.0.1".parse().unwrap()));
        assert!(!is_loopback_ip(&"8.8.8.8".parse().unwrap()));
    }
}
