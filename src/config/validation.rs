//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Enforce the required upstream credential
//! - Validate value ranges (timeouts > 0, body limit > 0)
//! - Require an encrypted upstream outside of loopback
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::IpAddr;

use url::{Host, Url};

use crate::config::schema::ProxyConfig;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("upstream.api_key is required (set UPSTREAM_API_KEY)")]
    MissingApiKey,
    #[error("upstream.url `{0}` is not a valid URL")]
    InvalidUpstreamUrl(String),
    #[error("upstream.url `{0}` must use https unless it points at a loopback host")]
    InsecureUpstream(String),
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
    #[error("listener.host `{0}` is empty")]
    EmptyBindHost(String),
    #[error("observability.metrics_address `{0}` is not a socket address")]
    InvalidMetricsAddress(String),
}

pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.upstream.api_key.trim().is_empty() {
        errors.push(ValidationError::MissingApiKey);
    }

    match Url::parse(&config.upstream.url) {
        Ok(url) if url.scheme() == "https" => {}
        Ok(url) if url.scheme() == "http" && is_loopback(&url) => {}
        Ok(url) if url.scheme() == "http" => {
            errors.push(ValidationError::InsecureUpstream(config.upstream.url.clone()))
        }
        _ => errors.push(ValidationError::InvalidUpstreamUrl(config.upstream.url.clone())),
    }

    if config.timeouts.upstream_ms == 0 {
        errors.push(ValidationError::Zero("timeouts.upstream_ms"));
    }
    if config.timeouts.client_idle_ms == 0 {
        errors.push(ValidationError::Zero("timeouts.client_idle_ms"));
    }
    if config.timeouts.admin_request_secs == 0 {
        errors.push(ValidationError::Zero("timeouts.admin_request_secs"));
    }
    if config.limits.max_body_bytes == 0 {
        errors.push(ValidationError::Zero("limits.max_body_bytes"));
    }
    if config.listener.host.trim().is_empty() {
        errors.push(ValidationError::EmptyBindHost(config.listener.host.clone()));
    }
    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<std::net::SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::InvalidMetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn is_loopback(url: &Url) -> bool {
    match url.host() {
        Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
        Some(Host::Ipv4(ip)) => IpAddr::V4(ip).is_loopback(),
        Some(Host::Ipv6(ip)) => IpAddr::V6(ip).is_loopback(),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> ProxyConfig {
        let mut config = ProxyConfig::default();
        config.upstream.api_key = "sk-test".into();
        config
    }

    #[test]
    fn defaults_with_key_are_valid() {
        assert_eq!(validate_config(&valid()), Ok(()));
    }

    #[test]
    fn missing_api_key_is_rejected() {
        let errors = validate_config(&ProxyConfig::default()).unwrap_err();
        assert_eq!(errors, vec![ValidationError::MissingApiKey]);
    }

    #[test]
    fn plain_http_only_for_loopback() {
        let mut config = valid();
        config.upstream.url = "http://127.0.0.1:9000/v1/chat/completions".into();
        assert!(validate_config(&config).is_ok());

        config.upstream.url = "http://localhost:9000/v1".into();
        assert!(validate_config(&config).is_ok());

        config.upstream.url = "http://api.example.com/v1".into();
        assert_eq!(
            validate_config(&config).unwrap_err(),
            vec![ValidationError::InsecureUpstream("http://api.example.com/v1".into())]
        );
    }

    #[test]
    fn collects_every_error() {
        let mut config = ProxyConfig::default();
        config.upstream.url = "not a url".into();
        config.timeouts.upstream_ms = 0;
        config.limits.max_body_bytes = 0;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors.contains(&ValidationError::MissingApiKey));
        assert!(errors.contains(&ValidationError::Zero("timeouts.upstream_ms")));
        assert!(errors.contains(&ValidationError::Zero("limits.max_body_bytes")));
    }
}
