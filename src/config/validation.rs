//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate the upstream base URL and mount prefix shape
//! - Validate value ranges (timeouts > 0, TTL > 0, addresses parse)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;
use url::Url;

use crate::config::schema::ProxyConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self { field, message: message.into() }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("not a socket address: {:?}", config.listener.bind_address),
        ));
    }

    match Url::parse(&config.upstream.base_url) {
        Ok(url) => {
            if !matches!(url.scheme(), "http" | "https") {
                errors.push(ValidationError::new("upstream.base_url", "scheme must be http or https"));
            }
            if url.host_str().is_none() {
                errors.push(ValidationError::new("upstream.base_url", "missing host"));
            }
            if url.path() != "/" || url.query().is_some() {
                errors.push(ValidationError::new("upstream.base_url", "must not carry a path or query"));
            }
        }
        Err(e) => errors.push(ValidationError::new("upstream.base_url", e.to_string())),
    }

    if let Some(landing) = &config.upstream.landing_path {
        if !landing.starts_with('/') {
            errors.push(ValidationError::new("upstream.landing_path", "must start with '/'"));
        }
    }

    let prefix = &config.mount.prefix;
    if !prefix.is_empty() && (!prefix.starts_with('/') || prefix.ends_with('/')) {
        errors.push(ValidationError::new(
            "mount.prefix",
            "must be empty or start with '/' and not end with '/'",
        ));
    }

    if let Some(origin) = &config.mount.public_origin {
        match Url::parse(origin) {
            Ok(url) if url.path() == "/" && url.host_str().is_some() => {}
            _ => errors.push(ValidationError::new(
                "mount.public_origin",
                "must be a scheme://host[:port] origin",
            )),
        }
    }

    if config.session.ttl_secs == 0 {
        errors.push(ValidationError::new("session.ttl_secs", "must be greater than 0"));
    }
    if config.session.cookie_name.is_empty()
        || !config.session.cookie_name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        errors.push(ValidationError::new("session.cookie_name", "must be a non-empty token"));
    }
    if config.session.encryption_key.as_deref() == Some("") {
        errors.push(ValidationError::new("session.encryption_key", "must not be empty when set"));
    }
    match config.session.signing_key.as_deref() {
        Some("") => errors.push(ValidationError::new("session.signing_key", "must not be empty when set")),
        None if config.session.store_url.is_some() => errors.push(ValidationError::new(
            "session.signing_key",
            "required when session.store_url is set",
        )),
        _ => {}
    }
    if config.session.store_timeout_ms == 0 {
        errors.push(ValidationError::new("session.store_timeout_ms", "must be greater than 0"));
    }

    if config.timeouts.connect_secs == 0 {
        errors.push(ValidationError::new("timeouts.connect_secs", "must be greater than 0"));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than 0"));
    }

    if config.retries.max_attempts == 0 {
        errors.push(ValidationError::new("retries.max_attempts", "must be at least 1"));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new("observability.metrics_address", "not a socket address"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
