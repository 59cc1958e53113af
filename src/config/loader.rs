//! Configuration loading from disk and environment.

use std::path::Path;
use std::fs;
use crate::config::schema::{LogFormat, ProxyConfig};
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Env { var: &'static str, value: String },
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Env { var, value } => write!(f, "Invalid value for {}: {:?}", var, value),
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 { write!(f, ", ")?; }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Resolve the effective configuration: optional file, then environment
/// overrides, then validation.
pub fn resolve_config(path: Option<&Path>) -> Result<ProxyConfig, ConfigError> {
    let mut config = match path {
        Some(path) => {
            let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
            toml::from_str(&content).map_err(ConfigError::Parse)?
        }
        None => ProxyConfig::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Apply environment overrides on top of file/default configuration.
///
/// `lookup` abstracts the environment so tests can feed fixed values.
pub fn apply_env_overrides<F>(config: &mut ProxyConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(url) = lookup("UPSTREAM_URL") {
        config.upstream.base_url = url;
    }

    if let Some(port) = lookup("PORT") {
        let port: u16 = port
            .parse()
            .map_err(|_| ConfigError::Env { var: "PORT", value: port.clone() })?;
        let host = config
            .listener
            .bind_address
            .rsplit_once(':')
            .map(|(host, _)| host.to_string())
            .unwrap_or_else(|| "0.0.0.0".to_string());
        config.listener.bind_address = format!("{}:{}", host, port);
    }

    if let Some(prefix) = lookup("MOUNT_PREFIX") {
        config.mount.prefix = prefix;
    }

    if let Some(origin) = lookup("PUBLIC_ORIGIN") {
        config.mount.public_origin = Some(origin);
    }

    if let Some(ttl) = lookup("SESSION_TTL_SECS") {
        config.session.ttl_secs = ttl
            .parse()
            .map_err(|_| ConfigError::Env { var: "SESSION_TTL_SECS", value: ttl.clone() })?;
    }

    if let Some(key) = lookup("SESSION_ENCRYPTION_KEY") {
        config.session.encryption_key = Some(key);
    }

    if let Some(key) = lookup("SESSION_SIGNING_KEY") {
        config.session.signing_key = Some(key);
    }

    if let Some(url) = lookup("SESSION_STORE_URL") {
        config.session.store_url = Some(url);
    }

    if let Some(format) = lookup("LOG_FORMAT") {
        config.observability.log_format = match format.to_ascii_lowercase().as_str() {
            "json" => LogFormat::Json,
            "pretty" => LogFormat::Pretty,
            _ => return Err(ConfigError::Env { var: "LOG_FORMAT", value: format }),
        };
    }

    Ok(())
}
