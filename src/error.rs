//! Top-level error type for server construction and startup.

use thiserror::Error;

use crate::config::loader::ConfigError;
use crate::session::SessionError;

/// Errors that abort proxy startup.
///
/// Per-request failures never surface here; they are mapped to HTTP
/// responses by the forwarding engine.
#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("invalid upstream: {0}")]
    Upstream(String),

    #[error("failed to build upstream client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("session store unavailable: {0}")]
    Session(#[from] SessionError),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for startup operations.
pub type Result<T> = std::result::Result<T, ProxyError>;
