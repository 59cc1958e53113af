//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the mirror proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// The single upstream site being mirrored.
    pub upstream: UpstreamConfig,

    /// Local mount under which upstream paths are re-rooted.
    pub mount: MountConfig,

    /// Body rewriting switches.
    pub rewrite: RewriteConfig,

    /// Session affinity settings.
    pub session: SessionConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Retry configuration.
    pub retries: RetryConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Request size limits.
    pub security: SecurityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8000").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8000".to_string(),
        }
    }
}

/// Upstream site configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Base URL of the mirrored site, scheme and host only
    /// (e.g., "https://portal.example.org").
    pub base_url: String,

    /// Upstream path served when the client asks for `/`.
    /// `None` forwards `/` unchanged.
    pub landing_path: Option<String>,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "https://portal.example.org".to_string(),
            landing_path: None,
        }
    }
}

/// Mount configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MountConfig {
    /// Local path prefix for rewritten root-relative URLs. Empty mounts the
    /// upstream at the root.
    pub prefix: String,

    /// Public origin of the mirror (e.g., "https://mirror.example.net").
    /// When unset it is derived per request from forwarding headers.
    pub public_origin: Option<String>,
}

impl Default for MountConfig {
    fn default() -> Self {
        Self {
            prefix: "/proxy".to_string(),
            public_origin: None,
        }
    }
}

/// Rewriting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RewriteConfig {
    /// Rewrite upstream origins inside inline scripts and other HTML text.
    pub inline: bool,
}

impl Default for RewriteConfig {
    fn default() -> Self {
        Self { inline: true }
    }
}

/// Session store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Name of the session-identifier cookie set on the browser.
    pub cookie_name: String,

    /// Inactivity TTL in seconds.
    pub ttl_secs: u64,

    /// Secret used to encrypt jars at rest. Unset stores plaintext JSON.
    pub encryption_key: Option<String>,

    /// Secret used to sign session tokens. Unset picks a random secret per
    /// process, so tokens do not survive a restart. Required with `store_url`.
    pub signing_key: Option<String>,

    /// External store connection string (e.g., "redis://127.0.0.1/").
    /// Unset keeps sessions in process memory.
    pub store_url: Option<String>,

    /// Key prefix in the external store.
    pub key_prefix: String,

    /// Interval of the in-memory expiry sweep in seconds.
    pub sweep_interval_secs: u64,

    /// Bound on each session store call in milliseconds. A slower store is
    /// treated as failed.
    pub store_timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: "mirror_session".to_string(),
            ttl_secs: 24 * 60 * 60,
            encryption_key: None,
            signing_key: None,
            store_url: None,
            key_prefix: "mirror:session:".to_string(),
            sweep_interval_secs: 300,
            store_timeout_ms: 2000,
        }
    }
}

/// Timeout configuration for upstream calls.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Total upstream request timeout (including body) in seconds.
    pub request_secs: u64,

    /// Idle pooled connection timeout in seconds.
    pub idle_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 10,
            request_secs: 45,
            idle_secs: 60,
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Enable retries for idempotent reads.
    pub enabled: bool,

    /// Maximum number of attempts, including the first one.
    pub max_attempts: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 2,
            base_delay_ms: 100,
            max_delay_ms: 1000,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Log line format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Request limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Maximum request body size in bytes.
    pub max_body_size: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_body_size: 16 * 1024 * 1024, // 16MB, uploads included
        }
    }
}
