//! Upstream deadlines.
//!
//! The connect and total deadlines are enforced by the `reqwest` client; the
//! HTTP layer adds an outer bound a little above the total so a stuck
//! handler still ends with a response.

use std::time::Duration;

use axum::http::StatusCode;
use tower_http::timeout::TimeoutLayer;

use crate::config::TimeoutConfig;

/// Slack between the upstream deadline and the outer handler deadline.
const HANDLER_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpstreamTimeouts {
    pub connect: Duration,
    pub request: Duration,
    pub idle: Duration,
}

impl UpstreamTimeouts {
    /// Outer deadline for a whole request across `attempts` upstream calls
    /// separated by at most `max_backoff` each.
    pub fn handler(&self, attempts: u32, max_backoff: Duration) -> Duration {
        let attempts = attempts.max(1);
        self.request * attempts + max_backoff * (attempts - 1) + HANDLER_GRACE
    }
}

/// Outer bound on a whole request. Expiry answers `504`, the same status as
/// an upstream timeout.
pub fn handler_timeout_layer(timeout: Duration) -> TimeoutLayer {
    TimeoutLayer::with_status_code(StatusCode::GATEWAY_TIMEOUT, timeout)
}

impl From<&TimeoutConfig> for UpstreamTimeouts {
    fn from(config: &TimeoutConfig) -> Self {
        Self {
            connect: Duration::from_secs(config.connect_secs),
            request: Duration::from_secs(config.request_secs),
            idle: Duration::from_secs(config.idle_secs),
        }
    }
}
