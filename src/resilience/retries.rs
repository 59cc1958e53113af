//! Retry policy for upstream calls.

use axum::http::{Method, StatusCode};

use crate::config::RetryConfig;

/// Whether a failed attempt may be replayed.
///
/// Only `GET` and `HEAD` qualify, and only after a network failure or a
/// 5xx answer. Anything that can change upstream state goes out once.
pub fn is_retryable(method: &Method, status: Option<StatusCode>, network_error: bool) -> bool {
    if method != Method::GET && method != Method::HEAD {
        return false;
    }
    network_error || status.is_some_and(|s| s.is_server_error())
}

/// Total attempts allowed for `method` under `config`.
pub fn attempts_for(method: &Method, config: &RetryConfig) -> u32 {
    if config.enabled && (method == Method::GET || method == Method::HEAD) {
        config.max_attempts.max(1)
    } else {
        1
    }
}
