//! Request and response descriptors exchanged with the upstream.

use axum::body::Bytes;
use axum::http::{HeaderMap, Method, StatusCode};
use thiserror::Error;
use url::Url;

/// One request bound for the upstream, built fresh per browser request.
#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    /// Raw body bytes; multipart uploads are forwarded untouched.
    pub body: Bytes,
    /// Session the upstream cookies belong to.
    pub session: String,
}

/// Body of a [`ProxyResponse`].
#[derive(Debug)]
pub enum ResponseBody {
    Empty,
    /// Buffered, possibly rewritten.
    Full(Bytes),
    /// Passthrough of a binary upstream body, streamed as it arrives.
    Stream(reqwest::Response),
}

/// Response ready to be sent to the browser. Headers are already filtered.
#[derive(Debug)]
pub struct ProxyResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: ResponseBody,
}

/// Failure talking to the upstream.
///
/// Display strings are the short causes shown to the browser; they never
/// carry the upstream URL or host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ForwardError {
    #[error("timed out")]
    Timeout,

    #[error("connection failed")]
    Connect,

    #[error("response body failed")]
    Body,

    #[error("request failed")]
    Request,
}

impl ForwardError {
    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            ForwardError::Timeout
        } else if err.is_connect() {
            ForwardError::Connect
        } else if err.is_body() || err.is_decode() {
            ForwardError::Body
        } else {
            ForwardError::Request
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ForwardError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::BAD_GATEWAY,
        }
    }

    /// Metric label.
    pub fn kind(&self) -> &'static str {
        match self {
            ForwardError::Timeout => "timeout",
            ForwardError::Connect => "connect",
            ForwardError::Body => "body",
            ForwardError::Request => "request",
        }
    }

    /// Plain-text body sent to the browser.
    pub fn message(&self) -> String {
        format!("upstream error: {}", self)
    }
}
