//! Conversion of proxy outcomes into browser responses.
//!
//! # Design Decisions
//! - Binary passthrough streams straight from the upstream connection
//! - Error bodies are short plain text and never name the upstream
//! - The session cookie is appended last so nothing upstream can shadow it

use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::forward::{ForwardError, ProxyResponse, ResponseBody};

impl IntoResponse for ProxyResponse {
    fn into_response(self) -> Response {
        let body = match self.body {
            ResponseBody::Empty => Body::empty(),
            ResponseBody::Full(bytes) => Body::from(bytes),
            ResponseBody::Stream(upstream) => Body::from_stream(upstream.bytes_stream()),
        };

        let mut response = Response::new(body);
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

impl IntoResponse for ForwardError {
    fn into_response(self) -> Response {
        plain_text(self.status(), self.message())
    }
}

/// Plain-text response with an explicit content type.
pub fn plain_text(status: StatusCode, message: impl Into<String>) -> Response {
    let mut response = Response::new(Body::from(message.into()));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

/// Attach the session-identifier cookie.
pub fn with_session_cookie(mut response: Response, cookie: &str) -> Response {
    match HeaderValue::from_str(cookie) {
        Ok(value) => {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
        Err(_) => tracing::warn!("Session cookie is not a valid header value"),
    }
    response
}
