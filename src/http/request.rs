//! Request-side helpers: request IDs and the client's view of the mirror.
//!
//! # Responsibilities
//! - Generate a UUID v4 request ID for every request and echo it back
//! - Work out the public origin the browser used to reach the mirror
//! - Detect TLS terminated in front of the proxy

use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Request};
use tower_http::request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer};

/// Header carrying the request ID, both to the browser and upstream.
pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Generates UUID v4 request IDs.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidRequestId;

impl MakeRequestId for UuidRequestId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        let id = uuid::Uuid::new_v4().to_string();
        HeaderValue::from_str(&id).ok().map(RequestId::new)
    }
}

pub fn set_request_id_layer() -> SetRequestIdLayer<UuidRequestId> {
    SetRequestIdLayer::new(X_REQUEST_ID, UuidRequestId)
}

pub fn propagate_request_id_layer() -> PropagateRequestIdLayer {
    PropagateRequestIdLayer::new(X_REQUEST_ID)
}

/// Request ID of an incoming request, or `"unknown"` outside the layer.
pub fn request_id(headers: &HeaderMap) -> String {
    headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string()
}

/// How the browser sees the mirror for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientContext {
    /// `scheme://host[:port]` of the mirror, no trailing slash.
    pub local_origin: String,
    /// The browser connection is HTTPS (directly or via the load balancer).
    pub secure: bool,
}

impl ClientContext {
    /// Derive the context from request headers. A configured public origin
    /// wins over anything the request claims.
    pub fn from_headers(headers: &HeaderMap, public_origin: Option<&str>) -> Self {
        let forwarded_https = first_value(headers, "x-forwarded-proto")
            .is_some_and(|proto| proto.eq_ignore_ascii_case("https"))
            || forwarded_proto(headers).is_some_and(|proto| proto.eq_ignore_ascii_case("https"));

        if let Some(origin) = public_origin {
            let origin = origin.trim_end_matches('/');
            let secure = forwarded_https
                || origin.get(..8).is_some_and(|scheme| scheme.eq_ignore_ascii_case("https://"));
            return Self { local_origin: origin.to_string(), secure };
        }

        let host = first_value(headers, "x-forwarded-host")
            .or_else(|| headers.get(header::HOST).and_then(|v| v.to_str().ok()))
            .map(str::trim)
            .filter(|host| !host.is_empty())
            .unwrap_or("localhost");
        let scheme = if forwarded_https { "https" } else { "http" };

        Self {
            local_origin: format!("{}://{}", scheme, host),
            secure: forwarded_https,
        }
    }
}

fn first_value<'h>(headers: &'h HeaderMap, name: &str) -> Option<&'h str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
}

/// `proto=` parameter of the first `Forwarded` element.
fn forwarded_proto(headers: &HeaderMap) -> Option<&str> {
    let element = first_value(headers, "forwarded")?;
    element.split(';').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("proto")
            .then(|| value.trim().trim_matches('"'))
    })
}
