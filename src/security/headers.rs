//! Header policy for both directions of the mirror.
//!
//! # Responsibilities
//! - Strip hop-by-hop headers and anything named in `Connection`
//! - Re-target `Host`, `Origin` and `Referer` at the upstream
//! - Keep browser cookies away from the upstream and upstream cookies away
//!   from the browser (the session jar sits in between)
//! - Remove upstream policies that would break the mirror (CSP, framing, HSTS)

use axum::http::{header, HeaderMap, HeaderName, HeaderValue};
use url::Url;

use crate::http::request::ClientContext;
use crate::rewrite::{MountPrefix, UpstreamOrigin};

const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
];

const REQUEST_STRIPPED: [HeaderName; 4] = [
    header::HOST,
    header::CONTENT_LENGTH,
    header::COOKIE,
    header::ACCEPT_ENCODING,
];

const RESPONSE_STRIPPED: [HeaderName; 7] = [
    header::CONTENT_SECURITY_POLICY,
    header::CONTENT_SECURITY_POLICY_REPORT_ONLY,
    header::X_FRAME_OPTIONS,
    header::STRICT_TRANSPORT_SECURITY,
    header::CONTENT_ENCODING,
    header::CONTENT_LENGTH,
    header::SET_COOKIE,
];

/// Header names listed in `Connection` tokens.
fn connection_tokens(headers: &HeaderMap) -> Vec<HeaderName> {
    headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|token| HeaderName::from_bytes(token.trim().as_bytes()).ok())
        .collect()
}

fn strip(headers: &mut HeaderMap, names: &[HeaderName]) {
    for name in names {
        headers.remove(name);
    }
}

/// Build the header set sent upstream from the browser's headers.
pub fn build_upstream_headers(
    incoming: &HeaderMap,
    upstream: &UpstreamOrigin,
    mount: &MountPrefix,
    client: &ClientContext,
) -> HeaderMap {
    let mut headers = incoming.clone();
    let named = connection_tokens(&headers);
    strip(&mut headers, &named);
    strip(&mut headers, &HOP_BY_HOP);
    strip(&mut headers, &REQUEST_STRIPPED);

    if let Ok(host) = HeaderValue::from_str(upstream.authority()) {
        headers.insert(header::HOST, host);
    }

    if headers.contains_key(header::ORIGIN) {
        if let Ok(origin) = HeaderValue::from_str(upstream.origin()) {
            headers.insert(header::ORIGIN, origin);
        }
    }

    if let Some(referer) = incoming.get(header::REFERER).and_then(|v| v.to_str().ok()) {
        let translated = translate_referer(referer, upstream, mount, &client.local_origin);
        match HeaderValue::from_str(&translated) {
            Ok(value) => {
                headers.insert(header::REFERER, value);
            }
            Err(_) => {
                headers.remove(header::REFERER);
            }
        }
    }

    headers
}

/// Point a browser `Referer` at the upstream. Mirror URLs keep their path
/// (with the mount removed) and query; anything else collapses to the
/// upstream root.
fn translate_referer(referer: &str, upstream: &UpstreamOrigin, mount: &MountPrefix, local_origin: &str) -> String {
    let root = format!("{}/", upstream.origin());
    let Ok(url) = Url::parse(referer) else {
        return root;
    };

    let origin = url.origin().ascii_serialization();
    if !origin.eq_ignore_ascii_case(local_origin.trim_end_matches('/')) {
        return root;
    }

    let path = mount.strip(url.path()).unwrap_or(url.path());
    match url.query() {
        Some(query) => format!("{}{}?{}", upstream.origin(), path, query),
        None => format!("{}{}", upstream.origin(), path),
    }
}

/// Filter upstream response headers before they reach the browser.
pub fn sanitize_downstream_headers(upstream: &HeaderMap) -> HeaderMap {
    let mut headers = upstream.clone();
    let named = connection_tokens(&headers);
    strip(&mut headers, &named);
    strip(&mut headers, &HOP_BY_HOP);
    strip(&mut headers, &RESPONSE_STRIPPED);
    headers
}
