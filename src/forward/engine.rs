//! Upstream forwarding: one browser request in, one [`ProxyResponse`] out.

use std::sync::Arc;

use axum::body::Bytes;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use reqwest::redirect::Policy;
use url::Url;

use crate::config::RetryConfig;
use crate::forward::outcome::{ForwardError, ProxyResponse, ResponseBody, UpstreamRequest};
use crate::http::request::ClientContext;
use crate::observability::metrics;
use crate::resilience::backoff::calculate_backoff;
use crate::resilience::retries::{attempts_for, is_retryable};
use crate::resilience::timeouts::UpstreamTimeouts;
use crate::rewrite::{MediaType, RewriteDiagnostic, Rewriter};
use crate::security::headers::{build_upstream_headers, sanitize_downstream_headers};
use crate::session::{unix_now, SessionStore};

/// Response headers whose values may embed upstream origins.
const URL_TEXT_HEADERS: [HeaderName; 2] = [header::LINK, HeaderName::from_static("refresh")];

/// Response headers holding exactly one URL.
const URL_HEADERS: [HeaderName; 2] = [header::LOCATION, header::CONTENT_LOCATION];

/// Drives the BUILD → SEND → REDIRECT | CONTENT cycle.
pub struct Forwarder {
    client: reqwest::Client,
    rewriter: Rewriter,
    sessions: Arc<SessionStore>,
    retries: RetryConfig,
}

impl Forwarder {
    pub fn new(client: reqwest::Client, rewriter: Rewriter, sessions: Arc<SessionStore>, retries: RetryConfig) -> Self {
        Self { client, rewriter, sessions, retries }
    }

    /// Upstream client: no redirect following, no cookie store, bounded.
    pub fn build_client(timeouts: &UpstreamTimeouts) -> Result<reqwest::Client, reqwest::Error> {
        reqwest::Client::builder()
            .redirect(Policy::none())
            .connect_timeout(timeouts.connect)
            .timeout(timeouts.request)
            .pool_idle_timeout(timeouts.idle)
            .build()
    }

    pub fn rewriter(&self) -> &Rewriter {
        &self.rewriter
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// BUILD: header policy plus the session's cookies for `url`.
    pub async fn build(
        &self,
        method: Method,
        url: Url,
        incoming: &HeaderMap,
        body: Bytes,
        session: &str,
        client: &ClientContext,
    ) -> UpstreamRequest {
        let mut headers = build_upstream_headers(incoming, self.rewriter.upstream(), self.rewriter.mount(), client);

        let jar = self.sessions.get(session).await;
        if let Some(cookie) = jar.cookie_header(&url, unix_now()) {
            match HeaderValue::from_str(&cookie) {
                Ok(value) => {
                    headers.insert(header::COOKIE, value);
                }
                Err(_) => tracing::warn!("Session jar produced an invalid Cookie header"),
            }
        }

        UpstreamRequest { method, url, headers, body, session: session.to_string() }
    }

    /// SEND and classify the upstream answer.
    pub async fn forward(&self, request: UpstreamRequest, client: &ClientContext) -> Result<ProxyResponse, ForwardError> {
        let response = self.send(&request).await?;
        let status = response.status();

        let set_cookies: Vec<String> = response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .map(str::to_string)
            .collect();

        let mut headers = sanitize_downstream_headers(response.headers());
        self.rewrite_url_headers(&mut headers, &request.url, client);

        if status.is_redirection() && headers.contains_key(header::LOCATION) {
            tracing::debug!(status = %status, location = ?headers.get(header::LOCATION), "Upstream redirect");
            self.persist_cookies(&request, &set_cookies).await;
            return Ok(ProxyResponse { status, headers, body: ResponseBody::Empty });
        }

        let media = MediaType::parse(
            response
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok()),
        );

        if request.method == Method::HEAD || !has_body(status) {
            self.persist_cookies(&request, &set_cookies).await;
            return Ok(ProxyResponse { status, headers, body: ResponseBody::Empty });
        }

        if !media.kind.is_textual() {
            self.persist_cookies(&request, &set_cookies).await;
            return Ok(ProxyResponse { status, headers, body: ResponseBody::Stream(response) });
        }

        let body = response.bytes().await.map_err(|e| {
            let error = ForwardError::from_reqwest(&e);
            tracing::warn!(url = %request.url, error = %e, "Failed to read upstream body");
            metrics::record_upstream_error(error.kind());
            error
        })?;

        let rewritten = self.rewriter.rewrite(body, &media, &client.local_origin);
        if let Some(diagnostic) = &rewritten.diagnostic {
            tracing::warn!(url = %request.url, kind = media.kind.as_str(), %diagnostic, "Rewrite degraded");
        }
        let outcome = match rewritten.diagnostic {
            None => "rewritten",
            Some(RewriteDiagnostic::LossyDecode) => "lossy",
            Some(RewriteDiagnostic::UnsupportedCharset(_)) => "skipped",
        };
        metrics::record_rewrite(media.kind.as_str(), outcome);

        self.persist_cookies(&request, &set_cookies).await;
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));

        Ok(ProxyResponse { status, headers, body: ResponseBody::Full(rewritten.body) })
    }

    async fn send(&self, request: &UpstreamRequest) -> Result<reqwest::Response, ForwardError> {
        let max_attempts = attempts_for(&request.method, &self.retries);
        let mut attempt = 0;

        loop {
            attempt += 1;

            let mut builder = self
                .client
                .request(request.method.clone(), request.url.clone())
                .headers(request.headers.clone());
            if !request.body.is_empty() {
                builder = builder.body(request.body.clone());
            }

            match builder.send().await {
                Ok(response) => {
                    let status = response.status();
                    if attempt < max_attempts && is_retryable(&request.method, Some(status), false) {
                        let delay = calculate_backoff(attempt, self.retries.base_delay_ms, self.retries.max_delay_ms);
                        tracing::info!(attempt, status = %status, delay = ?delay, "Retrying upstream request");
                        drop(response);
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    return Ok(response);
                }
                Err(e) => {
                    let error = ForwardError::from_reqwest(&e);
                    tracing::warn!(attempt, url = %request.url, error = %e, "Upstream request failed");

                    if attempt < max_attempts && is_retryable(&request.method, None, true) {
                        let delay = calculate_backoff(attempt, self.retries.base_delay_ms, self.retries.max_delay_ms);
                        tracing::info!(attempt, delay = ?delay, "Retrying after network error");
                        tokio::time::sleep(delay).await;
                        continue;
                    }

                    metrics::record_upstream_error(error.kind());
                    return Err(error);
                }
            }
        }
    }

    /// Rewrite URL-bearing response headers into mirror space.
    fn rewrite_url_headers(&self, headers: &mut HeaderMap, request_url: &Url, client: &ClientContext) {
        for name in URL_HEADERS {
            let Some(raw) = headers.get(&name).and_then(|v| v.to_str().ok()) else {
                continue;
            };
            let mapped = self.map_location(raw, request_url, &client.local_origin);
            if mapped != raw {
                if let Ok(value) = HeaderValue::from_str(&mapped) {
                    headers.insert(name, value);
                }
            }
        }

        for name in URL_TEXT_HEADERS {
            let values: Vec<HeaderValue> = headers
                .get_all(&name)
                .iter()
                .map(|value| match value.to_str() {
                    Ok(text) => HeaderValue::from_str(&self.rewriter.rewrite_text(text, &client.local_origin))
                        .unwrap_or_else(|_| value.clone()),
                    Err(_) => value.clone(),
                })
                .collect();
            if values.is_empty() {
                continue;
            }
            headers.remove(&name);
            for value in values {
                headers.append(name.clone(), value);
            }
        }
    }

    /// Map a `Location`-style value. Relative values resolve against the
    /// request URL; third-party targets and unparseable values stay raw.
    fn map_location(&self, raw: &str, request_url: &Url, local_origin: &str) -> String {
        match request_url.join(raw.trim()) {
            Ok(absolute) => self
                .rewriter
                .map_url(absolute.as_str(), local_origin)
                .unwrap_or_else(|| raw.to_string()),
            Err(e) => {
                tracing::warn!(location = %raw, error = %e, "Unparseable upstream Location, passing through");
                raw.to_string()
            }
        }
    }

    /// Merge upstream `Set-Cookie` headers into the session jar.
    async fn persist_cookies(&self, request: &UpstreamRequest, set_cookies: &[String]) {
        if set_cookies.is_empty() {
            return;
        }
        let now = unix_now();
        let result = self
            .sessions
            .update(&request.session, |jar| {
                jar.merge_set_cookies(set_cookies.iter().map(String::as_str), &request.url, now);
            })
            .await;

        if let Err(e) = result {
            tracing::warn!(error = %e, "Failed to persist upstream cookies");
        }
    }
}

/// Statuses that never carry a body.
fn has_body(status: StatusCode) -> bool {
    !(status.is_informational() || status == StatusCode::NO_CONTENT || status == StatusCode::NOT_MODIFIED)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::rewrite::{MountPrefix, UpstreamOrigin};
    use crate::session::MemoryBackend;

    fn forwarder() -> Forwarder {
        let upstream = UpstreamOrigin::parse("https://portal.example.org").unwrap();
        let rewriter = Rewriter::new(upstream, MountPrefix::new("/proxy"), true).unwrap();
        let sessions = Arc::new(SessionStore::new(Arc::new(MemoryBackend::new()), &SessionConfig::default()));
        let client = Forwarder::build_client(&UpstreamTimeouts::from(&crate::config::TimeoutConfig::default())).unwrap();
        Forwarder::new(client, rewriter, sessions, RetryConfig::default())
    }

    #[test]
    fn test_map_location() {
        let f = forwarder();
        let from = Url::parse("https://portal.example.org/guardian/login").unwrap();
        let local = "https://mirror.test";

        assert_eq!(
            f.map_location("https://portal.example.org/guardian/home.html", &from, local),
            "https://mirror.test/proxy/guardian/home.html"
        );
        assert_eq!(f.map_location("/public/home.html", &from, local), "https://mirror.test/proxy/public/home.html");
        assert_eq!(f.map_location("home.html?x=1", &from, local), "https://mirror.test/proxy/guardian/home.html?x=1");
        assert_eq!(f.map_location("https://sso.example.com/auth", &from, local), "https://sso.example.com/auth");
        assert_eq!(f.map_location("http://[broken", &from, local), "http://[broken");
    }

    #[test]
    fn test_url_headers_rewritten() {
        let f = forwarder();
        let from = Url::parse("https://portal.example.org/a").unwrap();
        let client = ClientContext { local_origin: "https://mirror.test".into(), secure: true };

        let mut headers = HeaderMap::new();
        headers.insert(header::LOCATION, "/items/7".parse().unwrap());
        headers.insert(header::LINK, "<https://portal.example.org/s.css>; rel=preload".parse().unwrap());
        headers.insert("refresh", "5; url=https://portal.example.org/home".parse().unwrap());

        f.rewrite_url_headers(&mut headers, &from, &client);
        assert_eq!(headers[header::LOCATION], "https://mirror.test/proxy/items/7");
        assert_eq!(headers[header::LINK], "<https://mirror.test/proxy/s.css>; rel=preload");
        assert_eq!(headers["refresh"], "5; url=https://mirror.test/proxy/home");
    }

    #[test]
    fn test_has_body() {
        assert!(has_body(StatusCode::OK));
        assert!(!has_body(StatusCode::NO_CONTENT));
        assert!(!has_body(StatusCode::NOT_MODIFIED));
    }
}
