//! Shared utilities for integration tests: a mock upstream site and a
//! proxy started in front of it.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, get},
    Router,
};
use tokio::net::TcpListener;

use mirror_proxy::config::ProxyConfig;
use mirror_proxy::lifecycle::Shutdown;
use mirror_proxy::session::{MemoryBackend, SessionBackend, SessionStore};
use mirror_proxy::HttpServer;

/// PNG signature followed by bytes that are not valid UTF-8.
pub const PNG_BYTES: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 0xff, 0xfe, b'/', b'x', 0x00];

#[derive(Clone)]
struct MockState {
    origin: String,
    flaky_hits: Arc<AtomicU32>,
    post_hits: Arc<AtomicU32>,
}

/// Running mock upstream.
pub struct MockUpstream {
    pub addr: SocketAddr,
    pub flaky_hits: Arc<AtomicU32>,
    pub post_hits: Arc<AtomicU32>,
}

impl MockUpstream {
    pub fn origin(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn flaky_count(&self) -> u32 {
        self.flaky_hits.load(Ordering::SeqCst)
    }

    pub fn post_count(&self) -> u32 {
        self.post_hits.load(Ordering::SeqCst)
    }
}

async fn page(State(state): State<MockState>) -> Response {
    let html = format!(
        concat!(
            r#"<html><head><link rel="stylesheet" href="/style.css"></head><body>"#,
            r#"<a href="/x">x</a><img src="{origin}/img.png">"#,
            r#"<a href="https://cdn.example.net/lib.js">cdn</a>"#,
            r#"<script>var api = "{origin}/api";</script></body></html>"#
        ),
        origin = state.origin
    );
    (
        [
            (header::CONTENT_TYPE, "text/html; charset=utf-8"),
            (header::CONTENT_SECURITY_POLICY, "default-src 'self'"),
            (header::X_FRAME_OPTIONS, "DENY"),
        ],
        html,
    )
        .into_response()
}

async fn style() -> Response {
    ([(header::CONTENT_TYPE, "text/css")], "body{background:url(/style.css)}").into_response()
}

async fn image() -> Response {
    ([(header::CONTENT_TYPE, "image/png")], PNG_BYTES).into_response()
}

async fn login(State(state): State<MockState>) -> Response {
    (
        StatusCode::FOUND,
        [
            (header::LOCATION, format!("{}/home", state.origin)),
            (header::SET_COOKIE, "auth=granted; Path=/; HttpOnly".to_string()),
        ],
    )
        .into_response()
}

async fn set_cookie(Query(params): Query<HashMap<String, String>>) -> Response {
    let name = params.get("name").cloned().unwrap_or_else(|| "c".into());
    let value = params.get("value").cloned().unwrap_or_else(|| "1".into());
    (
        [
            (header::CONTENT_TYPE, "text/plain".to_string()),
            (header::SET_COOKIE, format!("{}={}; Path=/", name, value)),
        ],
        "ok",
    )
        .into_response()
}

/// Echo request headers the upstream saw. Served as binary so the proxy
/// leaves it alone.
async fn echo(headers: HeaderMap) -> Response {
    let pick = |name: header::HeaderName| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string()
    };
    let body = format!(
        "host={}\ncookie={}\nreferer={}\nx-request-id={}",
        pick(header::HOST),
        pick(header::COOKIE),
        pick(header::REFERER),
        pick(header::HeaderName::from_static("x-request-id")),
    );
    ([(header::CONTENT_TYPE, "application/octet-stream")], body).into_response()
}

/// Return the uploaded body as-is, with the content type the upstream saw.
async fn upload(headers: HeaderMap, body: Bytes) -> Response {
    let seen = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    (
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (header::HeaderName::from_static("x-seen-content-type"), seen),
        ],
        body,
    )
        .into_response()
}

async fn slow() -> Response {
    tokio::time::sleep(Duration::from_secs(3)).await;
    "late".into_response()
}

async fn flaky(State(state): State<MockState>) -> Response {
    if state.flaky_hits.fetch_add(1, Ordering::SeqCst) == 0 {
        (StatusCode::SERVICE_UNAVAILABLE, "busy").into_response()
    } else {
        ([(header::CONTENT_TYPE, "text/plain")], "recovered").into_response()
    }
}

async fn flaky_post(State(state): State<MockState>) -> Response {
    state.post_hits.fetch_add(1, Ordering::SeqCst);
    (StatusCode::SERVICE_UNAVAILABLE, "busy").into_response()
}

/// Start the mock upstream on an ephemeral port.
pub async fn start_upstream() -> MockUpstream {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let flaky_hits = Arc::new(AtomicU32::new(0));
    let post_hits = Arc::new(AtomicU32::new(0));

    let state = MockState {
        origin: format!("http://{}", addr),
        flaky_hits: flaky_hits.clone(),
        post_hits: post_hits.clone(),
    };
    let app = Router::new()
        .route("/page", get(page))
        .route("/style.css", get(style))
        .route("/img.png", get(image))
        .route("/login", any(login))
        .route("/set", get(set_cookie))
        .route("/echo", any(echo))
        .route("/upload", any(upload))
        .route("/slow", get(slow))
        .route("/flaky", get(flaky))
        .route("/flaky-post", any(flaky_post))
        .with_state(state);

    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    MockUpstream { addr, flaky_hits, post_hits }
}

/// Proxy configuration pointed at `upstream_origin`.
pub fn proxy_config(upstream_origin: &str) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.upstream.base_url = upstream_origin.to_string();
    config.retries.base_delay_ms = 10;
    config.retries.max_delay_ms = 50;
    config
}

/// Running proxy plus handles for assertions.
pub struct TestProxy {
    pub addr: SocketAddr,
    pub backend: Arc<MemoryBackend>,
    pub sessions: Arc<SessionStore>,
    pub shutdown: Shutdown,
}

impl TestProxy {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn origin(&self) -> String {
        format!("http://{}", self.addr)
    }
}

impl Drop for TestProxy {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Start a proxy with an in-memory session backend the test can inspect.
pub async fn start_proxy(config: ProxyConfig) -> TestProxy {
    let backend = Arc::new(MemoryBackend::new());
    let (addr, sessions, shutdown) = spawn_proxy(config, backend.clone()).await;
    TestProxy { addr, backend, sessions, shutdown }
}

/// Start a proxy over any session backend. The caller triggers `Shutdown`.
pub async fn spawn_proxy(
    config: ProxyConfig,
    backend: Arc<dyn SessionBackend>,
) -> (SocketAddr, Arc<SessionStore>, Shutdown) {
    let sessions = Arc::new(SessionStore::new(backend, &config.session));
    let server = HttpServer::with_session_store(config, sessions.clone()).unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    (addr, sessions, shutdown)
}

/// Client that never follows redirects and keeps no cookies.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .no_proxy()
        .build()
        .unwrap()
}

/// The `name=value` part of the proxy's session cookie.
pub fn session_pair(response: &reqwest::Response) -> String {
    let cookies: Vec<&str> = response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect();
    assert_eq!(cookies.len(), 1, "only the session cookie may reach the browser: {:?}", cookies);
    cookies[0].split(';').next().unwrap().to_string()
}
