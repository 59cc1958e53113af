//! HTTP server setup and the catch-all proxy handler.
//!
//! # Responsibilities
//! - Build the shared state (rewriter, session store, upstream client)
//! - Create the Axum router and wire middleware (request ID, tracing, timeout)
//! - Hand every path and method to the forwarding engine
//! - Issue the session cookie on every response
//! - Serve until shutdown, then stop background tasks

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;

use crate::config::ProxyConfig;
use crate::error::ProxyError;
use crate::forward::Forwarder;
use crate::http::request::{propagate_request_id_layer, request_id, set_request_id_layer, ClientContext};
use crate::http::response::{plain_text, with_session_cookie};
use crate::observability::metrics;
use crate::resilience::retries::attempts_for;
use crate::resilience::timeouts::{handler_timeout_layer, UpstreamTimeouts};
use crate::rewrite::{MountPrefix, Rewriter, UpstreamOrigin};
use crate::routing::Dispatcher;
use crate::session::SessionStore;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub forwarder: Arc<Forwarder>,
    pub dispatcher: Arc<Dispatcher>,
    pub public_origin: Option<String>,
    pub max_body_size: usize,
}

/// HTTP server for the mirror.
pub struct HttpServer {
    router: Router,
    config: ProxyConfig,
    sessions: Arc<SessionStore>,
}

impl HttpServer {
    /// Create a server, connecting the session backend named in the config.
    pub async fn new(config: ProxyConfig) -> Result<Self, ProxyError> {
        let sessions = Arc::new(SessionStore::from_config(&config.session).await?);
        Self::with_session_store(config, sessions)
    }

    /// Create a server around an existing session store.
    pub fn with_session_store(config: ProxyConfig, sessions: Arc<SessionStore>) -> Result<Self, ProxyError> {
        let upstream = UpstreamOrigin::parse(&config.upstream.base_url).map_err(ProxyError::Upstream)?;
        let mount = MountPrefix::new(config.mount.prefix.clone());
        let rewriter = Rewriter::new(upstream.clone(), mount.clone(), config.rewrite.inline)
            .map_err(|e| ProxyError::Upstream(e.to_string()))?;

        let timeouts = UpstreamTimeouts::from(&config.timeouts);
        let client = Forwarder::build_client(&timeouts)?;
        let forwarder = Forwarder::new(client, rewriter, sessions.clone(), config.retries.clone());

        let state = AppState {
            forwarder: Arc::new(forwarder),
            dispatcher: Arc::new(Dispatcher::new(upstream, mount, config.upstream.landing_path.clone())),
            public_origin: config.mount.public_origin.clone(),
            max_body_size: config.security.max_body_size,
        };

        let max_backoff = Duration::from_millis(config.retries.max_delay_ms + config.retries.max_delay_ms / 10);
        let attempts = attempts_for(&axum::http::Method::GET, &config.retries);
        let router = Self::build_router(state, timeouts.handler(attempts, max_backoff));

        tracing::info!(
            upstream = %config.upstream.base_url,
            mount = %config.mount.prefix,
            inline_rewrite = config.rewrite.inline,
            "Mirror configured"
        );

        Ok(Self { router, config, sessions })
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(state: AppState, handler_timeout: Duration) -> Router {
        Router::new()
            .route("/", any(proxy_handler))
            .route("/{*path}", any(proxy_handler))
            .with_state(state)
            .layer(handler_timeout_layer(handler_timeout))
            .layer(TraceLayer::new_for_http())
            .layer(propagate_request_id_layer())
            .layer(set_request_id_layer())
    }

    /// Run the server until `shutdown` fires, then drain in-flight requests.
    pub async fn run(self, listener: TcpListener, mut shutdown: broadcast::Receiver<()>) -> Result<(), ProxyError> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let sweep_every = Duration::from_secs(self.config.session.sweep_interval_secs.max(1));
        let sweeper = self.sessions.spawn_sweeper(sweep_every, shutdown.resubscribe());

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received, draining connections");
            })
            .await?;

        if let Err(e) = sweeper.await {
            tracing::warn!(error = %e, "Session sweeper ended abnormally");
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Router for in-process tests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }
}

/// Catch-all handler: every method and path goes to the upstream.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start = Instant::now();
    let request_id = request_id(request.headers());
    let (parts, body) = request.into_parts();

    let client = ClientContext::from_headers(&parts.headers, state.public_origin.as_deref());
    let sessions = state.forwarder.sessions();
    let handle = sessions.resolve(&parts.headers);
    if handle.issued {
        metrics::record_session_issued();
    }

    tracing::debug!(
        request_id = %request_id,
        method = %parts.method,
        path = %parts.uri.path(),
        new_session = handle.issued,
        "Proxying request"
    );

    let response = match state.dispatcher.resolve(&parts.uri) {
        Err(e) => {
            tracing::warn!(request_id = %request_id, error = %e, "Cannot map request path upstream");
            plain_text(StatusCode::BAD_REQUEST, "bad request path")
        }
        Ok(url) => match axum::body::to_bytes(body, state.max_body_size).await {
            Err(e) => {
                tracing::warn!(request_id = %request_id, error = %e, limit = state.max_body_size, "Request body rejected");
                plain_text(StatusCode::PAYLOAD_TOO_LARGE, "request body too large")
            }
            Ok(bytes) => {
                let upstream_request = state
                    .forwarder
                    .build(parts.method.clone(), url, &parts.headers, bytes, &handle.token, &client)
                    .await;
                match state.forwarder.forward(upstream_request, &client).await {
                    Ok(proxied) => proxied.into_response(),
                    Err(e) => {
                        tracing::warn!(request_id = %request_id, error = %e, "Upstream unavailable");
                        e.into_response()
                    }
                }
            }
        },
    };

    let response = with_session_cookie(response, &sessions.session_cookie(&handle.token, client.secure));
    metrics::record_request(parts.method.as_str(), response.status().as_u16(), start);
    tracing::debug!(
        request_id = %request_id,
        status = response.status().as_u16(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Request complete"
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::MemoryBackend;
    use axum::http::header;
    use tower::ServiceExt;

    fn server() -> HttpServer {
        let mut config = ProxyConfig::default();
        // nothing listens here; requests fail fast
        config.upstream.base_url = "http://127.0.0.1:1".to_string();
        config.retries.enabled = false;
        let sessions = Arc::new(SessionStore::new(Arc::new(MemoryBackend::new()), &config.session));
        HttpServer::with_session_store(config, sessions).unwrap()
    }

    #[tokio::test]
    async fn test_unreachable_upstream_is_502_with_cookie() {
        let response = server()
            .router()
            .oneshot(Request::builder().uri("/proxy/x").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert!(response.headers().get("x-request-id").is_some());
        let cookie = response.headers()[header::SET_COOKIE].to_str().unwrap().to_string();
        assert!(cookie.starts_with("mirror_session="));

        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.starts_with("upstream error: "));
        assert!(!text.contains("127.0.0.1"));
    }

    #[tokio::test]
    async fn test_oversized_body_is_413() {
        let mut config = ProxyConfig::default();
        config.security.max_body_size = 8;
        let sessions = Arc::new(SessionStore::new(Arc::new(MemoryBackend::new()), &config.session));
        let server = HttpServer::with_session_store(config, sessions).unwrap();

        let response = server
            .router()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/upload")
                    .body(Body::from(vec![0u8; 64]))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}
