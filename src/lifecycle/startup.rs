//! Startup helpers.

use tokio::net::TcpListener;

use crate::config::ProxyConfig;
use crate::error::ProxyError;
use crate::observability::metrics;

/// Start the metrics exporter when enabled. A bad address is logged, not
/// fatal; validation normally catches it first.
pub fn start_metrics(config: &ProxyConfig) {
    if !config.observability.metrics_enabled {
        return;
    }
    match config.observability.metrics_address.parse() {
        Ok(addr) => metrics::init_metrics(addr),
        Err(_) => tracing::error!(
            metrics_address = %config.observability.metrics_address,
            "Failed to parse metrics address"
        ),
    }
}

/// Bind the public listener.
pub async fn bind_listener(addr: &str) -> Result<TcpListener, ProxyError> {
    let listener = TcpListener::bind(addr).await.map_err(|source| ProxyError::Bind {
        addr: addr.to_string(),
        source,
    })?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");
    Ok(listener)
}
