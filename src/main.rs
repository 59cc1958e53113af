//! Rewriting mirror proxy.
//!
//! # Architecture Overview
//!
//! ```text
//!   Browser ──▶ http::server ──▶ routing::dispatcher ──▶ forward::engine ──▶ Upstream
//!                   │                                        │    │
//!                   │                          security::headers  session (cookie jar)
//!                   │                                        │
//!   Browser ◀── http::response ◀──────── rewrite (HTML / CSS / script / Location)
//!
//!   Cross-cutting: config, observability, resilience, lifecycle
//! ```

use std::path::PathBuf;

use clap::Parser;

use mirror_proxy::config::loader::resolve_config;
use mirror_proxy::lifecycle::signals::wait_for_signal;
use mirror_proxy::lifecycle::startup::{bind_listener, start_metrics};
use mirror_proxy::observability::logging::init_logging;
use mirror_proxy::{HttpServer, Shutdown};

#[derive(Parser, Debug)]
#[command(name = "mirror-proxy", version, about = "Rewriting reverse proxy for a single upstream site")]
struct Cli {
    /// Path to a TOML configuration file. Environment variables override it.
    #[arg(short, long, env = "MIRROR_PROXY_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = resolve_config(cli.config.as_deref())?;

    init_logging(&config.observability);
    tracing::info!(
        bind_address = %config.listener.bind_address,
        upstream = %config.upstream.base_url,
        request_timeout_secs = config.timeouts.request_secs,
        "mirror-proxy v{} starting",
        env!("CARGO_PKG_VERSION")
    );

    start_metrics(&config);

    let listener = bind_listener(&config.listener.bind_address).await?;
    let server = HttpServer::new(config).await?;

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    let mut server_task = tokio::spawn(server.run(listener, server_shutdown));

    tokio::select! {
        _ = wait_for_signal() => {
            shutdown.trigger();
            server_task.await??;
        }
        result = &mut server_task => {
            result??;
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
