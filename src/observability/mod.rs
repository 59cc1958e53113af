//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured tracing events, pretty or JSON)
//!     → metrics.rs (counters and histograms)
//!
//! Consumers:
//!     → stdout / log aggregation
//!     → Prometheus scrape endpoint (optional)
//! ```
//!
//! # Design Decisions
//! - The request ID (x-request-id) is attached to every per-request event
//! - Upstream URLs appear in logs, never in browser-facing error bodies
//! - Metrics are cheap no-ops when the exporter is disabled

pub mod logging;
pub mod metrics;
