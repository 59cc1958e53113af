//! Rewriting mirror proxy library.
//!
//! Serves one upstream site under a different origin, rewriting URL
//! references in bodies and redirects and keeping each browser's upstream
//! cookies in a server-side session.

pub mod config;
pub mod error;
pub mod forward;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod rewrite;
pub mod routing;
pub mod security;
pub mod session;

pub use config::schema::ProxyConfig;
pub use error::{ProxyError, Result};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use rewrite::{rewrite, Rewritten};
