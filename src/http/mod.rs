//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection (TLS already terminated in front)
//!     → server.rs (Axum router, middleware, catch-all handler)
//!     → request.rs (request ID, client origin, HTTPS detection)
//!     → [dispatcher resolves the upstream URL]
//!     → [forwarding engine talks to the upstream]
//!     → response.rs (body conversion, error mapping, session cookie)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{ClientContext, X_REQUEST_ID};
pub use server::HttpServer;
