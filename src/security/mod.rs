//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Browser request:
//!     → headers.rs (strip hop-by-hop and cookies, re-target Host/Origin/Referer)
//!     → upstream
//! Upstream response:
//!     → headers.rs (drop CSP, framing, HSTS, Set-Cookie, encodings)
//!     → browser
//! ```
//!
//! # Design Decisions
//! - No upstream cookie ever reaches the browser
//! - Request body size is bounded in the HTTP layer (`security.max_body_size`)

pub mod headers;
