//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request URI (path + query)
//!     → dispatcher.rs (strip mount, apply landing path)
//!     → Absolute upstream URL
//! ```
//!
//! # Design Decisions
//! - Single upstream: every path maps, there is no "no match"
//! - `/` and `<mount>/...` are equivalent entry points
//! - Query strings are forwarded byte for byte

pub mod dispatcher;

pub use dispatcher::Dispatcher;
