//! Forwarding engine.
//!
//! # States
//! ```text
//! BUILD    → target URL, header policy, Cookie from the session jar
//! SEND     → upstream call with deadlines; idempotent reads may retry
//! REDIRECT → 3xx with Location: map Location, persist cookies, return
//! CONTENT  → textual: buffer, rewrite, persist cookies, no-store
//!            binary: persist cookies, stream through
//! ERROR    → 504 on timeout, 502 otherwise
//! ```

pub mod engine;
pub mod outcome;

pub use engine::Forwarder;
pub use outcome::{ForwardError, ProxyResponse, ResponseBody, UpstreamRequest};
