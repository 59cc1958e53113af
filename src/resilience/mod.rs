//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Upstream call:
//!     → timeouts.rs (connect and total deadlines baked into the client)
//!     → On 5xx or network failure: retries.rs (idempotent reads only)
//!         → backoff.rs (jittered exponential delay before the next attempt)
//! ```
//!
//! # Design Decisions
//! - Every upstream call has a deadline
//! - Writes are never replayed; a login POST must hit the upstream once
//! - Attempts are bounded by configuration, not by a time budget

pub mod backoff;
pub mod retries;
pub mod timeouts;
