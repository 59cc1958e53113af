//! Storage seam for serialized cookie jars.

use std::time::Duration;

use async_trait::async_trait;

use crate::session::SessionError;

/// Key/value storage with an inactivity TTL.
///
/// Implementations refresh the TTL on every successful read so a session
/// stays alive while the browser keeps using it.
///
/// Writers sharing one backend (several proxy processes on one Redis)
/// serialize read-modify-write through a lease: `try_lock` hands out a
/// holder id, `unlock` releases it only for that holder, and an abandoned
/// lease lapses after its duration.
#[async_trait]
pub trait SessionBackend: Send + Sync {
    /// Fetch a value and push its expiry out to `ttl` from now.
    async fn get(&self, key: &str, ttl: Duration) -> Result<Option<Vec<u8>>, SessionError>;

    /// Store a value expiring `ttl` from now.
    async fn put(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), SessionError>;

    /// Take the lease on `key` for `lease`. `None` while another holder has it.
    async fn try_lock(&self, key: &str, lease: Duration) -> Result<Option<String>, SessionError>;

    /// Release a lease taken by `holder`. A lease that lapsed and was taken
    /// over is left alone.
    async fn unlock(&self, key: &str, holder: &str) -> Result<(), SessionError>;

    /// Remove expired values. Backends with native expiry do nothing.
    async fn purge_expired(&self) -> usize {
        0
    }

    /// Short label for logs.
    fn name(&self) -> &'static str;
}

/// Random lease holder id.
pub(crate) fn lease_holder() -> String {
    format!("{:032x}", rand::random::<u128>())
}
