//! Redis-backed sessions for deployments running several proxy processes.

use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};

use crate::session::backend::{lease_holder, SessionBackend};
use crate::session::SessionError;

/// Delete the lease only if `ARGV[1]` still holds it.
static UNLOCK: Lazy<redis::Script> = Lazy::new(|| {
    redis::Script::new(
        r#"if redis.call("GET", KEYS[1]) == ARGV[1] then return redis.call("DEL", KEYS[1]) else return 0 end"#,
    )
});

/// Session backend on a Redis server. `GETEX` refreshes the TTL atomically
/// with each read; writes use `SET .. EX`. Leases are `SET .. NX PX` keys
/// next to the session key.
#[derive(Clone)]
pub struct RedisBackend {
    conn: ConnectionManager,
}

impl RedisBackend {
    /// Connect to `url` (e.g. `redis://127.0.0.1/`). Connecting and every
    /// command are bounded by `timeout`.
    pub async fn connect(url: &str, timeout: Duration) -> Result<Self, SessionError> {
        let client = redis::Client::open(url)?;
        let config = ConnectionManagerConfig::new()
            .set_connection_timeout(timeout)
            .set_response_timeout(timeout);
        let conn = client.get_connection_manager_with_config(config).await?;
        tracing::info!(timeout_ms = timeout.as_millis() as u64, "Connected to Redis session store");
        Ok(Self { conn })
    }
}

fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

fn lease_key(key: &str) -> String {
    format!("{}:lock", key)
}

#[async_trait]
impl SessionBackend for RedisBackend {
    async fn get(&self, key: &str, ttl: Duration) -> Result<Option<Vec<u8>>, SessionError> {
        let mut conn = self.conn.clone();
        let value: Option<Vec<u8>> = redis::cmd("GETEX")
            .arg(key)
            .arg("EX")
            .arg(ttl_secs(ttl))
            .query_async(&mut conn)
            .await?;
        Ok(value)
    }

    async fn put(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), SessionError> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl_secs(ttl))
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn try_lock(&self, key: &str, lease: Duration) -> Result<Option<String>, SessionError> {
        let mut conn = self.conn.clone();
        let holder = lease_holder();
        let reply: Option<String> = redis::cmd("SET")
            .arg(lease_key(key))
            .arg(&holder)
            .arg("NX")
            .arg("PX")
            .arg(lease.as_millis().max(1) as u64)
            .query_async(&mut conn)
            .await?;
        Ok(reply.map(|_| holder))
    }

    async fn unlock(&self, key: &str, holder: &str) -> Result<(), SessionError> {
        let mut conn = self.conn.clone();
        let _: i64 = UNLOCK
            .key(lease_key(key))
            .arg(holder)
            .invoke_async(&mut conn)
            .await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}
