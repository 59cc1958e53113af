//! Session affinity subsystem.
//!
//! # Data Flow
//! ```text
//! Browser cookie (session token)
//!     → SessionStore::resolve (adopt a token this server signed, or issue one)
//!     → SessionStore::get (jar for the upstream Cookie header)
//!     → upstream call
//!     → SessionStore::update (process lock + backend lease:
//!                             load → merge → prune → store)
//! ```
//!
//! # Design Decisions
//! - The browser only ever holds the opaque, HMAC-signed token
//! - Backends are swappable behind `SessionBackend` (memory or Redis)
//! - Read-modify-write is serialized per token inside the process, and
//!   across processes through the backend lease
//! - Every backend call is time-bounded; store failures degrade to an empty
//!   jar instead of failing the request

pub mod backend;
pub mod crypto;
pub mod jar;
pub mod memory;
pub mod redis;

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use axum::http::{header, HeaderMap};
use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;

use crate::config::SessionConfig;
use crate::resilience::backoff::calculate_backoff;

pub use self::backend::SessionBackend;
pub use self::crypto::{JarCipher, TokenSigner};
pub use self::jar::{CookieEntry, CookieJar};
pub use self::memory::MemoryBackend;
pub use self::redis::RedisBackend;

/// How long one writer may hold a session's backend lease.
const LEASE: Duration = Duration::from_secs(5);

/// Errors from the session store.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session backend error: {0}")]
    Backend(String),

    #[error("session payload is not valid JSON: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("session payload could not be decrypted")]
    Crypto,
}

impl From<::redis::RedisError> for SessionError {
    fn from(err: ::redis::RedisError) -> Self {
        SessionError::Backend(err.to_string())
    }
}

/// Token resolved for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHandle {
    pub token: String,
    /// True when the token was minted for this request.
    pub issued: bool,
}

/// Current time as unix seconds, the clock used for cookie expiry.
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Maps session tokens to upstream cookie jars.
pub struct SessionStore {
    backend: Arc<dyn SessionBackend>,
    cipher: Option<JarCipher>,
    signer: TokenSigner,
    locks: DashMap<String, Arc<Mutex<()>>>,
    ttl: Duration,
    op_timeout: Duration,
    cookie_name: String,
    key_prefix: String,
}

impl SessionStore {
    pub fn new(backend: Arc<dyn SessionBackend>, config: &SessionConfig) -> Self {
        let signer = match config.signing_key.as_deref() {
            Some(secret) => TokenSigner::new(secret.as_bytes()),
            None => TokenSigner::ephemeral(),
        };
        Self {
            backend,
            cipher: config.encryption_key.as_deref().map(JarCipher::new),
            signer,
            locks: DashMap::new(),
            ttl: Duration::from_secs(config.ttl_secs),
            op_timeout: Duration::from_millis(config.store_timeout_ms),
            cookie_name: config.cookie_name.clone(),
            key_prefix: config.key_prefix.clone(),
        }
    }

    /// Build the store selected by configuration: Redis when `store_url` is
    /// set, process memory otherwise.
    pub async fn from_config(config: &SessionConfig) -> Result<Self, SessionError> {
        let timeout = Duration::from_millis(config.store_timeout_ms);
        let backend: Arc<dyn SessionBackend> = match config.store_url.as_deref() {
            Some(url) => Arc::new(RedisBackend::connect(url, timeout).await?),
            None => Arc::new(MemoryBackend::new()),
        };
        if config.signing_key.is_none() {
            tracing::warn!("No session signing key configured, sessions end when the process restarts");
        }
        tracing::info!(
            backend = backend.name(),
            ttl_secs = config.ttl_secs,
            encrypted = config.encryption_key.is_some(),
            "Session store ready"
        );
        Ok(Self::new(backend, config))
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Mint a fresh token: 256 random bits plus a truncated HMAC tag.
    pub fn new_token(&self) -> String {
        self.signer.mint()
    }

    /// True when `token` was minted by a store sharing this signing secret.
    pub fn verify(&self, token: &str) -> bool {
        self.signer.verify(token)
    }

    /// Pick the session for a request from its `Cookie` headers.
    pub fn resolve(&self, headers: &HeaderMap) -> SessionHandle {
        let presented = headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(';'))
            .filter_map(|pair| pair.split_once('='))
            .find(|(name, _)| name.trim() == self.cookie_name)
            .map(|(_, value)| value.trim());

        match presented {
            Some(token) if self.verify(token) => SessionHandle {
                token: token.to_string(),
                issued: false,
            },
            _ => SessionHandle {
                token: self.new_token(),
                issued: true,
            },
        }
    }

    fn key(&self, token: &str) -> String {
        format!("{}{}", self.key_prefix, token)
    }

    /// Run one backend call under the store timeout.
    async fn bounded<T, F>(&self, op: &'static str, call: F) -> Result<T, SessionError>
    where
        F: Future<Output = Result<T, SessionError>>,
    {
        match tokio::time::timeout(self.op_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(SessionError::Backend(format!(
                "{} timed out after {}ms",
                op,
                self.op_timeout.as_millis()
            ))),
        }
    }

    async fn load(&self, token: &str) -> Result<Option<CookieJar>, SessionError> {
        let key = self.key(token);
        let Some(raw) = self.bounded("get", self.backend.get(&key, self.ttl)).await? else {
            return Ok(None);
        };
        let plain = match &self.cipher {
            Some(cipher) => cipher.open(&raw)?,
            None => raw,
        };
        Ok(Some(serde_json::from_slice(&plain)?))
    }

    /// Jar for `token`. Missing sessions and store failures both yield an
    /// empty jar.
    pub async fn get(&self, token: &str) -> CookieJar {
        match self.load(token).await {
            Ok(jar) => jar.unwrap_or_default(),
            Err(e) => {
                tracing::warn!(error = %e, backend = self.backend.name(), "Session load failed, using empty jar");
                CookieJar::new()
            }
        }
    }

    /// Persist `jar` for `token`, resetting its TTL.
    pub async fn put(&self, token: &str, jar: &CookieJar) -> Result<(), SessionError> {
        let json = serde_json::to_vec(jar)?;
        let payload = match &self.cipher {
            Some(cipher) => cipher.seal(&json)?,
            None => json,
        };
        let key = self.key(token);
        self.bounded("put", self.backend.put(&key, payload, self.ttl)).await
    }

    /// Serialized read-modify-write of one session's jar.
    ///
    /// Concurrent updates for the same token queue on a per-token lock, then
    /// on the backend lease shared with other processes, so no write is
    /// lost. A stored jar that cannot be decoded is replaced.
    pub async fn update<F>(&self, token: &str, apply: F) -> Result<(), SessionError>
    where
        F: FnOnce(&mut CookieJar),
    {
        let lock = {
            let entry = self
                .locks
                .entry(token.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())));
            Arc::clone(entry.value())
        };

        let result = {
            let _guard = lock.lock().await;
            self.update_leased(token, apply).await
        };

        drop(lock);
        self.locks.remove_if(token, |_, lock| Arc::strong_count(lock) == 1);
        result
    }

    async fn update_leased<F>(&self, token: &str, apply: F) -> Result<(), SessionError>
    where
        F: FnOnce(&mut CookieJar),
    {
        let key = self.key(token);
        let holder = self.acquire_lease(&key).await?;
        let result = self.update_locked(token, apply).await;

        if let Err(e) = self.bounded("unlock", self.backend.unlock(&key, &holder)).await {
            tracing::warn!(error = %e, "Session lease not released, it lapses on its own");
        }
        result
    }

    /// Wait for the backend lease on `key`, backing off between attempts.
    async fn acquire_lease(&self, key: &str) -> Result<String, SessionError> {
        let deadline = Instant::now() + LEASE;
        let mut attempt = 0;
        loop {
            if let Some(holder) = self.bounded("lock", self.backend.try_lock(key, LEASE)).await? {
                return Ok(holder);
            }
            attempt += 1;
            if Instant::now() >= deadline {
                return Err(SessionError::Backend("session lease busy".to_string()));
            }
            tokio::time::sleep(calculate_backoff(attempt, 5, 50)).await;
        }
    }

    async fn update_locked<F>(&self, token: &str, apply: F) -> Result<(), SessionError>
    where
        F: FnOnce(&mut CookieJar),
    {
        let mut jar = match self.load(token).await {
            Ok(jar) => jar.unwrap_or_default(),
            Err(SessionError::Backend(e)) => return Err(SessionError::Backend(e)),
            Err(e) => {
                tracing::warn!(error = %e, "Discarding undecodable session jar");
                CookieJar::new()
            }
        };

        apply(&mut jar);
        jar.prune(unix_now());
        self.put(token, &jar).await
    }

    /// `Set-Cookie` value handing the token to the browser.
    pub fn session_cookie(&self, token: &str, secure: bool) -> String {
        let mut cookie = format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
            self.cookie_name,
            token,
            self.ttl.as_secs()
        );
        if secure {
            cookie.push_str("; Secure");
        }
        cookie
    }

    /// Number of tokens currently holding an update lock.
    pub fn pending_locks(&self) -> usize {
        self.locks.len()
    }

    /// Periodically purge expired sessions until shutdown.
    pub fn spawn_sweeper(&self, every: Duration, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        let backend = Arc::clone(&self.backend);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let purged = backend.purge_expired().await;
                        if purged > 0 {
                            tracing::debug!(purged, backend = backend.name(), "Expired sessions removed");
                        }
                    }
                    _ = shutdown.recv() => {
                        tracing::debug!("Session sweeper stopping");
                        break;
                    }
                }
            }
        })
    }
}
