//! In-process session backend.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::session::backend::{lease_holder, SessionBackend};
use crate::session::SessionError;

struct Slot {
    value: Vec<u8>,
    expires_at: Instant,
}

struct Lease {
    holder: String,
    expires_at: Instant,
}

/// Sessions held in a concurrent map. Expiry is lazy on read plus the
/// periodic sweep started by the store.
#[derive(Default)]
pub struct MemoryBackend {
    slots: DashMap<String, Slot>,
    leases: DashMap<String, Lease>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[async_trait]
impl SessionBackend for MemoryBackend {
    async fn get(&self, key: &str, ttl: Duration) -> Result<Option<Vec<u8>>, SessionError> {
        let now = Instant::now();
        if let Some(mut slot) = self.slots.get_mut(key) {
            if slot.expires_at > now {
                slot.expires_at = now + ttl;
                return Ok(Some(slot.value.clone()));
            }
        } else {
            return Ok(None);
        }

        self.slots.remove_if(key, |_, slot| slot.expires_at <= now);
        Ok(None)
    }

    async fn put(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), SessionError> {
        self.slots.insert(
            key.to_string(),
            Slot { value, expires_at: Instant::now() + ttl },
        );
        Ok(())
    }

    async fn try_lock(&self, key: &str, lease: Duration) -> Result<Option<String>, SessionError> {
        let now = Instant::now();
        let holder = lease_holder();
        let fresh = Lease { holder: holder.clone(), expires_at: now + lease };

        match self.leases.entry(key.to_string()) {
            Entry::Occupied(mut held) => {
                if held.get().expires_at > now {
                    return Ok(None);
                }
                held.insert(fresh);
            }
            Entry::Vacant(slot) => {
                slot.insert(fresh);
            }
        }
        Ok(Some(holder))
    }

    async fn unlock(&self, key: &str, holder: &str) -> Result<(), SessionError> {
        self.leases.remove_if(key, |_, lease| lease.holder == holder);
        Ok(())
    }

    async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.slots.len();
        self.slots.retain(|_, slot| slot.expires_at > now);
        self.leases.retain(|_, lease| lease.expires_at > now);
        before.saturating_sub(self.slots.len())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
