//! Unbounded in-memory cache
//!
//! Every insert allocates a large synthetic payload and keeps it for the life
//! of the process. Entries may carry an expiry, but expiry is only consulted
//! on read: nothing ever removes an entry, so memory grows with every insert.

use bytes::Bytes;
use metrics::{counter, gauge};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use super::stats::CacheStats;
use crate::config::CacheConfig;

/// Fill byte for synthetic payloads. Non-zero so every page is actually touched.
const PAYLOAD_FILL: u8 = 0x5a;

/// A cached payload
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: String,
    pub payload: Bytes,
    pub created_at: Instant,
    pub expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// Map plus its running size, guarded together
#[derive(Default)]
struct CacheStore {
    entries: HashMap<String, CacheEntry>,
    total_bytes: u64,
}

pub struct CacheGrowthEngine {
    store: Mutex<CacheStore>,
    payload_bytes: usize,
    processing_delay: Duration,
}

impl CacheGrowthEngine {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            store: Mutex::new(CacheStore::default()),
            payload_bytes: config.payload_bytes,
            processing_delay: config.processing_delay,
        }
    }

    /// Store a fresh payload under a unique key derived from `id` and return the key.
    pub async fn insert(&self, id: &str, ttl: Option<Duration>) -> String {
        if !self.processing_delay.is_zero() {
            tokio::time::sleep(self.processing_delay).await;
        }

        let key = format!("{}-{}", id, Uuid::new_v4());
        let payload = Bytes::from(vec![PAYLOAD_FILL; self.payload_bytes]);
        let now = Instant::now();
        let entry = CacheEntry {
            key: key.clone(),
            payload,
            created_at: now,
            expires_at: ttl.map(|ttl| now + ttl),
        };

        let (entries, bytes) = {
            let mut store = self.store.lock().await;
            store.total_bytes += entry.payload.len() as u64;
            store.entries.insert(key.clone(), entry);
            (store.entries.len(), store.total_bytes)
        };

        counter!("faultlab_cache_inserts_total").increment(1);
        gauge!("faultlab_cache_entries").set(entries as f64);
        gauge!("faultlab_cache_bytes").set(bytes as f64);
        debug!(
            "Cached {} ({} bytes), cache now holds {} entries / {} bytes",
            key, self.payload_bytes, entries, bytes
        );

        key
    }

    /// Look up a payload. Expired entries read as missing but stay in the map.
    pub async fn get(&self, key: &str) -> Option<Bytes> {
        let store = self.store.lock().await;
        let entry = store.entries.get(key)?;
        if entry.is_expired(Instant::now()) {
            debug!("Cache entry {} expired; leaving it in place", key);
            return None;
        }
        Some(entry.payload.clone())
    }

    pub async fn entry_count(&self) -> usize {
        self.store.lock().await.entries.len()
    }

    pub async fn approximate_byte_size(&self) -> u64 {
        self.store.lock().await.total_bytes
    }

    /// Entry count and byte size read under one lock
    pub async fn stats(&self) -> CacheStats {
        let store = self.store.lock().await;
        CacheStats {
            entries: store.entries.len() as u64,
            bytes: store.total_bytes,
        }
    }
}
