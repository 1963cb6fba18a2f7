// 🗃️ Cache Store - advisory response cache shared by all source adapters
//
// Staleness is decided at read time: an entry older than the TTL is reported
// as absent and simply overwritten by the next successful fetch. Nothing is
// ever evicted.

use crate::company::CompanyRecord;
use crate::db;
use crate::error::StorageError;
use anyhow::{anyhow, Result};
use chrono::{DateTime, Duration, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// One cached adapter response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// `<source id>:<date>:<region>`
    pub key: String,
    pub payload: Vec<CompanyRecord>,
    pub created_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn is_fresh(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.created_at) < ttl
    }
}

// ============================================================================
// BACKENDS
// ============================================================================

/// Persistent key/value storage with timestamped entries
pub trait CacheBackend: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<CacheEntry>>;

    /// Overwrite any existing entry for the same key
    fn store(&self, entry: &CacheEntry) -> Result<()>;
}

/// SQLite-backed cache (shares the connection with the audit store)
pub struct SqliteCache {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteCache {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        SqliteCache { conn }
    }
}

impl CacheBackend for SqliteCache {
    fn load(&self, key: &str) -> Result<Option<CacheEntry>> {
        let conn = self.conn.lock().map_err(|_| anyhow!("database mutex poisoned"))?;
        db::load_cache_entry(&conn, key)
    }

    fn store(&self, entry: &CacheEntry) -> Result<()> {
        let conn = self.conn.lock().map_err(|_| anyhow!("database mutex poisoned"))?;
        db::store_cache_entry(&conn, entry)
    }
}

/// Process-local cache for embedders without a database
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheBackend for MemoryCache {
    fn load(&self, key: &str) -> Result<Option<CacheEntry>> {
        let entries = self.entries.lock().map_err(|_| anyhow!("cache mutex poisoned"))?;
        Ok(entries.get(key).cloned())
    }

    fn store(&self, entry: &CacheEntry) -> Result<()> {
        let mut entries = self.entries.lock().map_err(|_| anyhow!("cache mutex poisoned"))?;
        entries.insert(entry.key.clone(), entry.clone());
        Ok(())
    }
}

// ============================================================================
// CACHE STORE
// ============================================================================

/// TTL gate in front of a backend. Cheap to clone; clones share the backend.
#[derive(Clone)]
pub struct CacheStore {
    backend: Arc<dyn CacheBackend>,
    ttl: Duration,
}

impl CacheStore {
    /// Reference TTL: 24 hours
    pub const DEFAULT_TTL_HOURS: i64 = 24;

    pub fn new(backend: Arc<dyn CacheBackend>, ttl: Duration) -> Self {
        CacheStore { backend, ttl }
    }

    pub fn in_memory(ttl: Duration) -> Self {
        Self::new(Arc::new(MemoryCache::new()), ttl)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Fresh entry for `key`, or None when absent, stale or unreadable
    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        self.get_at(key, Utc::now())
    }

    pub fn get_at(&self, key: &str, now: DateTime<Utc>) -> Option<CacheEntry> {
        match self.backend.load(key) {
            Ok(Some(entry)) if entry.is_fresh(self.ttl, now) => Some(entry),
            Ok(Some(entry)) => {
                debug!(key = %key, created_at = %entry.created_at, "Cache entry is stale");
                None
            }
            Ok(None) => None,
            Err(e) => {
                warn!(key = %key, error = %e, "Cache read failed, treating as miss");
                None
            }
        }
    }

    /// Store `payload` under `key`, stamped now
    pub fn put(&self, key: &str, payload: &[CompanyRecord]) -> Result<(), StorageError> {
        self.put_at(key, payload, Utc::now())
    }

    pub fn put_at(
        &self,
        key: &str,
        payload: &[CompanyRecord],
        created_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let entry = CacheEntry {
            key: key.to_string(),
            payload: payload.to_vec(),
            created_at,
        };
        self.backend
            .store(&entry)
            .map_err(|e| StorageError::Cache(e.to_string()))
    }
}
