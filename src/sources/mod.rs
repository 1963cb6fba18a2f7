// 🛰️ Source Adapters - one per upstream registry
//
// Adding a registry = implement SourceAdapter. Caching, timeouts, region
// gating and the fail-soft policy live in CachedSource, so adapters only
// know how to talk to their upstream.

pub mod regional_board;
pub mod registry_index;

pub use regional_board::RegionalBoardSource;
pub use registry_index::RegistryIndexSource;

use crate::cache::CacheStore;
use crate::company::{CompanyRecord, RegistryQuery, SourceKind};
use crate::error::SourceError;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

// ============================================================================
// ADAPTER CONTRACT
// ============================================================================

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Stable identifier, used in cache keys, audit entries and diagnostics
    fn id(&self) -> &str;

    fn kind(&self) -> SourceKind;

    /// The single region this adapter covers, or None for nationwide sources
    fn region_scope(&self) -> Option<&str> {
        None
    }

    fn supports_region(&self, region: &str) -> bool {
        match self.region_scope() {
            Some(scope) => scope.eq_ignore_ascii_case(region),
            None => true,
        }
    }

    /// Wait until the upstream may be called again. Runs before the retrieval
    /// timeout starts, so queueing behind a rate limit never counts as an outage.
    async fn pace(&self) {}

    /// Live retrieval from the upstream. Never called for unsupported regions.
    async fn retrieve(&self, query: &RegistryQuery) -> Result<Vec<CompanyRecord>, SourceError>;
}

// ============================================================================
// FETCH OUTCOME
// ============================================================================

/// How an adapter's records were obtained (metadata only, output shape is the same)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum FetchStatus {
    Live,
    Cached,
    /// Read from cache for cross-validation only; no live retrieval happened
    CrossCheck,
    UnsupportedRegion,
    Unavailable(String),
}

impl FetchStatus {
    /// Whether the source actually contributed data to this query
    pub fn consulted(&self) -> bool {
        matches!(self, FetchStatus::Live | FetchStatus::Cached | FetchStatus::CrossCheck)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FetchOutcome {
    pub source_id: String,
    pub kind: SourceKind,
    pub status: FetchStatus,
    pub records: Vec<CompanyRecord>,
}

impl FetchOutcome {
    fn empty(source_id: &str, kind: SourceKind, status: FetchStatus) -> Self {
        FetchOutcome {
            source_id: source_id.to_string(),
            kind,
            status,
            records: Vec::new(),
        }
    }
}

// ============================================================================
// CACHED SOURCE
// ============================================================================

/// An adapter wrapped with the shared cache and a bounded timeout
#[derive(Clone)]
pub struct CachedSource {
    adapter: Arc<dyn SourceAdapter>,
    cache: CacheStore,
    timeout: Duration,
}

impl CachedSource {
    pub fn new(adapter: Arc<dyn SourceAdapter>, cache: CacheStore, timeout: Duration) -> Self {
        CachedSource {
            adapter,
            cache,
            timeout,
        }
    }

    pub fn id(&self) -> &str {
        self.adapter.id()
    }

    pub fn kind(&self) -> SourceKind {
        self.adapter.kind()
    }

    pub fn region_scope(&self) -> Option<&str> {
        self.adapter.region_scope()
    }

    pub fn supports_region(&self, region: &str) -> bool {
        self.adapter.supports_region(region)
    }

    /// Fetch records for `query`. Never fails: errors degrade to an empty outcome.
    pub async fn fetch(&self, query: &RegistryQuery) -> FetchOutcome {
        let id = self.adapter.id();
        let kind = self.adapter.kind();

        if !self.adapter.supports_region(&query.region) {
            let err = SourceError::UnsupportedRegion(query.region.clone());
            debug!(source = %id, region = %query.region, "{}", err);
            return FetchOutcome::empty(id, kind, FetchStatus::UnsupportedRegion);
        }

        let key = query.cache_key(id);
        if let Some(entry) = self.cache.get(&key) {
            debug!(source = %id, key = %key, records = entry.payload.len(), "Served from cache");
            return FetchOutcome {
                source_id: id.to_string(),
                kind,
                status: FetchStatus::Cached,
                records: entry.payload,
            };
        }

        self.adapter.pace().await;
        let result = match tokio::time::timeout(self.timeout, self.adapter.retrieve(query)).await {
            Ok(result) => result,
            Err(_) => Err(SourceError::Timeout(self.timeout)),
        };

        match result {
            Ok(raw) => {
                let fetched = raw.len();
                let records: Vec<CompanyRecord> =
                    raw.into_iter().filter_map(CompanyRecord::normalized).collect();
                if records.len() < fetched {
                    warn!(
                        source = %id,
                        dropped = fetched - records.len(),
                        "Dropped records without a usable tax id"
                    );
                }

                // Cache is advisory: a failed write still returns the fresh payload
                if let Err(e) = self.cache.put(&key, &records) {
                    warn!(source = %id, key = %key, error = %e, "Cache write failed");
                }

                debug!(source = %id, records = records.len(), "Live fetch complete");
                FetchOutcome {
                    source_id: id.to_string(),
                    kind,
                    status: FetchStatus::Live,
                    records,
                }
            }
            Err(e) => {
                warn!(source = %id, region = %query.region, date = %query.date, error = %e, "Source unavailable, treating as empty");
                FetchOutcome::empty(id, kind, FetchStatus::Unavailable(e.to_string()))
            }
        }
    }

    /// Fresh cached records for `query`, without ever touching the upstream
    pub fn peek_cached(&self, query: &RegistryQuery) -> Option<Vec<CompanyRecord>> {
        if !self.adapter.supports_region(&query.region) {
            return None;
        }
        self.cache
            .get(&query.cache_key(self.adapter.id()))
            .map(|entry| entry.payload)
    }
}
