// Registry Radar - Core Library
// Cross-source reconciliation of newly registered companies.
// Exposes all modules for use in the CLI, the API server, and tests.

pub mod audit;          // Compliance Logger - append-only audit trail
pub mod cache;          // Cache Store - TTL-gated response cache
pub mod company;        // Data model - records, provenance, confidence
pub mod config;         // TOML configuration
pub mod db;             // SQLite persistence (cache + audit tables)
pub mod error;          // Error taxonomy
pub mod reconciliation; // Reconciliation Engine - fallback, cross-check, dedup
pub mod service;        // Caller boundary - identity, validation, response
pub mod sources;        // Source Adapters - federal index, regional board
pub mod summary;        // Result Summarizer

#[cfg(feature = "server")]
pub mod api;            // REST API (axum)

// Re-export commonly used types
pub use audit::{
    AuditAction, AuditLogEntry, AuditParameters, AuditStore,
    ComplianceLogger, MemoryAuditStore, SqliteAuditStore, LEGAL_BASIS,
};
pub use cache::{CacheBackend, CacheEntry, CacheStore, MemoryCache, SqliteCache};
pub use company::{
    normalize_region, normalize_tax_id,
    CompanyRecord, Confidence, RegistryQuery, SourceKind, SourceTag, ValidatedCompany,
};
pub use config::Config;
pub use db::{open_database, setup_database};
pub use error::{ReconcileError, SourceError, StorageError};
pub use reconciliation::{assemble, Reconciliation, ReconciliationEngine, SourceReport, SourceSet};
pub use service::{
    Identity, IdentityProvider, NewCompaniesRequest, NewCompaniesResponse,
    RegistryService, StaticTokenProvider,
};
pub use sources::{
    CachedSource, FetchOutcome, FetchStatus, RegionalBoardSource, RegistryIndexSource, SourceAdapter,
};
pub use summary::{summarize, ResultSummary};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
