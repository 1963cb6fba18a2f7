// Error taxonomy
//
// Only ReconcileError ever reaches a caller. SourceError and StorageError are
// absorbed inside the engine and show up, at most, as a smaller result set.

use std::time::Duration;
use thiserror::Error;

/// Failures surfaced to the caller of a reconciliation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconcileError {
    #[error("unauthorized: a valid caller identity is required")]
    Unauthorized,

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Per-adapter retrieval failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    #[error("network error: {0}")]
    Network(String),

    #[error("upstream returned status {0}")]
    Status(u16),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("region {0} is not covered by this source")]
    UnsupportedRegion(String),
}

/// Cache or audit persistence failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("cache storage error: {0}")]
    Cache(String),

    #[error("audit storage error: {0}")]
    Audit(String),
}
