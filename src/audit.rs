// 📜 Compliance Logger - one append-only audit entry per reconciliation
//
// The engine writes and never reads. A failed write is logged and reported
// to the caller of `record`, which decides whether it matters (the service
// layer does not let it change the response).

use crate::company::{RegistryQuery, SourceKind};
use crate::db;
use crate::error::StorageError;
use crate::summary::ResultSummary;
use anyhow::{anyhow, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::{Arc, Mutex};
use tracing::{debug, error};

/// Fixed justification recorded with every query of personal/company data
pub const LEGAL_BASIS: &str =
    "Legitimate interest: processing of publicly available company registration data (LGPD art. 7, IX and par. 4)";

// ============================================================================
// AUDIT ENTRY
// ============================================================================

/// Fixed action vocabulary: one tag per source type queried
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    QueryAuthoritativeRegistry,
    QueryPreliminaryRegistry,
}

impl AuditAction {
    pub fn for_kind(kind: SourceKind) -> Self {
        match kind {
            SourceKind::Authoritative => AuditAction::QueryAuthoritativeRegistry,
            SourceKind::Preliminary => AuditAction::QueryPreliminaryRegistry,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::QueryAuthoritativeRegistry => "query_authoritative_registry",
            AuditAction::QueryPreliminaryRegistry => "query_preliminary_registry",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "query_authoritative_registry" => Some(AuditAction::QueryAuthoritativeRegistry),
            "query_preliminary_registry" => Some(AuditAction::QueryPreliminaryRegistry),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditParameters {
    pub date: NaiveDate,
    pub region: String,
}

impl From<&RegistryQuery> for AuditParameters {
    fn from(query: &RegistryQuery) -> Self {
        AuditParameters {
            date: query.date,
            region: query.region.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub entry_id: String,
    pub recorded_at: DateTime<Utc>,
    pub actor: String,
    pub action: AuditAction,
    pub parameters: AuditParameters,
    pub result_count: usize,
    pub sources_used: Vec<String>,
    pub legal_basis: String,
    /// SHA-256 over the fields above
    pub digest: String,
}

impl AuditLogEntry {
    pub fn new(
        actor: &str,
        action: AuditAction,
        parameters: AuditParameters,
        result_count: usize,
        sources_used: Vec<String>,
    ) -> Self {
        let mut entry = AuditLogEntry {
            entry_id: uuid::Uuid::new_v4().to_string(),
            recorded_at: Utc::now(),
            actor: actor.to_string(),
            action,
            parameters,
            result_count,
            sources_used,
            legal_basis: LEGAL_BASIS.to_string(),
            digest: String::new(),
        };
        entry.digest = entry.compute_digest();
        entry
    }

    pub fn compute_digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(format!(
            "{}|{}|{}|{}|{}|{}|{}|{}|{}",
            self.entry_id,
            self.recorded_at.to_rfc3339(),
            self.actor,
            self.action.as_str(),
            self.parameters.date,
            self.parameters.region,
            self.result_count,
            self.sources_used.join(","),
            self.legal_basis
        ));
        format!("{:x}", hasher.finalize())
    }

    pub fn verify_digest(&self) -> bool {
        self.digest == self.compute_digest()
    }
}

// ============================================================================
// AUDIT STORES
// ============================================================================

/// Append-only sink for audit entries
pub trait AuditStore: Send + Sync {
    fn append(&self, entry: &AuditLogEntry) -> Result<()>;
}

pub struct SqliteAuditStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteAuditStore {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        SqliteAuditStore { conn }
    }
}

impl AuditStore for SqliteAuditStore {
    fn append(&self, entry: &AuditLogEntry) -> Result<()> {
        let conn = self.conn.lock().map_err(|_| anyhow!("database mutex poisoned"))?;
        db::insert_audit_entry(&conn, entry)
    }
}

/// Keeps entries in memory
#[derive(Default)]
pub struct MemoryAuditStore {
    entries: Mutex<Vec<AuditLogEntry>>,
}

impl MemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<AuditLogEntry> {
        self.entries.lock().map(|entries| entries.clone()).unwrap_or_default()
    }
}

impl AuditStore for MemoryAuditStore {
    fn append(&self, entry: &AuditLogEntry) -> Result<()> {
        let mut entries = self.entries.lock().map_err(|_| anyhow!("audit mutex poisoned"))?;
        entries.push(entry.clone());
        Ok(())
    }
}

// ============================================================================
// COMPLIANCE LOGGER
// ============================================================================

#[derive(Clone)]
pub struct ComplianceLogger {
    store: Arc<dyn AuditStore>,
}

impl ComplianceLogger {
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        ComplianceLogger { store }
    }

    /// Append the audit entry for one completed reconciliation.
    ///
    /// `consulted` lists the sources that supplied data, in query order. The
    /// action is the lowest-trust source type among them, so a fallback query
    /// is never recorded as an authoritative one.
    pub fn record(
        &self,
        actor: &str,
        query: &RegistryQuery,
        summary: &ResultSummary,
        consulted: &[(String, SourceKind)],
    ) -> Result<AuditLogEntry, StorageError> {
        let kind = if consulted.iter().any(|(_, kind)| *kind == SourceKind::Preliminary) {
            SourceKind::Preliminary
        } else {
            SourceKind::Authoritative
        };

        let entry = AuditLogEntry::new(
            actor,
            AuditAction::for_kind(kind),
            AuditParameters::from(query),
            summary.total,
            consulted.iter().map(|(id, _)| id.clone()).collect(),
        );

        match self.store.append(&entry) {
            Ok(()) => {
                debug!(entry_id = %entry.entry_id, actor = %actor, "Audit entry recorded");
                Ok(entry)
            }
            Err(e) => {
                error!(actor = %actor, region = %query.region, date = %query.date, error = %e, "Audit write failed");
                Err(StorageError::Audit(e.to_string()))
            }
        }
    }
}
