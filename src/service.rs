//! Caller boundary: identity gate, input validation, reconciliation, audit,
//! summary. Transport-agnostic; the HTTP router and the CLI both call
//! [`RegistryService::new_companies`].

use crate::audit::{ComplianceLogger, SqliteAuditStore};
use crate::cache::{CacheStore, SqliteCache};
use crate::company::{RegistryQuery, ValidatedCompany};
use crate::config::{ApiToken, Config};
use crate::error::ReconcileError;
use crate::reconciliation::ReconciliationEngine;
use crate::sources::{CachedSource, RegionalBoardSource, RegistryIndexSource};
use crate::summary::{summarize, ResultSummary};
use anyhow::{Context, Result};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

// ============================================================================
// IDENTITY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub actor: String,
}

/// Resolves request credentials to a caller identity
pub trait IdentityProvider: Send + Sync {
    fn identify(&self, credentials: Option<&str>) -> Option<Identity>;
}

/// Static bearer tokens from the config file
pub struct StaticTokenProvider {
    tokens: HashMap<String, String>,
}

impl StaticTokenProvider {
    pub fn new(tokens: &[ApiToken]) -> Self {
        StaticTokenProvider {
            tokens: tokens
                .iter()
                .filter(|t| !t.token.is_empty() && !t.actor.trim().is_empty())
                .map(|t| (t.token.clone(), t.actor.clone()))
                .collect(),
        }
    }
}

impl IdentityProvider for StaticTokenProvider {
    fn identify(&self, credentials: Option<&str>) -> Option<Identity> {
        let token = credentials?.trim();
        self.tokens.get(token).map(|actor| Identity { actor: actor.clone() })
    }
}

// ============================================================================
// REQUEST / RESPONSE
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewCompaniesRequest {
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub region: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCompaniesResponse {
    pub success: bool,
    pub companies: Vec<ValidatedCompany>,
    pub stats: ResultSummary,
    pub sources_used: Vec<String>,
    /// Sources that were unavailable or out of region (omitted when none)
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

impl From<&ReconcileError> for ErrorResponse {
    fn from(err: &ReconcileError) -> Self {
        ErrorResponse {
            success: false,
            error: err.to_string(),
        }
    }
}

/// Configured source, as listed by the sources endpoint
#[derive(Debug, Clone, Serialize)]
pub struct SourceDescriptor {
    pub id: String,
    pub kind: crate::company::SourceKind,
    /// None = nationwide
    pub region: Option<String>,
}

// ============================================================================
// SERVICE
// ============================================================================

pub struct RegistryService {
    identity: Arc<dyn IdentityProvider>,
    engine: ReconciliationEngine,
    logger: ComplianceLogger,
}

impl RegistryService {
    pub fn new(identity: Arc<dyn IdentityProvider>, engine: ReconciliationEngine, logger: ComplianceLogger) -> Self {
        RegistryService {
            identity,
            engine,
            logger,
        }
    }

    /// Wire adapters, cache, audit store and identity provider from config.
    /// Cache and audit share one SQLite connection.
    pub fn from_config(config: &Config, conn: Arc<Mutex<Connection>>) -> Result<Self> {
        let cache = CacheStore::new(Arc::new(SqliteCache::new(conn.clone())), config.cache_ttl());
        let timeout = config.adapter_timeout();

        let federal = RegistryIndexSource::new(config.authoritative.clone(), timeout)
            .context("Failed to build authoritative source")?;
        let mut engine = ReconciliationEngine::new(CachedSource::new(Arc::new(federal), cache.clone(), timeout))
            .with_cached_cross_check(config.cross_check_cached);

        if let Some(preliminary) = &config.preliminary {
            let board = RegionalBoardSource::new(preliminary.clone(), timeout)
                .context("Failed to build preliminary source")?;
            engine = engine.with_fallback(CachedSource::new(Arc::new(board), cache, timeout));
        }

        if config.api_tokens.is_empty() {
            warn!("No api_tokens configured: every request will be rejected as unauthorized");
        }

        Ok(Self::new(
            Arc::new(StaticTokenProvider::new(&config.api_tokens)),
            engine,
            ComplianceLogger::new(Arc::new(SqliteAuditStore::new(conn))),
        ))
    }

    /// Reconciled list of companies registered on `request.date` in `request.region`.
    ///
    /// Fails only with `Unauthorized` or `InvalidInput`; neither writes an
    /// audit entry. Source, cache and audit failures are absorbed.
    pub async fn new_companies(
        &self,
        credentials: Option<&str>,
        request: &NewCompaniesRequest,
    ) -> Result<NewCompaniesResponse, ReconcileError> {
        let identity = self
            .identity
            .identify(credentials)
            .ok_or(ReconcileError::Unauthorized)?;
        let query = RegistryQuery::parse(&request.date, &request.region)?;

        let reconciliation = self.engine.reconcile(&query).await;
        let summary = summarize(&reconciliation.companies);

        if let Err(e) = self
            .logger
            .record(&identity.actor, &query, &summary, &reconciliation.consulted())
        {
            // Response is unaffected by a failed audit write
            warn!(actor = %identity.actor, error = %e, "Continuing without audit entry");
        }

        let warnings = reconciliation.warnings();
        info!(
            actor = %identity.actor,
            date = %query.date,
            region = %query.region,
            total = summary.total,
            high = summary.high_confidence,
            "New-companies query served"
        );

        Ok(NewCompaniesResponse {
            success: true,
            sources_used: summary.sources_used(),
            companies: reconciliation.companies,
            stats: summary,
            warnings,
        })
    }

    pub fn sources(&self) -> Vec<SourceDescriptor> {
        self.engine
            .sources()
            .map(|source| SourceDescriptor {
                id: source.id().to_string(),
                kind: source.kind(),
                region: source.region_scope().map(str::to_string),
            })
            .collect()
    }
}
