// ⚖️ Reconciliation Engine - one trusted list out of many partial sources
//
// Priority fallback + cross-check:
//   1. the authoritative source is always queried first
//   2. fallbacks are queried live only when it comes back empty
//   3. a tax id seen by two or more independent sources is CrossValidated
//   4. one entry per tax id; higher confidence wins, then source priority
//
// Output order is first appearance. It can differ between runs whose caches
// have different freshness, which is accepted.

use crate::company::{CompanyRecord, Confidence, RegistryQuery, SourceKind, SourceTag, ValidatedCompany};
use crate::sources::{CachedSource, FetchOutcome, FetchStatus};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::HashMap;
use tracing::info;

// ============================================================================
// RECONCILIATION RESULT
// ============================================================================

/// What one source contributed to a reconciliation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceReport {
    pub source_id: String,
    pub kind: SourceKind,
    pub status: FetchStatus,
    pub record_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct Reconciliation {
    pub query: RegistryQuery,
    pub companies: Vec<ValidatedCompany>,
    pub reports: Vec<SourceReport>,
}

impl Reconciliation {
    /// Sources that actually supplied data (live, cached or cross-check), in query order
    pub fn consulted(&self) -> Vec<(String, SourceKind)> {
        self.reports
            .iter()
            .filter(|report| report.status.consulted())
            .map(|report| (report.source_id.clone(), report.kind))
            .collect()
    }

    /// Human-readable diagnostics for sources that could not contribute
    pub fn warnings(&self) -> Vec<String> {
        self.reports
            .iter()
            .filter_map(|report| match &report.status {
                FetchStatus::Unavailable(reason) => {
                    Some(format!("source {} unavailable: {}", report.source_id, reason))
                }
                FetchStatus::UnsupportedRegion => Some(format!(
                    "source {} does not cover region {}",
                    report.source_id, self.query.region
                )),
                _ => None,
            })
            .collect()
    }
}

// ============================================================================
// MERGE
// ============================================================================

/// One source's records as input to `assemble`
#[derive(Debug, Clone, Copy)]
pub struct SourceSet<'a> {
    pub source_id: &'a str,
    pub kind: SourceKind,
    pub records: &'a [CompanyRecord],
    /// false = only counts as a sighting for cross-validation, never emitted on its own
    pub emit: bool,
}

/// Merge source sets (in priority order) into the deduplicated, classified list
pub fn assemble(query_date: NaiveDate, sets: &[SourceSet<'_>]) -> Vec<ValidatedCompany> {
    // tax id -> distinct sources that listed it, in order of appearance
    let mut sightings: HashMap<&str, Vec<&str>> = HashMap::new();
    for set in sets {
        for record in set.records {
            let seen = sightings.entry(record.tax_id.as_str()).or_default();
            if !seen.contains(&set.source_id) {
                seen.push(set.source_id);
            }
        }
    }

    let mut merged: Vec<ValidatedCompany> = Vec::new();
    let mut position: HashMap<String, usize> = HashMap::new();

    for set in sets.iter().filter(|set| set.emit) {
        for record in set.records {
            let seen = sightings
                .get(record.tax_id.as_str())
                .map(Vec::as_slice)
                .unwrap_or_default();
            let candidate = classify(query_date, set, record, seen);

            match position.get(&record.tax_id) {
                Some(&i) => {
                    if candidate.rank() > merged[i].rank() {
                        merged[i] = candidate;
                    }
                }
                None => {
                    position.insert(record.tax_id.clone(), merged.len());
                    merged.push(candidate);
                }
            }
        }
    }

    merged
}

fn classify(
    query_date: NaiveDate,
    set: &SourceSet<'_>,
    record: &CompanyRecord,
    seen: &[&str],
) -> ValidatedCompany {
    let (source, confidence, validation_note) = if seen.len() >= 2 {
        (
            SourceTag::CrossValidated,
            Confidence::High,
            format!("Confirmed by {} independent sources: {}", seen.len(), seen.join(", ")),
        )
    } else {
        match set.kind {
            SourceKind::Authoritative => (
                SourceTag::Authoritative,
                Confidence::High,
                format!("Listed in the authoritative registry ({})", set.source_id),
            ),
            SourceKind::Preliminary if record.registration_date == query_date => (
                SourceTag::Preliminary,
                Confidence::Medium,
                format!(
                    "Listed only by preliminary source {}; pending authoritative confirmation",
                    set.source_id
                ),
            ),
            SourceKind::Preliminary => (
                SourceTag::Preliminary,
                Confidence::Low,
                format!(
                    "Preliminary listing from {} dated {}, outside the requested date {}",
                    set.source_id, record.registration_date, query_date
                ),
            ),
        }
    };

    ValidatedCompany {
        record: record.clone(),
        source,
        confidence,
        validation_note,
    }
}

// ============================================================================
// RECONCILIATION ENGINE
// ============================================================================

pub struct ReconciliationEngine {
    authoritative: CachedSource,

    /// Preliminary-tier sources, consulted in this order
    fallbacks: Vec<CachedSource>,

    /// Peek fallback caches when the authoritative source has results (default: true)
    cross_check_cached: bool,
}

impl ReconciliationEngine {
    pub fn new(authoritative: CachedSource) -> Self {
        ReconciliationEngine {
            authoritative,
            fallbacks: Vec::new(),
            cross_check_cached: true,
        }
    }

    pub fn with_fallback(mut self, source: CachedSource) -> Self {
        self.fallbacks.push(source);
        self
    }

    pub fn with_cached_cross_check(mut self, enabled: bool) -> Self {
        self.cross_check_cached = enabled;
        self
    }

    /// All configured sources, authoritative first
    pub fn sources(&self) -> impl Iterator<Item = &CachedSource> {
        std::iter::once(&self.authoritative).chain(self.fallbacks.iter())
    }

    /// Reconcile all sources for one (date, region). Source failures never fail this.
    ///
    /// Fetches are sequential: whether fallbacks run depends on the
    /// authoritative result.
    pub async fn reconcile(&self, query: &RegistryQuery) -> Reconciliation {
        let mut outcomes: Vec<FetchOutcome> = vec![self.authoritative.fetch(query).await];

        if outcomes[0].records.is_empty() {
            for fallback in &self.fallbacks {
                outcomes.push(fallback.fetch(query).await);
            }
        } else if self.cross_check_cached {
            for fallback in &self.fallbacks {
                if let Some(records) = fallback.peek_cached(query) {
                    outcomes.push(FetchOutcome {
                        source_id: fallback.id().to_string(),
                        kind: fallback.kind(),
                        status: FetchStatus::CrossCheck,
                        records,
                    });
                }
            }
        }

        let sets: Vec<SourceSet<'_>> = outcomes
            .iter()
            .map(|outcome| SourceSet {
                source_id: &outcome.source_id,
                kind: outcome.kind,
                records: &outcome.records,
                emit: outcome.status != FetchStatus::CrossCheck,
            })
            .collect();
        let companies = assemble(query.date, &sets);

        let reports: Vec<SourceReport> = outcomes
            .iter()
            .map(|outcome| SourceReport {
                source_id: outcome.source_id.clone(),
                kind: outcome.kind,
                status: outcome.status.clone(),
                record_count: outcome.records.len(),
            })
            .collect();

        info!(
            date = %query.date,
            region = %query.region,
            companies = companies.len(),
            sources = reports.len(),
            "Reconciliation complete"
        );

        Reconciliation {
            query: query.clone(),
            companies,
            reports,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
