// 🏢 Company Model - Normalized registration records and their provenance
// Every source adapter speaks CompanyRecord; the engine speaks ValidatedCompany.

use crate::error::ReconcileError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// TAX ID / REGION NORMALIZATION
// ============================================================================

/// Canonical tax identifier: digits only, formatting punctuation stripped.
///
/// `"12.345.678/0001-90"` and `"12345678000190"` normalize to the same key.
pub fn normalize_tax_id(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Maximum length of an administrative region code
pub const MAX_REGION_LEN: usize = 8;

/// Normalize a region code: trimmed, upper-cased, 1-8 ASCII alphanumerics.
pub fn normalize_region(raw: &str) -> Option<String> {
    let region = raw.trim().to_ascii_uppercase();
    if region.is_empty()
        || region.len() > MAX_REGION_LEN
        || !region.chars().all(|c| c.is_ascii_alphanumeric())
    {
        return None;
    }
    Some(region)
}

// ============================================================================
// COMPANY RECORD
// ============================================================================

/// A normalized registration entry, as returned by any source adapter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyRecord {
    /// Canonical national identifier (digits only)
    pub tax_id: String,
    pub legal_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trade_name: Option<String>,
    pub registration_date: NaiveDate,
    /// Administrative subdivision code
    pub region: String,
}

impl CompanyRecord {
    pub fn new(tax_id: &str, legal_name: &str, registration_date: NaiveDate, region: &str) -> Self {
        CompanyRecord {
            tax_id: normalize_tax_id(tax_id),
            legal_name: legal_name.trim().to_string(),
            trade_name: None,
            registration_date,
            region: region.trim().to_ascii_uppercase(),
        }
    }

    /// Builder pattern: add optional trade name (blank names are ignored)
    pub fn with_trade_name(mut self, trade_name: &str) -> Self {
        let trade_name = trade_name.trim();
        if !trade_name.is_empty() {
            self.trade_name = Some(trade_name.to_string());
        }
        self
    }

    /// Re-apply normalization to a record built elsewhere (e.g. deserialized).
    /// Returns None when no usable tax id remains.
    pub fn normalized(mut self) -> Option<Self> {
        self.tax_id = normalize_tax_id(&self.tax_id);
        if self.tax_id.is_empty() {
            return None;
        }
        self.legal_name = self.legal_name.trim().to_string();
        self.region = self.region.trim().to_ascii_uppercase();
        Some(self)
    }
}

// ============================================================================
// PROVENANCE
// ============================================================================

/// Adapter identity class. Fallback adapters of any origin are Preliminary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Authoritative,
    Preliminary,
}

/// Provenance of a ValidatedCompany
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceTag {
    Authoritative,
    CrossValidated,
    Preliminary,
}

impl SourceTag {
    /// Tie-break rank when two entries share a confidence tier (higher wins)
    pub fn priority(&self) -> u8 {
        match self {
            SourceTag::Authoritative => 3,
            SourceTag::CrossValidated => 2,
            SourceTag::Preliminary => 1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceTag::Authoritative => "authoritative",
            SourceTag::CrossValidated => "cross_validated",
            SourceTag::Preliminary => "preliminary",
        }
    }
}

impl fmt::Display for SourceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Confidence tier. Ordering is Low < Medium < High.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

// ============================================================================
// VALIDATED COMPANY
// ============================================================================

/// A CompanyRecord annotated with provenance and a derived confidence tier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatedCompany {
    #[serde(flatten)]
    pub record: CompanyRecord,
    pub source: SourceTag,
    pub confidence: Confidence,
    pub validation_note: String,
}

impl ValidatedCompany {
    pub fn tax_id(&self) -> &str {
        &self.record.tax_id
    }

    /// Ranking key used by deduplication: confidence first, then source priority
    pub fn rank(&self) -> (Confidence, u8) {
        (self.confidence, self.source.priority())
    }
}

// ============================================================================
// QUERY
// ============================================================================

/// A validated (date, region) pair. Construction is the only place input is checked.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegistryQuery {
    pub date: NaiveDate,
    pub region: String,
}

impl RegistryQuery {
    pub fn new(date: NaiveDate, region: &str) -> Result<Self, ReconcileError> {
        let region = normalize_region(region)
            .ok_or_else(|| ReconcileError::InvalidInput(format!("invalid region code: {:?}", region)))?;
        Ok(RegistryQuery { date, region })
    }

    /// Parse an ISO-8601 calendar date (`YYYY-MM-DD`) and a region code
    pub fn parse(date: &str, region: &str) -> Result<Self, ReconcileError> {
        let date = date.trim();
        if date.is_empty() {
            return Err(ReconcileError::InvalidInput("date is required".to_string()));
        }
        if region.trim().is_empty() {
            return Err(ReconcileError::InvalidInput("region is required".to_string()));
        }
        let date = NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .map_err(|_| ReconcileError::InvalidInput(format!("invalid date (expected YYYY-MM-DD): {:?}", date)))?;
        Self::new(date, region)
    }

    /// Cache key for one source: `<source id>:<date>:<region>`
    pub fn cache_key(&self, source_id: &str) -> String {
        format!("{}:{}:{}", source_id, self.date.format("%Y-%m-%d"), self.region)
    }
}
