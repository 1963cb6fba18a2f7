// 📊 Result Summarizer - aggregate counts for the response payload

use crate::company::{Confidence, SourceTag, ValidatedCompany};
use serde::Serialize;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultSummary {
    pub total: usize,
    pub high_confidence: usize,
    pub medium_confidence: usize,
    pub low_confidence: usize,
    #[serde(skip)]
    pub sources: BTreeSet<SourceTag>,
}

impl ResultSummary {
    /// Distinct source tags as strings, in a stable order
    pub fn sources_used(&self) -> Vec<String> {
        self.sources.iter().map(|tag| tag.as_str().to_string()).collect()
    }
}

pub fn summarize(companies: &[ValidatedCompany]) -> ResultSummary {
    let mut summary = ResultSummary {
        total: companies.len(),
        ..ResultSummary::default()
    };

    for company in companies {
        match company.confidence {
            Confidence::High => summary.high_confidence += 1,
            Confidence::Medium => summary.medium_confidence += 1,
            Confidence::Low => summary.low_confidence += 1,
        }
        summary.sources.insert(company.source);
    }

    summary
}
