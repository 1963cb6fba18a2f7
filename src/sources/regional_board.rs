//! Preliminary source: a regional trade board's public registration listing
//!
//! Faster than the federal index but unofficial, and bound to the single
//! region the board serves. Live retrievals are spaced by a fixed politeness
//! delay (never below 5 seconds) agreed with the upstream site; the delay is
//! taken in `pace`, outside the retrieval timeout.
//!
//! Wire contract: `GET {base_url}/registrations?date=DD/MM/YYYY` returning
//! `{"rows": [{"document", "name", "fantasy_name"?, "date"}]}` where
//! `document` is a formatted tax id and `date` is `DD/MM/YYYY`.

use super::SourceAdapter;
use crate::company::{normalize_region, CompanyRecord, RegistryQuery, SourceKind};
use crate::config::PreliminaryConfig;
use crate::error::SourceError;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

const SOURCE_ID: &str = "regional_board";
const USER_AGENT: &str = concat!("registry-radar/", env!("CARGO_PKG_VERSION"));
const BOARD_DATE_FORMAT: &str = "%d/%m/%Y";

#[derive(Debug, Deserialize)]
struct BoardListing {
    #[serde(default)]
    rows: Vec<BoardRow>,
}

#[derive(Debug, Deserialize)]
struct BoardRow {
    document: String,
    name: String,
    #[serde(default)]
    fantasy_name: Option<String>,
    date: String,
}

/// Enforces a minimum interval between live scrapes
pub(crate) struct PolitenessGate {
    last_request: Mutex<Option<Instant>>,
    min_interval: Duration,
}

impl PolitenessGate {
    pub(crate) fn new(min_interval: Duration) -> Self {
        Self {
            last_request: Mutex::new(None),
            min_interval,
        }
    }

    /// Wait if necessary so that consecutive scrapes are `min_interval` apart
    pub(crate) async fn wait(&self) {
        let mut last = self.last_request.lock().await;

        if let Some(last_time) = *last {
            let elapsed = last_time.elapsed();
            if elapsed < self.min_interval {
                let wait_time = self.min_interval - elapsed;
                debug!("Politeness delay: waiting {:?}", wait_time);
                tokio::time::sleep(wait_time).await;
            }
        }

        *last = Some(Instant::now());
    }
}

/// `scrape(date, region)` against one regional board
pub struct RegionalBoardSource {
    http_client: reqwest::Client,
    base_url: String,
    region: String,
    gate: PolitenessGate,
}

impl RegionalBoardSource {
    pub fn new(config: PreliminaryConfig, timeout: Duration) -> Result<Self, SourceError> {
        let region = normalize_region(&config.region)
            .ok_or_else(|| SourceError::UnsupportedRegion(config.region.clone()))?;
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| SourceError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            region,
            gate: PolitenessGate::new(config.request_delay()),
        })
    }

    fn to_record(&self, row: BoardRow) -> Option<CompanyRecord> {
        let date = match NaiveDate::parse_from_str(row.date.trim(), BOARD_DATE_FORMAT) {
            Ok(date) => date,
            Err(_) => {
                warn!(source = SOURCE_ID, document = %row.document, date = %row.date, "Skipping row with unreadable date");
                return None;
            }
        };
        let record = CompanyRecord::new(&row.document, &row.name, date, &self.region);
        Some(match row.fantasy_name {
            Some(fantasy_name) => record.with_trade_name(&fantasy_name),
            None => record,
        })
    }
}

#[async_trait]
impl SourceAdapter for RegionalBoardSource {
    fn id(&self) -> &str {
        SOURCE_ID
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Preliminary
    }

    fn region_scope(&self) -> Option<&str> {
        Some(&self.region)
    }

    async fn pace(&self) {
        self.gate.wait().await;
    }

    async fn retrieve(&self, query: &RegistryQuery) -> Result<Vec<CompanyRecord>, SourceError> {
        if !self.supports_region(&query.region) {
            return Err(SourceError::UnsupportedRegion(query.region.clone()));
        }

        let url = format!("{}/registrations", self.base_url);
        let date = query.date.format(BOARD_DATE_FORMAT).to_string();
        debug!(url = %url, date = %date, region = %self.region, "Scraping regional board");

        let response = self
            .http_client
            .get(&url)
            .query(&[("date", date.as_str())])
            .send()
            .await
            .map_err(|e| SourceError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status(status.as_u16()));
        }

        let listing: BoardListing = response
            .json()
            .await
            .map_err(|e| SourceError::Parse(e.to_string()))?;

        Ok(listing
            .rows
            .into_iter()
            .filter_map(|row| self.to_record(row))
            .collect())
    }
}
