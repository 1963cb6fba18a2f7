//! Authoritative source: mirrored index of the federal company registry
//!
//! The mirror is refreshed from the official registry dumps, so newly
//! registered companies can take up to ~90 days to appear. An empty answer
//! for a recent date is normal, not an error.
//!
//! Wire contract: `GET {base_url}/companies?registered_on=YYYY-MM-DD&region=XX`
//! returning `{"results": [{"tax_id", "legal_name", "trade_name"?, "registered_on", "region"}]}`.

use super::SourceAdapter;
use crate::company::{CompanyRecord, RegistryQuery, SourceKind};
use crate::config::AuthoritativeConfig;
use crate::error::SourceError;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

const SOURCE_ID: &str = "federal_index";
const USER_AGENT: &str = concat!("registry-radar/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
struct IndexResponse {
    #[serde(default)]
    results: Vec<IndexCompany>,
}

#[derive(Debug, Deserialize)]
struct IndexCompany {
    tax_id: String,
    legal_name: String,
    #[serde(default)]
    trade_name: Option<String>,
    registered_on: NaiveDate,
    region: String,
}

impl From<IndexCompany> for CompanyRecord {
    fn from(row: IndexCompany) -> Self {
        let record = CompanyRecord::new(&row.tax_id, &row.legal_name, row.registered_on, &row.region);
        match row.trade_name {
            Some(trade_name) => record.with_trade_name(&trade_name),
            None => record,
        }
    }
}

/// Delegated `query(date, region)` against the mirrored federal index
pub struct RegistryIndexSource {
    http_client: reqwest::Client,
    config: AuthoritativeConfig,
}

impl RegistryIndexSource {
    pub fn new(config: AuthoritativeConfig, timeout: Duration) -> Result<Self, SourceError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| SourceError::Network(e.to_string()))?;

        Ok(Self { http_client, config })
    }

    fn endpoint(&self) -> String {
        format!("{}/companies", self.config.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl SourceAdapter for RegistryIndexSource {
    fn id(&self) -> &str {
        SOURCE_ID
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Authoritative
    }

    async fn retrieve(&self, query: &RegistryQuery) -> Result<Vec<CompanyRecord>, SourceError> {
        let date = query.date.format("%Y-%m-%d").to_string();
        let url = self.endpoint();

        debug!(url = %url, date = %date, region = %query.region, "Querying federal index");

        let mut request = self
            .http_client
            .get(&url)
            .query(&[("registered_on", date.as_str()), ("region", query.region.as_str())]);
        if let Some(api_key) = &self.config.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| SourceError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status(status.as_u16()));
        }

        let body: IndexResponse = response
            .json()
            .await
            .map_err(|e| SourceError::Parse(e.to_string()))?;

        let (records, foreign): (Vec<CompanyRecord>, Vec<CompanyRecord>) = body
            .results
            .into_iter()
            .map(CompanyRecord::from)
            .partition(|record| record.region == query.region);
        if !foreign.is_empty() {
            warn!(
                source = SOURCE_ID,
                region = %query.region,
                dropped = foreign.len(),
                "Index returned rows for other regions, dropping them"
            );
        }

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn source(base_url: &str, api_key: Option<&str>) -> RegistryIndexSource {
        RegistryIndexSource::new(
            AuthoritativeConfig {
                base_url: base_url.to_string(),
                api_key: api_key.map(str::to_string),
            },
            Duration::from_secs(5),
        )
        .unwrap()
    }

    fn query() -> RegistryQuery {
        RegistryQuery::parse("2025-03-10", "SP").unwrap()
    }

    #[tokio::test]
    async fn test_retrieve_normalizes_rows() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/companies"))
            .and(query_param("registered_on", "2025-03-10"))
            .and(query_param("region", "SP"))
            .and(header("authorization", "Bearer k-123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": [
                    {
                        "tax_id": "00.000.000/0001-00",
                        "legal_name": "Alpha Comercio Ltda",
                        "trade_name": "Alpha",
                        "registered_on": "2025-03-10",
                        "region": "sp"
                    },
                    {
                        "tax_id": "00000000000200",
                        "legal_name": "Beta Servicos SA",
                        "registered_on": "2025-03-10",
                        "region": "SP"
                    }
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let records = source(&server.uri(), Some("k-123")).retrieve(&query()).await.unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].tax_id, "00000000000100");
        assert_eq!(records[0].trade_name.as_deref(), Some("Alpha"));
        assert_eq!(records[0].region, "SP");
        assert_eq!(records[1].trade_name, None);
    }

    #[tokio::test]
    async fn test_rows_from_other_regions_are_dropped() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/companies"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": [
                    {
                        "tax_id": "00000000000100",
                        "legal_name": "Alpha Comercio Ltda",
                        "registered_on": "2025-03-10",
                        "region": "SP"
                    },
                    {
                        "tax_id": "00000000000900",
                        "legal_name": "Omega Carioca Ltda",
                        "registered_on": "2025-03-10",
                        "region": "RJ"
                    }
                ]
            })))
            .mount(&server)
            .await;

        let records = source(&server.uri(), None).retrieve(&query()).await.unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].tax_id, "00000000000100");
        assert!(records.iter().all(|r| r.region == "SP"));
    }

    #[tokio::test]
    async fn test_empty_index_is_not_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/companies"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "results": [] })))
            .mount(&server)
            .await;

        let records = source(&server.uri(), None).retrieve(&query()).await.unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_non_success_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let err = source(&server.uri(), None).retrieve(&query()).await.unwrap_err();
        assert_eq!(err, SourceError::Status(502));
    }

    #[tokio::test]
    async fn test_malformed_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
            .mount(&server)
            .await;

        let err = source(&server.uri(), None).retrieve(&query()).await.unwrap_err();
        assert!(matches!(err, SourceError::Parse(_)));
    }

    #[tokio::test]
    async fn test_unreachable_host() {
        let server = MockServer::start().await;
        let uri = server.uri();
        drop(server);

        let err = source(&uri, None).retrieve(&query()).await.unwrap_err();
        assert!(matches!(err, SourceError::Network(_)));
    }
}
