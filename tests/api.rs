//! End-to-end: HTTP router -> service -> real adapters (wiremock upstreams) -> SQLite

#![cfg(feature = "server")]

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use http_body_util::BodyExt;
use registry_radar::api::{build_router, AppState};
use registry_radar::config::{ApiToken, AuthoritativeConfig, PreliminaryConfig};
use registry_radar::db::count_audit_entries;
use registry_radar::{setup_database, Config, RegistryService};
use rusqlite::Connection;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Harness {
    app: axum::Router,
    conn: Arc<Mutex<Connection>>,
    federal: MockServer,
    board: MockServer,
}

async fn harness() -> Harness {
    let federal = MockServer::start().await;
    let board = MockServer::start().await;

    let conn = Connection::open_in_memory().unwrap();
    setup_database(&conn).unwrap();
    let conn = Arc::new(Mutex::new(conn));

    let config = Config {
        authoritative: AuthoritativeConfig {
            base_url: federal.uri(),
            api_key: None,
        },
        preliminary: Some(PreliminaryConfig {
            base_url: board.uri(),
            region: "SP".to_string(),
            request_delay_secs: 5,
        }),
        api_tokens: vec![ApiToken {
            token: "t-ops".to_string(),
            actor: "ops@example.org".to_string(),
        }],
        ..Config::default()
    };

    let service = RegistryService::from_config(&config, conn.clone()).unwrap();
    let app = build_router(AppState {
        service: Arc::new(service),
    });

    Harness { app, conn, federal, board }
}

async fn post(app: &axum::Router, token: Option<&str>, body: Value) -> (StatusCode, Value) {
    post_raw(app, token, body.to_string()).await
}

async fn post_raw(app: &axum::Router, token: Option<&str>, body: String) -> (StatusCode, Value) {
    let mut request = Request::builder()
        .method("POST")
        .uri("/api/companies/new")
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        request = request.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = request.body(Body::from(body)).unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn audit_count(harness: &Harness) -> i64 {
    count_audit_entries(&harness.conn.lock().unwrap()).unwrap()
}

#[tokio::test]
async fn test_authoritative_result_is_served_without_scraping() {
    let h = harness().await;
    Mock::given(method("GET"))
        .and(path("/companies"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{
                "tax_id": "00000000000100",
                "legal_name": "Alpha",
                "registered_on": "2025-03-10",
                "region": "SP"
            }]
        })))
        .expect(1)
        .mount(&h.federal)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "rows": [] })))
        .expect(0)
        .mount(&h.board)
        .await;

    let (status, body) = post(&h.app, Some("t-ops"), json!({ "date": "2025-03-10", "region": "SP" })).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["companies"][0]["taxId"], "00000000000100");
    assert_eq!(body["companies"][0]["source"], "authoritative");
    assert_eq!(body["companies"][0]["confidence"], "high");
    assert_eq!(body["stats"], json!({ "total": 1, "highConfidence": 1, "mediumConfidence": 0, "lowConfidence": 0 }));
    assert_eq!(body["sourcesUsed"], json!(["authoritative"]));
    assert_eq!(audit_count(&h), 1);
}

#[tokio::test]
async fn test_fallback_and_cache_reuse() {
    let h = harness().await;
    Mock::given(method("GET"))
        .and(path("/companies"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "results": [] })))
        .expect(1)
        .mount(&h.federal)
        .await;
    Mock::given(method("GET"))
        .and(path("/registrations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "rows": [{ "document": "00.000.000/0002-00", "name": "Gamma Ltda", "date": "10/03/2025" }]
        })))
        .expect(1)
        .mount(&h.board)
        .await;

    let request = json!({ "date": "2025-03-10", "region": "SP" });
    let (status, first) = post(&h.app, Some("t-ops"), request.clone()).await;
    let (_, second) = post(&h.app, Some("t-ops"), request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["companies"][0]["taxId"], "00000000000200");
    assert_eq!(first["companies"][0]["source"], "preliminary");
    assert_eq!(first["companies"][0]["confidence"], "medium");
    assert_eq!(first["companies"], second["companies"]);
    assert_eq!(audit_count(&h), 2);
    // MockServer drop verifies each upstream was hit exactly once
}

#[tokio::test]
async fn test_upstream_outage_is_still_a_success() {
    let h = harness().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&h.federal)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&h.board)
        .await;

    let (status, body) = post(&h.app, Some("t-ops"), json!({ "date": "2025-03-10", "region": "SP" })).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["companies"], json!([]));
    assert_eq!(body["warnings"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_missing_token_is_unauthorized_without_audit() {
    let h = harness().await;

    let (status, body) = post(&h.app, None, json!({ "date": "2025-03-10", "region": "SP" })).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
    assert!(body["error"].is_string());

    let (status, _) = post(&h.app, Some("nope"), json!({ "date": "2025-03-10", "region": "SP" })).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    assert_eq!(audit_count(&h), 0);
}

#[tokio::test]
async fn test_malformed_input_is_bad_request() {
    let h = harness().await;

    let (status, body) = post(&h.app, Some("t-ops"), json!({ "date": "10/03/2025", "region": "SP" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let (status, _) = post(&h.app, Some("t-ops"), json!({ "date": "2025-03-10" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert_eq!(audit_count(&h), 0);
}

#[tokio::test]
async fn test_credentials_are_checked_before_the_body() {
    let h = harness().await;

    let (status, body) = post_raw(&h.app, None, "not json".to_string()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);

    let (status, _) = post_raw(&h.app, Some("nope"), String::new()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = post_raw(&h.app, Some("t-ops"), "not json".to_string()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    assert_eq!(audit_count(&h), 0);
}

#[tokio::test]
async fn test_sources_endpoint() {
    let h = harness().await;
    let request = Request::builder().uri("/api/sources").body(Body::empty()).unwrap();

    let response = h.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();

    assert_eq!(body["sources"][0]["id"], "federal_index");
    assert_eq!(body["sources"][0]["kind"], "authoritative");
    assert_eq!(body["sources"][1]["region"], "SP");
}
