// Registry Radar - REST API (axum)
//
// One statically typed route per request kind; each handler owns its own
// request and response types.

use crate::error::ReconcileError;
use crate::service::{ErrorResponse, NewCompaniesRequest, RegistryService};
use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<RegistryService>,
}

#[derive(Serialize)]
struct HealthResponse {
    success: bool,
    status: &'static str,
    version: &'static str,
}

impl IntoResponse for ReconcileError {
    fn into_response(self) -> Response {
        let status = match self {
            ReconcileError::Unauthorized => StatusCode::UNAUTHORIZED,
            ReconcileError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        };
        (status, Json(ErrorResponse::from(&self))).into_response()
    }
}

/// `Authorization: Bearer <token>` (the scheme is case-insensitive)
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    scheme.eq_ignore_ascii_case("bearer").then_some(token.trim())
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        success: true,
        status: "OK",
        version: crate::VERSION,
    })
}

/// POST /api/companies/new - Reconciled new registrations for one date and region
async fn new_companies(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Option<Json<NewCompaniesRequest>>,
) -> Response {
    // A missing or unreadable body becomes an empty request, so the identity
    // check still runs first and the empty date is then rejected as invalid
    let request = body.map(|Json(request)| request).unwrap_or_default();

    match state.service.new_companies(bearer_token(&headers), &request).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// GET /api/sources - Configured sources and their region scope
async fn list_sources(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "success": true,
        "sources": state.service.sources(),
    }))
}

pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/companies/new", post(new_companies))
        .route("/sources", get(list_sources))
        .with_state(state);

    Router::new()
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive())
}
