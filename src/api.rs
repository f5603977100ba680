//! REST API for the car recommender
//!
//! Exposes search, recommendation and listing lookup over HTTP.

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::models::{Criteria, ListingId};
use crate::recommender::{Recommender, CANDIDATE_POOL, DEFAULT_LIMIT};

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub recommender: Arc<Recommender>,
}

#[derive(Debug, Deserialize)]
pub struct AnalyzeParams {
    pub limit: Option<usize>,
}

/// Request bodies that are empty or not a JSON object mean "no criteria"
fn criteria_from_body(body: &Bytes) -> Criteria {
    Criteria::parse(std::str::from_utf8(body).ok())
}

/// =============================
/// Health Endpoint
/// =============================

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// =============================
/// Search Endpoint
/// =============================

async fn search(State(state): State<ApiState>, body: Bytes) -> (StatusCode, Json<ApiResponse>) {
    let criteria = criteria_from_body(&body);

    match state.recommender.store().find(&criteria, CANDIDATE_POOL).await {
        Ok(listings) => {
            info!(count = listings.len(), "Search completed");
            (
                StatusCode::OK,
                Json(ApiResponse::success(serde_json::json!({ "listings": listings }))),
            )
        }
        Err(e) => {
            error!("Error in search API: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error(e.to_string())),
            )
        }
    }
}

/// =============================
/// Recommendation Endpoint
/// =============================

async fn analyze(
    State(state): State<ApiState>,
    Query(params): Query<AnalyzeParams>,
    body: Bytes,
) -> (StatusCode, Json<ApiResponse>) {
    let criteria = criteria_from_body(&body);
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT);

    if let Err(e) = state.recommender.store().save_search(&criteria).await {
        warn!("Failed to record search criteria: {}", e);
    }

    let recommendations = state.recommender.recommend(&criteria, limit).await;

    (
        StatusCode::OK,
        Json(ApiResponse::success(serde_json::json!({
            "recommendations": recommendations
        }))),
    )
}

/// =============================
/// Listing Lookup
/// =============================

async fn get_listing(
    State(state): State<ApiState>,
    Path(listing_id): Path<ListingId>,
) -> (StatusCode, Json<ApiResponse>) {
    match state.recommender.store().get_listing(listing_id).await {
        Ok(Some(listing)) => (
            StatusCode::OK,
            Json(ApiResponse::success(serde_json::json!({ "listing": listing }))),
        ),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::error("Listing not found".into())),
        ),
        Err(e) => {
            error!(listing_id, "Error in listing API: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error(e.to_string())),
            )
        }
    }
}

async fn scrape() -> (StatusCode, Json<ApiResponse>) {
    (
        StatusCode::NOT_IMPLEMENTED,
        Json(ApiResponse::error(
            "Scraping is handled outside this service; import listings with the CLI".into(),
        )),
    )
}

/// =============================
/// Router
/// =============================

pub fn create_router(recommender: Arc<Recommender>) -> Router {
    let state = ApiState { recommender };

    Router::new()
        .route("/health", get(health))
        .route("/api/search", post(search))
        .route("/api/analyze", post(analyze))
        .route("/api/listings/:id", get(get_listing))
        .route("/api/scrape", post(scrape))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    recommender: Arc<Recommender>,
    host: &str,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(recommender);

    let listener = tokio::net::TcpListener::bind(format!("{}:{}", host, port)).await?;

    info!("API Server listening on http://{}:{}", host, port);

    axum::serve(listener, router).await?;

    Ok(())
}
