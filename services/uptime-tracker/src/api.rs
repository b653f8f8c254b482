//! HTTP API: cached status list, runtime names and the cleanup trigger

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::cache::TtlCache;
use crate::error::Result;
use crate::pipeline::{Pipeline, ServiceStatus};
use crate::retention::{CleanupReport, RetentionManager};
use crate::runtime::{container_names, SnapshotSource};
use crate::store::Store;

/// Cache key of the whole status list
pub const STATUS_CACHE_KEY: &str = "container-status";

/// Status list as cached; hits share one allocation
pub type StatusList = Arc<Vec<ServiceStatus>>;

const API_KEY_HEADER: &str = "x-api-key";

/// Shared state behind every route
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub cache: Arc<TtlCache<StatusList>>,
    pub cache_ttl: Duration,
    pub retention: Arc<RetentionManager>,
    pub source: Arc<dyn SnapshotSource>,
    pub store: Arc<dyn Store>,
    pub api_key: Option<String>,
}

impl AppState {
    /// Status list from the cache, polling the runtime when it has expired
    pub async fn current_status(&self) -> Result<StatusList> {
        let pipeline = Arc::clone(&self.pipeline);
        self.cache
            .get(
                STATUS_CACHE_KEY,
                || async move { pipeline.run().await.map(Arc::new) },
                self.cache_ttl,
            )
            .await
    }
}

/// Build the API router
pub fn build_router(state: AppState) -> Router {
    let operator = Router::new()
        .route("/api/status/names", get(names_handler))
        .route(
            "/api/cleanup",
            get(cleanup_get_handler).post(cleanup_post_handler),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_api_key,
        ));

    Router::new()
        .route("/api/status", get(status_handler))
        .route("/health", get(health_handler))
        .route("/health/store", get(store_health_handler))
        .merge(operator)
        .with_state(state)
}

async fn require_api_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    if let Some(expected) = &state.api_key {
        let provided = request
            .headers()
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok());
        if provided != Some(expected.as_str()) {
            tracing::debug!("Rejected request to {} without valid API key", request.uri());
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "Unauthorized" })),
            )
                .into_response();
        }
    }
    next.run(request).await
}

async fn status_handler(State(state): State<AppState>) -> Response {
    match state.current_status().await {
        Ok(statuses) => Json(statuses.as_slice()).into_response(),
        Err(e) => {
            tracing::warn!("Status request failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "error": "Failed to fetch container status",
                    "details": e.to_string(),
                })),
            )
                .into_response()
        }
    }
}

async fn names_handler(State(state): State<AppState>) -> Response {
    match container_names(state.source.as_ref()).await {
        Ok(names) => Json(names).into_response(),
        Err(e) => {
            tracing::warn!("Listing container names failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "error": "Failed to fetch container names",
                    "details": e.to_string(),
                })),
            )
                .into_response()
        }
    }
}

/// Successful cleanup answer
#[derive(Debug, Serialize)]
struct CleanupResponse {
    success: bool,
    message: String,
    #[serde(flatten)]
    report: CleanupReport,
}

#[derive(Debug, Deserialize)]
struct CleanupQuery {
    action: Option<String>,
}

async fn run_cleanup(state: &AppState, trigger: &str) -> Response {
    tracing::info!("Cleanup triggered manually via {}", trigger);

    if !state.store.healthy() {
        tracing::error!("Cleanup failed: history store unavailable");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "History store unavailable" })),
        )
            .into_response();
    }

    match state.retention.cleanup().await {
        Ok(report) => {
            tracing::info!(
                "Manual cleanup finished, removed {} points",
                report.deleted_count
            );
            Json(CleanupResponse {
                success: true,
                message: format!(
                    "Points older than {} days deleted successfully",
                    report.max_age_days
                ),
                report,
            })
            .into_response()
        }
        Err(e) => {
            tracing::error!("Manual cleanup failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "error": "Failed to clean up old data",
                    "details": e.to_string(),
                })),
            )
                .into_response()
        }
    }
}

async fn cleanup_post_handler(State(state): State<AppState>) -> Response {
    run_cleanup(&state, "POST").await
}

async fn cleanup_get_handler(
    State(state): State<AppState>,
    Query(query): Query<CleanupQuery>,
) -> Response {
    if query.action.as_deref() == Some("run") {
        return run_cleanup(&state, "GET ?action=run").await;
    }

    Json(json!({
        "message": "Cleanup API endpoint",
        "usage": "POST to this endpoint or GET with ?action=run to trigger history cleanup",
        "maxAgeDays": state.retention.max_age_days(),
    }))
    .into_response()
}

async fn health_handler() -> impl IntoResponse {
    "OK"
}

async fn store_health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({ "store_healthy": state.store.healthy() }))
}
