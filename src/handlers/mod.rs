// Route handlers, one module per resource. Role checks happen inside each
// handler through `CurrentUser::restrict_to`.
pub mod auth;
pub mod factory;
pub mod reviews;
pub mod tours;
pub mod users;

use axum::{
    extract::{OriginalUri, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};

use crate::database::DatabaseManager;
use crate::error::ApiError;
use crate::state::AppState;

/// GET /health
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    match DatabaseManager::health_check(&state.pool).await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({ "status": "success", "data": { "database": "ok" } })),
        ),
        Err(e) => {
            tracing::warn!("health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "error", "data": { "database": "unavailable" } })),
            )
        }
    }
}

/// Fallback for unmatched routes
pub async fn not_found(OriginalUri(uri): OriginalUri) -> ApiError {
    let path = uri.path_and_query().map_or(uri.path(), |p| p.as_str());
    ApiError::not_found(format!("Can't find {} on this server!", path))
}
