//! Health and ingestion endpoints.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::json;

use crate::ingest;
use crate::state::AppState;

/// GET /api/health
pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let status = if state.is_ready() {
        "healthy"
    } else {
        "initializing"
    };

    Json(json!({
        "status": status,
        "documents": state.document_count(),
        "cache": state.cache.stats(),
        "security": state.security.stats(),
        "uptime": state.uptime_secs(),
    }))
}

/// POST /api/ingest — rebuild both indices from the doc root and swap
/// them in. In-flight requests keep the indices they started with.
pub async fn reingest(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let indices = ingest::run(&state.config, &state.embedder)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "reingest failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Ingestion failed".to_string(),
            )
        })?;

    let documents = indices.len();
    state.swap_indices(indices);
    tracing::info!(documents, "index rebuilt");

    Ok(Json(json!({
        "success": true,
        "documents": documents,
    })))
}
