use crate::AppState;
use axum::{Json, extract::State, response::IntoResponse};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub database: String,
    pub storage: String,
    pub version: String,
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Database and object store reachability", body = HealthResponse)
    ),
    tag = "system"
)]
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let db_status = if state.db.ping().await.is_ok() {
        "connected"
    } else {
        "disconnected"
    };

    // Replication creates a missing bucket on first use
    let storage_status = match state.storage.list_buckets().await {
        Ok(buckets) if buckets.iter().any(|b| b == state.storage.bucket()) => "connected",
        Ok(_) => "bucket missing",
        Err(e) => {
            tracing::warn!("Object store health check failed: {:#}", e);
            "disconnected"
        }
    };

    let status = if db_status == "connected" && storage_status != "disconnected" {
        "ok"
    } else {
        "degraded"
    };

    Json(HealthResponse {
        status: status.to_string(),
        database: db_status.to_string(),
        storage: storage_status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
