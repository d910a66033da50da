use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;

use crate::state::AppState;

/// Liveness probe
pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "service": state.config.service.name,
    }))
}

/// Readiness probe: database and cache must answer
pub async fn ready(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let db_ok = sqlx_ping(&state).await;
    let cache_ok = state.cache.exists("ready-probe").await.is_ok();

    if db_ok && cache_ok {
        (
            StatusCode::OK,
            Json(json!({"status": "ready", "database": "up", "cache": "up"})),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "not_ready",
                "database": if db_ok { "up" } else { "down" },
                "cache": if cache_ok { "up" } else { "down" },
            })),
        )
    }
}

async fn sqlx_ping(state: &AppState) -> bool {
    sqlx::query("SELECT 1").fetch_one(state.db.pool()).await.is_ok()
}

/// Prometheus text exposition
pub async fn metrics(State(state): State<AppState>) -> String {
    state.metrics.render()
}

/// Router for operational routes
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/metrics", get(metrics))
}
