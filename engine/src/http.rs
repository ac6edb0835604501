use crate::breaker::BreakerState;
use crate::stats::StatsSnapshot;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Narrow status capability the HTTP layer reads from, so the router
/// does not hold a back-reference to the full engine.
pub trait EngineStatus: Send + Sync + 'static {
    fn is_running(&self) -> bool;
    fn is_leader(&self) -> bool;
    fn instance_id(&self) -> String;
    fn queue_size(&self) -> usize;
    fn queue_paused(&self) -> bool;
    fn breaker_state(&self) -> BreakerState;
    fn stats(&self) -> StatsSnapshot;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    instance_id: String,
    is_leader: bool,
    queue_size: usize,
    queue_paused: bool,
    breaker_state: BreakerState,
    timestamp: i64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReadyResponse {
    status: &'static str,
    is_running: bool,
    timestamp: i64,
}

/// Engine HTTP surface: health, liveness, readiness and stats.
pub fn router(status: Arc<dyn EngineStatus>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/health/live", get(live))
        .route("/health/ready", get(ready))
        .route("/stats", get(stats))
        .layer(TraceLayer::new_for_http())
        .with_state(status)
}

async fn health(State(status): State<Arc<dyn EngineStatus>>) -> Json<HealthResponse> {
    let degraded = status.breaker_state() == BreakerState::Open || status.queue_paused();
    Json(HealthResponse {
        status: if degraded { "degraded" } else { "healthy" },
        service: "execution-engine",
        instance_id: status.instance_id(),
        is_leader: status.is_leader(),
        queue_size: status.queue_size(),
        queue_paused: status.queue_paused(),
        breaker_state: status.breaker_state(),
        timestamp: Utc::now().timestamp_millis(),
    })
}

async fn live() -> StatusCode {
    StatusCode::OK
}

async fn ready(State(status): State<Arc<dyn EngineStatus>>) -> impl IntoResponse {
    let is_running = status.is_running();
    let code = if is_running {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        code,
        Json(ReadyResponse {
            status: if is_running { "ready" } else { "not_ready" },
            is_running,
            timestamp: Utc::now().timestamp_millis(),
        }),
    )
}

async fn stats(State(status): State<Arc<dyn EngineStatus>>) -> Json<StatsSnapshot> {
    Json(status.stats())
}
