use super::auth::{is_valid_name, Identity};
use super::ApiState;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use macaw_domain::{Alert, ServiceHealth};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
}

fn error_response(code: StatusCode, message: &'static str) -> Response {
    (code, Json(ErrorBody { error: message })).into_response()
}

fn unauthorized() -> Response {
    error_response(StatusCode::UNAUTHORIZED, "Authentication required")
}

fn forbidden() -> Response {
    error_response(StatusCode::FORBIDDEN, "Forbidden")
}

/// Auth then authz, in that order; `Err` is the ready-made refusal.
fn authenticate(state: &ApiState, headers: &HeaderMap, action: &str) -> Result<Identity, Response> {
    let identity = state
        .authenticator
        .authenticate(headers)
        .ok_or_else(unauthorized)?;
    if !state.authorizer.authorize(&identity, action) {
        return Err(forbidden());
    }
    Ok(identity)
}

fn rate_limited(state: &ApiState, identity: &Identity, route: &str) -> Option<Response> {
    let key = format!("{route}:{}", identity.subject);
    if state.rate_limiter.check(&key, Utc::now()) {
        None
    } else {
        Some(error_response(
            StatusCode::TOO_MANY_REQUESTS,
            "Too many requests",
        ))
    }
}

/// `GET /api/health`: public summary, enriched when authenticated.
pub async fn health(State(state): State<Arc<ApiState>>, headers: HeaderMap) -> Response {
    let system_health = state.health.system_health();
    let mut body = json!({
        "status": if system_health >= 50 { "healthy" } else { "degraded" },
        "systemHealth": system_health,
        "timestamp": Utc::now().timestamp_millis(),
    });

    // Extra detail only for validated identities; no 401 on this route.
    if let Some(identity) = state.authenticator.authenticate(&headers) {
        if state.authorizer.authorize(&identity, "health:detail") {
            body["isLeader"] = json!(state.leadership.is_leader());
            body["instanceId"] = json!(state.leadership.instance_id());
            body["services"] = serde_json::to_value(state.health.snapshot())
                .unwrap_or(serde_json::Value::Null);
        }
    }
    Json(body).into_response()
}

/// `GET /api/health/live`: 200 while the process is up.
pub async fn live() -> Response {
    Json(json!({ "status": "alive" })).into_response()
}

/// `GET /api/health/ready`: 200 iff running and the fleet is not
/// entirely unhealthy.
pub async fn ready(State(state): State<Arc<ApiState>>) -> Response {
    let is_running = state.running.load(Ordering::SeqCst);
    let system_health = state.health.system_health();
    let ready = is_running && system_health > 0;
    let body = json!({
        "status": if ready { "ready" } else { "not_ready" },
        "isRunning": is_running,
        "systemHealth": system_health,
        "timestamp": Utc::now().timestamp_millis(),
    });
    let code = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(body)).into_response()
}

/// `GET /api/metrics`.
pub async fn metrics(State(state): State<Arc<ApiState>>, headers: HeaderMap) -> Response {
    if let Err(refusal) = authenticate(&state, &headers, "metrics:read") {
        return refusal;
    }
    Json(state.metrics.snapshot()).into_response()
}

/// `GET /api/services`.
pub async fn services(State(state): State<Arc<ApiState>>, headers: HeaderMap) -> Response {
    if let Err(refusal) = authenticate(&state, &headers, "services:read") {
        return refusal;
    }
    let services: Vec<ServiceHealth> = state.health.snapshot();
    Json(json!({
        "services": services,
        "systemHealth": state.health.system_health(),
        "timestamp": Utc::now().timestamp_millis(),
    }))
    .into_response()
}

/// `GET /api/opportunities`: the 100 most recent by timestamp.
pub async fn opportunities(State(state): State<Arc<ApiState>>, headers: HeaderMap) -> Response {
    if let Err(refusal) = authenticate(&state, &headers, "opportunities:read") {
        return refusal;
    }
    let recent = state.opportunities.most_recent(100);
    Json(json!({
        "count": recent.len(),
        "opportunities": recent,
        "timestamp": Utc::now().timestamp_millis(),
    }))
    .into_response()
}

#[derive(Debug, Deserialize)]
pub struct AlertsQuery {
    limit: Option<usize>,
}

/// `GET /api/alerts`: recent alert history, newest first.
pub async fn alerts(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Query(query): Query<AlertsQuery>,
) -> Response {
    if let Err(refusal) = authenticate(&state, &headers, "alerts:read") {
        return refusal;
    }
    let alerts: Vec<Alert> = state.notifier.history(query.limit.unwrap_or(100));
    Json(json!({
        "count": alerts.len(),
        "alerts": alerts,
        "timestamp": Utc::now().timestamp_millis(),
    }))
    .into_response()
}

/// `GET /api/leader`.
pub async fn leader(State(state): State<Arc<ApiState>>, headers: HeaderMap) -> Response {
    if let Err(refusal) = authenticate(&state, &headers, "leader:read") {
        return refusal;
    }
    Json(json!({
        "isLeader": state.leadership.is_leader(),
        "instanceId": state.leadership.instance_id(),
        "currentLeader": state.leadership.current_leader().await,
        "timestamp": Utc::now().timestamp_millis(),
    }))
    .into_response()
}

/// `POST /api/services/{service}/restart`.
///
/// Failure order is contract: auth 401, authz 403, rate limit 429, name
/// format 400, allow-list 404, leadership 403, then execution (500 on
/// failure). Leadership is read last so an unauthenticated probe can
/// never learn whether this instance leads.
pub async fn restart_service(
    State(state): State<Arc<ApiState>>,
    Path(service): Path<String>,
    headers: HeaderMap,
) -> Response {
    let identity = match authenticate(&state, &headers, "services:restart") {
        Ok(identity) => identity,
        Err(refusal) => return refusal,
    };
    if let Some(refusal) = rate_limited(&state, &identity, "restart") {
        return refusal;
    }
    if !is_valid_name(&service) {
        return error_response(StatusCode::BAD_REQUEST, "Invalid service name");
    }
    if !state.restart_allow_list.iter().any(|allowed| allowed == &service) {
        return error_response(StatusCode::NOT_FOUND, "Service not found");
    }
    if !state.leadership.is_leader() {
        return error_response(StatusCode::FORBIDDEN, "Not the leader");
    }

    match state.restarter.restart(&service).await {
        Ok(()) => {
            info!(service, subject = %identity.subject, "restart requested");
            Json(json!({
                "success": true,
                "message": format!("Restart requested for {service}"),
            }))
            .into_response()
        }
        Err(error) => {
            warn!(service, error, "restart request failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        }
    }
}

/// `POST /api/alerts/{alert}/acknowledge`.
///
/// Deletes the alert's cooldown so the next occurrence fires
/// immediately. Tries the literal path parameter first, then falls back
/// to `{alert}_system` for service-less alerts. Deliberately no
/// leadership check: acknowledging is a read-your-own-view operation any
/// instance can serve.
pub async fn acknowledge_alert(
    State(state): State<Arc<ApiState>>,
    Path(alert): Path<String>,
    headers: HeaderMap,
) -> Response {
    let identity = match authenticate(&state, &headers, "alerts:acknowledge") {
        Ok(identity) => identity,
        Err(refusal) => return refusal,
    };
    if let Some(refusal) = rate_limited(&state, &identity, "acknowledge") {
        return refusal;
    }
    if !is_valid_name(&alert) {
        return error_response(StatusCode::BAD_REQUEST, "Invalid alert name");
    }

    let deleted = state.cooldowns.delete(&alert) || state.cooldowns.delete(&format!("{alert}_system"));
    Json(json!({
        "success": deleted,
        "message": if deleted {
            "Alert acknowledged"
        } else {
            "Alert not found in cooldowns"
        },
    }))
    .into_response()
}
