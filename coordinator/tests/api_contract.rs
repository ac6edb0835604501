//! Contract tests for the `/api` surface: failure ordering, bit-exact
//! bodies and the readiness truth table.

use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use chrono::{Duration, Utc};
use macaw_coordinator::cooldown::AlertCooldownManager;
use macaw_coordinator::health::HealthAggregator;
use macaw_coordinator::http::auth::{Authenticator, Authorizer, Identity, RateLimiter};
use macaw_coordinator::http::{create_router, ApiState, LeadershipView, RestartHandle};
use macaw_coordinator::metrics::SystemMetrics;
use macaw_coordinator::notify::AlertNotifier;
use macaw_coordinator::opportunities::OpportunityCache;
use macaw_domain::ServiceHealth;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tower::ServiceExt as _;

struct StaticAuth {
    allow: bool,
}

impl Authenticator for StaticAuth {
    fn authenticate(&self, _headers: &HeaderMap) -> Option<Identity> {
        self.allow.then(|| Identity {
            subject: "test".to_string(),
            roles: vec!["admin".to_string()],
        })
    }
}

struct AllowAll;

impl Authorizer for AllowAll {
    fn authorize(&self, _identity: &Identity, _action: &str) -> bool {
        true
    }
}

#[derive(Default)]
struct RecordingLeadership {
    leader: bool,
    consulted: AtomicBool,
}

#[async_trait::async_trait]
impl LeadershipView for RecordingLeadership {
    fn is_leader(&self) -> bool {
        self.consulted.store(true, Ordering::SeqCst);
        self.leader
    }
    fn instance_id(&self) -> String {
        "coordinator-test".to_string()
    }
    async fn current_leader(&self) -> Option<String> {
        Some("coordinator-test".to_string())
    }
}

struct StubRestarter {
    fail: bool,
    requested: AtomicBool,
}

#[async_trait::async_trait]
impl RestartHandle for StubRestarter {
    async fn restart(&self, _service: &str) -> Result<(), String> {
        self.requested.store(true, Ordering::SeqCst);
        if self.fail {
            Err("logger failure".to_string())
        } else {
            Ok(())
        }
    }
}

struct Harness {
    router: Router,
    state: Arc<ApiState>,
    leadership: Arc<RecordingLeadership>,
    restarter: Arc<StubRestarter>,
}

fn harness(authed: bool, leader: bool) -> Harness {
    harness_with(authed, leader, false)
}

fn harness_with(authed: bool, leader: bool, restart_fails: bool) -> Harness {
    let leadership = Arc::new(RecordingLeadership {
        leader,
        consulted: AtomicBool::new(false),
    });
    let restarter = Arc::new(StubRestarter {
        fail: restart_fails,
        requested: AtomicBool::new(false),
    });
    let state = Arc::new(ApiState {
        health: Arc::new(HealthAggregator::for_report_interval(Duration::seconds(5))),
        metrics: Arc::new(SystemMetrics::default()),
        opportunities: Arc::new(OpportunityCache::default()),
        cooldowns: Arc::new(AlertCooldownManager::new(Duration::milliseconds(300_000))),
        notifier: Arc::new(AlertNotifier::new(vec![])),
        authenticator: Arc::new(StaticAuth { allow: authed }),
        authorizer: Arc::new(AllowAll),
        restarter: Arc::clone(&restarter) as Arc<dyn RestartHandle>,
        leadership: Arc::clone(&leadership) as Arc<dyn LeadershipView>,
        rate_limiter: RateLimiter::admin_default(),
        restart_allow_list: vec![
            "execution-engine".to_string(),
            "eth-detector".to_string(),
        ],
        running: AtomicBool::new(true),
    });
    Harness {
        router: create_router(Arc::clone(&state)),
        state,
        leadership,
        restarter,
    }
}

async fn request(
    router: &Router,
    method: &str,
    uri: &str,
) -> (StatusCode, serde_json::Value) {
    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let code = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), 1 << 20)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (code, json)
}

#[tokio::test]
async fn test_restart_unauthenticated_is_401_and_leader_not_consulted() {
    let harness = harness(false, false);
    let (code, body) = request(
        &harness.router,
        "POST",
        "/api/services/execution-engine/restart",
    )
    .await;

    assert_eq!(code, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Authentication required");
    assert!(
        !harness.leadership.consulted.load(Ordering::SeqCst),
        "leadership must not be consulted before auth passes"
    );
}

#[tokio::test]
async fn test_restart_unknown_service_is_404_before_leader_check() {
    let harness = harness(true, false);
    let (code, body) = request(
        &harness.router,
        "POST",
        "/api/services/unknown-service/restart",
    )
    .await;

    assert_eq!(code, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Service not found");
    assert!(!harness.leadership.consulted.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_restart_allow_listed_name_that_matches_format_but_unknown_is_404() {
    // `my_service` passes the name-format check (400 path) but is not in
    // the allow-list: format vs domain distinction.
    let harness = harness(true, true);
    let (code, body) = request(&harness.router, "POST", "/api/services/my_service/restart").await;
    assert_eq!(code, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Service not found");
}

#[tokio::test]
async fn test_restart_malformed_name_is_400() {
    let harness = harness(true, true);
    let (code, body) = request(
        &harness.router,
        "POST",
        "/api/services/bad%20name/restart",
    )
    .await;
    assert_eq!(code, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid service name");
}

#[tokio::test]
async fn test_restart_non_leader_is_403() {
    let harness = harness(true, false);
    let (code, body) = request(
        &harness.router,
        "POST",
        "/api/services/execution-engine/restart",
    )
    .await;
    assert_eq!(code, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "Not the leader");
    assert!(!harness.restarter.requested.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_restart_success_body() {
    let harness = harness(true, true);
    let (code, body) = request(
        &harness.router,
        "POST",
        "/api/services/execution-engine/restart",
    )
    .await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Restart requested for execution-engine");
    assert!(harness.restarter.requested.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_restart_executor_failure_is_500() {
    let harness = harness_with(true, true, true);
    let (code, body) = request(
        &harness.router,
        "POST",
        "/api/services/execution-engine/restart",
    )
    .await;
    assert_eq!(code, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Internal server error");
}

#[tokio::test]
async fn test_restart_rate_limit_is_5_per_window() {
    let harness = harness(true, true);
    for _ in 0..5 {
        let (code, _) = request(
            &harness.router,
            "POST",
            "/api/services/execution-engine/restart",
        )
        .await;
        assert_eq!(code, StatusCode::OK);
    }
    let (code, body) = request(
        &harness.router,
        "POST",
        "/api/services/execution-engine/restart",
    )
    .await;
    assert_eq!(code, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"], "Too many requests");
}

#[tokio::test]
async fn test_acknowledge_falls_back_to_system_suffix() {
    let harness = harness(true, false);
    // A service-less alert is stored under `<type>_system`.
    harness
        .state
        .cooldowns
        .should_fire("HIGH_MEMORY_system", Utc::now());

    let (code, body) = request(
        &harness.router,
        "POST",
        "/api/alerts/HIGH_MEMORY/acknowledge",
    )
    .await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Alert acknowledged");
}

#[tokio::test]
async fn test_acknowledge_literal_key_wins_over_fallback() {
    let harness = harness(true, false);
    harness
        .state
        .cooldowns
        .should_fire("SERVICE_UNHEALTHY_eth-detector", Utc::now());

    let (_, body) = request(
        &harness.router,
        "POST",
        "/api/alerts/SERVICE_UNHEALTHY_eth-detector/acknowledge",
    )
    .await;
    assert_eq!(body["success"], true);
}

#[tokio::test]
async fn test_acknowledge_unknown_alert_reports_not_found_in_body() {
    // No leadership requirement on acknowledge: a follower serves it.
    let harness = harness(true, false);
    let (code, body) = request(
        &harness.router,
        "POST",
        "/api/alerts/NO_SUCH_ALERT/acknowledge",
    )
    .await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Alert not found in cooldowns");
    assert!(!harness.leadership.consulted.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_readiness_truth_table() {
    // Not running -> 503.
    let harness_a = harness(false, false);
    harness_a.state.running.store(false, Ordering::SeqCst);
    let (code, body) = request(&harness_a.router, "GET", "/api/health/ready").await;
    assert_eq!(code, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "not_ready");
    assert_eq!(body["isRunning"], false);

    // Running but zero system health -> 503.
    let harness_b = harness(false, false);
    let mut sick = ServiceHealth::healthy("only-service", Utc::now());
    sick.status = macaw_domain::HealthStatus::Unhealthy;
    harness_b.state.health.record(sick);
    let (code, body) = request(&harness_b.router, "GET", "/api/health/ready").await;
    assert_eq!(code, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["isRunning"], true);

    // Running and healthy -> 200.
    let harness_c = harness(false, false);
    harness_c
        .state
        .health
        .record(ServiceHealth::healthy("svc", Utc::now()));
    let (code, _) = request(&harness_c.router, "GET", "/api/health/ready").await;
    assert_eq!(code, StatusCode::OK);
}

#[tokio::test]
async fn test_health_is_public_and_enriched_when_authenticated() {
    let harness_a = harness(false, false);
    let (code, body) = request(&harness_a.router, "GET", "/api/health").await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(body["status"], "healthy"); // empty fleet -> 100
    assert_eq!(body["systemHealth"], 100);
    assert!(body.get("isLeader").is_none());
    assert!(body.get("services").is_none());

    let harness_b = harness(true, false);
    let (_, body) = request(&harness_b.router, "GET", "/api/health").await;
    assert_eq!(body["isLeader"], false);
    assert_eq!(body["instanceId"], "coordinator-test");
    assert!(body.get("services").is_some());
}

#[tokio::test]
async fn test_health_degraded_below_fifty() {
    let harness = harness(false, false);
    harness
        .state
        .health
        .record(ServiceHealth::healthy("good", Utc::now()));
    let mut bad = ServiceHealth::healthy("bad-1", Utc::now());
    bad.status = macaw_domain::HealthStatus::Unhealthy;
    harness.state.health.record(bad);
    let mut bad = ServiceHealth::healthy("bad-2", Utc::now());
    bad.status = macaw_domain::HealthStatus::Unhealthy;
    harness.state.health.record(bad);

    let (_, body) = request(&harness.router, "GET", "/api/health").await;
    // 1 of 3 healthy -> 33.
    assert_eq!(body["systemHealth"], 33);
    assert_eq!(body["status"], "degraded");
}

#[tokio::test]
async fn test_read_endpoints_require_auth() {
    let harness = harness(false, false);
    for uri in [
        "/api/metrics",
        "/api/services",
        "/api/opportunities",
        "/api/alerts",
        "/api/leader",
    ] {
        let (code, body) = request(&harness.router, "GET", uri).await;
        assert_eq!(code, StatusCode::UNAUTHORIZED, "uri {uri}");
        assert_eq!(body["error"], "Authentication required");
    }
}

#[tokio::test]
async fn test_opportunities_returns_top_100_newest_first() {
    let harness = harness(true, false);
    for i in 0..150 {
        harness.state.opportunities.insert(macaw_domain::Opportunity {
            id: format!("opp-{i}").into(),
            kind: macaw_domain::OpportunityKind::CrossDex,
            source_chain: None,
            target_chain: None,
            dex: None,
            expected_profit: 1.0,
            confidence: 0.9,
            amount: None,
            timestamp: chrono::TimeZone::timestamp_millis_opt(&Utc, i * 1000).unwrap(),
            expires_at: None,
            status: Default::default(),
            data: serde_json::Value::Null,
        });
    }

    let (code, body) = request(&harness.router, "GET", "/api/opportunities").await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(body["count"], 100);
    let opportunities = body["opportunities"].as_array().unwrap();
    assert_eq!(opportunities[0]["id"], "opp-149");
    assert_eq!(opportunities[99]["id"], "opp-50");
}
