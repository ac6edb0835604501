//! The coordinator's `/api` surface.
//!
//! Paths, status codes and body shapes are monitoring contract: change
//! them and every dashboard probing this service breaks. Handlers check
//! in a fixed order (authentication 401, authorization 403, input format
//! 400, domain existence 404, leadership 403) so a caller can distinguish
//! *who you are* failures from *what you asked* ones.

/// Identity, authorization and rate-limit capabilities.
pub mod auth;

/// Request handlers.
pub mod handlers;

use crate::cooldown::AlertCooldownManager;
use crate::health::HealthAggregator;
use crate::metrics::SystemMetrics;
use crate::notify::AlertNotifier;
use crate::opportunities::OpportunityCache;
use auth::{Authenticator, Authorizer, RateLimiter};
use axum::routing::{get, post};
use axum::Router;
use std::fmt;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Restart capability, held by the service layer.
///
/// The handler publishes the request; executing it is leader-only
/// side-effecting work guarded before this is called.
#[async_trait::async_trait]
pub trait RestartHandle: Send + Sync + 'static {
    async fn restart(&self, service: &str) -> Result<(), String>;
}

/// Leadership view consumed by the handlers.
#[async_trait::async_trait]
pub trait LeadershipView: Send + Sync + 'static {
    fn is_leader(&self) -> bool;
    fn instance_id(&self) -> String;
    async fn current_leader(&self) -> Option<String>;
}

/// Shared state behind every `/api` handler.
pub struct ApiState {
    pub health: Arc<HealthAggregator>,
    pub metrics: Arc<SystemMetrics>,
    pub opportunities: Arc<OpportunityCache>,
    pub cooldowns: Arc<AlertCooldownManager>,
    pub notifier: Arc<AlertNotifier>,
    pub authenticator: Arc<dyn Authenticator>,
    pub authorizer: Arc<dyn Authorizer>,
    pub restarter: Arc<dyn RestartHandle>,
    pub leadership: Arc<dyn LeadershipView>,
    pub rate_limiter: RateLimiter,
    pub restart_allow_list: Vec<String>,
    pub running: AtomicBool,
}

impl fmt::Debug for ApiState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiState")
            .field("restart_allow_list", &self.restart_allow_list)
            .finish_non_exhaustive()
    }
}

/// Builds the router, mounted at `/api`.
pub fn create_router(state: Arc<ApiState>) -> Router {
    let api = Router::new()
        // Health
        .route("/health", get(handlers::health))
        .route("/health/live", get(handlers::live))
        .route("/health/ready", get(handlers::ready))
        // Read surface (auth + authorize)
        .route("/metrics", get(handlers::metrics))
        .route("/services", get(handlers::services))
        .route("/opportunities", get(handlers::opportunities))
        .route("/alerts", get(handlers::alerts))
        .route("/leader", get(handlers::leader))
        // Admin surface
        .route("/services/{service}/restart", post(handlers::restart_service))
        .route("/alerts/{alert}/acknowledge", post(handlers::acknowledge_alert))
        .with_state(state);

    Router::new()
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
}
