use crate::config::CoordinatorConfig;
use crate::consumers;
use crate::cooldown::AlertCooldownManager;
use crate::error::CoordinatorError;
use crate::health::HealthAggregator;
use crate::http::auth::{RateLimiter, RoleAuthorizer, TokenAuthenticator};
use crate::http::{create_router, ApiState, LeadershipView, RestartHandle};
use crate::metrics::SystemMetrics;
use crate::notify::{AlertChannel, AlertNotifier, DiscordChannel, SlackChannel};
use crate::opportunities::OpportunityCache;
use chrono::Utc;
use macaw_coordination::{failover, LeaderElector, LeaderElectorConfig, LeaderEvent};
use macaw_domain::{Alert, AlertSeverity, ServiceHealth, WireEvent};
use macaw_streams::{AlertFn, ConsumerConfig, ConsumerHandle, GroupConsumer, StreamHandler};
use macaw_substrate::{streams, EventLog, KvStore};
use serde_json::json;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// The coordinator service.
pub struct Coordinator {
    config: CoordinatorConfig,
    instance_id: String,
    log: Arc<dyn EventLog>,
    kv: Arc<dyn KvStore>,
    health: Arc<HealthAggregator>,
    metrics: Arc<SystemMetrics>,
    cache: Arc<OpportunityCache>,
    cooldowns: Arc<AlertCooldownManager>,
    notifier: Arc<AlertNotifier>,
    leader: Arc<AtomicBool>,
    api: Arc<ApiState>,
}

impl fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Coordinator")
            .field("instance_id", &self.instance_id)
            .field("region", &self.config.region)
            .finish_non_exhaustive()
    }
}

struct Leadership {
    leader: Arc<AtomicBool>,
    instance_id: String,
    kv: Arc<dyn KvStore>,
    leader_key: &'static str,
}

#[async_trait::async_trait]
impl LeadershipView for Leadership {
    fn is_leader(&self) -> bool {
        self.leader.load(Ordering::SeqCst)
    }

    fn instance_id(&self) -> String {
        self.instance_id.clone()
    }

    async fn current_leader(&self) -> Option<String> {
        self.kv.get(self.leader_key).await.ok().flatten()
    }
}

/// Restart requests are published to the execution-requests stream; the
/// targeted service's supervisor consumes them.
struct StreamRestarter {
    log: Arc<dyn EventLog>,
    requested_by: String,
}

#[async_trait::async_trait]
impl RestartHandle for StreamRestarter {
    async fn restart(&self, service: &str) -> Result<(), String> {
        let event = WireEvent::encode(
            "service-restart",
            &json!({
                "service": service,
                "requestedBy": self.requested_by,
                "requestedAt": Utc::now().timestamp_millis(),
            }),
        )
        .map_err(|error| error.to_string())?
        .with_service(service);
        self.log
            .append(streams::EXECUTION_REQUESTS, event.into_fields())
            .await
            .map(|_| ())
            .map_err(|error| error.to_string())
    }
}

impl Coordinator {
    pub fn new(
        config: CoordinatorConfig,
        log: Arc<dyn EventLog>,
        kv: Arc<dyn KvStore>,
    ) -> Arc<Self> {
        let instance_id = format!(
            "{}-{}-{}",
            config.service_name,
            config.region,
            uuid::Uuid::new_v4()
        );

        let health = Arc::new(HealthAggregator::for_report_interval(
            chrono::Duration::from_std(config.health_report_interval)
                .unwrap_or_else(|_| chrono::Duration::seconds(5)),
        ));
        let metrics = Arc::new(SystemMetrics::default());
        let cache = Arc::new(OpportunityCache::default());
        let cooldowns = Arc::new(AlertCooldownManager::new(
            chrono::Duration::from_std(config.alert_cooldown)
                .unwrap_or_else(|_| chrono::Duration::minutes(5)),
        ));

        let channels: Vec<Arc<dyn AlertChannel>> = vec![
            Arc::new(DiscordChannel::new(config.discord_webhook_url.clone())),
            Arc::new(SlackChannel::new(config.slack_webhook_url.clone())),
        ];
        let notifier = Arc::new(AlertNotifier::new(channels));

        let leader = Arc::new(AtomicBool::new(false));
        let api = Arc::new(ApiState {
            health: Arc::clone(&health),
            metrics: Arc::clone(&metrics),
            opportunities: Arc::clone(&cache),
            cooldowns: Arc::clone(&cooldowns),
            notifier: Arc::clone(&notifier),
            authenticator: Arc::new(TokenAuthenticator::new(config.api_token.clone())),
            authorizer: Arc::new(RoleAuthorizer),
            restarter: Arc::new(StreamRestarter {
                log: Arc::clone(&log),
                requested_by: instance_id.clone(),
            }),
            leadership: Arc::new(Leadership {
                leader: Arc::clone(&leader),
                instance_id: instance_id.clone(),
                kv: Arc::clone(&kv),
                leader_key: config.leader_key(),
            }),
            rate_limiter: RateLimiter::admin_default(),
            restart_allow_list: config.restart_allow_list.clone(),
            running: AtomicBool::new(false),
        });

        Arc::new(Self {
            config,
            instance_id,
            log,
            kv,
            health,
            metrics,
            cache,
            cooldowns,
            notifier,
            leader,
            api,
        })
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Starts consumers, timers, the elector and the HTTP server.
    pub async fn start(self: &Arc<Self>) -> Result<CoordinatorRuntime, CoordinatorError> {
        // Alerts flow through one channel so cooldown gating and fan-out
        // happen on a single task, not on every consumer.
        let (alert_tx, mut alert_rx) = mpsc::unbounded_channel::<Alert>();
        let alert_task = {
            let cooldowns = Arc::clone(&self.cooldowns);
            let notifier = Arc::clone(&self.notifier);
            tokio::spawn(async move {
                while let Some(alert) = alert_rx.recv().await {
                    if cooldowns.should_fire(&alert.cooldown_key(), Utc::now()) {
                        notifier.notify(alert).await;
                    }
                }
            })
        };
        let alert_fn: AlertFn = {
            let alert_tx = alert_tx.clone();
            Arc::new(move |alert| {
                let _ = alert_tx.send(alert);
            })
        };

        let consumers = self.spawn_consumers(&alert_fn);

        let (elector, mut leader_events) = LeaderElector::spawn(
            LeaderElectorConfig::new(self.config.leader_key(), self.instance_id.clone()),
            Arc::clone(&self.kv),
        );
        let leader_listener = {
            let leader = Arc::clone(&self.leader);
            tokio::spawn(async move {
                while let Some(event) = leader_events.recv().await {
                    match event {
                        LeaderEvent::Elected => leader.store(true, Ordering::SeqCst),
                        LeaderEvent::LeadershipLost => leader.store(false, Ordering::SeqCst),
                    }
                }
            })
        };

        // Periodic work: own heartbeat, staleness sweep + unhealthy
        // alerts, batch cache prune, cooldown cleanup.
        let heartbeat = {
            let coordinator = Arc::clone(self);
            let started_at = Utc::now();
            tokio::spawn(async move {
                let mut tick = tokio::time::interval(Duration::from_secs(5));
                tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                loop {
                    tick.tick().await;
                    coordinator.emit_health(started_at).await;
                }
            })
        };

        let sweeper = {
            let coordinator = Arc::clone(self);
            let alert_tx = alert_tx.clone();
            let interval = self.config.health_report_interval;
            tokio::spawn(async move {
                let mut tick = tokio::time::interval(interval);
                tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                loop {
                    tick.tick().await;
                    let now = Utc::now();
                    for service in coordinator.health.sweep(now) {
                        warn!(service = %service, "service went stale, marked unhealthy");
                        let _ = alert_tx.send(
                            Alert::new("SERVICE_UNHEALTHY", AlertSeverity::High, now)
                                .with_service(service.clone())
                                .with_message(format!("{service} stopped reporting health")),
                        );
                    }
                }
            })
        };

        let cache_pruner = {
            let cache = Arc::clone(&self.cache);
            tokio::spawn(async move {
                let mut tick = tokio::time::interval(Duration::from_secs(1));
                tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                loop {
                    tick.tick().await;
                    cache.prune(Utc::now());
                }
            })
        };

        let cooldown_cleaner = {
            let cooldowns = Arc::clone(&self.cooldowns);
            tokio::spawn(async move {
                let mut tick = tokio::time::interval(Duration::from_secs(60));
                tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                loop {
                    tick.tick().await;
                    cooldowns.cleanup(Utc::now());
                }
            })
        };

        let listener = TcpListener::bind(("0.0.0.0", self.config.port)).await?;
        info!(port = self.config.port, "coordinator http listening");
        let http_server = {
            let router = create_router(Arc::clone(&self.api));
            tokio::spawn(async move {
                if let Err(error) = axum::serve(listener, router).await {
                    error!(%error, "coordinator http server exited");
                }
            })
        };

        self.api.running.store(true, Ordering::SeqCst);
        info!(instance_id = %self.instance_id, "coordinator started");

        Ok(CoordinatorRuntime {
            coordinator: Arc::clone(self),
            consumers,
            elector,
            tasks: vec![
                alert_task,
                leader_listener,
                heartbeat,
                sweeper,
                cache_pruner,
                cooldown_cleaner,
                http_server,
            ],
        })
    }

    fn spawn_consumers(&self, alert_fn: &AlertFn) -> Vec<ConsumerHandle> {
        let handlers: Vec<(&'static str, Arc<dyn StreamHandler>)> = vec![
            (
                streams::HEALTH,
                consumers::health_handler(Arc::clone(&self.health)),
            ),
            (
                streams::OPPORTUNITIES,
                consumers::opportunity_handler(Arc::clone(&self.cache), Arc::clone(&self.metrics)),
            ),
            (
                streams::WHALE_ALERTS,
                consumers::whale_alert_handler(Arc::clone(&self.metrics)),
            ),
            (
                streams::SWAP_EVENTS,
                consumers::swap_handler(Arc::clone(&self.metrics)),
            ),
            (
                streams::VOLUME_AGGREGATES,
                consumers::volume_handler(Arc::clone(&self.metrics)),
            ),
            (
                streams::PRICE_UPDATES,
                consumers::price_handler(Arc::clone(&self.metrics)),
            ),
            (
                streams::EXECUTION_RESULTS,
                consumers::execution_result_handler(Arc::clone(&self.metrics)),
            ),
        ];

        handlers
            .into_iter()
            .map(|(stream, handler)| {
                GroupConsumer::spawn(
                    ConsumerConfig::new(
                        stream,
                        self.config.service_name.clone(),
                        self.instance_id.clone(),
                    ),
                    Arc::clone(&self.log),
                    handler,
                    Some(Arc::clone(alert_fn)),
                )
            })
            .collect()
    }

    async fn emit_health(&self, started_at: chrono::DateTime<Utc>) {
        let now = Utc::now();
        let mut health = ServiceHealth::healthy(self.config.service_name.clone(), now);
        health.region = Some(self.config.region.as_str().into());
        health.uptime_secs = Some(now.signed_duration_since(started_at).num_seconds().max(0) as u64);

        match WireEvent::encode("service-health", &health) {
            Ok(event) => {
                let fields = event
                    .with_service(self.config.service_name.clone())
                    .into_fields();
                if let Err(error) = self.log.append(streams::HEALTH, fields).await {
                    warn!(%error, "health publication failed");
                }
            }
            Err(error) => error!(%error, "health encode failed"),
        }
        if let Err(error) =
            failover::record_region_heartbeat(&*self.kv, &self.config.region, now).await
        {
            warn!(%error, "region heartbeat failed");
        }
    }

    /// The API state, exposed for the HTTP contract tests.
    pub fn api_state(&self) -> Arc<ApiState> {
        Arc::clone(&self.api)
    }
}

/// Handles to the running coordinator's background tasks.
pub struct CoordinatorRuntime {
    coordinator: Arc<Coordinator>,
    consumers: Vec<ConsumerHandle>,
    elector: LeaderElector,
    tasks: Vec<JoinHandle<()>>,
}

impl fmt::Debug for CoordinatorRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoordinatorRuntime").finish_non_exhaustive()
    }
}

impl CoordinatorRuntime {
    pub async fn shutdown(self) {
        info!("coordinator shutting down");
        self.coordinator.api.running.store(false, Ordering::SeqCst);
        for consumer in self.consumers {
            consumer.shutdown().await;
        }
        self.elector.shutdown().await;
        for task in self.tasks {
            task.abort();
        }
        info!("coordinator stopped");
    }
}
