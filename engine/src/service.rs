use crate::breaker::{BreakerState, CircuitBreaker};
use crate::config::EngineConfig;
use crate::consumer::{ActiveSet, OpportunityIngest};
use crate::error::EngineError;
use crate::http::{self, EngineStatus};
use crate::pipeline::{ExecutionPipeline, PipelineConfig, PipelineHandle};
use crate::queue::OpportunityQueue;
use crate::stats::{EngineStats, StatsSnapshot};
use crate::tradelog::TradeLog;
use chrono::Utc;
use macaw_coordination::{
    failover, FailoverEvent, LeaderElector, LeaderElectorConfig, LockConflictTracker, LockManager,
    RegionFailoverConfig, RegionFailoverManager,
};
use macaw_domain::{OpportunityKind, ServiceHealth, WireEvent};
use macaw_risk::{RiskConfig, RiskOrchestrator};
use macaw_strategies::{
    ExecutionStrategy, SimulationStrategy, StrategyContext, StrategyFactory,
};
use macaw_substrate::{streams, EventLog, KvStore};
use macaw_streams::{ConsumerConfig, ConsumerHandle, GroupConsumer};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Streams trimmed by the regional leader's maintenance tick.
const TRIMMED_STREAMS: [&str; 2] = [streams::OPPORTUNITIES, streams::EXECUTION_RESULTS];
/// Retained entries per trimmed stream.
const TRIM_MAX_LEN: u64 = 10_000;

/// The execution engine service.
///
/// Construction validates every fail-fast invariant (simulation in
/// production, risk initialisation); [`start`](Self::start) wires the
/// background tasks and returns a runtime handle whose
/// [`shutdown`](EngineRuntime::shutdown) drains the pipeline.
pub struct ExecutionEngine {
    config: EngineConfig,
    instance_id: String,
    log: Arc<dyn EventLog>,
    kv: Arc<dyn KvStore>,
    queue: Arc<OpportunityQueue>,
    breaker: Arc<CircuitBreaker>,
    risk: Option<Arc<RiskOrchestrator>>,
    factory: Arc<StrategyFactory>,
    conflicts: Arc<LockConflictTracker>,
    stats: Arc<EngineStats>,
    active: Arc<ActiveSet>,
    pipeline: Arc<ExecutionPipeline>,
    running: AtomicBool,
    leader: AtomicBool,
}

impl fmt::Debug for ExecutionEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionEngine")
            .field("instance_id", &self.instance_id)
            .field("region", &self.config.region)
            .field("standby", &self.config.standby)
            .finish_non_exhaustive()
    }
}

impl ExecutionEngine {
    pub fn new(
        config: EngineConfig,
        log: Arc<dyn EventLog>,
        kv: Arc<dyn KvStore>,
    ) -> Result<Arc<Self>, EngineError> {
        // Safety invariant: synthetic execution must never reach
        // production capital without the explicit escape hatch.
        if config.production && config.simulation_mode && !config.simulation_production_override {
            return Err(EngineError::SimulationForbiddenInProduction);
        }

        let risk = if config.risk_enabled {
            match RiskOrchestrator::new(RiskConfig::default()) {
                Ok(orchestrator) => Some(Arc::new(orchestrator)),
                Err(error) if config.simulation_mode => {
                    warn!(%error, "risk init failed, continuing without risk gates (simulation)");
                    None
                }
                Err(error) => return Err(error.into()),
            }
        } else {
            None
        };

        let instance_id = format!("{}-{}-{}", config.service_name, config.region, uuid::Uuid::new_v4());
        let queue = Arc::new(if config.standby {
            info!("starting with queue manually paused (standby)");
            OpportunityQueue::new_paused(config.queue.clone())
        } else {
            OpportunityQueue::new(config.queue.clone())
        });
        queue.set_on_pause_change(Box::new(|paused| {
            info!(paused, "queue pause state changed");
        }));
        let breaker = Arc::new(CircuitBreaker::new(config.circuit_breaker.clone()));

        let factory = Arc::new(StrategyFactory::new(StrategyContext::detached()));
        if config.simulation_mode {
            let simulation = Arc::new(SimulationStrategy::new(config.simulation.clone()));
            factory.register_for_supported(
                [
                    OpportunityKind::CrossDex,
                    OpportunityKind::CrossChain,
                    OpportunityKind::Backrun,
                    OpportunityKind::Liquidation,
                ],
                simulation,
            );
        }

        let conflicts = Arc::new(LockConflictTracker::default());
        let stats = Arc::new(EngineStats::default());
        let active = Arc::new(ActiveSet::new());

        let pipeline = ExecutionPipeline::new(
            PipelineConfig {
                max_concurrent: config.max_concurrent_executions,
                execution_timeout: config.execution_timeout(),
                lock_ttl: config.lock_ttl(),
                lock_owner: instance_id.clone(),
                service_name: config.service_name.clone(),
                stream: streams::OPPORTUNITIES.to_string(),
                group: config.service_name.clone(),
                gas_cost_multiplier: config.simulation.gas_cost_multiplier,
                drain_timeout: config.shutdown_drain_timeout,
            },
            Arc::clone(&queue),
            Arc::clone(&breaker),
            risk.clone(),
            Arc::clone(&factory),
            LockManager::new(Arc::clone(&kv)),
            Arc::clone(&conflicts),
            Arc::clone(&log),
            Some(Arc::new(TradeLog::new(config.trade_log_dir.clone()))),
            Arc::clone(&stats),
            Arc::clone(&active),
        );

        Ok(Arc::new(Self {
            config,
            instance_id,
            log,
            kv,
            queue,
            breaker,
            risk,
            factory,
            conflicts,
            stats,
            active,
            pipeline,
            running: AtomicBool::new(false),
            leader: AtomicBool::new(false),
        }))
    }

    /// Registers a real execution strategy for a kind. Deployments call
    /// this before [`start`](Self::start); simulation mode comes
    /// pre-registered.
    pub fn register_strategy(&self, kind: OpportunityKind, strategy: Arc<dyn ExecutionStrategy>) {
        self.factory.register(kind, strategy);
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn stats_snapshot(&self) -> StatsSnapshot {
        self.stats.snapshot(
            self.breaker.metrics(),
            self.risk
                .as_ref()
                .map(|risk| risk.counters())
                .unwrap_or_default(),
            self.conflicts.lock_conflicts(),
            self.conflicts.stale_lock_recoveries(),
            self.queue.size(),
            self.pipeline.active_executions(),
        )
    }

    /// Resumes a standby engine after cross-region promotion: the cached
    /// strategy context is rebuilt and the queue un-paused.
    pub fn activate_standby(&self) {
        info!("standby activated: resuming queue");
        self.factory.invalidate_context(StrategyContext::detached());
        self.queue.resume();
    }

    /// Starts every background task. Binding the HTTP listener happens
    /// here so a bind failure aborts startup with a non-zero exit.
    pub async fn start(self: &Arc<Self>) -> Result<EngineRuntime, EngineError> {
        let engine = Arc::clone(self);

        // Breaker transitions fan out to the event stream through a
        // channel so the sync callback never blocks on I/O.
        let (transition_tx, mut transition_rx) = mpsc::unbounded_channel();
        self.breaker.set_on_transition(Box::new(move |event| {
            let _ = transition_tx.send(event);
        }));
        let breaker_publisher = {
            let log = Arc::clone(&self.log);
            let service = self.config.service_name.clone();
            tokio::spawn(async move {
                while let Some(event) = transition_rx.recv().await {
                    let fields = match WireEvent::encode("circuit-breaker-event", &event) {
                        Ok(wire) => wire.with_service(service.clone()).into_fields(),
                        Err(error) => {
                            error!(%error, "breaker event encode failed");
                            continue;
                        }
                    };
                    if let Err(error) =
                        log.append(streams::CIRCUIT_BREAKER_EVENTS, fields).await
                    {
                        warn!(%error, "breaker event publication failed");
                    }
                }
            })
        };

        let ingest = Arc::new(OpportunityIngest::new(
            Arc::clone(&self.queue),
            Arc::clone(&self.active),
            Arc::clone(&self.stats),
            self.config.min_confidence,
        ));
        let consumer = GroupConsumer::spawn(
            ConsumerConfig::new(
                streams::OPPORTUNITIES,
                self.config.service_name.clone(),
                self.instance_id.clone(),
            ),
            Arc::clone(&self.log),
            ingest,
            Some(Arc::new(|alert: macaw_domain::Alert| {
                error!(kind = %alert.kind, data = %alert.data, "stream consumer failure alert");
            })),
        );

        let pipeline = Arc::clone(&self.pipeline).spawn();

        let (elector, mut leader_events) = LeaderElector::spawn(
            LeaderElectorConfig::new(self.config.leader_key(), self.instance_id.clone()),
            Arc::clone(&self.kv),
        );
        let leader_listener = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move {
                while let Some(event) = leader_events.recv().await {
                    match event {
                        macaw_coordination::LeaderEvent::Elected => {
                            engine.leader.store(true, Ordering::SeqCst);
                        }
                        macaw_coordination::LeaderEvent::LeadershipLost => {
                            engine.leader.store(false, Ordering::SeqCst);
                        }
                    }
                }
            })
        };

        let heartbeat = {
            let engine = Arc::clone(&engine);
            let started_at = Utc::now();
            tokio::spawn(async move {
                let mut tick = tokio::time::interval(Duration::from_secs(5));
                tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                loop {
                    tick.tick().await;
                    engine.emit_health(started_at).await;
                }
            })
        };

        let sweeper = {
            let conflicts = Arc::clone(&self.conflicts);
            tokio::spawn(async move {
                let mut tick = tokio::time::interval(Duration::from_secs(30));
                tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                loop {
                    tick.tick().await;
                    conflicts.sweep(Utc::now());
                }
            })
        };

        // Leader-only maintenance: bounded stream retention.
        let maintenance = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move {
                let mut tick = tokio::time::interval(Duration::from_secs(60));
                tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                loop {
                    tick.tick().await;
                    if !engine.leader.load(Ordering::SeqCst) {
                        continue;
                    }
                    for stream in TRIMMED_STREAMS {
                        match engine.log.trim(stream, TRIM_MAX_LEN).await {
                            Ok(0) => {}
                            Ok(dropped) => info!(stream, dropped, "trimmed stream"),
                            Err(error) => warn!(stream, %error, "stream trim failed"),
                        }
                    }
                }
            })
        };

        let (failover_manager, standby_listener) = if self.config.standby {
            let (manager, mut events) = RegionFailoverManager::spawn(
                RegionFailoverConfig::new(
                    self.config.region.clone(),
                    self.config.primary_region.clone(),
                    format!(
                        "execution-engine:leader:lock:{}",
                        self.config.primary_region
                    ),
                    self.instance_id.clone(),
                ),
                Arc::clone(&self.kv),
            );
            let engine = Arc::clone(&engine);
            let listener = tokio::spawn(async move {
                while let Some(event) = events.recv().await {
                    match event {
                        FailoverEvent::ActivateStandby => engine.activate_standby(),
                        FailoverEvent::PrimaryRecovered => {
                            info!("primary region recovered; standby stays active until demoted");
                        }
                    }
                }
            });
            (Some(manager), Some(listener))
        } else {
            (None, None)
        };

        let listener = TcpListener::bind(("0.0.0.0", self.config.port)).await?;
        info!(port = self.config.port, "engine http listening");
        let http_server = {
            let status = Arc::clone(&engine) as Arc<dyn EngineStatus>;
            tokio::spawn(async move {
                if let Err(error) = axum::serve(listener, http::router(status)).await {
                    error!(%error, "engine http server exited");
                }
            })
        };

        self.running.store(true, Ordering::SeqCst);
        info!(instance_id = %self.instance_id, "execution engine started");

        Ok(EngineRuntime {
            engine: Arc::clone(self),
            consumer,
            pipeline,
            elector,
            failover: failover_manager,
            tasks: vec![
                breaker_publisher,
                leader_listener,
                heartbeat,
                sweeper,
                maintenance,
                http_server,
            ]
            .into_iter()
            .chain(standby_listener)
            .collect(),
        })
    }

    async fn emit_health(&self, started_at: chrono::DateTime<Utc>) {
        let now = Utc::now();
        let mut health = ServiceHealth::healthy(self.config.service_name.clone(), now);
        health.region = Some(self.config.region.as_str().into());
        health.uptime_secs = Some(now.signed_duration_since(started_at).num_seconds().max(0) as u64);

        let fields = match WireEvent::encode("service-health", &health) {
            Ok(wire) => wire
                .with_service(self.config.service_name.clone())
                .into_fields(),
            Err(error) => {
                error!(%error, "health encode failed");
                return;
            }
        };
        if let Err(error) = self.log.append(streams::HEALTH, fields).await {
            warn!(%error, "health publication failed");
        }
        if let Err(error) =
            failover::record_region_heartbeat(&*self.kv, &self.config.region, now).await
        {
            warn!(%error, "region heartbeat failed");
        }
    }
}

impl EngineStatus for ExecutionEngine {
    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
    fn is_leader(&self) -> bool {
        self.leader.load(Ordering::SeqCst)
    }
    fn instance_id(&self) -> String {
        self.instance_id.clone()
    }
    fn queue_size(&self) -> usize {
        self.queue.size()
    }
    fn queue_paused(&self) -> bool {
        self.queue.is_paused()
    }
    fn breaker_state(&self) -> BreakerState {
        self.breaker.state()
    }
    fn stats(&self) -> StatsSnapshot {
        self.stats_snapshot()
    }
}

/// Handles to the running engine's background tasks.
pub struct EngineRuntime {
    engine: Arc<ExecutionEngine>,
    consumer: ConsumerHandle,
    pipeline: PipelineHandle,
    elector: LeaderElector,
    failover: Option<RegionFailoverManager>,
    tasks: Vec<JoinHandle<()>>,
}

impl fmt::Debug for EngineRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineRuntime").finish_non_exhaustive()
    }
}

impl EngineRuntime {
    /// Ordered shutdown: stop intake, drain the pipeline up to the drain
    /// deadline, release leadership, then stop the periodic tasks.
    pub async fn shutdown(self) {
        info!("execution engine shutting down");
        self.engine.running.store(false, Ordering::SeqCst);
        self.consumer.shutdown().await;
        self.pipeline.shutdown().await;
        self.elector.shutdown().await;
        if let Some(failover) = self.failover {
            failover.shutdown().await;
        }
        for task in self.tasks {
            task.abort();
        }
        let snapshot = self.engine.stats_snapshot();
        info!(
            executed = snapshot.executions_attempted,
            succeeded = snapshot.executions_succeeded,
            failed = snapshot.executions_failed,
            "execution engine stopped"
        );
    }
}
