use crate::breaker::CircuitBreaker;
use crate::consumer::ActiveSet;
use crate::queue::{OpportunityQueue, QueueItem};
use crate::stats::EngineStats;
use crate::tradelog::TradeLog;
use chrono::Utc;
use macaw_coordination::{ConflictVerdict, CoordinationError, LockConflictTracker, LockManager};
use macaw_domain::{ExecutionResult, Opportunity, WireEvent};
use macaw_risk::RiskOrchestrator;
use macaw_strategies::StrategyFactory;
use macaw_substrate::{streams, EntryId, EventLog};
use rust_decimal::Decimal;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Pipeline tuning and identity.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Bounded concurrency of in-flight executions.
    pub max_concurrent: usize,
    /// Hard deadline per strategy invocation; below the lock TTL.
    pub execution_timeout: Duration,
    /// TTL of the per-opportunity lock.
    pub lock_ttl: Duration,
    /// Lock owner id (the engine instance id).
    pub lock_owner: String,
    /// Service name stamped on published results.
    pub service_name: String,
    /// Stream/group acked after publication.
    pub stream: String,
    pub group: String,
    /// Gas estimate for the EV gate, as a fraction of expected profit.
    pub gas_cost_multiplier: f64,
    /// Drain deadline on shutdown.
    pub drain_timeout: Duration,
}

/// Per-item execution flow with bounded concurrency.
///
/// Items arrive through the queue; each one runs
/// breaker gate → risk gates → distributed lock (with stale-holder
/// recovery) → strategy dispatch under the execution deadline → result
/// publication. The originating log entry is acked only after the result
/// is published, so a crash between execution and publication redelivers
/// the opportunity and idempotency rests on the per-id lock.
pub struct ExecutionPipeline {
    config: PipelineConfig,
    queue: Arc<OpportunityQueue>,
    breaker: Arc<CircuitBreaker>,
    risk: Option<Arc<RiskOrchestrator>>,
    factory: Arc<StrategyFactory>,
    locks: LockManager,
    conflicts: Arc<LockConflictTracker>,
    log: Arc<dyn EventLog>,
    trade_log: Option<Arc<TradeLog>>,
    stats: Arc<EngineStats>,
    active: Arc<ActiveSet>,
    permits: Arc<Semaphore>,
}

impl fmt::Debug for ExecutionPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionPipeline")
            .field("max_concurrent", &self.config.max_concurrent)
            .finish_non_exhaustive()
    }
}

/// Handle to the running pipeline loop.
pub struct PipelineHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl fmt::Debug for PipelineHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineHandle").finish_non_exhaustive()
    }
}

impl PipelineHandle {
    /// Stops intake and drains in-flight executions up to the drain
    /// deadline. Items still running past it are abandoned (their acks
    /// are withheld, so they redeliver after restart).
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(error) = self.task.await {
            warn!(%error, "pipeline task did not shut down cleanly");
        }
    }
}

impl ExecutionPipeline {
    pub fn new(
        config: PipelineConfig,
        queue: Arc<OpportunityQueue>,
        breaker: Arc<CircuitBreaker>,
        risk: Option<Arc<RiskOrchestrator>>,
        factory: Arc<StrategyFactory>,
        locks: LockManager,
        conflicts: Arc<LockConflictTracker>,
        log: Arc<dyn EventLog>,
        trade_log: Option<Arc<TradeLog>>,
        stats: Arc<EngineStats>,
        active: Arc<ActiveSet>,
    ) -> Arc<Self> {
        let permits = Arc::new(Semaphore::new(config.max_concurrent));
        Arc::new(Self {
            config,
            queue,
            breaker,
            risk,
            factory,
            locks,
            conflicts,
            log,
            trade_log,
            stats,
            active,
            permits,
        })
    }

    pub fn active_executions(&self) -> usize {
        self.config.max_concurrent - self.permits.available_permits()
    }

    /// Spawns the dispatch loop. The queue's item signal is the primary
    /// wake-up; a one-second tick is the safety net.
    pub fn spawn(self: Arc<Self>) -> PipelineHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(self.run(shutdown_rx));
        PipelineHandle {
            shutdown: shutdown_tx,
            task,
        }
    }

    async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!(max_concurrent = self.config.max_concurrent, "execution pipeline started");
        loop {
            tokio::select! {
                _ = self.queue.wait_for_item() => {}
                _ = tokio::time::sleep(Duration::from_secs(1)) => {}
                _ = shutdown.changed() => break,
            }
            self.drain_ready();
        }
        self.drain_on_shutdown().await;
    }

    /// Starts executions while permits and items are available.
    fn drain_ready(self: &Arc<Self>) {
        loop {
            let Ok(permit) = Arc::clone(&self.permits).try_acquire_owned() else {
                return;
            };
            let Some(item) = self.queue.dequeue() else {
                return;
            };
            let pipeline = Arc::clone(self);
            tokio::spawn(async move {
                let id = item.opportunity.id.clone();
                pipeline.process_item(item).await;
                pipeline.active.remove(&id);
                drop(permit);
            });
        }
    }

    async fn drain_on_shutdown(&self) {
        let in_flight = self.active_executions();
        if in_flight > 0 {
            info!(in_flight, "draining in-flight executions");
        }
        let all = self.config.max_concurrent as u32;
        match tokio::time::timeout(self.config.drain_timeout, self.permits.acquire_many(all)).await
        {
            Ok(Ok(_)) => info!("execution pipeline drained"),
            Ok(Err(_)) => {}
            Err(_) => {
                warn!(
                    abandoned = self.active_executions(),
                    "drain deadline passed, abandoning in-flight executions"
                );
            }
        }
    }

    async fn process_item(&self, item: QueueItem) {
        let QueueItem {
            mut opportunity,
            entry_id,
        } = item;

        // Circuit-breaker gate precedes everything else.
        if !self.breaker.can_execute(Utc::now()) {
            EngineStats::incr(&self.stats.circuit_breaker_blocks);
            debug!(id = %opportunity.id, "circuit breaker blocked execution");
            self.ack(entry_id).await;
            return;
        }

        // Capital-risk gates. Rejections are final (acked, no result).
        let gas_estimate = opportunity.expected_profit * self.config.gas_cost_multiplier;
        if let Some(risk) = &self.risk {
            match risk.evaluate(&opportunity, gas_estimate) {
                Ok(approved) => {
                    opportunity.amount = Some(approved.into_item());
                }
                Err(refused) => {
                    info!(id = %opportunity.id, reason = %refused.reason, "risk gate refused opportunity");
                    self.ack(entry_id).await;
                    return;
                }
            }
        }

        // Per-opportunity distributed lock with stale-holder recovery.
        let lock_key = format!("opp:{}", opportunity.id);
        match self.acquire_with_recovery(&lock_key).await {
            Ok(true) => {}
            Ok(false) => {
                // Another consumer owns the attempt; leave the entry
                // pending so the group retries it.
                debug!(id = %opportunity.id, "lock not acquired, leaving pending");
                return;
            }
            Err(error) => {
                warn!(id = %opportunity.id, %error, "lock infrastructure failure");
                return;
            }
        }

        let result = self.execute(&opportunity).await;
        let published = self.publish(&opportunity, &result).await;

        let now = Utc::now();
        if result.success {
            self.breaker.record_success(now);
            EngineStats::incr(&self.stats.executions_succeeded);
        } else {
            self.breaker.record_failure(now);
            EngineStats::incr(&self.stats.executions_failed);
        }
        if let Some(risk) = &self.risk {
            let pnl = result
                .actual_profit
                .unwrap_or(0.0)
                - result.gas_cost.unwrap_or(0.0);
            let pnl = Decimal::try_from(pnl).unwrap_or(Decimal::ZERO);
            risk.record_outcome(&opportunity, result.success, pnl);
        }

        // Ack only after successful publication; otherwise the entry
        // stays pending and redelivery re-runs behind the lock.
        if published {
            self.ack(entry_id).await;
        }

        if let Err(error) = self.locks.release(&lock_key, &self.config.lock_owner).await {
            warn!(key = %lock_key, %error, "lock release failed");
        }
    }

    async fn acquire_with_recovery(&self, key: &str) -> Result<bool, CoordinationError> {
        let attempt = self
            .locks
            .acquire(key, &self.config.lock_owner, self.config.lock_ttl)
            .await?;
        if attempt.acquired {
            self.conflicts.record_acquired(key);
            return Ok(true);
        }

        match self.conflicts.record_conflict(key, Utc::now()) {
            ConflictVerdict::Retry => Ok(false),
            ConflictVerdict::Stale => {
                self.locks.force_release(key).await?;
                self.conflicts.record_recovery(key);
                let retry = self
                    .locks
                    .acquire(key, &self.config.lock_owner, self.config.lock_ttl)
                    .await?;
                if retry.acquired {
                    self.conflicts.record_acquired(key);
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
        }
    }

    async fn execute(&self, opportunity: &Opportunity) -> ExecutionResult {
        EngineStats::incr(&self.stats.executions_attempted);
        match tokio::time::timeout(
            self.config.execution_timeout,
            self.factory.dispatch(opportunity),
        )
        .await
        {
            Ok(Ok(result)) => result,
            Ok(Err(strategy_error)) => {
                warn!(id = %opportunity.id, %strategy_error, "strategy dispatch failed");
                ExecutionResult::failure(
                    opportunity.id.clone(),
                    strategy_error.to_string(),
                    Utc::now(),
                )
            }
            Err(_) => {
                EngineStats::incr(&self.stats.execution_timeouts);
                warn!(id = %opportunity.id, "execution deadline exceeded");
                ExecutionResult::failure(opportunity.id.clone(), "timeout", Utc::now())
            }
        }
    }

    /// Publishes the result to the results stream and the trade log.
    /// Returns whether the stream append succeeded.
    async fn publish(&self, opportunity: &Opportunity, result: &ExecutionResult) -> bool {
        if let Some(trade_log) = &self.trade_log {
            if let Err(error) = trade_log.append(result).await {
                error!(id = %result.opportunity_id, %error, "trade log append failed");
            }
        }

        let event = match WireEvent::encode("execution-result", result) {
            Ok(event) => event
                .with_id(result.opportunity_id.clone())
                .with_service(self.config.service_name.clone()),
            Err(error) => {
                error!(id = %result.opportunity_id, %error, "result encode failed");
                return false;
            }
        };
        match self.log.append(streams::EXECUTION_RESULTS, event.into_fields()).await {
            Ok(_) => {
                debug!(
                    id = %result.opportunity_id,
                    success = result.success,
                    kind = %opportunity.kind,
                    "execution result published"
                );
                true
            }
            Err(error) => {
                error!(id = %result.opportunity_id, %error, "result publication failed");
                false
            }
        }
    }

    async fn ack(&self, entry_id: EntryId) {
        if let Err(error) = self
            .log
            .ack(&self.config.stream, &self.config.group, &[entry_id])
            .await
        {
            warn!(id = %entry_id, %error, "opportunity ack failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breaker::CircuitBreakerConfig;
    use crate::queue::QueueConfig;
    use macaw_domain::OpportunityKind;
    use macaw_strategies::{SimulationConfig, SimulationStrategy, StrategyContext};
    use macaw_substrate::{GroupStart, KvStore, MemoryEventLog, MemoryKvStore};
    use smol_str::SmolStr;

    struct Harness {
        pipeline: Arc<ExecutionPipeline>,
        queue: Arc<OpportunityQueue>,
        log: Arc<MemoryEventLog>,
        kv: Arc<MemoryKvStore>,
        breaker: Arc<CircuitBreaker>,
        stats: Arc<EngineStats>,
        active: Arc<ActiveSet>,
    }

    async fn harness(success_rate: f64, risk: Option<Arc<RiskOrchestrator>>) -> Harness {
        let log = Arc::new(MemoryEventLog::new());
        log.create_group("stream:opportunities", "engine", GroupStart::Beginning)
            .await
            .unwrap();
        let kv = Arc::new(MemoryKvStore::new());
        let queue = Arc::new(OpportunityQueue::new(QueueConfig::default()));
        let breaker = Arc::new(CircuitBreaker::new(CircuitBreakerConfig::default()));
        let stats = Arc::new(EngineStats::default());
        let active = Arc::new(ActiveSet::new());

        let factory = Arc::new(StrategyFactory::new(StrategyContext::detached()));
        let simulation = Arc::new(SimulationStrategy::new(SimulationConfig {
            success_rate,
            latency_ms: 0,
            ..SimulationConfig::default()
        }));
        factory.register(OpportunityKind::CrossDex, simulation);

        let pipeline = ExecutionPipeline::new(
            PipelineConfig {
                max_concurrent: 5,
                execution_timeout: Duration::from_secs(55),
                lock_ttl: Duration::from_secs(60),
                lock_owner: "engine-test".to_string(),
                service_name: "execution-engine".to_string(),
                stream: "stream:opportunities".to_string(),
                group: "engine".to_string(),
                gas_cost_multiplier: 0.1,
                drain_timeout: Duration::from_secs(1),
            },
            Arc::clone(&queue),
            Arc::clone(&breaker),
            risk,
            factory,
            LockManager::new(kv.clone() as Arc<dyn KvStore>),
            Arc::new(LockConflictTracker::default()),
            log.clone() as Arc<dyn EventLog>,
            None,
            Arc::clone(&stats),
            Arc::clone(&active),
        );

        Harness {
            pipeline,
            queue,
            log,
            kv,
            breaker,
            stats,
            active,
        }
    }

    fn opportunity(id: &str) -> Opportunity {
        Opportunity {
            id: SmolStr::new(id),
            kind: OpportunityKind::CrossDex,
            source_chain: None,
            target_chain: None,
            dex: None,
            expected_profit: 100.0,
            confidence: 0.9,
            amount: None,
            timestamp: Utc::now(),
            expires_at: None,
            status: Default::default(),
            data: serde_json::Value::Null,
        }
    }

    /// Appends the opportunity, reads it through the group (so the entry
    /// is pending) and enqueues it the way the ingest handler would.
    async fn feed(harness: &Harness, opportunity: Opportunity) -> EntryId {
        let fields = WireEvent::encode("opportunity", &opportunity)
            .unwrap()
            .with_id(opportunity.id.clone())
            .into_fields();
        harness
            .log
            .append("stream:opportunities", fields)
            .await
            .unwrap();
        let batch = harness
            .log
            .read_group("stream:opportunities", "engine", "c1", 10, Duration::ZERO)
            .await
            .unwrap();
        let entry_id = batch.last().unwrap().id;
        harness.active.insert(opportunity.id.clone());
        harness
            .queue
            .enqueue(QueueItem {
                opportunity,
                entry_id,
            })
            .unwrap();
        entry_id
    }

    async fn results(log: &MemoryEventLog) -> Vec<ExecutionResult> {
        log.create_group(streams::EXECUTION_RESULTS, "test-read", GroupStart::Beginning)
            .await
            .unwrap();
        log.read_group(streams::EXECUTION_RESULTS, "test-read", "t", 100, Duration::ZERO)
            .await
            .unwrap()
            .iter()
            .map(|entry| {
                WireEvent::from_fields(&entry.fields)
                    .unwrap()
                    .decode()
                    .unwrap()
            })
            .collect()
    }

    #[tokio::test]
    async fn test_accepted_opportunity_publishes_exactly_one_result() {
        let harness = harness(1.0, None).await;
        feed(&harness, opportunity("opp-1")).await;

        let handle = Arc::clone(&harness.pipeline).spawn();
        tokio::time::sleep(Duration::from_millis(200)).await;
        handle.shutdown().await;

        let results = results(&harness.log).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].opportunity_id, "opp-1");
        assert!(results[0].success);

        // Acked after publication; active set drained; lock released.
        assert_eq!(
            harness
                .log
                .pending("stream:opportunities", "engine")
                .await
                .unwrap()
                .count,
            0
        );
        assert!(harness.active.is_empty());
        assert_eq!(harness.kv.get("opp:opp-1").await.unwrap(), None);
        assert_eq!(
            harness
                .stats
                .executions_succeeded
                .load(std::sync::atomic::Ordering::Relaxed),
            1
        );
    }

    #[tokio::test]
    async fn test_failed_execution_still_publishes_and_trips_breaker_counter() {
        let harness = harness(0.0, None).await;
        feed(&harness, opportunity("opp-1")).await;

        let handle = Arc::clone(&harness.pipeline).spawn();
        tokio::time::sleep(Duration::from_millis(200)).await;
        handle.shutdown().await;

        let results = results(&harness.log).await;
        assert_eq!(results.len(), 1);
        assert!(!results[0].success);
        assert_eq!(harness.breaker.consecutive_failures(), 1);
        assert_eq!(
            harness
                .stats
                .executions_failed
                .load(std::sync::atomic::Ordering::Relaxed),
            1
        );
    }

    #[tokio::test]
    async fn test_open_breaker_blocks_and_acks_without_result() {
        let harness = harness(1.0, None).await;
        harness.breaker.force_open("test", Utc::now());
        feed(&harness, opportunity("opp-1")).await;

        let handle = Arc::clone(&harness.pipeline).spawn();
        tokio::time::sleep(Duration::from_millis(200)).await;
        handle.shutdown().await;

        assert!(results(&harness.log).await.is_empty());
        assert_eq!(
            harness
                .stats
                .circuit_breaker_blocks
                .load(std::sync::atomic::Ordering::Relaxed),
            1
        );
        // Blocked items are acked, not replayed.
        assert_eq!(
            harness
                .log
                .pending("stream:opportunities", "engine")
                .await
                .unwrap()
                .count,
            0
        );
    }

    #[tokio::test]
    async fn test_contested_lock_leaves_entry_pending() {
        let harness = harness(1.0, None).await;
        // Another engine instance holds the opportunity lock.
        harness
            .kv
            .set_if_absent("opp:opp-1", "other-engine", Duration::from_secs(60))
            .await
            .unwrap();
        feed(&harness, opportunity("opp-1")).await;

        let handle = Arc::clone(&harness.pipeline).spawn();
        tokio::time::sleep(Duration::from_millis(200)).await;
        handle.shutdown().await;

        assert!(results(&harness.log).await.is_empty());
        // Left pending for the group's next delivery.
        assert_eq!(
            harness
                .log
                .pending("stream:opportunities", "engine")
                .await
                .unwrap()
                .count,
            1
        );
    }

    #[tokio::test]
    async fn test_unsupported_kind_publishes_failure_result() {
        let harness = harness(1.0, None).await;
        let mut opportunity = opportunity("opp-1");
        opportunity.kind = OpportunityKind::CrossChain; // nothing registered
        feed(&harness, opportunity).await;

        let handle = Arc::clone(&harness.pipeline).spawn();
        tokio::time::sleep(Duration::from_millis(200)).await;
        handle.shutdown().await;

        let results = results(&harness.log).await;
        assert_eq!(results.len(), 1);
        assert!(!results[0].success);
        assert!(results[0].error.as_deref().unwrap().contains("cross-chain"));
    }

    #[tokio::test]
    async fn test_risk_refusal_acks_without_result() {
        let risk = Arc::new(
            RiskOrchestrator::new(macaw_risk::RiskConfig {
                min_expected_value: 1_000_000.0, // reject everything
                ..macaw_risk::RiskConfig::default()
            })
            .unwrap(),
        );
        let harness = harness(1.0, Some(Arc::clone(&risk))).await;
        feed(&harness, opportunity("opp-1")).await;

        let handle = Arc::clone(&harness.pipeline).spawn();
        tokio::time::sleep(Duration::from_millis(200)).await;
        handle.shutdown().await;

        assert!(results(&harness.log).await.is_empty());
        assert_eq!(risk.counters().risk_ev_rejections, 1);
        assert_eq!(
            harness
                .log
                .pending("stream:opportunities", "engine")
                .await
                .unwrap()
                .count,
            0
        );
    }
}
