use crate::breaker::BreakerMetrics;
use macaw_risk::RiskCounters;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// In-memory engine counters, updated lock-free from the pipeline.
#[derive(Debug, Default)]
pub struct EngineStats {
    pub opportunities_received: AtomicU64,
    pub opportunities_rejected: AtomicU64,
    pub duplicates_suppressed: AtomicU64,
    pub queue_rejections: AtomicU64,
    pub executions_attempted: AtomicU64,
    pub executions_succeeded: AtomicU64,
    pub executions_failed: AtomicU64,
    pub execution_timeouts: AtomicU64,
    pub circuit_breaker_blocks: AtomicU64,
}

impl EngineStats {
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(
        &self,
        breaker: BreakerMetrics,
        risk: RiskCounters,
        lock_conflicts: u64,
        stale_lock_recoveries: u64,
        queue_size: usize,
        active_executions: usize,
    ) -> StatsSnapshot {
        StatsSnapshot {
            opportunities_received: self.opportunities_received.load(Ordering::Relaxed),
            opportunities_rejected: self.opportunities_rejected.load(Ordering::Relaxed),
            duplicates_suppressed: self.duplicates_suppressed.load(Ordering::Relaxed),
            queue_rejections: self.queue_rejections.load(Ordering::Relaxed),
            executions_attempted: self.executions_attempted.load(Ordering::Relaxed),
            executions_succeeded: self.executions_succeeded.load(Ordering::Relaxed),
            executions_failed: self.executions_failed.load(Ordering::Relaxed),
            execution_timeouts: self.execution_timeouts.load(Ordering::Relaxed),
            circuit_breaker_blocks: self.circuit_breaker_blocks.load(Ordering::Relaxed),
            lock_conflicts,
            stale_lock_recoveries,
            queue_size,
            active_executions,
            breaker,
            risk,
        }
    }
}

/// Point-in-time engine statistics served over HTTP and logged at
/// shutdown.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub opportunities_received: u64,
    pub opportunities_rejected: u64,
    pub duplicates_suppressed: u64,
    pub queue_rejections: u64,
    pub executions_attempted: u64,
    pub executions_succeeded: u64,
    pub executions_failed: u64,
    pub execution_timeouts: u64,
    pub circuit_breaker_blocks: u64,
    pub lock_conflicts: u64,
    pub stale_lock_recoveries: u64,
    pub queue_size: usize,
    pub active_executions: usize,
    pub breaker: BreakerMetrics,
    pub risk: RiskCounters,
}
