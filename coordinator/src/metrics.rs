use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// System-wide counters aggregated from every consumed stream.
///
/// Counters are lock-free; the floating-point accumulators (volumes and
/// profit) sit behind a small mutex since they are updated far less often
/// than they are read.
#[derive(Debug, Default)]
pub struct SystemMetrics {
    opportunities_detected: AtomicU64,
    executions_succeeded: AtomicU64,
    executions_failed: AtomicU64,
    whale_alerts: AtomicU64,
    swap_events: AtomicU64,
    volume_aggregates: AtomicU64,
    price_updates: AtomicU64,
    accumulators: Mutex<Accumulators>,
}

#[derive(Debug, Default, Clone, Copy)]
struct Accumulators {
    total_volume_usd: f64,
    total_profit: f64,
    total_gas_cost: f64,
}

/// Point-in-time metrics snapshot served over `/api/metrics`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub opportunities_detected: u64,
    pub executions_succeeded: u64,
    pub executions_failed: u64,
    pub whale_alerts: u64,
    pub swap_events: u64,
    pub volume_aggregates: u64,
    pub price_updates: u64,
    pub total_volume_usd: f64,
    pub total_profit: f64,
    pub total_gas_cost: f64,
}

impl SystemMetrics {
    pub fn record_opportunity(&self) {
        self.opportunities_detected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_execution(&self, success: bool, profit: Option<f64>, gas_cost: Option<f64>) {
        if success {
            self.executions_succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.executions_failed.fetch_add(1, Ordering::Relaxed);
        }
        let mut accumulators = self.accumulators.lock();
        if let Some(profit) = profit.filter(|p| p.is_finite()) {
            accumulators.total_profit += profit;
        }
        if let Some(gas) = gas_cost.filter(|g| g.is_finite()) {
            accumulators.total_gas_cost += gas;
        }
    }

    pub fn record_whale_alert(&self, amount_usd: f64) {
        self.whale_alerts.fetch_add(1, Ordering::Relaxed);
        if amount_usd.is_finite() {
            self.accumulators.lock().total_volume_usd += amount_usd;
        }
    }

    pub fn record_swap(&self, amount_usd: f64) {
        self.swap_events.fetch_add(1, Ordering::Relaxed);
        if amount_usd.is_finite() {
            self.accumulators.lock().total_volume_usd += amount_usd;
        }
    }

    pub fn record_volume_aggregate(&self) {
        self.volume_aggregates.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_price_update(&self) {
        self.price_updates.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let accumulators = *self.accumulators.lock();
        MetricsSnapshot {
            opportunities_detected: self.opportunities_detected.load(Ordering::Relaxed),
            executions_succeeded: self.executions_succeeded.load(Ordering::Relaxed),
            executions_failed: self.executions_failed.load(Ordering::Relaxed),
            whale_alerts: self.whale_alerts.load(Ordering::Relaxed),
            swap_events: self.swap_events.load(Ordering::Relaxed),
            volume_aggregates: self.volume_aggregates.load(Ordering::Relaxed),
            price_updates: self.price_updates.load(Ordering::Relaxed),
            total_volume_usd: accumulators.total_volume_usd,
            total_profit: accumulators.total_profit,
            total_gas_cost: accumulators.total_gas_cost,
        }
    }
}
