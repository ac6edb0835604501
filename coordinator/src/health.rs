use chrono::{DateTime, Duration, Utc};
use macaw_domain::{HealthStatus, ServiceHealth};
use parking_lot::RwLock;
use smol_str::SmolStr;
use std::collections::HashMap;

/// In-memory view of fleet health.
///
/// Records refresh on every health event; the periodic sweep marks a
/// service unhealthy once its last report ages beyond the staleness
/// window (3x the reporting interval by default). `system_health` is the
/// percentage of healthy services, 100 for an empty fleet.
#[derive(Debug)]
pub struct HealthAggregator {
    services: RwLock<HashMap<SmolStr, ServiceHealth>>,
    staleness: Duration,
}

impl HealthAggregator {
    pub fn new(staleness: Duration) -> Self {
        Self {
            services: RwLock::new(HashMap::new()),
            staleness,
        }
    }

    /// Staleness derived from a reporting interval (3x).
    pub fn for_report_interval(interval: Duration) -> Self {
        Self::new(interval * 3)
    }

    /// Applies one health event.
    pub fn record(&self, health: ServiceHealth) {
        self.services
            .write()
            .insert(health.service.clone(), health);
    }

    /// Marks services unhealthy whose reports went stale. Returns the
    /// services newly marked, for alerting.
    pub fn sweep(&self, now: DateTime<Utc>) -> Vec<SmolStr> {
        let mut newly_unhealthy = Vec::new();
        let mut services = self.services.write();
        for (name, health) in services.iter_mut() {
            if health.status != HealthStatus::Unhealthy && health.is_stale(now, self.staleness) {
                health.status = HealthStatus::Unhealthy;
                newly_unhealthy.push(name.clone());
            }
        }
        newly_unhealthy
    }

    /// `100 * healthy / total`, 100 when the fleet is empty.
    pub fn system_health(&self) -> u32 {
        let services = self.services.read();
        if services.is_empty() {
            return 100;
        }
        let healthy = services
            .values()
            .filter(|health| health.status.is_healthy())
            .count();
        (100 * healthy / services.len()) as u32
    }

    pub fn service(&self, name: &str) -> Option<ServiceHealth> {
        self.services.read().get(name).cloned()
    }

    /// Snapshot of every known service, sorted by name.
    pub fn snapshot(&self) -> Vec<ServiceHealth> {
        let mut all: Vec<ServiceHealth> = self.services.read().values().cloned().collect();
        all.sort_by(|a, b| a.service.cmp(&b.service));
        all
    }

    pub fn len(&self) -> usize {
        self.services.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(offset_secs: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_700_000_000_000 + offset_secs * 1000)
            .unwrap()
    }

    fn aggregator() -> HealthAggregator {
        HealthAggregator::for_report_interval(Duration::seconds(5))
    }

    #[test]
    fn test_empty_fleet_is_fully_healthy() {
        assert_eq!(aggregator().system_health(), 100);
    }

    #[test]
    fn test_system_health_is_healthy_fraction() {
        let agg = aggregator();
        agg.record(ServiceHealth::healthy("a", t(0)));
        agg.record(ServiceHealth::healthy("b", t(0)));
        let mut sick = ServiceHealth::healthy("c", t(0));
        sick.status = HealthStatus::Degraded;
        agg.record(sick);

        // 2 of 3 healthy.
        assert_eq!(agg.system_health(), 66);
    }

    #[test]
    fn test_sweep_marks_stale_services_unhealthy_once() {
        let agg = aggregator();
        agg.record(ServiceHealth::healthy("fresh", t(14)));
        agg.record(ServiceHealth::healthy("stale", t(0)));

        // 3x the 5 s interval: stale at >15 s.
        let marked = agg.sweep(t(16));
        assert_eq!(marked, vec![SmolStr::new("stale")]);
        assert_eq!(agg.service("stale").unwrap().status, HealthStatus::Unhealthy);
        assert_eq!(agg.service("fresh").unwrap().status, HealthStatus::Healthy);

        // Already unhealthy: not reported again.
        assert!(agg.sweep(t(17)).is_empty());
    }

    #[test]
    fn test_new_report_recovers_swept_service() {
        let agg = aggregator();
        agg.record(ServiceHealth::healthy("svc", t(0)));
        agg.sweep(t(20));
        assert_eq!(agg.system_health(), 0);

        agg.record(ServiceHealth::healthy("svc", t(21)));
        assert_eq!(agg.system_health(), 100);
    }
}
