use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// Reported status of one service in the fleet.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
    #[default]
    Unknown,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }
}

/// Per-service health record.
///
/// Created or refreshed on every health event from the service; the
/// coordinator marks it [`HealthStatus::Unhealthy`] once `last_seen` ages
/// beyond the configured staleness window (3x the reporting interval).
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceHealth {
    pub service: SmolStr,
    pub status: HealthStatus,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_seen: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<SmolStr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uptime_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_mb: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_pct: Option<f64>,
}

impl ServiceHealth {
    pub fn healthy(service: impl Into<SmolStr>, last_seen: DateTime<Utc>) -> Self {
        Self {
            service: service.into(),
            status: HealthStatus::Healthy,
            last_seen,
            region: None,
            uptime_secs: None,
            memory_mb: None,
            cpu_pct: None,
        }
    }

    /// True once `now` is further from `last_seen` than the staleness
    /// window.
    pub fn is_stale(&self, now: DateTime<Utc>, staleness: chrono::Duration) -> bool {
        now.signed_duration_since(self.last_seen) > staleness
    }
}
