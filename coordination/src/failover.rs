use crate::lock::LockManager;
use crate::CoordinationError;
use chrono::{DateTime, Utc};
use macaw_substrate::KvStore;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Key prefix under which every region writes its liveness heartbeat.
pub const REGION_HEARTBEAT_PREFIX: &str = "health:region:";

/// Cross-region promotion signals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailoverEvent {
    /// The primary region stayed dark past the threshold and this standby
    /// took the leader lock.
    ActivateStandby,
    /// The primary's heartbeat came back after an activation.
    PrimaryRecovered,
}

/// Configuration of the standby-side failover watcher.
#[derive(Debug, Clone)]
pub struct RegionFailoverConfig {
    /// Region this instance runs in.
    pub region: String,
    /// Region whose leadership we shadow.
    pub primary_region: String,
    /// Leader key taken over on promotion.
    pub leader_key: String,
    pub instance_id: String,
    pub check_interval: Duration,
    /// Consecutive failed checks of the primary before promotion.
    pub failover_threshold: u32,
    /// Heartbeat age beyond which a region counts as unhealthy.
    pub heartbeat_staleness: Duration,
    pub leader_ttl: Duration,
}

impl RegionFailoverConfig {
    pub fn new(
        region: impl Into<String>,
        primary_region: impl Into<String>,
        leader_key: impl Into<String>,
        instance_id: impl Into<String>,
    ) -> Self {
        Self {
            region: region.into(),
            primary_region: primary_region.into(),
            leader_key: leader_key.into(),
            instance_id: instance_id.into(),
            check_interval: Duration::from_secs(10),
            failover_threshold: 3,
            heartbeat_staleness: Duration::from_secs(30),
            leader_ttl: Duration::from_secs(15),
        }
    }

    pub fn with_check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval;
        self
    }

    pub fn with_failover_threshold(mut self, threshold: u32) -> Self {
        self.failover_threshold = threshold;
        self
    }

    pub fn with_heartbeat_staleness(mut self, staleness: Duration) -> Self {
        self.heartbeat_staleness = staleness;
        self
    }
}

/// Writes the caller's region heartbeat (epoch milliseconds) for failover
/// watchers in other regions.
pub async fn record_region_heartbeat(
    store: &dyn KvStore,
    region: &str,
    now: DateTime<Utc>,
) -> Result<(), CoordinationError> {
    let key = format!("{REGION_HEARTBEAT_PREFIX}{region}");
    store
        .set(&key, &now.timestamp_millis().to_string(), None)
        .await?;
    Ok(())
}

/// Standby-side watcher promoting this instance when the primary region
/// goes dark.
pub struct RegionFailoverManager {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl fmt::Debug for RegionFailoverManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegionFailoverManager").finish_non_exhaustive()
    }
}

impl RegionFailoverManager {
    pub fn spawn(
        config: RegionFailoverConfig,
        store: Arc<dyn KvStore>,
    ) -> (Self, mpsc::UnboundedReceiver<FailoverEvent>) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_watcher(config, store, shutdown_rx, event_tx));
        (
            Self {
                shutdown: shutdown_tx,
                task,
            },
            event_rx,
        )
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }
}

async fn run_watcher(
    config: RegionFailoverConfig,
    store: Arc<dyn KvStore>,
    mut shutdown: watch::Receiver<bool>,
    events: mpsc::UnboundedSender<FailoverEvent>,
) {
    let locks = LockManager::new(Arc::clone(&store));
    let mut consecutive_unhealthy = 0u32;
    let mut activated = false;

    loop {
        tokio::select! {
            _ = tokio::time::sleep(config.check_interval) => {}
            _ = shutdown.changed() => return,
        }

        let now = Utc::now();
        let local_healthy = match region_healthy(&*store, &config.region, now, config.heartbeat_staleness).await {
            Ok(healthy) => healthy,
            Err(error) => {
                warn!(%error, region = %config.region, "failover check failed to read local heartbeat");
                continue;
            }
        };
        let primary_healthy = match region_healthy(
            &*store,
            &config.primary_region,
            now,
            config.heartbeat_staleness,
        )
        .await
        {
            Ok(healthy) => healthy,
            Err(error) => {
                warn!(%error, region = %config.primary_region, "failover check failed to read primary heartbeat");
                continue;
            }
        };

        if primary_healthy {
            if activated {
                info!(primary = %config.primary_region, "primary region heartbeat recovered");
                let _ = events.send(FailoverEvent::PrimaryRecovered);
                activated = false;
            }
            consecutive_unhealthy = 0;
            continue;
        }

        if !local_healthy {
            // A standby that cannot see its own heartbeat must not
            // promote itself off a partitioned store view.
            consecutive_unhealthy = 0;
            continue;
        }

        consecutive_unhealthy += 1;
        if activated || consecutive_unhealthy < config.failover_threshold {
            continue;
        }

        match locks
            .acquire(&config.leader_key, &config.instance_id, config.leader_ttl)
            .await
        {
            Ok(attempt) if attempt.acquired => {
                info!(
                    leader_key = %config.leader_key,
                    region = %config.region,
                    checks = consecutive_unhealthy,
                    "standby promoted after primary went dark"
                );
                activated = true;
                let _ = events.send(FailoverEvent::ActivateStandby);
            }
            Ok(attempt) => {
                warn!(
                    leader_key = %config.leader_key,
                    holder = attempt.holder.as_deref().unwrap_or("<unknown>"),
                    "standby promotion lost the acquire race"
                );
            }
            Err(error) => {
                warn!(leader_key = %config.leader_key, %error, "standby promotion attempt failed");
            }
        }
    }
}

async fn region_healthy(
    store: &dyn KvStore,
    region: &str,
    now: DateTime<Utc>,
    staleness: Duration,
) -> Result<bool, CoordinationError> {
    let key = format!("{REGION_HEARTBEAT_PREFIX}{region}");
    let Some(raw) = store.get(&key).await? else {
        return Ok(false);
    };
    let Ok(beat_ms) = raw.parse::<i64>() else {
        return Ok(false);
    };
    let age_ms = now.timestamp_millis().saturating_sub(beat_ms);
    Ok(age_ms >= 0 && age_ms as u128 <= staleness.as_millis())
}
