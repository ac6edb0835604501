use crate::lock::LockManager;
use crate::CoordinationError;
use macaw_substrate::KvStore;
use rand::Rng;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Jitter applied to follower acquisition retries so a fleet restarted
/// together does not hammer the store in lockstep.
const ACQUIRE_JITTER_FACTOR: f64 = 1.2;

/// Whether this instance currently holds the leader lock.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum LeaderState {
    #[default]
    Follower,
    Leader,
}

impl LeaderState {
    pub fn is_leader(&self) -> bool {
        matches!(self, Self::Leader)
    }
}

/// Leadership transitions observable by the owning service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaderEvent {
    Elected,
    /// A renewal was fenced out or failed; leadership yielded immediately.
    LeadershipLost,
}

/// Elector configuration for one service instance.
#[derive(Debug, Clone)]
pub struct LeaderElectorConfig {
    /// Lock key, e.g. `coordinator:leader:lock` or
    /// `execution-engine:leader:lock:{region}`.
    pub leader_key: String,
    /// Opaque instance id stored as the lock value.
    pub instance_id: String,
    /// Lease TTL. Heartbeats renew at TTL/3.
    pub ttl: Duration,
    /// Base interval between follower acquisition attempts.
    pub retry_interval: Duration,
}

impl LeaderElectorConfig {
    pub fn new(leader_key: impl Into<String>, instance_id: impl Into<String>) -> Self {
        Self {
            leader_key: leader_key.into(),
            instance_id: instance_id.into(),
            ttl: Duration::from_secs(15),
            retry_interval: Duration::from_secs(5),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    fn heartbeat_interval(&self) -> Duration {
        self.ttl / 3
    }
}

/// Handle to a running elector task.
///
/// State is published through a watch channel so callers can either poll
/// (`is_leader`) before side-effecting work or subscribe to transitions.
pub struct LeaderElector {
    config: LeaderElectorConfig,
    state: watch::Receiver<LeaderState>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl fmt::Debug for LeaderElector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LeaderElector")
            .field("leader_key", &self.config.leader_key)
            .field("instance_id", &self.config.instance_id)
            .finish_non_exhaustive()
    }
}

impl LeaderElector {
    /// Spawns the elector loop, returning the handle and the transition
    /// event stream.
    pub fn spawn(
        config: LeaderElectorConfig,
        store: Arc<dyn KvStore>,
    ) -> (Self, mpsc::UnboundedReceiver<LeaderEvent>) {
        let (state_tx, state_rx) = watch::channel(LeaderState::Follower);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(run_elector(
            config.clone(),
            LockManager::new(store),
            state_tx,
            shutdown_rx,
            event_tx,
        ));

        (
            Self {
                config,
                state: state_rx,
                shutdown: shutdown_tx,
                task,
            },
            event_rx,
        )
    }

    pub fn instance_id(&self) -> &str {
        &self.config.instance_id
    }

    pub fn is_leader(&self) -> bool {
        self.state.borrow().is_leader()
    }

    /// Watch channel for leadership state, for select-driven consumers.
    pub fn state(&self) -> watch::Receiver<LeaderState> {
        self.state.clone()
    }

    /// Stops the loop and releases the lock when held.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(error) = self.task.await {
            warn!(%error, "leader elector task did not shut down cleanly");
        }
    }
}

async fn run_elector(
    config: LeaderElectorConfig,
    locks: LockManager,
    state: watch::Sender<LeaderState>,
    mut shutdown: watch::Receiver<bool>,
    events: mpsc::UnboundedSender<LeaderEvent>,
) {
    let mut leading = false;
    loop {
        let wait = if leading {
            config.heartbeat_interval()
        } else {
            jittered(config.retry_interval)
        };
        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = shutdown.changed() => break,
        }

        if leading {
            match locks
                .renew(&config.leader_key, &config.instance_id, config.ttl)
                .await
            {
                Ok(true) => {}
                Ok(false) => {
                    warn!(
                        leader_key = %config.leader_key,
                        instance_id = %config.instance_id,
                        "leadership lost: renewal fenced out"
                    );
                    leading = false;
                    let _ = state.send(LeaderState::Follower);
                    let _ = events.send(LeaderEvent::LeadershipLost);
                }
                Err(error) => {
                    // A store hiccup is indistinguishable from a lost
                    // lease once the TTL lapses; yield immediately.
                    warn!(leader_key = %config.leader_key, %error, "leadership lost: renewal failed");
                    leading = false;
                    let _ = state.send(LeaderState::Follower);
                    let _ = events.send(LeaderEvent::LeadershipLost);
                }
            }
        } else {
            match locks
                .acquire(&config.leader_key, &config.instance_id, config.ttl)
                .await
            {
                Ok(attempt) if attempt.acquired => {
                    info!(
                        leader_key = %config.leader_key,
                        instance_id = %config.instance_id,
                        "leadership acquired"
                    );
                    leading = true;
                    let _ = state.send(LeaderState::Leader);
                    let _ = events.send(LeaderEvent::Elected);
                }
                Ok(_) => {}
                Err(error) => {
                    warn!(leader_key = %config.leader_key, %error, "leader acquisition failed");
                }
            }
        }
    }

    if leading {
        let _ = state.send(LeaderState::Follower);
        if let Err(error) = locks
            .release(&config.leader_key, &config.instance_id)
            .await
        {
            warn!(leader_key = %config.leader_key, %error, "leader lock release failed");
        }
    }
}

fn jittered(base: Duration) -> Duration {
    let factor = rand::rng().random_range(1.0..ACQUIRE_JITTER_FACTOR);
    base.mul_f64(factor)
}

/// Convenience check used by non-elector code paths (HTTP handlers) that
/// only need to confirm the fencing invariant.
pub async fn holds_leadership(
    store: &dyn KvStore,
    leader_key: &str,
    instance_id: &str,
) -> Result<bool, CoordinationError> {
    Ok(store
        .get(leader_key)
        .await?
        .is_some_and(|holder| holder == instance_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use macaw_substrate::MemoryKvStore;

    fn config(key: &str, id: &str) -> LeaderElectorConfig {
        LeaderElectorConfig::new(key, id)
            .with_ttl(Duration::from_millis(300))
            .with_retry_interval(Duration::from_millis(50))
    }

    #[tokio::test]
    async fn test_single_instance_becomes_leader() {
        let store: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());
        let (elector, mut events) = LeaderElector::spawn(config("svc:leader", "a"), store.clone());

        assert_eq!(events.recv().await, Some(LeaderEvent::Elected));
        assert!(elector.is_leader());
        assert_eq!(
            store.get("svc:leader").await.unwrap().as_deref(),
            Some("a")
        );

        elector.shutdown().await;
        assert_eq!(store.get("svc:leader").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_second_instance_stays_follower_until_leader_leaves() {
        let store: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());
        let (first, mut first_events) =
            LeaderElector::spawn(config("svc:leader", "a"), store.clone());
        assert_eq!(first_events.recv().await, Some(LeaderEvent::Elected));

        let (second, mut second_events) =
            LeaderElector::spawn(config("svc:leader", "b"), store.clone());
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!second.is_leader());

        // Leader shuts down and releases; the follower takes over.
        first.shutdown().await;
        assert_eq!(second_events.recv().await, Some(LeaderEvent::Elected));
        assert!(second.is_leader());
        assert_eq!(
            store.get("svc:leader").await.unwrap().as_deref(),
            Some("b")
        );

        second.shutdown().await;
    }

    #[tokio::test]
    async fn test_stolen_lock_fires_leadership_lost() {
        let store: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());
        let (elector, mut events) = LeaderElector::spawn(config("svc:leader", "a"), store.clone());
        assert_eq!(events.recv().await, Some(LeaderEvent::Elected));

        // Simulate lease expiry plus takeover by another instance.
        store.set("svc:leader", "b", None).await.unwrap();

        assert_eq!(events.recv().await, Some(LeaderEvent::LeadershipLost));
        assert!(!elector.is_leader());
        elector.shutdown().await;
    }

    #[tokio::test]
    async fn test_holds_leadership_checks_fencing() {
        let store = MemoryKvStore::new();
        store.set("svc:leader", "a", None).await.unwrap();
        assert!(holds_leadership(&store, "svc:leader", "a").await.unwrap());
        assert!(!holds_leadership(&store, "svc:leader", "b").await.unwrap());
    }
}
