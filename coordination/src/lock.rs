use crate::CoordinationError;
use macaw_substrate::KvStore;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Outcome of one acquisition attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockAttempt {
    pub acquired: bool,
    /// Current owner id: ours on success, the competing holder's on
    /// failure (when still readable).
    pub holder: Option<String>,
}

/// Distributed lock manager over the key/value store.
///
/// Acquisition is the store's atomic set-if-absent with a TTL; renewal and
/// release are fenced on the stored owner id, so a holder that lost its
/// key cannot renew or release a competitor's acquisition.
#[derive(Clone)]
pub struct LockManager {
    store: Arc<dyn KvStore>,
}

impl fmt::Debug for LockManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockManager").finish_non_exhaustive()
    }
}

impl LockManager {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    pub async fn acquire(
        &self,
        key: &str,
        owner: &str,
        ttl: Duration,
    ) -> Result<LockAttempt, CoordinationError> {
        if self.store.set_if_absent(key, owner, ttl).await? {
            debug!(key, owner, "lock acquired");
            return Ok(LockAttempt {
                acquired: true,
                holder: Some(owner.to_string()),
            });
        }
        let holder = self.store.get(key).await?;
        Ok(LockAttempt {
            acquired: false,
            holder,
        })
    }

    /// Refreshes the TTL iff `owner` still holds the lock.
    pub async fn renew(
        &self,
        key: &str,
        owner: &str,
        ttl: Duration,
    ) -> Result<bool, CoordinationError> {
        match self.store.get(key).await? {
            Some(holder) if holder == owner => Ok(self.store.expire(key, ttl).await?),
            _ => Ok(false),
        }
    }

    /// Deletes the lock iff `owner` still holds it.
    pub async fn release(&self, key: &str, owner: &str) -> Result<bool, CoordinationError> {
        match self.store.get(key).await? {
            Some(holder) if holder == owner => Ok(self.store.del(key).await?),
            _ => Ok(false),
        }
    }

    /// Unconditional release, used by stale-holder recovery.
    pub async fn force_release(&self, key: &str) -> Result<bool, CoordinationError> {
        warn!(key, "force-releasing lock");
        Ok(self.store.del(key).await?)
    }

    /// Acquires `key`, holding it for the duration of the guard.
    ///
    /// Returns `Ok(None)` when another owner holds the lock. While the
    /// guard lives, a background task renews the TTL on a TTL/3 cadence;
    /// dropping the guard (on any exit path) releases the lock.
    pub async fn acquire_guard(
        &self,
        key: &str,
        owner: &str,
        ttl: Duration,
    ) -> Result<Option<LockGuard>, CoordinationError> {
        let attempt = self.acquire(key, owner, ttl).await?;
        if !attempt.acquired {
            return Ok(None);
        }

        let renewer = {
            let manager = self.clone();
            let key = key.to_string();
            let owner = owner.to_string();
            tokio::spawn(async move {
                let mut tick = tokio::time::interval(ttl / 3);
                tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                tick.tick().await;
                loop {
                    tick.tick().await;
                    match manager.renew(&key, &owner, ttl).await {
                        Ok(true) => {}
                        Ok(false) => {
                            warn!(key, owner, "lock renewal fenced out");
                            return;
                        }
                        Err(error) => {
                            warn!(key, owner, %error, "lock renewal failed");
                        }
                    }
                }
            })
        };

        Ok(Some(LockGuard {
            manager: self.clone(),
            key: key.to_string(),
            owner: owner.to_string(),
            renewer,
            released: false,
        }))
    }

    /// Runs `work` under the lock, releasing on every exit path.
    ///
    /// Returns `Ok(None)` without running `work` when the lock is held
    /// elsewhere.
    pub async fn with_lock<T, F, Fut>(
        &self,
        key: &str,
        owner: &str,
        ttl: Duration,
        work: F,
    ) -> Result<Option<T>, CoordinationError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let Some(guard) = self.acquire_guard(key, owner, ttl).await? else {
            return Ok(None);
        };
        let value = work().await;
        guard.release().await?;
        Ok(Some(value))
    }
}

/// Live acquisition of one lock key.
///
/// Prefer [`LockGuard::release`] for a checked release; `Drop` covers
/// cancellation with a best-effort background release.
#[derive(Debug)]
pub struct LockGuard {
    manager: LockManager,
    key: String,
    owner: String,
    renewer: JoinHandle<()>,
    released: bool,
}

impl LockGuard {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub async fn release(mut self) -> Result<bool, CoordinationError> {
        self.renewer.abort();
        self.released = true;
        self.manager.release(&self.key, &self.owner).await
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        self.renewer.abort();
        if !self.released {
            let manager = self.manager.clone();
            let key = std::mem::take(&mut self.key);
            let owner = std::mem::take(&mut self.owner);
            tokio::spawn(async move {
                if let Err(error) = manager.release(&key, &owner).await {
                    warn!(key, owner, %error, "best-effort lock release failed");
                }
            });
        }
    }
}
