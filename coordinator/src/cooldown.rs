use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Entries older than this are dropped by cleanup.
pub const DEFAULT_MAX_AGE_MS: i64 = 3_600_000;
/// Map size that triggers an opportunistic cleanup.
pub const CLEANUP_THRESHOLD: usize = 1000;

/// Storage capability behind the cooldown manager.
///
/// The default store is the in-memory map. A deployment may delegate
/// storage to an external health-monitor component; note that in
/// delegate mode [`clear`](Self::clear) is deliberately a no-op: the
/// delegate owns its own lifecycle and a coordinator restart must not
/// wipe it.
pub trait CooldownStore: Send + Sync + 'static {
    /// Last-fired time for a key.
    fn get(&self, key: &str) -> Option<DateTime<Utc>>;
    fn set(&self, key: &str, fired_at: DateTime<Utc>);
    /// Removes the key, reporting whether it existed.
    fn delete(&self, key: &str) -> bool;
    /// Drops entries older than `max_age`.
    fn cleanup(&self, now: DateTime<Utc>, max_age: Duration) -> usize;
    /// Clears everything (no-op for delegate-backed stores).
    fn clear(&self);
    fn len(&self) -> usize;
}

/// In-memory cooldown store.
#[derive(Debug, Default)]
pub struct MemoryCooldowns {
    fired: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl CooldownStore for MemoryCooldowns {
    fn get(&self, key: &str) -> Option<DateTime<Utc>> {
        self.fired.lock().get(key).copied()
    }

    fn set(&self, key: &str, fired_at: DateTime<Utc>) {
        self.fired.lock().insert(key.to_string(), fired_at);
    }

    fn delete(&self, key: &str) -> bool {
        self.fired.lock().remove(key).is_some()
    }

    fn cleanup(&self, now: DateTime<Utc>, max_age: Duration) -> usize {
        let mut fired = self.fired.lock();
        let before = fired.len();
        fired.retain(|_, at| now.signed_duration_since(*at) <= max_age);
        before - fired.len()
    }

    fn clear(&self) {
        self.fired.lock().clear();
    }

    fn len(&self) -> usize {
        self.fired.lock().len()
    }
}

/// Cooldown gate in front of the notifier.
///
/// Keyed `${type}_${service || "system"}`: two alerts sharing a key are
/// never emitted within `cooldown` of each other. Cleanup runs on the
/// owner's timer and opportunistically when the map outgrows
/// [`CLEANUP_THRESHOLD`].
pub struct AlertCooldownManager {
    store: Arc<dyn CooldownStore>,
    cooldown: Duration,
    max_age: Duration,
}

impl fmt::Debug for AlertCooldownManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlertCooldownManager")
            .field("cooldown_ms", &self.cooldown.num_milliseconds())
            .finish_non_exhaustive()
    }
}

impl AlertCooldownManager {
    pub fn new(cooldown: Duration) -> Self {
        Self::with_store(Arc::new(MemoryCooldowns::default()), cooldown)
    }

    /// Delegated storage mode (see [`CooldownStore::clear`]).
    pub fn with_store(store: Arc<dyn CooldownStore>, cooldown: Duration) -> Self {
        Self {
            store,
            cooldown,
            max_age: Duration::milliseconds(DEFAULT_MAX_AGE_MS),
        }
    }

    /// Returns whether the alert for `key` may fire now, recording the
    /// emission when it may.
    pub fn should_fire(&self, key: &str, now: DateTime<Utc>) -> bool {
        if let Some(last) = self.store.get(key) {
            if now.signed_duration_since(last) <= self.cooldown {
                return false;
            }
        }
        self.store.set(key, now);
        if self.store.len() > CLEANUP_THRESHOLD {
            self.store.cleanup(now, self.max_age);
        }
        true
    }

    /// Removes a cooldown (alert acknowledgement). Returns whether the
    /// key existed.
    pub fn delete(&self, key: &str) -> bool {
        self.store.delete(key)
    }

    /// Timer-driven cleanup pass.
    pub fn cleanup(&self, now: DateTime<Utc>) -> usize {
        self.store.cleanup(now, self.max_age)
    }

    pub fn clear(&self) {
        self.store.clear();
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(offset_ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_700_000_000_000 + offset_ms).unwrap()
    }

    fn manager() -> AlertCooldownManager {
        AlertCooldownManager::new(Duration::milliseconds(300_000))
    }

    #[test]
    fn test_same_key_suppressed_within_cooldown() {
        let cooldowns = manager();
        assert!(cooldowns.should_fire("SERVICE_UNHEALTHY_partition-asia-fast", t(0)));
        assert!(!cooldowns.should_fire("SERVICE_UNHEALTHY_partition-asia-fast", t(1)));

        // Distinct keys at the same instant are independent.
        assert!(cooldowns.should_fire("SERVICE_UNHEALTHY_eth-detector", t(1)));
        assert!(cooldowns.should_fire("HIGH_MEMORY_partition-asia-fast", t(1)));
    }

    #[test]
    fn test_fires_again_only_after_cooldown_strictly_elapses() {
        let cooldowns = manager();
        assert!(cooldowns.should_fire("k", t(0)));
        // Exactly the cooldown is still inside the window.
        assert!(!cooldowns.should_fire("k", t(300_000)));
        assert!(cooldowns.should_fire("k", t(300_001)));
    }

    #[test]
    fn test_delete_reports_existence() {
        let cooldowns = manager();
        cooldowns.should_fire("k", t(0));
        assert!(cooldowns.delete("k"));
        assert!(!cooldowns.delete("k"));
        // Deleted: next alert fires immediately.
        assert!(cooldowns.should_fire("k", t(1)));
    }

    #[test]
    fn test_cleanup_drops_only_aged_entries() {
        let cooldowns = manager();
        cooldowns.should_fire("old", t(0));
        cooldowns.should_fire("new", t(3_599_000));
        assert_eq!(cooldowns.cleanup(t(3_700_000)), 1);
        assert_eq!(cooldowns.len(), 1);
    }

    #[test]
    fn test_opportunistic_cleanup_past_threshold() {
        let cooldowns = manager();
        for i in 0..=CLEANUP_THRESHOLD {
            cooldowns.should_fire(&format!("k-{i}"), t(i as i64));
        }
        // One more insert pushes past the threshold with everything aged
        // out except the newcomer.
        cooldowns.should_fire("late", t(7_200_000));
        assert_eq!(cooldowns.len(), 1);
    }

    struct NoClearStore(MemoryCooldowns);

    impl CooldownStore for NoClearStore {
        fn get(&self, key: &str) -> Option<DateTime<Utc>> {
            self.0.get(key)
        }
        fn set(&self, key: &str, fired_at: DateTime<Utc>) {
            self.0.set(key, fired_at)
        }
        fn delete(&self, key: &str) -> bool {
            self.0.delete(key)
        }
        fn cleanup(&self, now: DateTime<Utc>, max_age: Duration) -> usize {
            self.0.cleanup(now, max_age)
        }
        fn clear(&self) {
            // Delegate-backed store: restart must not wipe it.
        }
        fn len(&self) -> usize {
            self.0.len()
        }
    }

    #[test]
    fn test_delegate_store_survives_clear() {
        let cooldowns = AlertCooldownManager::with_store(
            Arc::new(NoClearStore(MemoryCooldowns::default())),
            Duration::milliseconds(300_000),
        );
        cooldowns.should_fire("k", t(0));
        cooldowns.clear();
        // Still suppressed: the delegate kept the entry.
        assert!(!cooldowns.should_fire("k", t(1)));
    }
}
