use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// What the tracker concluded from one more conflict on a key.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ConflictVerdict {
    /// Back off and let the group redeliver.
    Retry,
    /// The holder is presumed crashed; force-release and retry once.
    Stale,
}

#[derive(Debug, Clone)]
struct ConflictRecord {
    first_seen: DateTime<Utc>,
    last_seen: DateTime<Utc>,
    count: u32,
}

/// Per-key conflict bookkeeping for stale-holder recovery.
///
/// A holder is declared stale when the same key has conflicted at least
/// `min_conflicts` times and the conflict burst is between `window_min`
/// and `window_max` old. Legitimate acquisition attempts complete within
/// a few seconds, so repeated conflicts across the 20 s mark mean the
/// holder is not making progress; bursts older than the upper bound are
/// treated as a fresh contention episode rather than a crash.
#[derive(Debug)]
pub struct LockConflictTracker {
    records: Mutex<HashMap<String, ConflictRecord>>,
    min_conflicts: u32,
    window_min: Duration,
    window_max: Duration,
    retention: Duration,
    conflicts: AtomicU64,
    recoveries: AtomicU64,
}

impl Default for LockConflictTracker {
    fn default() -> Self {
        Self::new(3, Duration::seconds(20), Duration::seconds(30))
    }
}

impl LockConflictTracker {
    pub fn new(min_conflicts: u32, window_min: Duration, window_max: Duration) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            min_conflicts,
            window_min,
            window_max,
            retention: Duration::seconds(60),
            conflicts: AtomicU64::new(0),
            recoveries: AtomicU64::new(0),
        }
    }

    /// Records one acquisition conflict on `key` and judges the holder.
    pub fn record_conflict(&self, key: &str, now: DateTime<Utc>) -> ConflictVerdict {
        self.conflicts.fetch_add(1, Ordering::Relaxed);

        let mut records = self.records.lock();
        let record = records
            .entry(key.to_string())
            .and_modify(|record| {
                record.count += 1;
                record.last_seen = now;
            })
            .or_insert(ConflictRecord {
                first_seen: now,
                last_seen: now,
                count: 1,
            });

        let age = now.signed_duration_since(record.first_seen);
        if record.count >= self.min_conflicts && age >= self.window_min && age <= self.window_max {
            ConflictVerdict::Stale
        } else {
            ConflictVerdict::Retry
        }
    }

    /// Counts one performed force-release.
    pub fn record_recovery(&self, key: &str) {
        self.recoveries.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(key, "stale lock force-released");
    }

    /// Clears the record once the key was successfully acquired.
    pub fn record_acquired(&self, key: &str) {
        self.records.lock().remove(key);
    }

    /// Drops records with no conflicts for the retention window. Runs on
    /// the owner's health-check cadence.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let mut records = self.records.lock();
        let before = records.len();
        records.retain(|_, record| now.signed_duration_since(record.last_seen) < self.retention);
        before - records.len()
    }

    /// Total conflicts observed.
    pub fn lock_conflicts(&self) -> u64 {
        self.conflicts.load(Ordering::Relaxed)
    }

    /// Total force-releases performed.
    pub fn stale_lock_recoveries(&self) -> u64 {
        self.recoveries.load(Ordering::Relaxed)
    }

    /// Number of keys currently tracked.
    pub fn tracked_keys(&self) -> usize {
        self.records.lock().len()
    }
}
