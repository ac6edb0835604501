#![forbid(unsafe_code)]
#![warn(
    unused,
    clippy::cognitive_complexity,
    unused_crate_dependencies,
    unused_extern_crates,
    missing_debug_implementations,
    rust_2018_idioms
)]

//! # Macaw Coordination
//!
//! Cross-process coordination over the key/value substrate: a distributed
//! [lock manager](lock::LockManager) with fenced renewal and release, a
//! [leader elector](elector::LeaderElector) that keeps exactly one active
//! instance per service and region, a
//! [region failover manager](failover::RegionFailoverManager) that promotes
//! a standby when the primary region goes dark, and the
//! [lock-conflict tracker](conflict::LockConflictTracker) that recovers
//! locks abandoned by crashed holders.
//!
//! Everything here rests on the store's atomic set-if-absent primitive;
//! there is no custom consensus. Fencing is string equality on the stored
//! owner id, so a lost renewal yields leadership immediately.

/// Distributed locking over the key/value store.
pub mod lock;

/// Leader election: acquire, heartbeat, release.
pub mod elector;

/// Cross-region health watching and standby promotion.
pub mod failover;

/// Repeated-conflict bookkeeping for stale-holder recovery.
pub mod conflict;

pub use conflict::{ConflictVerdict, LockConflictTracker};
pub use elector::{holds_leadership, LeaderElector, LeaderElectorConfig, LeaderEvent, LeaderState};
pub use failover::{FailoverEvent, RegionFailoverConfig, RegionFailoverManager};
pub use lock::{LockAttempt, LockGuard, LockManager};

use thiserror::Error;

/// Failures of coordination operations.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum CoordinationError {
    #[error("substrate failure: {0}")]
    Substrate(#[from] macaw_substrate::SubstrateError),
    #[error("lock `{key}` held by `{holder}`")]
    LockHeld { key: String, holder: String },
}
