#![forbid(unsafe_code)]
#![warn(
    unused,
    clippy::cognitive_complexity,
    unused_crate_dependencies,
    unused_extern_crates,
    missing_debug_implementations,
    rust_2018_idioms
)]

//! # Macaw Substrate
//!
//! Contracts for the two pieces of shared infrastructure both Macaw
//! services sit on: an ordered append-only [event log](log::EventLog) with
//! per-stream consumer groups, and a [key/value store](kv::KvStore) with
//! TTLs and an atomic set-if-absent primitive.
//!
//! Delivery over the log is at-least-once: consumers must be idempotent,
//! keyed by the entity id carried in the entry fields. Ordering is only
//! guaranteed per stream. Entries that cannot be parsed, or whose handler
//! deterministically fails, are moved to the dedicated dead-letter stream
//! ([`streams::DLQ`]).
//!
//! The in-memory implementations ([`MemoryEventLog`], [`MemoryKvStore`])
//! back the test suites and local simulation runs; production deployments
//! plug a remote store in behind the same traits.

/// Ordered append-only log with consumer groups.
pub mod log;

/// Key/value primitives: get/set, TTLs, atomic set-if-absent, counters.
pub mod kv;

/// In-memory event log used by tests and local simulation runs.
pub mod memory_log;

/// In-memory TTL key/value store used by tests and local simulation runs.
pub mod memory_kv;

/// Stream names shared by the fleet, and dead-letter entry shapes.
pub mod streams;

/// Default tracing initialisers for the service binaries.
pub mod logging;

pub use kv::KvStore;
pub use log::{Entry, EntryId, EventLog, GroupStart, PendingSummary};
pub use memory_kv::MemoryKvStore;
pub use memory_log::MemoryEventLog;
pub use streams::DeadLetter;

use thiserror::Error;

/// Failures surfaced by substrate implementations.
///
/// Remote backends collapse their transport errors into [`Self::Io`];
/// consumers treat every variant except [`Self::NoSuchStream`] and
/// [`Self::NoSuchGroup`] as transient.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum SubstrateError {
    #[error("stream `{0}` does not exist")]
    NoSuchStream(String),
    #[error("group `{group}` does not exist on stream `{stream}`")]
    NoSuchGroup { stream: String, group: String },
    #[error("malformed entry id `{0}`")]
    MalformedEntryId(String),
    #[error("substrate i/o failure: {0}")]
    Io(String),
}
