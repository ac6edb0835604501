#![forbid(unsafe_code)]
#![warn(
    unused,
    clippy::cognitive_complexity,
    unused_crate_dependencies,
    unused_extern_crates,
    missing_debug_implementations,
    rust_2018_idioms
)]
#![allow(clippy::too_many_arguments)]

//! # Macaw Coordinator
//!
//! Observes the detector/analysis fleet over the shared event log and
//! serves the admin API. The coordinator consumes the health, telemetry
//! and execution-result streams into an in-memory view (fleet health,
//! system metrics, a bounded opportunity cache), raises cooldown-gated
//! alerts through multi-channel fan-out, emits its own heartbeat, and,
//! only while holding the leader lock, performs side-effecting cluster
//! work such as service restarts.

/// Fleet health aggregation.
pub mod health;

/// System-wide counters.
pub mod metrics;

/// Bounded in-memory opportunity cache.
pub mod opportunities;

/// Alert cooldown bookkeeping.
pub mod cooldown;

/// Multi-channel alert fan-out with bounded history.
pub mod notify;

/// Stream handlers feeding the in-memory view.
pub mod consumers;

/// The `/api` HTTP surface.
pub mod http;

/// Environment-driven configuration.
pub mod config;

/// Coordinator error surface.
pub mod error;

/// Service wiring and lifecycle.
pub mod service;

pub use config::CoordinatorConfig;
pub use error::CoordinatorError;
pub use service::Coordinator;
