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

//! # Macaw Execution Engine
//!
//! Consumes candidate opportunities from the shared event log and
//! pipelines each one through the safety gates before dispatching a
//! strategy:
//!
//! ```text
//! stream:opportunities
//!         ↓ consumer (validate, dedupe, enqueue)
//!   bounded queue (hi/lo watermarks, standby pause)
//!         ↓ pipeline (bounded concurrency)
//!   circuit breaker → risk gates → distributed lock → strategy (55 s cap)
//!         ↓
//! stream:execution-results + trade log
//! ```
//!
//! Exactly one [`ExecutionResult`](macaw_domain::ExecutionResult) is
//! published per accepted opportunity, success or failure. Leadership and
//! cross-region standby activation come from `macaw-coordination`; the
//! engine itself never performs side-effecting cluster work unless its
//! elector holds the regional leader lock.

/// Bounded opportunity queue with watermark backpressure.
pub mod queue;

/// CLOSED/OPEN/HALF_OPEN circuit breaker.
pub mod breaker;

/// Engine counters and snapshots.
pub mod stats;

/// Line-delimited JSON trade log with daily rotation.
pub mod tradelog;

/// Opportunity-stream handler feeding the queue.
pub mod consumer;

/// The per-item execution pipeline.
pub mod pipeline;

/// Environment-driven configuration.
pub mod config;

/// Engine error surface.
pub mod error;

/// Health/stats HTTP endpoints.
pub mod http;

/// Service wiring and lifecycle.
pub mod service;

pub use breaker::{BreakerMetrics, BreakerState, CircuitBreaker, CircuitBreakerConfig, TransitionEvent};
pub use config::EngineConfig;
pub use error::EngineError;
pub use queue::{EnqueueError, OpportunityQueue, QueueConfig, QueueItem};
pub use service::ExecutionEngine;
pub use stats::{EngineStats, StatsSnapshot};
