#![forbid(unsafe_code)]
#![warn(
    unused,
    clippy::cognitive_complexity,
    unused_crate_dependencies,
    unused_extern_crates,
    missing_debug_implementations,
    rust_2018_idioms
)]

//! # Macaw Streams
//!
//! Consumer-group framework over the event-log substrate. A
//! [`GroupConsumer`] owns one poll loop: idempotent group creation,
//! blocking reads with a timeout, per-entry dispatch into a
//! [`StreamHandler`], acknowledgment bookkeeping, retry-then-dead-letter
//! policy, and the per-stream consecutive-error counter that raises one
//! critical alert per failure burst.
//!
//! Delivery is at-least-once: a handler that returns
//! [`HandlerOutcome::Retry`] leaves the entry pending for redelivery, and
//! the framework dead-letters it once the substrate reports the
//! configured number of deliveries. [`HandlerOutcome::Defer`] hands ack
//! responsibility to a downstream owner (the execution pipeline acks
//! opportunities only after result publication).

/// Handler seam and dispatch outcomes.
pub mod handler;

/// The poll loop.
pub mod consumer;

/// Consecutive-error tracking per stream.
pub mod errors;

pub use consumer::{ConsumerConfig, ConsumerHandle, GroupConsumer};
pub use errors::{StreamErrorTracker, MAX_STREAM_ERRORS};
pub use handler::{AlertFn, HandlerOutcome, StreamHandler};

use thiserror::Error;

/// Failures of the consumer framework itself (as opposed to handler
/// outcomes, which are policy).
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum ConsumeError {
    #[error("substrate failure: {0}")]
    Substrate(#[from] macaw_substrate::SubstrateError),
}
