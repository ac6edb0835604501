#![forbid(unsafe_code)]
#![warn(
    unused,
    clippy::cognitive_complexity,
    unused_crate_dependencies,
    unused_extern_crates,
    missing_debug_implementations,
    rust_2018_idioms
)]

//! # Macaw Domain
//!
//! Shared domain types for the Macaw arbitrage processing plane: candidate
//! [`Opportunity`]s produced by the detector fleet, [`ExecutionResult`]s
//! published by the execution engine, per-service [`ServiceHealth`] records
//! aggregated by the coordinator, and [`Alert`]s fanned out to notification
//! channels.
//!
//! Every type that crosses the event log has a wire codec in [`wire`]:
//! entries are flat string field maps with the JSON payload under the
//! `data` key, so malformed messages can be rejected at the edge without
//! touching the typed model.

/// Candidate arbitrage opportunities and their lifecycle status.
pub mod opportunity;

/// Execution outcomes published once per accepted opportunity.
pub mod execution;

/// Per-service health records and fleet status levels.
pub mod health;

/// Alerts, severities and cooldown keys.
pub mod alert;

/// Market telemetry consumed for system metrics (whale moves, swaps,
/// volume aggregates, price updates).
pub mod telemetry;

/// Field-map codecs for event-log entries.
pub mod wire;

pub use alert::{Alert, AlertSeverity};
pub use execution::ExecutionResult;
pub use health::{HealthStatus, ServiceHealth};
pub use opportunity::{Opportunity, OpportunityKind, OpportunityStatus, ValidationError};
pub use telemetry::{PriceUpdate, SwapEvent, VolumeAggregate, WhaleAlert};
pub use wire::{DomainError, FieldMap, WireEvent};
