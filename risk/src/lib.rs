#![forbid(unsafe_code)]
#![warn(
    unused,
    clippy::cognitive_complexity,
    unused_crate_dependencies,
    unused_extern_crates,
    missing_debug_implementations,
    rust_2018_idioms
)]

//! # Macaw Risk
//!
//! Capital-risk gates guarding the execution pipeline. Before an accepted
//! opportunity reaches a strategy it passes the [`RiskOrchestrator`],
//! which chains four checks:
//!
//! - [`DrawdownBreaker`](drawdown::DrawdownBreaker): refuses every trade
//!   once realised drawdown from the equity peak crosses the halt
//!   threshold;
//! - [`EvGate`](ev::EvGate): rejects opportunities whose probability-
//!   weighted expected value falls below the configured floor;
//! - [`KellyPositionSizer`](kelly::KellyPositionSizer): sizes the
//!   position from the estimated edge and rejects when the fraction
//!   clamps to zero;
//! - [`ProbabilityTracker`](probability::ProbabilityTracker): per-kind
//!   success estimates feeding the EV calculation.
//!
//! Each rejection is typed so the engine can keep independent counters
//! for drawdown blocks, EV rejections and position-size rejections.

/// Drawdown tracking and the halt latch.
pub mod drawdown;

/// Expected-value gating.
pub mod ev;

/// Kelly-criterion position sizing.
pub mod kelly;

/// Per-kind execution probability estimates.
pub mod probability;

/// The combined gate chain.
pub mod orchestrator;

pub use drawdown::{DrawdownBreaker, DrawdownState};
pub use ev::EvGate;
pub use kelly::KellyPositionSizer;
pub use orchestrator::{RiskConfig, RiskCounters, RiskOrchestrator, RiskRefusalReason};
pub use probability::ProbabilityTracker;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Approved result of a risk check.
///
/// Wrapper indicating the item passed every gate; for the orchestrator
/// the item is the position size the trade must be executed at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskApproved<T>(pub T);

impl<T> RiskApproved<T> {
    pub fn into_item(self) -> T {
        self.0
    }
}

/// Refused result of a risk check, with the gate that refused it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskRefused<Reason = RiskRefusalReason> {
    pub reason: Reason,
}

impl<Reason> RiskRefused<Reason> {
    pub fn new(reason: Reason) -> Self {
        Self { reason }
    }
}

/// Configuration and initialisation failures.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RiskError {
    #[error("invalid risk configuration: {0}")]
    InvalidConfig(String),
}
