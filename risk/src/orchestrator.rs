use crate::drawdown::DrawdownBreaker;
use crate::ev::EvGate;
use crate::kelly::KellyPositionSizer;
use crate::probability::ProbabilityTracker;
use crate::{RiskApproved, RiskError, RiskRefused};
use macaw_domain::Opportunity;
use parking_lot::Mutex;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Configuration of the combined risk gate.
#[derive(Debug, Clone)]
pub struct RiskConfig {
    pub enabled: bool,
    /// Starting bankroll for drawdown accounting and sizing.
    pub initial_equity: Decimal,
    /// Drawdown fraction that flags caution.
    pub caution_drawdown: Decimal,
    /// Drawdown fraction that halts trading.
    pub halt_drawdown: Decimal,
    /// Expected-value floor per trade.
    pub min_expected_value: f64,
    /// Kelly fraction cap.
    pub max_kelly_fraction: f64,
    /// Prior success probability for unseen opportunity kinds.
    pub prior_success_rate: f64,
    /// Evidence weight of the prior, in attempts.
    pub prior_weight: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_equity: Decimal::new(10_000, 0),
            caution_drawdown: Decimal::new(5, 2),
            halt_drawdown: Decimal::new(15, 2),
            min_expected_value: 0.0,
            max_kelly_fraction: 0.25,
            prior_success_rate: 0.7,
            prior_weight: 10.0,
        }
    }
}

impl RiskConfig {
    fn validate(&self) -> Result<(), RiskError> {
        if self.initial_equity <= Decimal::ZERO {
            return Err(RiskError::InvalidConfig(format!(
                "initial equity must be positive, got {}",
                self.initial_equity
            )));
        }
        if self.halt_drawdown <= self.caution_drawdown {
            return Err(RiskError::InvalidConfig(
                "halt drawdown must exceed caution drawdown".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.max_kelly_fraction) {
            return Err(RiskError::InvalidConfig(format!(
                "kelly fraction cap must be in [0, 1], got {}",
                self.max_kelly_fraction
            )));
        }
        if !(0.0..=1.0).contains(&self.prior_success_rate) {
            return Err(RiskError::InvalidConfig(format!(
                "prior success rate must be in [0, 1], got {}",
                self.prior_success_rate
            )));
        }
        Ok(())
    }
}

/// Which gate refused the opportunity.
#[derive(Debug, Clone, PartialEq, Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", tag = "gate")]
pub enum RiskRefusalReason {
    /// The drawdown breaker is in HALT.
    Drawdown,
    /// Expected value under the floor.
    ExpectedValue { ev: f64, threshold: f64 },
    /// Kelly fraction clamped to zero.
    PositionSize,
}

impl fmt::Display for RiskRefusalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Drawdown => write!(f, "drawdown breaker is in HALT"),
            Self::ExpectedValue { ev, threshold } => {
                write!(f, "expected value {ev:.4} below threshold {threshold:.4}")
            }
            Self::PositionSize => write!(f, "position size clamped to zero"),
        }
    }
}

/// Rejection counters, one per gate.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskCounters {
    pub risk_drawdown_blocks: u64,
    pub risk_ev_rejections: u64,
    pub risk_position_size_rejections: u64,
}

/// Chains drawdown, EV and sizing checks in front of the pipeline.
///
/// Single instance per engine; outcomes feed back through
/// [`record_outcome`](Self::record_outcome) so the probability estimates
/// and equity accounting stay current.
pub struct RiskOrchestrator {
    config: RiskConfig,
    drawdown: Mutex<DrawdownBreaker>,
    ev_gate: EvGate,
    sizer: KellyPositionSizer,
    probabilities: ProbabilityTracker,
    drawdown_blocks: AtomicU64,
    ev_rejections: AtomicU64,
    size_rejections: AtomicU64,
}

impl fmt::Debug for RiskOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RiskOrchestrator")
            .field("enabled", &self.config.enabled)
            .finish_non_exhaustive()
    }
}

impl RiskOrchestrator {
    pub fn new(config: RiskConfig) -> Result<Self, RiskError> {
        config.validate()?;
        Ok(Self {
            drawdown: Mutex::new(DrawdownBreaker::new(
                config.initial_equity,
                config.caution_drawdown,
                config.halt_drawdown,
            )),
            ev_gate: EvGate::new(config.min_expected_value),
            sizer: KellyPositionSizer::new(config.max_kelly_fraction),
            probabilities: ProbabilityTracker::new(config.prior_success_rate, config.prior_weight),
            drawdown_blocks: AtomicU64::new(0),
            ev_rejections: AtomicU64::new(0),
            size_rejections: AtomicU64::new(0),
            config,
        })
    }

    pub fn enabled(&self) -> bool {
        self.config.enabled
    }

    /// Runs the gate chain. Approval carries the position size the trade
    /// must execute at, which overrides the detector's amount.
    pub fn evaluate(
        &self,
        opportunity: &Opportunity,
        gas_cost: f64,
    ) -> Result<RiskApproved<f64>, RiskRefused> {
        if !self.drawdown.lock().allows_trading() {
            self.drawdown_blocks.fetch_add(1, Ordering::Relaxed);
            return Err(RiskRefused::new(RiskRefusalReason::Drawdown));
        }

        let probability = self.probabilities.estimate(&opportunity.kind);
        let ev = self
            .ev_gate
            .check(opportunity.expected_profit, gas_cost, probability)
            .map_err(|ev| {
                self.ev_rejections.fetch_add(1, Ordering::Relaxed);
                RiskRefused::new(RiskRefusalReason::ExpectedValue {
                    ev,
                    threshold: self.ev_gate.min_ev(),
                })
            })?;

        let bankroll = self
            .drawdown
            .lock()
            .equity()
            .to_f64()
            .unwrap_or_default()
            .max(0.0);
        let win_loss_ratio = if gas_cost > 0.0 {
            opportunity.expected_profit / gas_cost
        } else {
            // Free attempts: any positive profit is pure edge; cap at the
            // configured fraction via a large ratio.
            f64::MAX
        };
        let Some(size) = self.sizer.size(bankroll, probability, win_loss_ratio) else {
            self.size_rejections.fetch_add(1, Ordering::Relaxed);
            return Err(RiskRefused::new(RiskRefusalReason::PositionSize));
        };

        debug!(
            id = %opportunity.id,
            kind = %opportunity.kind,
            probability,
            ev,
            size,
            "risk gates passed"
        );
        Ok(RiskApproved(size))
    }

    /// Feeds one execution outcome back into the estimates.
    pub fn record_outcome(&self, opportunity: &Opportunity, success: bool, pnl: Decimal) {
        self.probabilities.record(&opportunity.kind, success);
        self.drawdown.lock().record_pnl(pnl);
    }

    pub fn counters(&self) -> RiskCounters {
        RiskCounters {
            risk_drawdown_blocks: self.drawdown_blocks.load(Ordering::Relaxed),
            risk_ev_rejections: self.ev_rejections.load(Ordering::Relaxed),
            risk_position_size_rejections: self.size_rejections.load(Ordering::Relaxed),
        }
    }

    /// Operator override clearing a drawdown halt.
    pub fn reset_drawdown(&self) {
        self.drawdown.lock().reset();
    }
}
