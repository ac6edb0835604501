use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Drawdown severity relative to the equity peak.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DrawdownState {
    #[default]
    Normal,
    Caution,
    Halt,
}

/// Tracks realised equity against its peak and halts trading past the
/// configured drawdown.
///
/// HALT latches: once tripped, trading stays refused until an operator
/// calls [`reset`](Self::reset), even if equity recovers. CAUTION is
/// informational and recomputed on every update.
#[derive(Debug, Clone)]
pub struct DrawdownBreaker {
    equity: Decimal,
    peak: Decimal,
    caution_threshold: Decimal,
    halt_threshold: Decimal,
    state: DrawdownState,
}

impl DrawdownBreaker {
    /// `caution_threshold`/`halt_threshold` are drawdown fractions of the
    /// peak, e.g. `0.05` and `0.15`.
    pub fn new(initial_equity: Decimal, caution_threshold: Decimal, halt_threshold: Decimal) -> Self {
        Self {
            equity: initial_equity,
            peak: initial_equity,
            caution_threshold,
            halt_threshold,
            state: DrawdownState::Normal,
        }
    }

    /// Applies one realised trade result.
    pub fn record_pnl(&mut self, pnl: Decimal) -> DrawdownState {
        self.equity += pnl;
        if self.equity > self.peak {
            self.peak = self.equity;
        }

        if self.state != DrawdownState::Halt {
            let drawdown = self.drawdown();
            self.state = if drawdown >= self.halt_threshold {
                warn!(%drawdown, equity = %self.equity, peak = %self.peak, "drawdown halt tripped");
                DrawdownState::Halt
            } else if drawdown >= self.caution_threshold {
                DrawdownState::Caution
            } else {
                DrawdownState::Normal
            };
        }
        self.state
    }

    /// Current drawdown as a fraction of the peak.
    pub fn drawdown(&self) -> Decimal {
        if self.peak <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        ((self.peak - self.equity) / self.peak).max(Decimal::ZERO)
    }

    pub fn state(&self) -> DrawdownState {
        self.state
    }

    pub fn equity(&self) -> Decimal {
        self.equity
    }

    pub fn allows_trading(&self) -> bool {
        self.state != DrawdownState::Halt
    }

    /// Operator override: clears the halt latch and re-bases the peak at
    /// current equity.
    pub fn reset(&mut self) {
        self.peak = self.equity;
        self.state = DrawdownState::Normal;
    }
}
