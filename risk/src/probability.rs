use macaw_domain::OpportunityKind;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Per-kind success-probability estimates.
///
/// Beta-style smoothing: the estimate is
/// `(successes + prior_successes) / (attempts + prior_attempts)`, so a
/// kind with no history starts at the prior mean instead of a hard 0 or
/// 1, and converges to the observed rate as attempts accumulate.
#[derive(Debug)]
pub struct ProbabilityTracker {
    prior_successes: f64,
    prior_attempts: f64,
    outcomes: RwLock<HashMap<OpportunityKind, KindOutcomes>>,
}

#[derive(Debug, Default, Clone, Copy)]
struct KindOutcomes {
    successes: u64,
    attempts: u64,
}

impl ProbabilityTracker {
    /// `prior_mean` seeds unseen kinds; `prior_weight` is how many
    /// attempts of evidence the prior is worth.
    pub fn new(prior_mean: f64, prior_weight: f64) -> Self {
        Self {
            prior_successes: prior_mean.clamp(0.0, 1.0) * prior_weight,
            prior_attempts: prior_weight,
            outcomes: RwLock::new(HashMap::new()),
        }
    }

    pub fn record(&self, kind: &OpportunityKind, success: bool) {
        let mut outcomes = self.outcomes.write();
        let entry = outcomes.entry(kind.clone()).or_default();
        entry.attempts += 1;
        if success {
            entry.successes += 1;
        }
    }

    pub fn estimate(&self, kind: &OpportunityKind) -> f64 {
        let outcomes = self.outcomes.read();
        let observed = outcomes.get(kind).copied().unwrap_or_default();
        (observed.successes as f64 + self.prior_successes)
            / (observed.attempts as f64 + self.prior_attempts)
    }

    pub fn attempts(&self, kind: &OpportunityKind) -> u64 {
        self.outcomes
            .read()
            .get(kind)
            .map(|outcomes| outcomes.attempts)
            .unwrap_or(0)
    }
}
