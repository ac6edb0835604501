/// Expected-value gate.
///
/// `ev = p * expected_profit - (1 - p) * gas_cost`: the probability-
/// weighted payoff of attempting the trade, where a failed attempt still
/// burns the gas.
#[derive(Debug, Clone, Copy)]
pub struct EvGate {
    min_ev: f64,
}

impl EvGate {
    pub fn new(min_ev: f64) -> Self {
        Self { min_ev }
    }

    pub fn expected_value(&self, expected_profit: f64, gas_cost: f64, success_probability: f64) -> f64 {
        let p = success_probability.clamp(0.0, 1.0);
        p * expected_profit - (1.0 - p) * gas_cost
    }

    /// Returns the expected value when it clears the floor, or `Err` with
    /// the failing value.
    pub fn check(
        &self,
        expected_profit: f64,
        gas_cost: f64,
        success_probability: f64,
    ) -> Result<f64, f64> {
        let ev = self.expected_value(expected_profit, gas_cost, success_probability);
        if ev >= self.min_ev {
            Ok(ev)
        } else {
            Err(ev)
        }
    }

    pub fn min_ev(&self) -> f64 {
        self.min_ev
    }
}
