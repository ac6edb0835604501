/// Kelly-criterion position sizer.
///
/// The classic fraction `f* = p - (1 - p) / b` with `b` the win/loss
/// ratio, clamped to `[0, max_fraction]`. A fraction of zero means the
/// edge does not justify any capital and the trade is refused.
#[derive(Debug, Clone, Copy)]
pub struct KellyPositionSizer {
    max_fraction: f64,
}

impl KellyPositionSizer {
    pub fn new(max_fraction: f64) -> Self {
        Self { max_fraction }
    }

    /// Raw clamped Kelly fraction.
    pub fn fraction(&self, success_probability: f64, win_loss_ratio: f64) -> f64 {
        if win_loss_ratio <= 0.0 {
            return 0.0;
        }
        let p = success_probability.clamp(0.0, 1.0);
        let fraction = p - (1.0 - p) / win_loss_ratio;
        fraction.clamp(0.0, self.max_fraction)
    }

    /// Position size for the given bankroll, `None` when the fraction
    /// clamps to zero.
    pub fn size(
        &self,
        bankroll: f64,
        success_probability: f64,
        win_loss_ratio: f64,
    ) -> Option<f64> {
        let fraction = self.fraction(success_probability, win_loss_ratio);
        let size = bankroll * fraction;
        (size > 0.0).then_some(size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positive_edge_produces_a_size() {
        let sizer = KellyPositionSizer::new(0.25);
        // p=0.6, b=2: f* = 0.6 - 0.4/2 = 0.4, clamped to 0.25.
        assert_eq!(sizer.fraction(0.6, 2.0), 0.25);
        assert_eq!(sizer.size(10_000.0, 0.6, 2.0), Some(2_500.0));
    }

    #[test]
    fn test_negative_edge_sizes_to_zero() {
        let sizer = KellyPositionSizer::new(0.25);
        // p=0.4, b=1: f* = 0.4 - 0.6 < 0.
        assert_eq!(sizer.fraction(0.4, 1.0), 0.0);
        assert_eq!(sizer.size(10_000.0, 0.4, 1.0), None);
    }

    #[test]
    fn test_degenerate_odds_size_to_zero() {
        let sizer = KellyPositionSizer::new(0.25);
        assert_eq!(sizer.size(10_000.0, 0.9, 0.0), None);
        assert_eq!(sizer.size(10_000.0, 0.9, -2.0), None);
    }

    #[test]
    fn test_unclamped_fraction_below_cap() {
        let sizer = KellyPositionSizer::new(0.5);
        // p=0.55, b=1.5: f* = 0.55 - 0.45/1.5 = 0.25.
        let fraction = sizer.fraction(0.55, 1.5);
        assert!((fraction - 0.25).abs() < 1e-12);
    }
}
