use chrono::NaiveDate;
use common::AlphaSignal;

use super::score_each_ticker;
use crate::data::PricePanel;

/// Trailing return over the lookback; past winners score positive
#[derive(Debug, Clone, PartialEq)]
pub struct MomentumAlpha {
    pub window: usize,
}

impl MomentumAlpha {
    pub const NAME: &'static str = "MomentumAlpha";

    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
        }
    }

    pub fn min_history(&self) -> usize {
        self.window + 1
    }

    pub fn compute_scores(&self, panel: &PricePanel, as_of: NaiveDate) -> AlphaSignal {
        score_each_ticker(panel, as_of, self.min_history(), |closes| {
            closes[closes.len() - 1] / closes[0] - 1.0
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{panel_from_closes, trading_day};
    use approx::assert_relative_eq;

    #[test]
    fn test_sign_follows_trailing_return() {
        let rising: Vec<f64> = (0..11).map(|i| 100.0 + i as f64).collect();
        let falling: Vec<f64> = (0..11).map(|i| 100.0 - i as f64).collect();
        let panel = panel_from_closes(&[("AAPL", rising), ("TSLA", falling)]);

        let signal = MomentumAlpha::new(10).compute_scores(&panel, trading_day(10));
        assert_relative_eq!(signal.score("AAPL").unwrap(), 0.10, epsilon = 1e-12);
        assert_relative_eq!(signal.score("TSLA").unwrap(), -0.10, epsilon = 1e-12);
    }

    #[test]
    fn test_uses_last_trading_date_at_or_before_as_of() {
        let closes: Vec<f64> = (0..11).map(|i| 100.0 + i as f64).collect();
        let panel = panel_from_closes(&[("AAPL", closes)]);
        let alpha = MomentumAlpha::new(10);

        // The day after the last bar resolves to the last bar
        let later = trading_day(10).succ_opt().unwrap();
        assert_eq!(
            alpha.compute_scores(&panel, later).score("AAPL"),
            alpha.compute_scores(&panel, trading_day(10)).score("AAPL")
        );
    }
}
