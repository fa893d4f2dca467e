use chrono::NaiveDate;
use common::AlphaSignal;

use super::score_each_ticker;
use crate::data::PricePanel;
use crate::indicators::{is_negligible, mean};

/// Scale-invariant reversion: how far the price sits below its long moving average,
/// as a fraction of that average.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceRatioMeanAlpha {
    pub window: usize,
}

impl PriceRatioMeanAlpha {
    pub const NAME: &'static str = "PriceRatioMeanAlpha";

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
            let price = closes[closes.len() - 1];
            let sma = mean(&closes[closes.len() - self.window..]);
            if sma <= 0.0 {
                return f64::NAN;
            }
            let ratio = 1.0 - price / sma;
            if is_negligible(ratio, 1.0) {
                0.0
            } else {
                ratio
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{panel_from_closes, trading_day};
    use approx::assert_relative_eq;

    #[test]
    fn test_ratio_score() {
        // Window of 4: last four closes 10, 10, 10, 6 => sma 9
        let panel = panel_from_closes(&[("AAPL", vec![10.0, 10.0, 10.0, 10.0, 6.0])]);
        let signal = PriceRatioMeanAlpha::new(4).compute_scores(&panel, trading_day(4));
        assert_relative_eq!(signal.score("AAPL").unwrap(), 1.0 - 6.0 / 9.0, epsilon = 1e-12);
    }

    #[test]
    fn test_scale_invariant() {
        let base: Vec<f64> = (0..60).map(|i| 50.0 + (i as f64 * 0.7).sin() * 3.0).collect();
        let scaled: Vec<f64> = base.iter().map(|p| p * 40.0).collect();
        let panel = panel_from_closes(&[("AAPL", base), ("NVDA", scaled)]);

        let signal = PriceRatioMeanAlpha::new(50).compute_scores(&panel, trading_day(59));
        assert_relative_eq!(
            signal.score("AAPL").unwrap(),
            signal.score("NVDA").unwrap(),
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_constant_prices_score_zero() {
        let panel = panel_from_closes(&[
            ("AAPL", vec![100.1; 60]),
            ("MSFT", vec![300.3; 60]),
            ("NVDA", vec![33.33; 60]),
            ("TSLA", vec![0.1; 60]),
        ]);
        let signal = PriceRatioMeanAlpha::new(50).compute_scores(&panel, trading_day(59));

        assert_eq!(signal.len(), 4);
        assert!(signal.scores.values().all(|s| *s == 0.0));
    }

    #[test]
    fn test_insufficient_history_excluded() {
        let panel = panel_from_closes(&[("AAPL", vec![10.0; 50])]);
        let signal = PriceRatioMeanAlpha::new(50).compute_scores(&panel, trading_day(49));
        assert!(signal.is_empty());
        assert_eq!(signal.excluded.len(), 1);
    }
}
