use chrono::NaiveDate;
use common::AlphaSignal;

use super::score_each_ticker;
use crate::data::PricePanel;
use crate::indicators::{is_negligible, mean, std_dev};

/// Buys tickers trading below their trailing mean and sells those above it
#[derive(Debug, Clone, PartialEq)]
pub struct MeanReversalAlpha {
    pub window: usize,
}

impl MeanReversalAlpha {
    pub const NAME: &'static str = "MeanReversalAlpha";

    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(2),
        }
    }

    pub fn min_history(&self) -> usize {
        self.window + 1
    }

    pub fn compute_scores(&self, panel: &PricePanel, as_of: NaiveDate) -> AlphaSignal {
        score_each_ticker(panel, as_of, self.min_history(), |closes| {
            // The window includes the decision date's close
            let window = &closes[closes.len() - self.window..];
            let price = window[window.len() - 1];
            reversal_score(price, mean(window), std_dev(window))
        })
    }
}

/// Negative z-score of `price` against a mean and standard deviation; 0 when the
/// deviation is negligible next to the price level
pub fn reversal_score(price: f64, mean: f64, std: f64) -> f64 {
    if is_negligible(std, mean) {
        return 0.0;
    }
    -(price - mean) / std
}
