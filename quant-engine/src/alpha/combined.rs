use std::collections::BTreeMap;

use chrono::NaiveDate;
use common::{AlphaSignal, EngineError, ExclusionReason, Result};

use super::Alpha;
use crate::data::PricePanel;
use crate::indicators::zscores;

/// Weighted average of component alphas.
///
/// A ticker is scored only when every weighted component scored it that date.
#[derive(Debug, Clone)]
pub struct CombinedAlpha {
    components: Vec<(Alpha, f64)>,
    standardize: bool,
}

impl CombinedAlpha {
    pub const NAME: &'static str = "Combined Alpha";

    /// Zero-weight components are dropped. Fails when no component has a positive weight.
    pub fn new(components: Vec<(Alpha, f64)>, standardize: bool) -> Result<Self> {
        if let Some((alpha, w)) = components.iter().find(|(_, w)| !w.is_finite() || *w < 0.0) {
            return Err(EngineError::Configuration(format!(
                "invalid weight {} for {}",
                w,
                alpha.name()
            )));
        }
        let components: Vec<(Alpha, f64)> =
            components.into_iter().filter(|(_, w)| *w > 0.0).collect();
        if components.is_empty() {
            return Err(EngineError::Configuration(
                "combined alpha needs at least one positive weight".to_string(),
            ));
        }
        Ok(Self {
            components,
            standardize,
        })
    }

    pub fn components(&self) -> &[(Alpha, f64)] {
        &self.components
    }

    pub fn min_history(&self) -> usize {
        self.components
            .iter()
            .map(|(alpha, _)| alpha.min_history())
            .max()
            .unwrap_or(0)
    }

    pub fn compute_scores(&self, panel: &PricePanel, as_of: NaiveDate) -> AlphaSignal {
        let component_scores: Vec<(&'static str, f64, BTreeMap<String, f64>)> = self
            .components
            .iter()
            .map(|(alpha, weight)| {
                let scores = alpha.compute_scores(panel, as_of).scores;
                let scores = if self.standardize {
                    standardized(scores)
                } else {
                    scores
                };
                (alpha.name(), *weight, scores)
            })
            .collect();
        let total_weight: f64 = component_scores.iter().map(|(_, w, _)| w).sum();

        let mut signal = AlphaSignal::new(as_of);
        for ticker in panel.tickers() {
            let mut weighted = 0.0;
            let mut missing = None;
            for (name, weight, scores) in &component_scores {
                match scores.get(ticker) {
                    Some(score) => weighted += weight * score,
                    None => {
                        missing = Some(*name);
                        break;
                    }
                }
            }
            match missing {
                Some(alpha) => signal.exclude(
                    ticker,
                    ExclusionReason::MissingFromComponent {
                        alpha: alpha.to_string(),
                    },
                ),
                None => signal.insert(ticker, weighted / total_weight),
            }
        }
        signal
    }
}

/// Cross-sectional z-scores of one component's scores
fn standardized(scores: BTreeMap<String, f64>) -> BTreeMap<String, f64> {
    let values: Vec<f64> = scores.values().copied().collect();
    scores.into_keys().zip(zscores(&values)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alpha::{MeanReversalAlpha, MomentumAlpha};
    use crate::test_support::{panel_from_closes, panel_with_offsets, trading_day};
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    fn rising(n: usize, step: f64) -> Vec<f64> {
        (0..n).map(|i| 100.0 + step * i as f64).collect()
    }

    #[test]
    fn test_weighted_average() {
        let panel = panel_from_closes(&[("AAPL", rising(11, 1.0))]);
        let momentum = MomentumAlpha::new(10);
        let short_momentum = MomentumAlpha::new(5);
        let combined = CombinedAlpha::new(
            vec![(momentum.clone().into(), 3.0), (short_momentum.clone().into(), 1.0)],
            false,
        )
        .unwrap();

        let day = trading_day(10);
        let m = momentum.compute_scores(&panel, day).score("AAPL").unwrap();
        let s = short_momentum.compute_scores(&panel, day).score("AAPL").unwrap();
        let signal = combined.compute_scores(&panel, day);

        assert_relative_eq!(
            signal.score("AAPL").unwrap(),
            (3.0 * m + s) / 4.0,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_ticker_missing_from_a_component_is_excluded() {
        // NVDA has enough history for the short window only
        let panel = panel_with_offsets(&[
            ("AAPL", 0, rising(31, 1.0)),
            ("NVDA", 20, rising(11, 2.0)),
        ]);
        let combined = CombinedAlpha::new(
            vec![
                (MeanReversalAlpha::new(5).into(), 1.0),
                (MomentumAlpha::new(20).into(), 1.0),
            ],
            false,
        )
        .unwrap();

        let signal = combined.compute_scores(&panel, trading_day(30));
        assert!(signal.score("AAPL").is_some());
        assert_eq!(signal.score("NVDA"), None);
        assert_eq!(
            signal.excluded[0].reason,
            ExclusionReason::MissingFromComponent {
                alpha: "MomentumAlpha".to_string()
            }
        );
    }

    #[test]
    fn test_standardized_components() {
        let panel = panel_from_closes(&[
            ("AAPL", rising(11, 1.0)),
            ("MSFT", rising(11, 2.0)),
            ("TSLA", rising(11, -1.0)),
        ]);
        let combined =
            CombinedAlpha::new(vec![(MomentumAlpha::new(10).into(), 1.0)], true).unwrap();

        let signal = combined.compute_scores(&panel, trading_day(10));
        let sum: f64 = signal.scores.values().sum();
        assert_abs_diff_eq!(sum, 0.0, epsilon = 1e-9);
        assert!(signal.score("MSFT").unwrap() > signal.score("AAPL").unwrap());
        assert!(signal.score("TSLA").unwrap() < 0.0);
    }

    #[test]
    fn test_weights_validation() {
        let zero = CombinedAlpha::new(vec![(MomentumAlpha::new(10).into(), 0.0)], false);
        assert!(matches!(zero, Err(EngineError::Configuration(_))));

        let negative = CombinedAlpha::new(vec![(MomentumAlpha::new(10).into(), -1.0)], false);
        assert!(matches!(negative, Err(EngineError::Configuration(_))));

        let dropped = CombinedAlpha::new(
            vec![
                (MomentumAlpha::new(10).into(), 1.0),
                (MeanReversalAlpha::new(5).into(), 0.0),
            ],
            false,
        )
        .unwrap();
        assert_eq!(dropped.components().len(), 1);
    }
}
