//! Alpha strategies.
//!
//! Every variant maps a price panel and a decision date to per-ticker scores using only
//! bars dated at or before that date.

pub mod combined;
pub mod mean_reversal;
pub mod momentum;
pub mod price_ratio;
pub mod regime_switching;

pub use combined::CombinedAlpha;
pub use mean_reversal::MeanReversalAlpha;
pub use momentum::MomentumAlpha;
pub use price_ratio::PriceRatioMeanAlpha;
pub use regime_switching::RegimeSwitchingAlpha;

use chrono::NaiveDate;
use common::{AlphaSignal, EngineConfig, EngineError, ExclusionReason, Result, ReversionKind};

use crate::data::PricePanel;
use crate::regime::RegimeDetector;

/// Strategy names in registry order
pub const STRATEGY_NAMES: [&str; 5] = [
    MeanReversalAlpha::NAME,
    PriceRatioMeanAlpha::NAME,
    MomentumAlpha::NAME,
    CombinedAlpha::NAME,
    RegimeSwitchingAlpha::NAME,
];

/// Closed set of strategies behind one scoring operation
#[derive(Debug, Clone)]
pub enum Alpha {
    MeanReversal(MeanReversalAlpha),
    PriceRatio(PriceRatioMeanAlpha),
    Momentum(MomentumAlpha),
    Combined(CombinedAlpha),
    RegimeSwitching(RegimeSwitchingAlpha),
}

impl Alpha {
    pub fn name(&self) -> &'static str {
        match self {
            Alpha::MeanReversal(_) => MeanReversalAlpha::NAME,
            Alpha::PriceRatio(_) => PriceRatioMeanAlpha::NAME,
            Alpha::Momentum(_) => MomentumAlpha::NAME,
            Alpha::Combined(_) => CombinedAlpha::NAME,
            Alpha::RegimeSwitching(_) => RegimeSwitchingAlpha::NAME,
        }
    }

    /// Observations a ticker needs before it can be scored
    pub fn min_history(&self) -> usize {
        match self {
            Alpha::MeanReversal(a) => a.min_history(),
            Alpha::PriceRatio(a) => a.min_history(),
            Alpha::Momentum(a) => a.min_history(),
            Alpha::Combined(a) => a.min_history(),
            Alpha::RegimeSwitching(a) => a.min_history(),
        }
    }

    /// Scores for the last trading date at or before `as_of`
    pub fn compute_scores(&self, panel: &PricePanel, as_of: NaiveDate) -> AlphaSignal {
        match self {
            Alpha::MeanReversal(a) => a.compute_scores(panel, as_of),
            Alpha::PriceRatio(a) => a.compute_scores(panel, as_of),
            Alpha::Momentum(a) => a.compute_scores(panel, as_of),
            Alpha::Combined(a) => a.compute_scores(panel, as_of),
            Alpha::RegimeSwitching(a) => a.compute_scores(panel, as_of),
        }
    }

    /// Build a strategy by name from the engine configuration
    pub fn from_config(name: &str, config: &EngineConfig) -> Result<Self> {
        let params = &config.alpha;
        let mean_reversal = MeanReversalAlpha::new(params.mean_reversal_window);
        let price_ratio = PriceRatioMeanAlpha::new(params.price_ratio_window);
        let momentum = MomentumAlpha::new(params.momentum_window);

        let alpha: Alpha = match name {
            MeanReversalAlpha::NAME => mean_reversal.into(),
            PriceRatioMeanAlpha::NAME => price_ratio.into(),
            MomentumAlpha::NAME => momentum.into(),
            CombinedAlpha::NAME => {
                let [w_reversal, w_ratio, w_momentum] = params.combined_weights;
                CombinedAlpha::new(
                    vec![
                        (mean_reversal.into(), w_reversal),
                        (price_ratio.into(), w_ratio),
                        (momentum.into(), w_momentum),
                    ],
                    params.standardize_combined,
                )?
                .into()
            }
            RegimeSwitchingAlpha::NAME => {
                let reversion: Alpha = match params.regime_reversion {
                    ReversionKind::MeanReversal => mean_reversal.into(),
                    ReversionKind::PriceRatio => price_ratio.into(),
                };
                let detector = RegimeDetector::new(config.regime.clone(), config.benchmark.clone());
                RegimeSwitchingAlpha::new(
                    momentum.into(),
                    reversion,
                    detector,
                    config.regime.dampening,
                )
                .into()
            }
            _ => {
                return Err(EngineError::UnknownStrategy {
                    name: name.to_string(),
                    available: STRATEGY_NAMES.iter().map(|s| s.to_string()).collect(),
                })
            }
        };
        Ok(alpha)
    }

    /// Every strategy, in registry order
    pub fn registry(config: &EngineConfig) -> Result<Vec<Alpha>> {
        STRATEGY_NAMES
            .iter()
            .map(|name| Alpha::from_config(name, config))
            .collect()
    }
}

impl From<MeanReversalAlpha> for Alpha {
    fn from(alpha: MeanReversalAlpha) -> Self {
        Alpha::MeanReversal(alpha)
    }
}

impl From<PriceRatioMeanAlpha> for Alpha {
    fn from(alpha: PriceRatioMeanAlpha) -> Self {
        Alpha::PriceRatio(alpha)
    }
}

impl From<MomentumAlpha> for Alpha {
    fn from(alpha: MomentumAlpha) -> Self {
        Alpha::Momentum(alpha)
    }
}

impl From<CombinedAlpha> for Alpha {
    fn from(alpha: CombinedAlpha) -> Self {
        Alpha::Combined(alpha)
    }
}

impl From<RegimeSwitchingAlpha> for Alpha {
    fn from(alpha: RegimeSwitchingAlpha) -> Self {
        Alpha::RegimeSwitching(alpha)
    }
}

/// Score every panel ticker from its last `required` closes (oldest first).
///
/// Tickers without a bar on the decision date, with too little history, or whose score
/// is not finite are excluded with the reason recorded.
pub(crate) fn score_each_ticker<F>(
    panel: &PricePanel,
    as_of: NaiveDate,
    required: usize,
    score: F,
) -> AlphaSignal
where
    F: Fn(&[f64]) -> f64,
{
    let mut signal = AlphaSignal::new(as_of);
    let idx = panel.index_at_or_before(as_of);

    for ticker in panel.tickers() {
        let Some(idx) = idx.filter(|&i| panel.bar(ticker, i).is_some()) else {
            signal.exclude(ticker, ExclusionReason::NoPrice);
            continue;
        };
        match panel.trailing_closes(ticker, idx, required) {
            Some(closes) => {
                let value = score(&closes);
                if value.is_finite() {
                    signal.insert(ticker, value);
                } else {
                    signal.exclude(ticker, ExclusionReason::NonFiniteScore);
                }
            }
            None => signal.exclude(
                ticker,
                ExclusionReason::InsufficientHistory {
                    required,
                    available: panel.observations(ticker, idx),
                },
            ),
        }
    }

    signal
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_order_and_names() {
        let config = EngineConfig::default();
        let names: Vec<&str> = Alpha::registry(&config)
            .unwrap()
            .iter()
            .map(|a| a.name())
            .collect();
        assert_eq!(names, STRATEGY_NAMES.to_vec());
        assert_eq!(
            names,
            vec![
                "MeanReversalAlpha",
                "PriceRatioMeanAlpha",
                "MomentumAlpha",
                "Combined Alpha",
                "Regime Switching Alpha",
            ]
        );
    }

    #[test]
    fn test_unknown_strategy() {
        let result = Alpha::from_config("Buy And Hold", &EngineConfig::default());
        match result {
            Err(EngineError::UnknownStrategy { name, available }) => {
                assert_eq!(name, "Buy And Hold");
                assert_eq!(available.len(), 5);
            }
            other => panic!("expected UnknownStrategy, got {:?}", other),
        }
    }

    #[test]
    fn test_min_history_of_composites() {
        let config = EngineConfig::default();
        let combined = Alpha::from_config("Combined Alpha", &config).unwrap();
        assert_eq!(combined.min_history(), 61);

        let switching = Alpha::from_config("Regime Switching Alpha", &config).unwrap();
        assert_eq!(switching.min_history(), 61);
    }
}
