use chrono::NaiveDate;
use common::{AlphaSignal, ExclusionReason, Regime};
use log::trace;

use super::Alpha;
use crate::data::PricePanel;
use crate::regime::RegimeDetector;

/// Picks the trend or reversion alpha by market regime.
///
/// TRENDING emits the trend alpha, MEAN_REVERTING the reversion alpha. VOLATILE and
/// NEUTRAL blend both 50/50 scaled by `dampening`.
#[derive(Debug, Clone)]
pub struct RegimeSwitchingAlpha {
    trend: Box<Alpha>,
    reversion: Box<Alpha>,
    detector: RegimeDetector,
    dampening: f64,
}

impl RegimeSwitchingAlpha {
    pub const NAME: &'static str = "Regime Switching Alpha";

    pub fn new(trend: Alpha, reversion: Alpha, detector: RegimeDetector, dampening: f64) -> Self {
        Self {
            trend: Box::new(trend),
            reversion: Box::new(reversion),
            detector,
            dampening: dampening.clamp(0.0, 1.0),
        }
    }

    pub fn min_history(&self) -> usize {
        self.trend
            .min_history()
            .max(self.reversion.min_history())
            .max(self.detector.params().window + 1)
    }

    pub fn compute_scores(&self, panel: &PricePanel, as_of: NaiveDate) -> AlphaSignal {
        let state = self
            .detector
            .classify(panel, as_of, self.detector.params().window);
        trace!("{}: regime {} ({:.2})", as_of, state.regime, state.confidence);

        let mut signal = match state.regime {
            Regime::Trending => self.trend.compute_scores(panel, as_of),
            Regime::MeanReverting => self.reversion.compute_scores(panel, as_of),
            Regime::Volatile | Regime::Neutral => self.blend(panel, as_of),
        };
        signal.regime = Some(state);
        signal
    }

    fn blend(&self, panel: &PricePanel, as_of: NaiveDate) -> AlphaSignal {
        let trend = self.trend.compute_scores(panel, as_of);
        let reversion = self.reversion.compute_scores(panel, as_of);

        let mut signal = AlphaSignal::new(as_of);
        for ticker in panel.tickers() {
            match (trend.score(ticker), reversion.score(ticker)) {
                (Some(t), Some(r)) => signal.insert(ticker, self.dampening * 0.5 * (t + r)),
                (None, _) => signal.exclude(
                    ticker,
                    ExclusionReason::MissingFromComponent {
                        alpha: self.trend.name().to_string(),
                    },
                ),
                (_, None) => signal.exclude(
                    ticker,
                    ExclusionReason::MissingFromComponent {
                        alpha: self.reversion.name().to_string(),
                    },
                ),
            }
        }
        signal
    }
}
