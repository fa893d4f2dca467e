use chrono::NaiveDate;
use common::{Regime, RegimeParameters, RegimeState};

use crate::data::PricePanel;
use crate::indicators::{is_negligible, lag1_autocorrelation, mean, simple_returns, std_dev};

const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Classifies the market from a trailing window of the market series.
///
/// Stateless: identical (panel, date, window) inputs always give the same state.
#[derive(Debug, Clone)]
pub struct RegimeDetector {
    params: RegimeParameters,
    benchmark: Option<String>,
}

impl RegimeDetector {
    pub fn new(params: RegimeParameters, benchmark: Option<String>) -> Self {
        Self { params, benchmark }
    }

    pub fn params(&self) -> &RegimeParameters {
        &self.params
    }

    /// Classify using the last `window` daily returns at or before `as_of`
    pub fn classify(&self, panel: &PricePanel, as_of: NaiveDate, window: usize) -> RegimeState {
        let Some(idx) = panel.index_at_or_before(as_of) else {
            return RegimeState::neutral();
        };
        match self.market_returns(panel, idx, window) {
            Some(returns) => classify_returns(&self.params, &returns),
            None => RegimeState::neutral(),
        }
    }

    /// Benchmark returns when the benchmark is in the panel, otherwise an
    /// equal-weighted average of the universe's daily returns.
    fn market_returns(&self, panel: &PricePanel, idx: usize, window: usize) -> Option<Vec<f64>> {
        if window < 2 {
            return None;
        }
        if let Some(benchmark) = self.benchmark.as_deref().filter(|b| panel.contains_ticker(b)) {
            let closes = panel.trailing_closes(benchmark, idx, window + 1)?;
            return Some(simple_returns(&closes));
        }

        if idx < window {
            return None;
        }
        let returns: Vec<f64> = (idx + 1 - window..=idx)
            .filter_map(|k| {
                let day: Vec<f64> = panel
                    .tickers()
                    .iter()
                    .filter_map(|t| {
                        let prev = panel.close(t, k - 1)?;
                        let curr = panel.close(t, k)?;
                        Some(curr / prev - 1.0)
                    })
                    .collect();
                (!day.is_empty()).then(|| mean(&day))
            })
            .collect();

        (returns.len() >= 3).then_some(returns)
    }
}

/// Classify a return series.
///
/// Strict inequalities throughout: a statistic sitting exactly on a threshold
/// falls through to NEUTRAL.
pub fn classify_returns(params: &RegimeParameters, returns: &[f64]) -> RegimeState {
    let n = returns.len();
    if n < 3 {
        return RegimeState::neutral();
    }

    let daily_std = std_dev(returns);
    let volatility = daily_std * TRADING_DAYS_PER_YEAR.sqrt();
    let scale = returns.iter().fold(0.0_f64, |acc, r| acc.max(r.abs()));
    let trend_strength = if !is_negligible(daily_std, scale) {
        returns.iter().sum::<f64>().abs() / (daily_std * (n as f64).sqrt())
    } else {
        0.0
    };
    let autocorrelation = lag1_autocorrelation(returns);

    let (regime, confidence) = if volatility > params.volatile_threshold {
        (
            Regime::Volatile,
            excess(volatility, params.volatile_threshold),
        )
    } else if trend_strength > params.trending_threshold {
        (
            Regime::Trending,
            excess(trend_strength, params.trending_threshold),
        )
    } else if trend_strength < params.reverting_threshold
        && autocorrelation < params.autocorrelation_threshold
    {
        let confidence = (params.reverting_threshold - trend_strength) / params.reverting_threshold;
        (Regime::MeanReverting, confidence.clamp(0.0, 1.0))
    } else {
        (Regime::Neutral, 0.0)
    };

    RegimeState {
        regime,
        confidence,
        volatility,
        trend_strength,
        autocorrelation,
    }
}

fn excess(value: f64, threshold: f64) -> f64 {
    ((value - threshold) / threshold).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{panel_from_closes, trading_day};

    fn alternating(a: f64, b: f64, n: usize) -> Vec<f64> {
        (0..n).map(|i| if i % 2 == 0 { a } else { b }).collect()
    }

    fn compounding(returns: &[f64], start: f64) -> Vec<f64> {
        let mut price = start;
        let mut closes = vec![price];
        for r in returns {
            price *= 1.0 + r;
            closes.push(price);
        }
        closes
    }

    fn detector() -> RegimeDetector {
        RegimeDetector::new(RegimeParameters::default(), None)
    }

    #[test]
    fn test_trending_market() {
        let closes = compounding(&alternating(0.002, 0.004, 80), 100.0);
        let panel = panel_from_closes(&[("AAPL", closes.clone()), ("MSFT", closes)]);

        let state = detector().classify(&panel, trading_day(80), 60);
        assert_eq!(state.regime, Regime::Trending);
        assert!(state.confidence > 0.0);
    }

    #[test]
    fn test_mean_reverting_market() {
        let closes = alternating(100.0, 101.0, 81);
        let panel = panel_from_closes(&[("AAPL", closes)]);

        let state = detector().classify(&panel, trading_day(80), 60);
        assert_eq!(state.regime, Regime::MeanReverting);
        assert!(state.autocorrelation < 0.0);
    }

    #[test]
    fn test_volatile_market() {
        let closes = alternating(100.0, 110.0, 81);
        let panel = panel_from_closes(&[("AAPL", closes)]);

        let state = detector().classify(&panel, trading_day(80), 60);
        assert_eq!(state.regime, Regime::Volatile);
        assert!(state.volatility > 0.35);
    }

    #[test]
    fn test_flat_market_is_neutral() {
        let panel = panel_from_closes(&[
            ("AAPL", vec![100.0; 81]),
            ("MSFT", vec![100.1; 81]),
            ("NVDA", vec![7.77; 81]),
        ]);
        let state = detector().classify(&panel, trading_day(80), 60);
        assert_eq!(state.regime, Regime::Neutral);
        assert_eq!(state.volatility, 0.0);
        assert_eq!(state.trend_strength, 0.0);
    }

    #[test]
    fn test_insufficient_history_is_neutral() {
        let panel = panel_from_closes(&[("AAPL", alternating(100.0, 110.0, 20))]);
        let state = detector().classify(&panel, trading_day(19), 60);
        assert_eq!(state, RegimeState::neutral());
    }

    #[test]
    fn test_classification_is_deterministic() {
        let closes = compounding(&alternating(0.01, -0.004, 120), 50.0);
        let panel = panel_from_closes(&[("AAPL", closes)]);
        let detector = detector();

        let first = detector.classify(&panel, trading_day(100), 60);
        for _ in 0..5 {
            assert_eq!(detector.classify(&panel, trading_day(100), 60), first);
        }
    }

    #[test]
    fn test_benchmark_series_is_used_when_present() {
        let trending = compounding(&alternating(0.002, 0.004, 80), 100.0);
        let choppy = alternating(100.0, 110.0, 81);
        let panel = panel_from_closes(&[("SPY", trending), ("AAPL", choppy)]);

        let with_benchmark = RegimeDetector::new(RegimeParameters::default(), Some("SPY".into()));
        let state = with_benchmark.classify(&panel, trading_day(80), 60);
        assert_eq!(state.regime, Regime::Trending);
    }

    #[test]
    fn test_threshold_boundaries_are_neutral() {
        // Zero-mean returns with one-sided autocorrelation: only the thresholds decide
        let returns = [0.01, -0.01, 0.01, -0.01, 0.01, -0.01];
        let state = classify_returns(&RegimeParameters::default(), &returns);
        assert_eq!(state.regime, Regime::MeanReverting);

        // Volatility exactly on the threshold is not VOLATILE
        let params = RegimeParameters {
            volatile_threshold: state.volatility,
            ..RegimeParameters::default()
        };
        assert_ne!(classify_returns(&params, &returns).regime, Regime::Volatile);

        // Trend strength exactly on the reverting threshold is not MEAN_REVERTING
        let params = RegimeParameters {
            reverting_threshold: state.trend_strength,
            ..RegimeParameters::default()
        };
        assert_eq!(classify_returns(&params, &returns).regime, Regime::Neutral);
    }
}
