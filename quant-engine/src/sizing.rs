use std::collections::BTreeMap;

use chrono::NaiveDate;
use common::{AlphaSignal, Direction, Exclusion, ExclusionReason, Position, SizingParameters};
use log::debug;

use crate::data::PricePanel;
use crate::indicators::{sample_std_dev, simple_returns};

/// Tolerance absorbing floating-point error before truncating to whole units
const UNIT_TOLERANCE: f64 = 1e-9;

/// Daily volatility estimate for a ticker at a panel index
pub trait VolatilityLookup {
    fn volatility(&self, ticker: &str, idx: usize) -> Option<f64>;
}

/// Sample standard deviation of the trailing daily returns
#[derive(Debug, Clone, Copy)]
pub struct TrailingVolatility<'a> {
    panel: &'a PricePanel,
    lookback: usize,
}

impl<'a> TrailingVolatility<'a> {
    pub fn new(panel: &'a PricePanel, lookback: usize) -> Self {
        Self {
            panel,
            lookback: lookback.max(2),
        }
    }
}

impl VolatilityLookup for TrailingVolatility<'_> {
    fn volatility(&self, ticker: &str, idx: usize) -> Option<f64> {
        let closes = self.panel.trailing_closes(ticker, idx, self.lookback + 1)?;
        Some(sample_std_dev(&simple_returns(&closes)))
    }
}

/// Result of one sizing pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SizingOutcome {
    pub positions: BTreeMap<String, Position>,
    /// Daily volatility used for each sized ticker
    pub volatilities: BTreeMap<String, f64>,
    pub invested: f64,
    pub cash_remaining: f64,
    pub excluded: Vec<Exclusion>,
    /// Tickers whose volatility was at or below the floor
    pub degenerate_volatility: u32,
}

/// Turns alpha scores into whole-unit target positions
#[derive(Debug, Clone)]
pub struct PositionSizer {
    params: SizingParameters,
}

impl PositionSizer {
    pub fn new(params: SizingParameters) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &SizingParameters {
        &self.params
    }

    /// Size `signal` against `capital` using prices of the last trading date at or before `as_of`.
    ///
    /// Weights are proportional to score over volatility and normalized so their absolute
    /// values sum to one. Each position is then capped at `max_position_pct` of capital;
    /// whatever the cap removes stays in cash. Total cost never exceeds
    /// `capital * max_gross_exposure`.
    pub fn size_positions(
        &self,
        signal: &AlphaSignal,
        panel: &PricePanel,
        as_of: NaiveDate,
        capital: f64,
        volatility: &dyn VolatilityLookup,
    ) -> SizingOutcome {
        let mut outcome = SizingOutcome {
            cash_remaining: capital.max(0.0),
            ..SizingOutcome::default()
        };
        let Some(idx) = panel.index_at_or_before(as_of) else {
            for ticker in signal.scores.keys() {
                outcome
                    .excluded
                    .push(Exclusion::new(ticker.as_str(), ExclusionReason::NoPrice));
            }
            return outcome;
        };
        if !capital.is_finite() || capital <= 0.0 {
            return outcome;
        }

        // (ticker, score, price, raw weight)
        let mut candidates: Vec<(&str, f64, f64, f64)> = Vec::new();
        for (ticker, &score) in &signal.scores {
            if !score.is_finite() {
                outcome
                    .excluded
                    .push(Exclusion::new(ticker.as_str(), ExclusionReason::NonFiniteScore));
                continue;
            }
            if score == 0.0 {
                continue;
            }
            let Some(price) = panel.close(ticker, idx).filter(|p| *p > 0.0) else {
                outcome
                    .excluded
                    .push(Exclusion::new(ticker.as_str(), ExclusionReason::NoPrice));
                continue;
            };

            let vol = volatility
                .volatility(ticker, idx)
                .filter(|v| v.is_finite())
                .unwrap_or(self.params.default_volatility);
            if vol <= self.params.volatility_floor {
                outcome.degenerate_volatility += 1;
            }
            let effective = vol.max(self.params.volatility_floor);
            outcome.volatilities.insert(ticker.clone(), vol);
            let raw = score * self.params.target_volatility / effective;
            candidates.push((ticker, score, price, raw));
        }

        let gross: f64 = candidates.iter().map(|c| c.3.abs()).sum();
        if gross <= 0.0 || !gross.is_finite() {
            outcome.volatilities.clear();
            return outcome;
        }

        for (ticker, score, price, raw) in candidates {
            let fraction = (raw.abs() / gross * self.params.max_gross_exposure)
                .min(self.params.max_position_pct);
            let dollars = fraction * capital;
            let units = (dollars / price + UNIT_TOLERANCE).floor() as u64;
            if units == 0 {
                debug!("{}: ${:.2} buys less than one unit at {:.2}", ticker, dollars, price);
                outcome.volatilities.remove(ticker);
                outcome
                    .excluded
                    .push(Exclusion::new(ticker, ExclusionReason::BelowOneShare));
                continue;
            }

            let position = Position {
                ticker: ticker.to_string(),
                direction: Direction::from_score(score),
                units,
                entry_price: price,
                allocated_capital: dollars,
                allocation_pct: fraction * 100.0,
            };
            outcome.invested += position.cost();
            outcome.positions.insert(ticker.to_string(), position);
        }
        outcome.cash_remaining = capital - outcome.invested;
        outcome
    }
}
