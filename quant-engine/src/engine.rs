use std::time::Instant;

use chrono::NaiveDate;
use common::{BacktestResult, EngineConfig, EngineError, Result, SignalCoverage};
use log::{debug, info};

use crate::alpha::Alpha;
use crate::data::PricePanel;
use crate::metrics::MetricsCalculator;
use crate::portfolio::Portfolio;
use crate::sizing::{PositionSizer, TrailingVolatility};

/// Daily-rebalancing backtest engine.
///
/// Holds only parameters; every run builds its own portfolio, so one engine can serve
/// concurrent runs over the same panel.
#[derive(Debug, Clone)]
pub struct BacktestEngine {
    initial_capital: f64,
    start_date: NaiveDate,
    end_date: NaiveDate,
    volatility_lookback: usize,
    sizer: PositionSizer,
}

impl BacktestEngine {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            initial_capital: config.initial_capital,
            start_date: config.start_date,
            end_date: config.end_date,
            volatility_lookback: config.sizing.volatility_lookback,
            sizer: PositionSizer::new(config.sizing.clone()),
        }
    }

    /// Same parameters over `[start_date, end_date]`
    pub fn with_dates(&self, start_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self {
            start_date,
            end_date,
            ..self.clone()
        }
    }

    /// Simulate `alpha` over the panel's trading dates inside the configured range.
    ///
    /// Each day: mark held positions to the close, score, size against current equity,
    /// replace the book, record equity. An empty signal holds the current book.
    pub fn run(&self, alpha: &Alpha, panel: &PricePanel) -> Result<BacktestResult> {
        let start_time = Instant::now();

        let range = panel.range_indices(self.start_date, self.end_date);
        if range.is_empty() {
            return Err(EngineError::NoData(format!(
                "no trading dates between {} and {}",
                self.start_date, self.end_date
            )));
        }

        let mut portfolio = Portfolio::new(self.initial_capital);
        let volatility = TrailingVolatility::new(panel, self.volatility_lookback);
        let mut coverage = SignalCoverage::default();
        let mut equity_curve: Vec<(NaiveDate, f64)> = Vec::with_capacity(range.len());

        for idx in range {
            let Some(date) = panel.date(idx) else { break };

            portfolio.mark_to_market(panel, idx);

            let signal = alpha.compute_scores(panel, date);
            coverage.excluded_observations += signal.excluded.len() as u32;

            if signal.is_empty() {
                coverage.empty_signal_days += 1;
                debug!("{} {}: empty signal, holding", alpha.name(), date);
            } else {
                coverage.signal_days += 1;
                let outcome = self.sizer.size_positions(
                    &signal,
                    panel,
                    date,
                    portfolio.equity(),
                    &volatility,
                );
                coverage.degenerate_volatility += outcome.degenerate_volatility;
                portfolio.rebalance(outcome.positions, date);
            }

            equity_curve.push((date, portfolio.equity()));
        }

        let trades = portfolio.trades().to_vec();
        let metrics =
            MetricsCalculator::calculate(&equity_curve, trades.len(), self.initial_capital);
        let drawdown_curve = MetricsCalculator::calculate_drawdown_curve(&equity_curve);
        let (start_date, end_date) = match (equity_curve.first(), equity_curve.last()) {
            (Some(first), Some(last)) => (first.0, last.0),
            _ => (self.start_date, self.end_date),
        };

        info!(
            "{}: {} days, return {:.2}%, sharpe {:.2}, {} trades in {}ms",
            alpha.name(),
            equity_curve.len(),
            metrics.total_return_pct,
            metrics.sharpe_ratio,
            trades.len(),
            start_time.elapsed().as_millis()
        );

        Ok(BacktestResult {
            strategy: alpha.name().to_string(),
            metrics,
            equity_curve,
            drawdown_curve,
            trades,
            start_date,
            end_date,
            initial_capital: self.initial_capital,
            final_equity: portfolio.equity(),
            realized_pnl: portfolio.realized_pnl(),
            coverage,
        })
    }
}
