use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{Duration, NaiveDate, Utc};
use common::{
    BacktestResult, EngineConfig, EngineError, Exclusion, PeriodPerformance, Recommendation,
    RecommendationSet, Result,
};
use log::{debug, info, warn};
use rayon::prelude::*;

use crate::alpha::Alpha;
use crate::data::{
    DataSource, LoadReport, PriceDataStore, PricePanel, PriceProvider, StaticUniverse,
    TickerUniverse,
};
use crate::engine::BacktestEngine;
use crate::sizing::{PositionSizer, TrailingVolatility};

/// Lookback windows backtested behind every recommendation, in calendar days
pub const LOOKBACK_PERIODS: [(&str, i64); 3] = [("1_month", 30), ("6_months", 180), ("2_years", 730)];

/// Composes data, strategies, sizing and the backtest engine.
///
/// The panel is loaded once at construction and shared read-only by every run.
pub struct TradingSystem {
    config: EngineConfig,
    panel: PricePanel,
    excluded: Vec<Exclusion>,
    source: DataSource,
    strategies: Vec<Alpha>,
    engine: BacktestEngine,
    sizer: PositionSizer,
}

impl TradingSystem {
    /// Validate `config` and load its ticker list from `provider`
    pub fn new(config: EngineConfig, provider: Arc<dyn PriceProvider>) -> Result<Self> {
        let config = config.validated()?;
        let universe = StaticUniverse::new(&config.tickers)?;
        let store = PriceDataStore::new(provider, &config.data);
        Self::with_store(config, &store, &universe)
    }

    /// Load `universe` through an existing store
    pub fn with_store(
        config: EngineConfig,
        store: &PriceDataStore,
        universe: &dyn TickerUniverse,
    ) -> Result<Self> {
        let config = config.validated()?;
        let report = store.load(universe, config.load_start(), config.end_date)?;
        if report.is_degraded() {
            warn!(
                "Running on degraded data: {} tickers excluded, source {:?}",
                report.excluded.len(),
                report.source
            );
        }
        Self::from_report(config, report)
    }

    /// Wrap an already-built panel
    pub fn from_panel(config: EngineConfig, panel: PricePanel) -> Result<Self> {
        let config = config.validated()?;
        Self::from_report(
            config,
            LoadReport {
                panel,
                excluded: Vec::new(),
                source: DataSource::Provider,
            },
        )
    }

    fn from_report(config: EngineConfig, report: LoadReport) -> Result<Self> {
        let strategies = Alpha::registry(&config)?;
        let engine = BacktestEngine::new(&config);
        let sizer = PositionSizer::new(config.sizing.clone());
        Ok(Self {
            config,
            panel: report.panel,
            excluded: report.excluded,
            source: report.source,
            strategies,
            engine,
            sizer,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn panel(&self) -> &PricePanel {
        &self.panel
    }

    /// Tickers dropped while loading
    pub fn excluded(&self) -> &[Exclusion] {
        &self.excluded
    }

    pub fn data_source(&self) -> &DataSource {
        &self.source
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    fn strategy(&self, name: &str) -> Result<&Alpha> {
        self.strategies
            .iter()
            .find(|s| s.name() == name)
            .ok_or_else(|| EngineError::UnknownStrategy {
                name: name.to_string(),
                available: self.strategy_names().iter().map(|s| s.to_string()).collect(),
            })
    }

    pub fn run_backtest(&self, name: &str) -> Result<BacktestResult> {
        let alpha = self.strategy(name)?;
        self.engine.run(alpha, &self.panel)
    }

    /// Backtest every strategy in parallel over the shared panel
    pub fn run_all_backtests(&self) -> Result<BTreeMap<String, BacktestResult>> {
        let results: Vec<BacktestResult> = self
            .strategies
            .par_iter()
            .map(|alpha| self.engine.run(alpha, &self.panel))
            .collect::<Result<_>>()?;

        Ok(results
            .into_iter()
            .map(|r| (r.strategy.clone(), r))
            .collect())
    }

    /// Strategy with the highest Sharpe ratio; ties go to the earlier registry entry
    pub fn best_strategy(&self) -> Result<String> {
        let results = self.run_all_backtests()?;
        let mut best: Option<(&str, f64)> = None;
        for name in self.strategy_names() {
            let Some(result) = results.get(name) else { continue };
            let sharpe = result.metrics.sharpe_ratio;
            if best.map_or(true, |(_, s)| sharpe > s) {
                best = Some((name, sharpe));
            }
        }
        let (name, sharpe) = best.ok_or_else(|| EngineError::NoData("no strategies ran".into()))?;
        info!("Best strategy: {} (sharpe {:.2})", name, sharpe);
        Ok(name.to_string())
    }

    /// Target positions as of `as_of` (default today) for one strategy or all of them.
    ///
    /// Prices come from the last trading date at or before `as_of`.
    pub fn get_trading_recommendations(
        &self,
        strategy: Option<&str>,
        as_of: Option<NaiveDate>,
    ) -> Result<BTreeMap<String, RecommendationSet>> {
        let as_of = as_of.unwrap_or_else(|| Utc::now().date_naive());
        let selected: Vec<&Alpha> = match strategy {
            Some(name) => vec![self.strategy(name)?],
            None => self.strategies.iter().collect(),
        };

        selected
            .par_iter()
            .map(|alpha| {
                let set = self.recommend(alpha, as_of)?;
                Ok((set.strategy.clone(), set))
            })
            .collect()
    }

    /// Recommendations of the strategy with the highest full-range Sharpe ratio
    pub fn get_best_recommendation(&self, as_of: Option<NaiveDate>) -> Result<RecommendationSet> {
        let as_of = as_of.unwrap_or_else(|| Utc::now().date_naive());
        let best = self.best_strategy()?;
        self.recommend(self.strategy(&best)?, as_of)
    }

    /// Backtest `alpha` over each lookback window ending on `reference_date`.
    ///
    /// Windows start no earlier than the configured start date, or the first loaded date
    /// when the reference date precedes it. A window that cannot run is skipped.
    fn period_performance(&self, alpha: &Alpha, reference_date: NaiveDate) -> Vec<PeriodPerformance> {
        let floor = if reference_date >= self.config.start_date {
            Some(self.config.start_date)
        } else {
            self.panel.first_date()
        };
        let Some(floor) = floor else {
            return Vec::new();
        };

        LOOKBACK_PERIODS
            .iter()
            .filter_map(|&(period, days)| {
                let start = (reference_date - Duration::days(days)).max(floor);
                match self.engine.with_dates(start, reference_date).run(alpha, &self.panel) {
                    Ok(result) => Some(PeriodPerformance {
                        period: period.to_string(),
                        start_date: result.start_date,
                        end_date: result.end_date,
                        sharpe_ratio: result.metrics.sharpe_ratio,
                        total_return_pct: result.metrics.total_return_pct,
                        max_drawdown_pct: result.metrics.max_drawdown_pct,
                    }),
                    Err(e) => {
                        debug!("{} {} backtest skipped: {}", alpha.name(), period, e);
                        None
                    }
                }
            })
            .collect()
    }

    fn recommend(&self, alpha: &Alpha, as_of: NaiveDate) -> Result<RecommendationSet> {
        let idx = self.panel.index_at_or_before(as_of).ok_or_else(|| {
            EngineError::NoData(format!("no price data on or before {}", as_of))
        })?;
        let reference_date = self
            .panel
            .date(idx)
            .ok_or_else(|| EngineError::NoData(format!("no trading date at index {}", idx)))?;

        let capital = self.config.initial_capital;
        let signal = alpha.compute_scores(&self.panel, reference_date);
        let volatility = TrailingVolatility::new(&self.panel, self.config.sizing.volatility_lookback);
        let outcome =
            self.sizer
                .size_positions(&signal, &self.panel, reference_date, capital, &volatility);

        let excluded_tickers: BTreeSet<&str> = signal
            .excluded
            .iter()
            .chain(outcome.excluded.iter())
            .map(|e| e.ticker.as_str())
            .collect();

        let mut positions: Vec<Recommendation> = outcome
            .positions
            .values()
            .map(|p| Recommendation {
                ticker: p.ticker.clone(),
                direction: p.direction,
                units: p.units,
                price: p.entry_price,
                capital: p.cost(),
                allocation_pct: p.allocation_pct,
                alpha_score: signal.score(&p.ticker).unwrap_or(0.0),
                volatility: outcome.volatilities.get(&p.ticker).copied().unwrap_or(0.0),
                as_of: reference_date,
            })
            .collect();
        positions.sort_by(|a, b| {
            b.alpha_score
                .abs()
                .total_cmp(&a.alpha_score.abs())
                .then_with(|| a.ticker.cmp(&b.ticker))
        });

        let periods = self.period_performance(alpha, reference_date);
        // Strictly greater: ties keep the shorter window
        let best = periods.iter().fold(None::<&PeriodPerformance>, |best, p| match best {
            Some(b) if p.sharpe_ratio <= b.sharpe_ratio => Some(b),
            _ => Some(p),
        });

        Ok(RecommendationSet {
            strategy: alpha.name().to_string(),
            as_of,
            reference_date,
            capital,
            invested: outcome.invested,
            cash_position_pct: outcome.cash_remaining / capital * 100.0,
            positions,
            excluded_tickers: excluded_tickers.len(),
            regime: signal.regime,
            best_period: best.map(|p| p.period.clone()),
            sharpe_ratio: best.map(|p| p.sharpe_ratio),
            periods,
        })
    }
}
