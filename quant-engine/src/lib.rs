pub mod alpha;
pub mod data;
pub mod engine;
pub mod indicators;
pub mod metrics;
pub mod portfolio;
pub mod regime;
pub mod sizing;
pub mod system;

pub use alpha::{
    Alpha, CombinedAlpha, MeanReversalAlpha, MomentumAlpha, PriceRatioMeanAlpha,
    RegimeSwitchingAlpha, STRATEGY_NAMES,
};
pub use data::{
    CsvDirectoryProvider, DataSource, InMemoryProvider, LoadReport, PriceDataStore, PricePanel,
    PriceProvider, SnapshotCache, StaticUniverse, SyntheticProvider, TickerUniverse,
};
pub use engine::BacktestEngine;
pub use metrics::MetricsCalculator;
pub use portfolio::Portfolio;
pub use regime::RegimeDetector;
pub use sizing::{PositionSizer, SizingOutcome, TrailingVolatility, VolatilityLookup};
pub use system::{TradingSystem, LOOKBACK_PERIODS};

// Re-export common types
pub use common::{
    AlphaSignal, BacktestResult, Bar, Direction, EngineConfig, EngineError, Exclusion,
    ExclusionReason, PerformanceMetrics, PeriodPerformance, Position, Recommendation,
    RecommendationSet, Regime, RegimeState, Result, Side, SignalCoverage, Trade,
};

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::BTreeMap;

    use chrono::{Duration, NaiveDate};
    use common::Bar;

    use crate::data::PricePanel;

    /// The `i`-th weekday starting Monday 2024-01-01
    pub fn trading_day(i: usize) -> NaiveDate {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        start + Duration::days((i / 5 * 7 + i % 5) as i64)
    }

    /// Panel whose series all start on the first trading day
    pub fn panel_from_closes(series: &[(&str, Vec<f64>)]) -> PricePanel {
        let with_offsets: Vec<(&str, usize, Vec<f64>)> = series
            .iter()
            .map(|(ticker, closes)| (*ticker, 0, closes.clone()))
            .collect();
        panel_with_offsets(&with_offsets)
    }

    /// Panel where each series starts on trading day `offset`
    pub fn panel_with_offsets(series: &[(&str, usize, Vec<f64>)]) -> PricePanel {
        let histories: BTreeMap<String, Vec<Bar>> = series
            .iter()
            .map(|(ticker, offset, closes)| {
                let bars = closes
                    .iter()
                    .enumerate()
                    .map(|(i, &close)| Bar::flat(trading_day(offset + i), close))
                    .collect();
                (ticker.to_string(), bars)
            })
            .collect();
        PricePanel::from_histories(histories).unwrap()
    }
}
