use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Daily OHLCV bar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

impl Bar {
    pub fn new(date: NaiveDate, open: f64, high: f64, low: f64, close: f64, volume: u64) -> Self {
        Self {
            date,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Bar with every price field set to `close`
    pub fn flat(date: NaiveDate, close: f64) -> Self {
        Self::new(date, close, close, close, close, 0)
    }
}

/// Why a ticker was left out of a load, signal, or sizing pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExclusionReason {
    NotFound,
    Unavailable { reason: String },
    InsufficientHistory { required: usize, available: usize },
    NoPrice,
    MissingFromComponent { alpha: String },
    NonFiniteScore,
    BelowOneShare,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exclusion {
    pub ticker: String,
    pub reason: ExclusionReason,
}

impl Exclusion {
    pub fn new(ticker: impl Into<String>, reason: ExclusionReason) -> Self {
        Self {
            ticker: ticker.into(),
            reason,
        }
    }
}

/// Market regime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Regime {
    Trending,
    MeanReverting,
    Volatile,
    Neutral,
}

impl std::fmt::Display for Regime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Regime::Trending => "TRENDING",
            Regime::MeanReverting => "MEAN_REVERTING",
            Regime::Volatile => "VOLATILE",
            Regime::Neutral => "NEUTRAL",
        };
        f.write_str(label)
    }
}

/// Regime classification plus the statistics it was derived from
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegimeState {
    pub regime: Regime,
    /// 0.0 - 1.0
    pub confidence: f64,
    /// Annualized volatility of the market series
    pub volatility: f64,
    pub trend_strength: f64,
    pub autocorrelation: f64,
}

impl RegimeState {
    pub fn neutral() -> Self {
        Self {
            regime: Regime::Neutral,
            confidence: 0.0,
            volatility: 0.0,
            trend_strength: 0.0,
            autocorrelation: 0.0,
        }
    }
}

/// Per-ticker conviction scores for one decision date.
///
/// Sign is direction, magnitude is conviction. Scores are unbounded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlphaSignal {
    pub as_of: NaiveDate,
    pub scores: BTreeMap<String, f64>,
    pub excluded: Vec<Exclusion>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub regime: Option<RegimeState>,
}

impl AlphaSignal {
    pub fn new(as_of: NaiveDate) -> Self {
        Self {
            as_of,
            scores: BTreeMap::new(),
            excluded: Vec::new(),
            regime: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn score(&self, ticker: &str) -> Option<f64> {
        self.scores.get(ticker).copied()
    }

    pub fn insert(&mut self, ticker: &str, score: f64) {
        self.scores.insert(ticker.to_string(), score);
    }

    pub fn exclude(&mut self, ticker: &str, reason: ExclusionReason) {
        self.excluded.push(Exclusion::new(ticker, reason));
    }
}

/// Position direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    pub fn from_score(score: f64) -> Self {
        if score < 0.0 {
            Direction::Short
        } else {
            Direction::Long
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Long => f.pad("LONG"),
            Direction::Short => f.pad("SHORT"),
        }
    }
}

/// Target position produced by one sizing pass.
///
/// Shorts are fully collateralized: `units * entry_price` of equity is committed and the
/// loss is capped at that amount. There is no borrowing cost or margin call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub ticker: String,
    pub direction: Direction,
    pub units: u64,
    pub entry_price: f64,
    /// Dollar target before share truncation
    pub allocated_capital: f64,
    /// Allocation as a percentage of the capital that was sized
    pub allocation_pct: f64,
}

impl Position {
    /// Capital committed at entry
    pub fn cost(&self) -> f64 {
        self.units as f64 * self.entry_price
    }

    /// Equity value of the position at `mark`
    pub fn market_value(&self, mark: f64) -> f64 {
        let units = self.units as f64;
        match self.direction {
            Direction::Long => units * mark,
            Direction::Short => (units * (2.0 * self.entry_price - mark)).max(0.0),
        }
    }

    pub fn unrealized_pnl(&self, mark: f64) -> f64 {
        self.market_value(mark) - self.cost()
    }

    /// Signed unit count, negative for shorts
    pub fn signed_units(&self) -> i64 {
        match self.direction {
            Direction::Long => self.units as i64,
            Direction::Short => -(self.units as i64),
        }
    }
}

/// Trade side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
    Short,
    Cover,
}

/// Net change applied to one ticker at a rebalance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub date: NaiveDate,
    pub ticker: String,
    pub side: Side,
    pub units: u64,
    pub price: f64,
    pub value: f64,
    pub reason: String,
}

/// Performance metrics.
///
/// Percentages are expressed in percent (5.0 == 5%).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    // Returns
    pub total_return: f64,
    pub total_return_pct: f64,
    pub annualized_return_pct: f64,
    pub final_equity: f64,
    // Risk metrics
    pub annualized_volatility_pct: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    /// Always <= 0
    pub max_drawdown_pct: f64,
    pub max_drawdown_duration_days: i64,
    pub calmar_ratio: f64,
    // Activity
    pub total_trades: u32,
    pub trading_days: u32,
}

/// Signal coverage over a run, so callers can spot degraded data
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalCoverage {
    pub signal_days: u32,
    pub empty_signal_days: u32,
    pub excluded_observations: u32,
    pub degenerate_volatility: u32,
}

/// Backtest result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    pub strategy: String,
    pub metrics: PerformanceMetrics,
    pub equity_curve: Vec<(NaiveDate, f64)>,
    pub drawdown_curve: Vec<(NaiveDate, f64)>,
    pub trades: Vec<Trade>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub initial_capital: f64,
    pub final_equity: f64,
    pub realized_pnl: f64,
    pub coverage: SignalCoverage,
}

/// Live-mode target position for one ticker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub ticker: String,
    pub direction: Direction,
    pub units: u64,
    pub price: f64,
    pub capital: f64,
    pub allocation_pct: f64,
    pub alpha_score: f64,
    pub volatility: f64,
    pub as_of: NaiveDate,
}

/// Backtest of one lookback window ending on a recommendation's reference date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodPerformance {
    pub period: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub sharpe_ratio: f64,
    pub total_return_pct: f64,
    pub max_drawdown_pct: f64,
}

/// Recommendations of one strategy for one reference date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationSet {
    pub strategy: String,
    pub as_of: NaiveDate,
    /// Last trading date with data at or before `as_of`
    pub reference_date: NaiveDate,
    pub capital: f64,
    pub invested: f64,
    pub cash_position_pct: f64,
    pub positions: Vec<Recommendation>,
    pub excluded_tickers: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub regime: Option<RegimeState>,
    /// Lookback backtests that ran, shortest window first
    pub periods: Vec<PeriodPerformance>,
    /// Window with the highest Sharpe ratio; `None` when no window could be backtested
    pub best_period: Option<String>,
    pub sharpe_ratio: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()
    }

    fn position(direction: Direction) -> Position {
        Position {
            ticker: "AAPL".to_string(),
            direction,
            units: 10,
            entry_price: 100.0,
            allocated_capital: 1000.0,
            allocation_pct: 10.0,
        }
    }

    #[test]
    fn test_long_market_value() {
        let pos = position(Direction::Long);
        assert_eq!(pos.market_value(110.0), 1100.0);
        assert_eq!(pos.unrealized_pnl(110.0), 100.0);
        assert_eq!(pos.signed_units(), 10);
    }

    #[test]
    fn test_short_market_value_is_collateralized() {
        let pos = position(Direction::Short);
        assert_eq!(pos.market_value(90.0), 1100.0);
        assert_eq!(pos.unrealized_pnl(110.0), -100.0);
        // Loss is capped at the committed capital
        assert_eq!(pos.market_value(250.0), 0.0);
        assert_eq!(pos.signed_units(), -10);
    }

    #[test]
    fn test_direction_from_score() {
        assert_eq!(Direction::from_score(0.3), Direction::Long);
        assert_eq!(Direction::from_score(-0.3), Direction::Short);
        assert_eq!(Direction::from_score(0.0), Direction::Long);
    }

    #[test]
    fn test_alpha_signal_bookkeeping() {
        let mut signal = AlphaSignal::new(day());
        assert!(signal.is_empty());

        signal.insert("MSFT", -1.5);
        signal.exclude("GOOGL", ExclusionReason::NoPrice);

        assert_eq!(signal.len(), 1);
        assert_eq!(signal.score("MSFT"), Some(-1.5));
        assert_eq!(signal.score("GOOGL"), None);
        assert_eq!(signal.excluded[0].ticker, "GOOGL");
    }

    #[test]
    fn test_regime_serializes_upper_case() {
        let json = serde_json::to_string(&Regime::MeanReverting).unwrap();
        assert_eq!(json, "\"MEAN_REVERTING\"");
        assert_eq!(Regime::Volatile.to_string(), "VOLATILE");
    }
}
