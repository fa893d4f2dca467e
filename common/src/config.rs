use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Which reversion alpha the regime-switching strategy uses in MEAN_REVERTING markets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReversionKind {
    MeanReversal,
    PriceRatio,
}

/// Alpha lookbacks and blending
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlphaParameters {
    pub mean_reversal_window: usize,
    pub price_ratio_window: usize,
    pub momentum_window: usize,
    /// Weights for mean reversal, price ratio and momentum, in that order
    pub combined_weights: [f64; 3],
    /// Cross-sectionally z-score each component before weighting
    pub standardize_combined: bool,
    pub regime_reversion: ReversionKind,
}

impl Default for AlphaParameters {
    fn default() -> Self {
        Self {
            mean_reversal_window: 20,
            price_ratio_window: 50,
            momentum_window: 60,
            combined_weights: [1.0, 1.0, 1.0],
            standardize_combined: false,
            regime_reversion: ReversionKind::MeanReversal,
        }
    }
}

/// Regime detection thresholds.
///
/// The (volatility, trend strength) plane is partitioned with strict inequalities;
/// a value exactly on a threshold classifies as NEUTRAL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegimeParameters {
    /// Trailing window in trading days
    pub window: usize,
    /// Annualized volatility above which the market is VOLATILE
    pub volatile_threshold: f64,
    /// Trend strength above which the market is TRENDING
    pub trending_threshold: f64,
    /// Trend strength below which the market may be MEAN_REVERTING
    pub reverting_threshold: f64,
    /// Lag-1 autocorrelation must be below this for MEAN_REVERTING
    pub autocorrelation_threshold: f64,
    /// Magnitude multiplier applied to blended scores in VOLATILE and NEUTRAL
    pub dampening: f64,
}

impl Default for RegimeParameters {
    fn default() -> Self {
        Self {
            window: 60,
            volatile_threshold: 0.35,
            trending_threshold: 1.5,
            reverting_threshold: 0.5,
            autocorrelation_threshold: 0.0,
            dampening: 0.5,
        }
    }
}

/// Position sizing constraints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SizingParameters {
    /// Largest single position as a fraction of capital
    pub max_position_pct: f64,
    /// Gross exposure as a fraction of capital (1.0 = no leverage)
    pub max_gross_exposure: f64,
    pub volatility_lookback: usize,
    /// Daily volatility floor applied before inverse-volatility scaling
    pub volatility_floor: f64,
    /// Daily volatility assumed when a ticker lacks return history
    pub default_volatility: f64,
    /// Daily volatility a unit-weight position is scaled towards
    pub target_volatility: f64,
}

impl Default for SizingParameters {
    fn default() -> Self {
        Self {
            max_position_pct: 0.25,
            max_gross_exposure: 1.0,
            volatility_lookback: 20,
            volatility_floor: 0.005,
            default_volatility: 0.02,
            target_volatility: 0.02,
        }
    }
}

/// Price retrieval and cache settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataParameters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<String>,
    pub cache_max_age_hours: u64,
    pub provider_timeout_secs: u64,
}

impl Default for DataParameters {
    fn default() -> Self {
        Self {
            cache_dir: None,
            cache_max_age_hours: 24,
            provider_timeout_secs: 30,
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub tickers: Vec<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub initial_capital: f64,
    /// Calendar days of history loaded before `start_date` to warm up lookbacks
    pub history_buffer_days: i64,
    /// Market proxy for regime detection; equal-weighted universe when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub benchmark: Option<String>,
    pub alpha: AlphaParameters,
    pub regime: RegimeParameters,
    pub sizing: SizingParameters,
    pub data: DataParameters,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tickers: ["AAPL", "MSFT", "GOOGL", "META", "AMZN", "TSLA", "NVDA"]
                .iter()
                .map(|t| t.to_string())
                .collect(),
            start_date: NaiveDate::from_ymd_opt(2015, 1, 1).unwrap_or_default(),
            end_date: NaiveDate::from_ymd_opt(2023, 12, 31).unwrap_or_default(),
            initial_capital: 100_000.0,
            history_buffer_days: 120,
            benchmark: None,
            alpha: AlphaParameters::default(),
            regime: RegimeParameters::default(),
            sizing: SizingParameters::default(),
            data: DataParameters::default(),
        }
    }
}

impl EngineConfig {
    /// Load a JSON configuration file. Missing fields take their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| {
            EngineError::Configuration(format!("cannot open {}: {}", path.display(), e))
        })?;
        let config: EngineConfig = serde_json::from_reader(BufReader::new(file))?;
        Ok(config)
    }

    pub fn with_tickers<I, S>(mut self, tickers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tickers = tickers.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_dates(mut self, start_date: NaiveDate, end_date: NaiveDate) -> Self {
        self.start_date = start_date;
        self.end_date = end_date;
        self
    }

    pub fn with_capital(mut self, capital: f64) -> Self {
        self.initial_capital = capital;
        self
    }

    pub fn with_history_buffer(mut self, days: i64) -> Self {
        self.history_buffer_days = days;
        self
    }

    pub fn with_benchmark(mut self, ticker: impl Into<String>) -> Self {
        self.benchmark = Some(ticker.into());
        self
    }

    pub fn with_max_position(mut self, max_position_pct: f64) -> Self {
        self.sizing.max_position_pct = max_position_pct;
        self
    }

    pub fn with_cache_dir(mut self, dir: impl Into<String>) -> Self {
        self.data.cache_dir = Some(dir.into());
        self
    }

    /// First calendar date loaded from the provider
    pub fn load_start(&self) -> NaiveDate {
        self.start_date - chrono::Duration::days(self.history_buffer_days.max(0))
    }

    /// Validate and return a copy with normalized ticker symbols
    pub fn validated(mut self) -> Result<Self> {
        self.tickers = normalize_tickers(&self.tickers)?;
        if let Some(benchmark) = self.benchmark.take() {
            let normalized = normalize_tickers(&[benchmark])?;
            self.benchmark = normalized.into_iter().next();
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.tickers.is_empty() {
            return Err(invalid("ticker list is empty"));
        }
        if self.start_date >= self.end_date {
            return Err(invalid(format!(
                "start date {} must be before end date {}",
                self.start_date, self.end_date
            )));
        }
        if !self.initial_capital.is_finite() || self.initial_capital <= 0.0 {
            return Err(invalid(format!(
                "initial capital must be positive, got {}",
                self.initial_capital
            )));
        }
        if self.history_buffer_days < 0 {
            return Err(invalid("history buffer cannot be negative"));
        }

        let alpha = &self.alpha;
        if alpha.mean_reversal_window < 2
            || alpha.price_ratio_window < 2
            || alpha.momentum_window == 0
        {
            return Err(invalid(
                "alpha windows must be at least 2 (momentum at least 1)",
            ));
        }
        if alpha
            .combined_weights
            .iter()
            .any(|w| !w.is_finite() || *w < 0.0)
        {
            return Err(invalid("combined weights must be finite and non-negative"));
        }
        if alpha.combined_weights.iter().sum::<f64>() <= 0.0 {
            return Err(invalid("at least one combined weight must be positive"));
        }

        let regime = &self.regime;
        if regime.window < 3 {
            return Err(invalid("regime window must be at least 3"));
        }
        if !is_positive(regime.volatile_threshold) {
            return Err(invalid("volatile threshold must be positive"));
        }
        if !regime.reverting_threshold.is_finite()
            || !regime.trending_threshold.is_finite()
            || regime.reverting_threshold < 0.0
            || regime.reverting_threshold >= regime.trending_threshold
        {
            return Err(invalid(
                "reverting threshold must be non-negative and below the trending threshold",
            ));
        }
        if !regime.autocorrelation_threshold.is_finite() {
            return Err(invalid("autocorrelation threshold must be finite"));
        }
        if !(0.0..=1.0).contains(&regime.dampening) {
            return Err(invalid("dampening must be within [0, 1]"));
        }

        let sizing = &self.sizing;
        if !(sizing.max_position_pct > 0.0 && sizing.max_position_pct <= 1.0) {
            return Err(invalid("max position must be within (0, 1]"));
        }
        if !is_positive(sizing.max_gross_exposure) {
            return Err(invalid("max gross exposure must be positive"));
        }
        if sizing.volatility_lookback < 2 {
            return Err(invalid("volatility lookback must be at least 2"));
        }
        if !is_positive(sizing.volatility_floor)
            || !is_positive(sizing.default_volatility)
            || !is_positive(sizing.target_volatility)
        {
            return Err(invalid("volatility floor, default and target must be positive"));
        }

        if self.data.provider_timeout_secs == 0 {
            return Err(invalid("provider timeout must be at least one second"));
        }

        Ok(())
    }
}

fn is_positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

fn invalid(message: impl Into<String>) -> EngineError {
    EngineError::Configuration(message.into())
}

/// Trim, upper-case and de-duplicate symbols, preserving order.
///
/// A valid symbol is 1-10 characters of ASCII letters, digits, `.`, `-` or `^`
/// and starts with a letter or `^`.
pub fn normalize_tickers<S: AsRef<str>>(tickers: &[S]) -> Result<Vec<String>> {
    let mut normalized: Vec<String> = Vec::with_capacity(tickers.len());
    for raw in tickers {
        let symbol = raw.as_ref().trim().to_ascii_uppercase();
        if !is_valid_symbol(&symbol) {
            return Err(invalid(format!("malformed ticker symbol '{}'", raw.as_ref())));
        }
        if !normalized.contains(&symbol) {
            normalized.push(symbol);
        }
    }
    Ok(normalized)
}

fn is_valid_symbol(symbol: &str) -> bool {
    let mut chars = symbol.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    symbol.len() <= 10
        && (first.is_ascii_alphabetic() || first == '^')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = EngineConfig::default().validated().unwrap();
        assert_eq!(config.tickers.len(), 7);
        assert_eq!(config.alpha.mean_reversal_window, 20);
        assert_eq!(config.alpha.momentum_window, 60);
    }

    #[test]
    fn test_normalize_tickers() {
        let tickers = normalize_tickers(&[" aapl", "MSFT", "msft", "brk.b", "^gspc"]).unwrap();
        assert_eq!(tickers, vec!["AAPL", "MSFT", "BRK.B", "^GSPC"]);

        assert!(normalize_tickers(&["AA PL"]).is_err());
        assert!(normalize_tickers(&[""]).is_err());
        assert!(normalize_tickers(&["1ABC"]).is_err());
    }

    #[test]
    fn test_invalid_date_range() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let result = EngineConfig::default().with_dates(start, start).validated();
        assert!(matches!(result, Err(EngineError::Configuration(_))));
    }

    #[test]
    fn test_negative_capital() {
        let result = EngineConfig::default().with_capital(-5.0).validated();
        assert!(matches!(result, Err(EngineError::Configuration(_))));

        let result = EngineConfig::default().with_capital(f64::NAN).validated();
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_universe() {
        let result = EngineConfig::default()
            .with_tickers(Vec::<String>::new())
            .validated();
        assert!(matches!(result, Err(EngineError::Configuration(_))));
    }

    #[test]
    fn test_sizing_bounds() {
        assert!(EngineConfig::default().with_max_position(0.0).validate().is_err());
        assert!(EngineConfig::default().with_max_position(1.5).validate().is_err());
        assert!(EngineConfig::default().with_max_position(1.0).validate().is_ok());
    }

    #[test]
    fn test_regime_threshold_order() {
        let mut config = EngineConfig::default();
        config.regime.reverting_threshold = 2.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_nan_parameters_rejected() {
        let mut config = EngineConfig::default();
        config.sizing.volatility_floor = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.sizing.target_volatility = f64::INFINITY;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.regime.volatile_threshold = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.regime.trending_threshold = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.regime.autocorrelation_threshold = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_takes_defaults() {
        let json = r#"{ "tickers": ["aapl"], "initial_capital": 50000.0, "sizing": { "max_position_pct": 0.5 } }"#;
        let config: EngineConfig = serde_json::from_str(json).unwrap();
        let config = config.validated().unwrap();

        assert_eq!(config.tickers, vec!["AAPL"]);
        assert_eq!(config.initial_capital, 50000.0);
        assert_eq!(config.sizing.max_position_pct, 0.5);
        assert_eq!(config.sizing.volatility_lookback, 20);
        assert_eq!(config.regime.window, 60);
    }

    #[test]
    fn test_load_start_includes_buffer() {
        let config = EngineConfig::default().with_history_buffer(10);
        assert_eq!(
            config.load_start(),
            NaiveDate::from_ymd_opt(2014, 12, 22).unwrap()
        );
    }
}
