pub mod cache;
pub mod loader;
pub mod panel;
pub mod store;
pub mod synthetic;

pub use cache::{Snapshot, SnapshotCache};
pub use loader::{load_csv, load_file, load_json, CsvDirectoryProvider};
pub use panel::PricePanel;
pub use store::{DataSource, LoadReport, PriceDataStore};
pub use synthetic::{generate_synthetic_bars, SyntheticProvider};

use std::collections::BTreeMap;

use chrono::NaiveDate;
use common::{normalize_tickers, Bar, EngineError, Result};

/// Source of daily OHLCV history.
///
/// Implementations report an unknown symbol as `TickerNotFound` and any transport or
/// provider failure as `DataUnavailable`. Either only excludes that ticker from a run.
pub trait PriceProvider: Send + Sync {
    fn get_history(&self, ticker: &str, start: NaiveDate, end: NaiveDate) -> Result<Vec<Bar>>;
}

/// Source of the ticker symbols to trade
pub trait TickerUniverse {
    fn tickers(&self) -> Result<Vec<String>>;
}

/// Fixed, validated list of symbols
#[derive(Debug, Clone)]
pub struct StaticUniverse {
    tickers: Vec<String>,
}

impl StaticUniverse {
    pub fn new<S: AsRef<str>>(tickers: &[S]) -> Result<Self> {
        let tickers = normalize_tickers(tickers)?;
        if tickers.is_empty() {
            return Err(EngineError::Configuration("ticker universe is empty".to_string()));
        }
        Ok(Self { tickers })
    }
}

impl TickerUniverse for StaticUniverse {
    fn tickers(&self) -> Result<Vec<String>> {
        Ok(self.tickers.clone())
    }
}

/// Provider over histories already held in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryProvider {
    histories: BTreeMap<String, Vec<Bar>>,
    unavailable: Vec<String>,
}

impl InMemoryProvider {
    pub fn new(histories: BTreeMap<String, Vec<Bar>>) -> Self {
        Self {
            histories,
            unavailable: Vec::new(),
        }
    }

    pub fn with_history(mut self, ticker: &str, bars: Vec<Bar>) -> Self {
        self.histories.insert(ticker.to_string(), bars);
        self
    }

    /// Make `ticker` fail as if the provider were down
    pub fn with_unavailable(mut self, ticker: &str) -> Self {
        self.unavailable.push(ticker.to_string());
        self
    }
}

impl PriceProvider for InMemoryProvider {
    fn get_history(&self, ticker: &str, start: NaiveDate, end: NaiveDate) -> Result<Vec<Bar>> {
        if self.unavailable.iter().any(|t| t == ticker) {
            return Err(EngineError::DataUnavailable {
                ticker: ticker.to_string(),
                reason: "provider offline".to_string(),
            });
        }
        let bars = self
            .histories
            .get(ticker)
            .ok_or_else(|| EngineError::TickerNotFound {
                ticker: ticker.to_string(),
            })?;
        Ok(bars
            .iter()
            .filter(|b| b.date >= start && b.date <= end)
            .cloned()
            .collect())
    }
}
