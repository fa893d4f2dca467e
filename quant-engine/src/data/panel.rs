use std::collections::BTreeMap;

use chrono::NaiveDate;
use common::{Bar, EngineError, Result};
use log::warn;
use serde::{Deserialize, Serialize};

/// Dates x tickers grid of daily bars.
///
/// Dates are strictly increasing. A ticker without a bar on a date holds `None` there;
/// absent observations are never zero-filled. The panel is immutable once built and is
/// shared read-only by every component of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePanel {
    dates: Vec<NaiveDate>,
    tickers: Vec<String>,
    bars: BTreeMap<String, Vec<Option<Bar>>>,
}

impl PricePanel {
    /// Align per-ticker histories on the union of their dates.
    ///
    /// Each history is sorted; for a repeated date the last bar wins. Bars with a
    /// non-finite or non-positive close are dropped.
    pub fn from_histories(histories: BTreeMap<String, Vec<Bar>>) -> Result<Self> {
        let mut cleaned: BTreeMap<String, BTreeMap<NaiveDate, Bar>> = BTreeMap::new();

        for (ticker, history) in histories {
            let mut by_date: BTreeMap<NaiveDate, Bar> = BTreeMap::new();
            let mut dropped = 0usize;
            let mut duplicates = 0usize;
            for bar in history {
                if !bar.close.is_finite() || bar.close <= 0.0 {
                    dropped += 1;
                    continue;
                }
                if by_date.insert(bar.date, bar).is_some() {
                    duplicates += 1;
                }
            }
            if dropped > 0 {
                warn!("{}: dropped {} bars with invalid close prices", ticker, dropped);
            }
            if duplicates > 0 {
                warn!("{}: {} duplicate dates, kept the last bar of each", ticker, duplicates);
            }
            if by_date.is_empty() {
                warn!("{}: no usable bars", ticker);
                continue;
            }
            cleaned.insert(ticker, by_date);
        }

        if cleaned.is_empty() {
            return Err(EngineError::NoData(
                "no ticker has usable price history".to_string(),
            ));
        }

        let mut dates: Vec<NaiveDate> = cleaned
            .values()
            .flat_map(|by_date| by_date.keys().copied())
            .collect();
        dates.sort_unstable();
        dates.dedup();

        let tickers: Vec<String> = cleaned.keys().cloned().collect();
        let bars = cleaned
            .into_iter()
            .map(|(ticker, mut by_date)| {
                let column = dates.iter().map(|d| by_date.remove(d)).collect();
                (ticker, column)
            })
            .collect();

        Ok(Self {
            dates,
            tickers,
            bars,
        })
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    /// Tickers in sorted order
    pub fn tickers(&self) -> &[String] {
        &self.tickers
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn contains_ticker(&self, ticker: &str) -> bool {
        self.bars.contains_key(ticker)
    }

    pub fn date(&self, idx: usize) -> Option<NaiveDate> {
        self.dates.get(idx).copied()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.dates.first().copied()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.dates.last().copied()
    }

    /// Index of an exact trading date
    pub fn index_of(&self, date: NaiveDate) -> Option<usize> {
        self.dates.binary_search(&date).ok()
    }

    /// Index of the last trading date at or before `date`
    pub fn index_at_or_before(&self, date: NaiveDate) -> Option<usize> {
        match self.dates.binary_search(&date) {
            Ok(idx) => Some(idx),
            Err(0) => None,
            Err(idx) => Some(idx - 1),
        }
    }

    /// Index range of trading dates within `[start, end]`
    pub fn range_indices(&self, start: NaiveDate, end: NaiveDate) -> std::ops::Range<usize> {
        let lo = self.dates.partition_point(|d| *d < start);
        let hi = self.dates.partition_point(|d| *d <= end);
        lo..hi.max(lo)
    }

    pub fn bar(&self, ticker: &str, idx: usize) -> Option<&Bar> {
        self.bars.get(ticker)?.get(idx)?.as_ref()
    }

    pub fn close(&self, ticker: &str, idx: usize) -> Option<f64> {
        self.bar(ticker, idx).map(|b| b.close)
    }

    /// Most recent close at or before `idx`
    pub fn last_close(&self, ticker: &str, idx: usize) -> Option<f64> {
        let column = self.bars.get(ticker)?;
        let end = idx.min(column.len().checked_sub(1)?);
        column[..=end].iter().rev().flatten().next().map(|b| b.close)
    }

    /// Number of present observations at or before `idx`
    pub fn observations(&self, ticker: &str, idx: usize) -> usize {
        self.bars
            .get(ticker)
            .map(|column| column.iter().take(idx + 1).flatten().count())
            .unwrap_or(0)
    }

    /// The last `n` present closes at or before `idx`, oldest first.
    ///
    /// Requires a bar on `idx` itself and at least `n` observations; never looks past `idx`.
    pub fn trailing_closes(&self, ticker: &str, idx: usize, n: usize) -> Option<Vec<f64>> {
        let column = self.bars.get(ticker)?;
        column.get(idx)?.as_ref()?;
        let mut closes: Vec<f64> = column[..=idx]
            .iter()
            .rev()
            .flatten()
            .take(n)
            .map(|b| b.close)
            .collect();
        if closes.len() < n {
            return None;
        }
        closes.reverse();
        Some(closes)
    }
}
