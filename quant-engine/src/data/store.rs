use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use common::{Bar, DataParameters, EngineError, Exclusion, ExclusionReason, Result};
use crossbeam_channel::RecvTimeoutError;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use super::cache::{Snapshot, SnapshotCache};
use super::panel::PricePanel;
use super::{PriceProvider, TickerUniverse};

/// Where the panel of a load came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    Provider,
    /// Fresh snapshot reused without contacting the provider
    Cache { age_hours: f64 },
    /// Provider returned nothing; an expired snapshot was used instead
    StaleCacheFallback { age_hours: f64, max_age_hours: u64 },
}

/// Panel plus everything that went wrong while building it
#[derive(Debug, Clone)]
pub struct LoadReport {
    pub panel: PricePanel,
    pub excluded: Vec<Exclusion>,
    pub source: DataSource,
}

impl LoadReport {
    /// True when tickers were dropped or stale data was used
    pub fn is_degraded(&self) -> bool {
        !self.excluded.is_empty() || matches!(self.source, DataSource::StaleCacheFallback { .. })
    }
}

/// Loads aligned price panels from a provider, once per run.
///
/// Every component receives the store (or its panel) explicitly; there is no process-wide
/// price cache.
pub struct PriceDataStore {
    provider: Arc<dyn PriceProvider>,
    cache: Option<SnapshotCache>,
    max_age_hours: u64,
    timeout: Duration,
}

impl PriceDataStore {
    pub fn new(provider: Arc<dyn PriceProvider>, params: &DataParameters) -> Self {
        Self {
            provider,
            cache: params.cache_dir.as_ref().map(SnapshotCache::new),
            max_age_hours: params.cache_max_age_hours,
            timeout: Duration::from_secs(params.provider_timeout_secs.max(1)),
        }
    }

    pub fn with_cache(mut self, cache: SnapshotCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_age_hours(mut self, hours: u64) -> Self {
        self.max_age_hours = hours;
        self
    }

    /// Build the panel for `universe` over `[start, end]`.
    ///
    /// Per-ticker failures become exclusions. Fails only when the request is invalid or
    /// no ticker could be loaded from either the provider or a snapshot. Only complete loads
    /// are written to the snapshot cache, so a partial outage never replaces a complete
    /// snapshot.
    pub fn load(
        &self,
        universe: &dyn TickerUniverse,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<LoadReport> {
        let tickers = universe.tickers()?;
        if tickers.is_empty() {
            return Err(EngineError::Configuration("ticker universe is empty".to_string()));
        }
        if start > end {
            return Err(EngineError::Configuration(format!(
                "invalid date range {} .. {}",
                start, end
            )));
        }

        let cached = self.read_snapshot(&tickers, start, end);
        let now = Utc::now();

        if let Some(snapshot) = &cached {
            let age_hours = snapshot.age_hours(now);
            if age_hours < self.max_age_hours as f64 {
                info!(
                    "Using cached snapshot for {} tickers ({:.1}h old)",
                    snapshot.tickers.len(),
                    age_hours
                );
                return Ok(LoadReport {
                    panel: PricePanel::from_histories(snapshot.histories.clone())?,
                    excluded: snapshot.excluded.clone(),
                    source: DataSource::Cache { age_hours },
                });
            }
            debug!("Cached snapshot is {:.1}h old; refreshing from provider", age_hours);
        }

        let (histories, excluded) = self.fetch_all(&tickers, start, end);

        if !histories.is_empty() {
            let panel = PricePanel::from_histories(histories.clone())?;
            info!(
                "Loaded {} of {} tickers over {} trading days",
                panel.tickers().len(),
                tickers.len(),
                panel.len()
            );
            if !excluded.is_empty() {
                debug!(
                    "Not caching a partial load ({} tickers excluded)",
                    excluded.len()
                );
            } else if let Some(cache) = &self.cache {
                let snapshot = Snapshot {
                    tickers: sorted(&tickers),
                    start,
                    end,
                    created_at: now,
                    histories,
                    excluded: excluded.clone(),
                };
                if let Err(e) = cache.store(&snapshot) {
                    warn!("Failed to store price snapshot: {}", e);
                }
            }
            return Ok(LoadReport {
                panel,
                excluded,
                source: DataSource::Provider,
            });
        }

        if let Some(snapshot) = cached {
            let age_hours = snapshot.age_hours(now);
            warn!(
                "Provider returned no data; falling back to a {:.1}h old snapshot (max age {}h)",
                age_hours, self.max_age_hours
            );
            return Ok(LoadReport {
                panel: PricePanel::from_histories(snapshot.histories)?,
                excluded: snapshot.excluded,
                source: DataSource::StaleCacheFallback {
                    age_hours,
                    max_age_hours: self.max_age_hours,
                },
            });
        }

        Err(EngineError::NoData(format!(
            "none of {} tickers could be loaded for {} .. {}",
            tickers.len(),
            start,
            end
        )))
    }

    fn read_snapshot(&self, tickers: &[String], start: NaiveDate, end: NaiveDate) -> Option<Snapshot> {
        let cache = self.cache.as_ref()?;
        match cache.load(tickers, start, end) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Ignoring unreadable price snapshot: {}", e);
                None
            }
        }
    }

    fn fetch_all(
        &self,
        tickers: &[String],
        start: NaiveDate,
        end: NaiveDate,
    ) -> (BTreeMap<String, Vec<Bar>>, Vec<Exclusion>) {
        let mut histories = BTreeMap::new();
        let mut excluded = Vec::new();

        for ticker in tickers {
            match self.fetch_with_timeout(ticker, start, end) {
                Ok(bars) => {
                    let bars: Vec<Bar> = bars
                        .into_iter()
                        .filter(|b| b.date >= start && b.date <= end)
                        .collect();
                    if bars.is_empty() {
                        warn!("{}: no bars between {} and {}", ticker, start, end);
                        excluded.push(Exclusion::new(
                            ticker.as_str(),
                            ExclusionReason::Unavailable {
                                reason: "no bars in range".to_string(),
                            },
                        ));
                    } else {
                        histories.insert(ticker.clone(), bars);
                    }
                }
                Err(EngineError::TickerNotFound { .. }) => {
                    warn!("{}: ticker not found, excluding", ticker);
                    excluded.push(Exclusion::new(ticker.as_str(), ExclusionReason::NotFound));
                }
                Err(e) => {
                    warn!("{}: {}, excluding", ticker, e);
                    excluded.push(Exclusion::new(
                        ticker.as_str(),
                        ExclusionReason::Unavailable {
                            reason: e.to_string(),
                        },
                    ));
                }
            }
        }

        (histories, excluded)
    }

    /// Blocking provider call bounded by the configured timeout.
    ///
    /// On timeout the worker thread is detached, not cancelled: it runs until the provider
    /// returns and its result is dropped.
    fn fetch_with_timeout(&self, ticker: &str, start: NaiveDate, end: NaiveDate) -> Result<Vec<Bar>> {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let provider = Arc::clone(&self.provider);
        let symbol = ticker.to_string();
        thread::spawn(move || {
            let _ = tx.send(provider.get_history(&symbol, start, end));
        });

        match rx.recv_timeout(self.timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(EngineError::DataUnavailable {
                ticker: ticker.to_string(),
                reason: format!("timed out after {:?}", self.timeout),
            }),
            Err(RecvTimeoutError::Disconnected) => Err(EngineError::DataUnavailable {
                ticker: ticker.to_string(),
                reason: "provider worker exited".to_string(),
            }),
        }
    }
}

fn sorted(tickers: &[String]) -> Vec<String> {
    let mut tickers = tickers.to_vec();
    tickers.sort();
    tickers.dedup();
    tickers
}
