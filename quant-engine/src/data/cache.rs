use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use common::{Bar, EngineError, Exclusion, Result};
use log::debug;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Price histories fetched for one universe and date range
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub tickers: Vec<String>,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub histories: BTreeMap<String, Vec<Bar>>,
    pub excluded: Vec<Exclusion>,
}

impl Snapshot {
    /// Only an exact universe and range match may be reused
    pub fn matches(&self, tickers: &[String], start: NaiveDate, end: NaiveDate) -> bool {
        self.start == start && self.end == end && self.tickers == sorted(tickers)
    }

    pub fn age_hours(&self, now: DateTime<Utc>) -> f64 {
        (now - self.created_at).num_seconds().max(0) as f64 / 3600.0
    }
}

/// One bincode file per (ticker set, date range) key
#[derive(Debug, Clone)]
pub struct SnapshotCache {
    dir: PathBuf,
}

impl SnapshotCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Stable key over the sorted ticker set and the requested range
    pub fn key(tickers: &[String], start: NaiveDate, end: NaiveDate) -> String {
        let mut hasher = Sha256::new();
        for ticker in sorted(tickers) {
            hasher.update(ticker.as_bytes());
            hasher.update(b",");
        }
        hasher.update(start.to_string().as_bytes());
        hasher.update(b"..");
        hasher.update(end.to_string().as_bytes());
        hex::encode(hasher.finalize())
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.bin", key))
    }

    /// Read the snapshot for a request; a missing file or a mismatched snapshot is a miss
    pub fn load(
        &self,
        tickers: &[String],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Option<Snapshot>> {
        let path = self.path_for(&Self::key(tickers, start, end));
        if !path.is_file() {
            return Ok(None);
        }
        let file = File::open(&path)?;
        let snapshot: Snapshot = bincode::deserialize_from(BufReader::new(file))
            .map_err(|e| EngineError::CacheError(format!("{}: {}", path.display(), e)))?;

        if !snapshot.matches(tickers, start, end) {
            debug!("Snapshot {} does not match the request; treating as miss", path.display());
            return Ok(None);
        }
        Ok(Some(snapshot))
    }

    pub fn store(&self, snapshot: &Snapshot) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(&Self::key(&snapshot.tickers, snapshot.start, snapshot.end));
        let tmp = path.with_extension("bin.tmp");
        {
            let file = File::create(&tmp)?;
            bincode::serialize_into(BufWriter::new(file), snapshot)
                .map_err(|e| EngineError::CacheError(e.to_string()))?;
        }
        fs::rename(&tmp, &path)?;
        Ok(path)
    }
}

fn sorted(tickers: &[String]) -> Vec<String> {
    let mut tickers = tickers.to_vec();
    tickers.sort();
    tickers.dedup();
    tickers
}
