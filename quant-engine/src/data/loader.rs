use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate};
use common::{Bar, EngineError, Result};

use super::PriceProvider;

/// Load bars from CSV file
pub fn load_csv(path: &Path) -> Result<Vec<Bar>> {
    let file = File::open(path).map_err(|e| EngineError::DataLoadError(e.to_string()))?;
    let reader = BufReader::new(file);
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let mut bars = Vec::new();

    for result in csv_reader.records() {
        let record = result.map_err(|e| EngineError::CsvError(e.to_string()))?;

        // Expected columns: date, open, high, low, close, volume
        if record.len() < 6 {
            continue;
        }

        let date = parse_date(&record[0])?;
        let open = parse_price(&record[1], "open")?;
        let high = parse_price(&record[2], "high")?;
        let low = parse_price(&record[3], "low")?;
        let close = parse_price(&record[4], "close")?;
        // Volume is often exported as a float
        let volume = record[5]
            .trim()
            .parse::<f64>()
            .map(|v| v.max(0.0) as u64)
            .map_err(|_| EngineError::CsvError("Invalid volume".to_string()))?;

        bars.push(Bar::new(date, open, high, low, close, volume));
    }

    Ok(bars)
}

/// Load bars from JSON file
pub fn load_json(path: &Path) -> Result<Vec<Bar>> {
    let file = File::open(path).map_err(|e| EngineError::DataLoadError(e.to_string()))?;
    let reader = BufReader::new(file);
    let bars: Vec<Bar> = serde_json::from_reader(reader)?;
    Ok(bars)
}

/// Load bars from file, detecting format from extension
pub fn load_file(path: &Path) -> Result<Vec<Bar>> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    match ext.as_str() {
        "csv" => load_csv(path),
        "json" => load_json(path),
        _ => Err(EngineError::DataLoadError(format!(
            "Unsupported file format: {}",
            ext
        ))),
    }
}

fn parse_price(s: &str, field: &str) -> Result<f64> {
    s.trim()
        .parse()
        .map_err(|_| EngineError::CsvError(format!("Invalid {} price", field)))
}

/// Parse a trading date from various formats
fn parse_date(s: &str) -> Result<NaiveDate> {
    let s = s.trim();

    // Try ISO 8601 format first
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.date_naive());
    }

    // Try common formats
    let datetime_formats = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y/%m/%d %H:%M:%S"];
    for fmt in &datetime_formats {
        if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(dt.date());
        }
    }

    let date_formats = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"];
    for fmt in &date_formats {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return Ok(date);
        }
    }

    // Try Unix timestamp (seconds)
    if let Ok(ts) = s.parse::<i64>() {
        if let Some(dt) = DateTime::from_timestamp(ts, 0) {
            return Ok(dt.date_naive());
        }
    }

    Err(EngineError::CsvError(format!("Unable to parse date: {}", s)))
}

/// Reads `<TICKER>.csv` or `<TICKER>.json` from a directory
#[derive(Debug, Clone)]
pub struct CsvDirectoryProvider {
    dir: PathBuf,
}

impl CsvDirectoryProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn locate(&self, ticker: &str) -> Option<PathBuf> {
        ["csv", "json"]
            .iter()
            .map(|ext| self.dir.join(format!("{}.{}", ticker, ext)))
            .find(|path| path.is_file())
    }
}

impl PriceProvider for CsvDirectoryProvider {
    fn get_history(&self, ticker: &str, start: NaiveDate, end: NaiveDate) -> Result<Vec<Bar>> {
        let path = self.locate(ticker).ok_or_else(|| EngineError::TickerNotFound {
            ticker: ticker.to_string(),
        })?;
        let bars = load_file(&path).map_err(|e| EngineError::DataUnavailable {
            ticker: ticker.to_string(),
            reason: e.to_string(),
        })?;
        Ok(bars
            .into_iter()
            .filter(|b| b.date >= start && b.date <= end)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;
    use std::io::Write;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "quant-engine-loader-{}-{}",
            name,
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_parse_date_iso() {
        let date = parse_date("2024-01-15T09:30:00Z").unwrap();
        assert_eq!(date.year(), 2024);
        assert_eq!(date.month(), 1);
        assert_eq!(date.day(), 15);
    }

    #[test]
    fn test_parse_date_common() {
        let date = parse_date("2024-01-15 09:30:00").unwrap();
        assert_eq!(date.year(), 2024);
        assert_eq!(parse_date("01/15/2024").unwrap().day(), 15);
    }

    #[test]
    fn test_parse_date_unix() {
        let date = parse_date("1705312200").unwrap();
        assert!(date.year() >= 2024);
    }

    #[test]
    fn test_parse_date_invalid() {
        assert!(parse_date("not a date").is_err());
    }

    #[test]
    fn test_directory_provider() {
        let dir = scratch_dir("provider");
        let mut file = File::create(dir.join("AAPL.csv")).unwrap();
        writeln!(file, "date,open,high,low,close,volume").unwrap();
        writeln!(file, "2024-01-02,10,11,9,10.5,1000").unwrap();
        writeln!(file, "2024-01-03,10.5,12,10,11.5,1500.0").unwrap();
        writeln!(file, "2024-01-04,11.5,12,11,11.0,900").unwrap();
        drop(file);

        let provider = CsvDirectoryProvider::new(&dir);
        let start = NaiveDate::from_ymd_opt(2024, 1, 3).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();

        let bars = provider.get_history("AAPL", start, end).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].close, 11.5);
        assert_eq!(bars[0].volume, 1500);

        let missing = provider.get_history("MSFT", start, end);
        assert!(matches!(missing, Err(EngineError::TickerNotFound { .. })));

        std::fs::remove_dir_all(&dir).ok();
    }
}
