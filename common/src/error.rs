use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Ticker not found: {ticker}")]
    TickerNotFound { ticker: String },

    #[error("Data unavailable for {ticker}: {reason}")]
    DataUnavailable { ticker: String, reason: String },

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Unknown strategy '{name}'. Available strategies: {}", available.join(", "))]
    UnknownStrategy {
        name: String,
        available: Vec<String>,
    },

    #[error("No data: {0}")]
    NoData(String),

    #[error("Data loading error: {0}")]
    DataLoadError(String),

    #[error("CSV parse error: {0}")]
    CsvError(String),

    #[error("Cache error: {0}")]
    CacheError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
