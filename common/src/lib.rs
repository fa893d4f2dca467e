pub mod config;
pub mod error;
pub mod types;

pub use config::{
    normalize_tickers, AlphaParameters, DataParameters, EngineConfig, RegimeParameters,
    ReversionKind, SizingParameters,
};
pub use error::{EngineError, Result};
pub use types::*;
