pub mod stats;

pub use stats::{
    is_negligible, lag1_autocorrelation, mean, sample_std_dev, simple_returns, std_dev, zscores,
};
