//! Descriptive statistics over price and return slices.
//!
//! Degenerate inputs (empty slices, zero variance) yield 0.0 rather than NaN. Dispersion is
//! compared against the magnitude of the data, so a constant series whose mean is off by a
//! few ulps still counts as flat.

/// Dispersion at or below this fraction of the data's magnitude is treated as zero
pub const RELATIVE_TOLERANCE: f64 = 1e-12;

/// True when `value` is negligible next to `scale`
pub fn is_negligible(value: f64, scale: f64) -> bool {
    value.abs() <= RELATIVE_TOLERANCE * scale.abs()
}

fn max_abs(values: &[f64]) -> f64 {
    values.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()))
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation
pub fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Sample standard deviation (n - 1 denominator)
pub fn sample_std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let variance =
        values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

/// Simple day-over-day returns; a zero previous price yields a 0.0 return
pub fn simple_returns(prices: &[f64]) -> Vec<f64> {
    prices
        .windows(2)
        .map(|w| if w[0] != 0.0 { w[1] / w[0] - 1.0 } else { 0.0 })
        .collect()
}

/// Lag-1 autocorrelation of a series
pub fn lag1_autocorrelation(values: &[f64]) -> f64 {
    if values.len() < 3 {
        return 0.0;
    }
    let m = mean(values);
    let denominator: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    let dispersion = (denominator / values.len() as f64).sqrt();
    if is_negligible(dispersion, max_abs(values)) {
        return 0.0;
    }
    let numerator: f64 = values
        .windows(2)
        .map(|w| (w[0] - m) * (w[1] - m))
        .sum();
    numerator / denominator
}

/// Cross-sectional z-scores; zero dispersion maps every value to 0.0
pub fn zscores(values: &[f64]) -> Vec<f64> {
    let m = mean(values);
    let sd = std_dev(values);
    if is_negligible(sd, max_abs(values)) {
        return vec![0.0; values.len()];
    }
    values.iter().map(|v| (v - m) / sd).collect()
}
