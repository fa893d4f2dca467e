use chrono::{Datelike, Duration, NaiveDate, Weekday};
use common::{Bar, EngineError, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::PriceProvider;

/// Generate seeded equity-like daily bars on weekdays between `start` and `end`
pub fn generate_synthetic_bars(
    start: NaiveDate,
    end: NaiveDate,
    initial_price: f64,
    seed: u64,
) -> Vec<Bar> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut bars = Vec::new();

    let mut price = initial_price;
    // Slight upward drift, ~1.5% daily volatility
    let drift = 0.0003;
    let daily_volatility = 0.015;

    let mut date = start;
    while date <= end {
        if matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
            date += Duration::days(1);
            continue;
        }

        let random_return: f64 = rng.gen_range(-1.0..1.0);
        let daily_return = drift + daily_volatility * random_return * 3.0_f64.sqrt();
        let new_price = (price * (1.0 + daily_return)).max(0.01);

        // Generate OHLC
        let intraday_range = price * rng.gen_range(0.005..0.03);
        let open = price + rng.gen_range(-intraday_range / 2.0..intraday_range / 2.0);
        let close = new_price;
        let high = open.max(close) + rng.gen_range(0.0..intraday_range / 2.0);
        let low = (open.min(close) - rng.gen_range(0.0..intraday_range / 2.0)).max(0.01);

        // Higher volume on volatile days
        let base_volume = 5_000_000u64;
        let volume_multiplier = 1.0 + daily_return.abs() * 10.0;
        let volume = (base_volume as f64 * volume_multiplier * rng.gen_range(0.8..1.2)) as u64;

        bars.push(Bar::new(date, open, high, low, close, volume));

        price = new_price;
        date += Duration::days(1);
    }

    bars
}

/// Deterministic provider producing an independent random walk per ticker
#[derive(Debug, Clone)]
pub struct SyntheticProvider {
    seed: u64,
}

impl SyntheticProvider {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    fn ticker_seed(&self, ticker: &str) -> u64 {
        ticker.bytes().fold(self.seed ^ 0x9e37_79b9_7f4a_7c15, |acc, b| {
            acc.wrapping_mul(0x0100_0000_01b3).wrapping_add(b as u64)
        })
    }
}

impl PriceProvider for SyntheticProvider {
    fn get_history(&self, ticker: &str, start: NaiveDate, end: NaiveDate) -> Result<Vec<Bar>> {
        if start > end {
            return Err(EngineError::DataUnavailable {
                ticker: ticker.to_string(),
                reason: format!("empty range {} .. {}", start, end),
            });
        }
        let seed = self.ticker_seed(ticker);
        let initial_price = 20.0 + (seed % 480) as f64;
        Ok(generate_synthetic_bars(start, end, initial_price, seed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range() -> (NaiveDate, NaiveDate) {
        (
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 6, 30).unwrap(),
        )
    }

    #[test]
    fn test_generate_synthetic_bars() {
        let (start, end) = range();
        let bars = generate_synthetic_bars(start, end, 50.0, 7);

        assert!(bars.len() > 120);

        for bar in &bars {
            assert!(bar.high >= bar.low);
            assert!(bar.high >= bar.open);
            assert!(bar.high >= bar.close);
            assert!(bar.low <= bar.close);
            assert!(bar.volume > 0);
            assert!(!matches!(bar.date.weekday(), Weekday::Sat | Weekday::Sun));
        }
        assert!(bars.windows(2).all(|w| w[0].date < w[1].date));
    }

    #[test]
    fn test_provider_is_deterministic_per_ticker() {
        let (start, end) = range();
        let provider = SyntheticProvider::new(42);

        let a1 = provider.get_history("AAPL", start, end).unwrap();
        let a2 = provider.get_history("AAPL", start, end).unwrap();
        let m = provider.get_history("MSFT", start, end).unwrap();

        assert_eq!(a1, a2);
        assert_ne!(a1[10].close, m[10].close);
    }
}
