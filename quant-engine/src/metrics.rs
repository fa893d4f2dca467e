use chrono::NaiveDate;
use common::PerformanceMetrics;

use crate::indicators::sample_std_dev;

const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Calculate performance metrics from an equity curve
pub struct MetricsCalculator;

impl MetricsCalculator {
    /// Calculate all performance metrics.
    ///
    /// Degenerate inputs (flat equity, single point) yield zeros, never NaN or infinity.
    pub fn calculate(
        equity_curve: &[(NaiveDate, f64)],
        total_trades: usize,
        initial_capital: f64,
    ) -> PerformanceMetrics {
        if equity_curve.is_empty() || initial_capital <= 0.0 {
            return PerformanceMetrics::default();
        }

        let final_equity = equity_curve
            .last()
            .map(|(_, e)| *e)
            .unwrap_or(initial_capital);
        let total_return = final_equity - initial_capital;
        let total_return_pct = (final_equity / initial_capital - 1.0) * 100.0;

        let daily_returns = Self::calculate_daily_returns(equity_curve);
        let annualized_return = Self::calculate_annualized_return(
            final_equity / initial_capital,
            daily_returns.len(),
        );
        let volatility = Self::calculate_volatility(&daily_returns);
        let sharpe_ratio = finite_or_zero(if volatility > 0.0 {
            annualized_return / volatility
        } else {
            0.0
        });
        let sortino_ratio = Self::calculate_sortino_ratio(&daily_returns, annualized_return);
        let (max_drawdown, max_dd_duration) = Self::calculate_max_drawdown(equity_curve);

        let annualized_return_pct = annualized_return * 100.0;
        let calmar_ratio = if max_drawdown != 0.0 {
            finite_or_zero(annualized_return_pct / max_drawdown.abs())
        } else {
            0.0
        };

        PerformanceMetrics {
            total_return,
            total_return_pct,
            annualized_return_pct,
            final_equity,
            annualized_volatility_pct: volatility * 100.0,
            sharpe_ratio,
            sortino_ratio,
            max_drawdown_pct: max_drawdown,
            max_drawdown_duration_days: max_dd_duration,
            calmar_ratio,
            total_trades: total_trades as u32,
            trading_days: equity_curve.len() as u32,
        }
    }

    /// Calculate daily returns from equity curve
    fn calculate_daily_returns(equity_curve: &[(NaiveDate, f64)]) -> Vec<f64> {
        equity_curve
            .windows(2)
            .map(|w| {
                let prev = w[0].1;
                let curr = w[1].1;
                if prev > 0.0 {
                    curr / prev - 1.0
                } else {
                    0.0
                }
            })
            .collect()
    }

    /// Geometric annualization of the growth factor over `periods` daily returns
    fn calculate_annualized_return(growth: f64, periods: usize) -> f64 {
        if periods == 0 {
            return 0.0;
        }
        if growth <= 0.0 {
            return -1.0;
        }
        finite_or_zero(growth.powf(TRADING_DAYS_PER_YEAR / periods as f64) - 1.0)
    }

    /// Annualized sample volatility of daily returns, as a fraction
    fn calculate_volatility(daily_returns: &[f64]) -> f64 {
        sample_std_dev(daily_returns) * TRADING_DAYS_PER_YEAR.sqrt()
    }

    /// Annualized return over annualized downside deviation; 0 without downside
    fn calculate_sortino_ratio(daily_returns: &[f64], annualized_return: f64) -> f64 {
        if daily_returns.is_empty() {
            return 0.0;
        }

        let n = daily_returns.len() as f64;
        let downside_variance: f64 = daily_returns
            .iter()
            .filter(|&&r| r < 0.0)
            .map(|r| r.powi(2))
            .sum::<f64>()
            / n;
        let downside_deviation = downside_variance.sqrt() * TRADING_DAYS_PER_YEAR.sqrt();

        if downside_deviation <= 0.0 {
            return 0.0;
        }
        finite_or_zero(annualized_return / downside_deviation)
    }

    /// Maximum drawdown (percent, <= 0) and its duration in trading days
    fn calculate_max_drawdown(equity_curve: &[(NaiveDate, f64)]) -> (f64, i64) {
        if equity_curve.is_empty() {
            return (0.0, 0);
        }

        let mut max_equity = equity_curve[0].1;
        let mut max_drawdown = 0.0;
        let mut max_dd_duration = 0i64;
        let mut current_dd_start = 0;

        for (i, (_, equity)) in equity_curve.iter().enumerate() {
            if *equity > max_equity {
                max_equity = *equity;
                current_dd_start = i;
            }

            let drawdown = drawdown_pct(*equity, max_equity);
            if drawdown < max_drawdown {
                max_drawdown = drawdown;
                max_dd_duration = (i - current_dd_start) as i64;
            }
        }

        (max_drawdown, max_dd_duration)
    }

    /// Drawdown from the running peak at every point, in percent (<= 0)
    pub fn calculate_drawdown_curve(equity_curve: &[(NaiveDate, f64)]) -> Vec<(NaiveDate, f64)> {
        let Some(first) = equity_curve.first() else {
            return vec![];
        };

        let mut max_equity = first.1;
        equity_curve
            .iter()
            .map(|(date, equity)| {
                if *equity > max_equity {
                    max_equity = *equity;
                }
                (*date, drawdown_pct(*equity, max_equity))
            })
            .collect()
    }
}

fn drawdown_pct(equity: f64, peak: f64) -> f64 {
    if peak > 0.0 {
        (equity / peak - 1.0).min(0.0) * 100.0
    } else {
        0.0
    }
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::Duration;

    fn make_equity_curve(values: &[f64]) -> Vec<(NaiveDate, f64)> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        values
            .iter()
            .enumerate()
            .map(|(i, &v)| (start + Duration::days(i as i64), v))
            .collect()
    }

    #[test]
    fn test_basic_metrics() {
        let equity = make_equity_curve(&[10000.0, 10100.0, 10200.0, 10300.0, 10400.0]);

        let metrics = MetricsCalculator::calculate(&equity, 3, 10000.0);

        assert_eq!(metrics.total_return, 400.0);
        assert_relative_eq!(metrics.total_return_pct, 4.0, epsilon = 1e-9);
        assert_eq!(metrics.final_equity, 10400.0);
        assert_eq!(metrics.total_trades, 3);
        assert_eq!(metrics.trading_days, 5);
        assert_eq!(metrics.max_drawdown_pct, 0.0);
    }

    #[test]
    fn test_compounding_annualizes_geometrically() {
        let r: f64 = 0.001;
        let values: Vec<f64> = (0..=252).map(|k| 1000.0 * (1.0 + r).powi(k)).collect();
        let metrics = MetricsCalculator::calculate(&make_equity_curve(&values), 0, 1000.0);

        let expected = ((1.0 + r).powi(252) - 1.0) * 100.0;
        assert_relative_eq!(metrics.total_return_pct, expected, max_relative = 1e-9);
        assert_relative_eq!(metrics.annualized_return_pct, expected, max_relative = 1e-9);
        assert_eq!(metrics.max_drawdown_pct, 0.0);
        assert_eq!(metrics.sortino_ratio, 0.0);
    }

    #[test]
    fn test_flat_equity_has_zero_ratios() {
        let equity = make_equity_curve(&[5000.0; 30]);
        let metrics = MetricsCalculator::calculate(&equity, 0, 5000.0);

        assert_eq!(metrics.total_return_pct, 0.0);
        assert_eq!(metrics.annualized_volatility_pct, 0.0);
        assert_eq!(metrics.sharpe_ratio, 0.0);
        assert_eq!(metrics.sortino_ratio, 0.0);
        assert_eq!(metrics.calmar_ratio, 0.0);
        assert_eq!(metrics.max_drawdown_pct, 0.0);
    }

    #[test]
    fn test_single_point() {
        let metrics = MetricsCalculator::calculate(&make_equity_curve(&[100.0]), 0, 100.0);
        assert_eq!(metrics.annualized_return_pct, 0.0);
        assert_eq!(metrics.sharpe_ratio, 0.0);
        assert_eq!(metrics.trading_days, 1);
    }

    #[test]
    fn test_max_drawdown() {
        let equity = make_equity_curve(&[10000.0, 11000.0, 9000.0, 9500.0, 10500.0]);
        let (max_dd, duration) = MetricsCalculator::calculate_max_drawdown(&equity);

        // Peak was 11000, trough was 9000
        assert_relative_eq!(max_dd, (9000.0 / 11000.0 - 1.0) * 100.0, epsilon = 1e-9);
        assert_eq!(duration, 1);
    }

    #[test]
    fn test_sharpe_ratio_positive() {
        // Consistently positive returns should give positive Sharpe
        let equity = make_equity_curve(&[
            10000.0, 10100.0, 10150.0, 10300.0, 10320.0, 10500.0, 10600.0,
        ]);
        let metrics = MetricsCalculator::calculate(&equity, 0, 10000.0);

        assert!(metrics.sharpe_ratio > 0.0);
        assert!(metrics.sharpe_ratio.is_finite());
    }

    #[test]
    fn test_total_loss_is_bounded() {
        let equity = make_equity_curve(&[1000.0, 500.0, 0.0, 0.0]);
        let metrics = MetricsCalculator::calculate(&equity, 0, 1000.0);

        assert_eq!(metrics.total_return_pct, -100.0);
        assert_eq!(metrics.annualized_return_pct, -100.0);
        assert_eq!(metrics.max_drawdown_pct, -100.0);
        assert!(metrics.sharpe_ratio.is_finite());
    }

    #[test]
    fn test_drawdown_curve() {
        let equity = make_equity_curve(&[10000.0, 11000.0, 10000.0, 9000.0]);
        let dd_curve = MetricsCalculator::calculate_drawdown_curve(&equity);

        assert_eq!(dd_curve.len(), 4);
        assert_eq!(dd_curve[0].1, 0.0); // No drawdown at start
        assert_eq!(dd_curve[1].1, 0.0); // New high, no drawdown
        assert!((dd_curve[2].1 + 9.09).abs() < 0.1);
        assert!((dd_curve[3].1 + 18.18).abs() < 0.1);
        assert!(dd_curve.iter().all(|(_, dd)| *dd <= 0.0));
    }
}
