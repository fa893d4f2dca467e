use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{Duration, NaiveDate, Utc};
use clap::{Parser, ValueEnum};
use log::info;
use serde::Serialize;

use quant_engine::{
    BacktestResult, CsvDirectoryProvider, EngineConfig, PriceProvider, RecommendationSet,
    SyntheticProvider, TradingSystem,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    Backtest,
    Live,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Json,
    Text,
}

#[derive(Parser, Debug)]
#[command(name = "quant-engine")]
#[command(version = "0.1.0")]
#[command(about = "Multi-strategy quant engine: alpha backtests and live position recommendations", long_about = None)]
struct Args {
    /// Backtest all strategies or print today's recommendations
    #[arg(short, long, value_enum, default_value = "backtest")]
    mode: Mode,

    /// Ticker symbols (defaults to the configured universe)
    #[arg(short, long, num_args = 1.., value_delimiter = ',')]
    tickers: Vec<String>,

    /// Initial capital
    #[arg(short, long)]
    cash: Option<f64>,

    /// Backtest start date (YYYY-MM-DD)
    #[arg(long)]
    start_date: Option<NaiveDate>,

    /// Backtest end date (YYYY-MM-DD); today in live mode
    #[arg(long)]
    end_date: Option<NaiveDate>,

    /// Run a single strategy by name
    #[arg(short, long)]
    strategy: Option<String>,

    /// Live mode: recommend only the strategy with the best backtest Sharpe ratio
    #[arg(long, conflicts_with = "strategy")]
    best: bool,

    /// Ticker used as the market series for regime detection
    #[arg(long)]
    benchmark: Option<String>,

    /// Recommendation date for live mode (defaults to today)
    #[arg(long)]
    as_of: Option<NaiveDate>,

    /// Directory with one <TICKER>.csv or <TICKER>.json per ticker. Synthetic data if absent.
    #[arg(short = 'd', long)]
    data_dir: Option<PathBuf>,

    /// Seed for synthetic data
    #[arg(long, default_value = "42")]
    seed: u64,

    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory for price snapshots
    #[arg(long)]
    cache_dir: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    output: OutputFormat,

    /// Pretty print JSON output
    #[arg(long)]
    pretty: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = build_config(&args)?;
    let provider: Arc<dyn PriceProvider> = match &args.data_dir {
        Some(dir) => {
            info!("Loading prices from {}", dir.display());
            Arc::new(CsvDirectoryProvider::new(dir))
        }
        None => {
            info!("Using synthetic prices (seed {})", args.seed);
            Arc::new(SyntheticProvider::new(args.seed))
        }
    };

    let system = TradingSystem::new(config, provider).context("failed to initialize trading system")?;
    if let (Some(first), Some(last)) = (system.panel().first_date(), system.panel().last_date()) {
        info!(
            "Loaded {} tickers over {} trading days, {} to {} ({} excluded)",
            system.panel().tickers().len(),
            system.panel().len(),
            first,
            last,
            system.excluded().len()
        );
    }

    match args.mode {
        Mode::Backtest => {
            let results = match &args.strategy {
                Some(name) => {
                    let result = system.run_backtest(name)?;
                    BTreeMap::from([(result.strategy.clone(), result)])
                }
                None => system.run_all_backtests()?,
            };
            match args.output {
                OutputFormat::Json => print_json(&results, args.pretty)?,
                OutputFormat::Text => {
                    for result in results.values() {
                        print_backtest_report(result);
                    }
                    if args.strategy.is_none() {
                        let best = results
                            .values()
                            .max_by(|a, b| a.metrics.sharpe_ratio.total_cmp(&b.metrics.sharpe_ratio));
                        if let Some(best) = best {
                            println!("  Best strategy by Sharpe: {}", best.strategy);
                        }
                    }
                }
            }
        }
        Mode::Live => {
            let recommendations = if args.best {
                let set = system.get_best_recommendation(args.as_of)?;
                BTreeMap::from([(set.strategy.clone(), set)])
            } else {
                system.get_trading_recommendations(args.strategy.as_deref(), args.as_of)?
            };
            match args.output {
                OutputFormat::Json => print_json(&recommendations, args.pretty)?,
                OutputFormat::Text => {
                    for set in recommendations.values() {
                        print_recommendations(set);
                    }
                }
            }
        }
    }

    Ok(())
}

fn build_config(args: &Args) -> Result<EngineConfig> {
    let mut config = match &args.config {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("failed to read config {}", path.display()))?,
        None => EngineConfig::default(),
    };

    if !args.tickers.is_empty() {
        config = config.with_tickers(args.tickers.iter().cloned());
    }
    if let Some(cash) = args.cash {
        config = config.with_capital(cash);
    }
    if let Some(benchmark) = &args.benchmark {
        config = config.with_benchmark(benchmark.clone());
    }
    if let Some(dir) = &args.cache_dir {
        config = config.with_cache_dir(dir.clone());
    }

    if args.mode == Mode::Live {
        let end = args
            .end_date
            .or(args.as_of)
            .unwrap_or_else(|| Utc::now().date_naive());
        let start = args.start_date.unwrap_or(end - Duration::days(365));
        config = config.with_dates(start, end);
    } else {
        let start = args.start_date.unwrap_or(config.start_date);
        let end = args.end_date.unwrap_or(config.end_date);
        config = config.with_dates(start, end);
    }

    Ok(config)
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> Result<()> {
    let json = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{}", json);
    Ok(())
}

fn print_backtest_report(result: &BacktestResult) {
    let m = &result.metrics;
    println!();
    println!("================================================================");
    println!("  BACKTEST REPORT - {}", result.strategy);
    println!("================================================================");
    println!("  Period: {} to {} ({} trading days)", result.start_date, result.end_date, m.trading_days);
    println!();
    println!("  Initial Capital:  ${:>12.2}", result.initial_capital);
    println!("  Final Equity:     ${:>12.2}", result.final_equity);
    println!(
        "  Total Return:     ${:>12.2} ({:+.2}%)",
        m.total_return, m.total_return_pct
    );
    println!("  Annual Return:    {:>12.2}%", m.annualized_return_pct);
    println!("  Volatility (Ann): {:>12.2}%", m.annualized_volatility_pct);
    println!("  Sharpe Ratio:     {:>12.3}", m.sharpe_ratio);
    println!("  Sortino Ratio:    {:>12.3}", m.sortino_ratio);
    println!("  Max Drawdown:     {:>12.2}%", m.max_drawdown_pct);
    println!("  Max DD Duration:  {:>12} days", m.max_drawdown_duration_days);
    println!("  Calmar Ratio:     {:>12.3}", m.calmar_ratio);
    println!("  Total Trades:     {:>12}", m.total_trades);
    println!("  Realized P&L:     ${:>12.2}", result.realized_pnl);
    if result.coverage.empty_signal_days > 0 || result.coverage.degenerate_volatility > 0 {
        println!(
            "  Coverage:         {} signal days, {} empty, {} degenerate volatility",
            result.coverage.signal_days,
            result.coverage.empty_signal_days,
            result.coverage.degenerate_volatility
        );
    }
    println!("================================================================");
}

fn print_recommendations(set: &RecommendationSet) {
    println!();
    println!("================================================================");
    println!("  {} - positions as of {}", set.strategy, set.reference_date);
    println!("================================================================");
    if let (Some(period), Some(sharpe)) = (&set.best_period, set.sharpe_ratio) {
        println!("  Best lookback: {} (sharpe {:.3})", period, sharpe);
    }
    if let Some(regime) = &set.regime {
        println!("  Regime: {} (confidence {:.2})", regime.regime, regime.confidence);
    }
    if set.positions.is_empty() {
        println!("  No positions");
    }
    for p in &set.positions {
        println!(
            "  {:<6} {:<5} {:>8} @ {:>10.2}  ${:>12.2} ({:>5.1}%)  score {:+.3}",
            p.ticker, p.direction, p.units, p.price, p.capital, p.allocation_pct, p.alpha_score
        );
    }
    println!("  Cash: {:.1}%", set.cash_position_pct);
    if set.excluded_tickers > 0 {
        println!("  Excluded tickers: {}", set.excluded_tickers);
    }
}
