use std::collections::BTreeMap;

use chrono::NaiveDate;
use common::{Direction, Position, Side, Trade};

use crate::data::PricePanel;

#[derive(Debug, Clone)]
struct Holding {
    position: Position,
    mark: f64,
}

/// Cash plus held positions for one backtest run.
///
/// Owned by a single run; every rebalance replaces the whole book.
#[derive(Debug)]
pub struct Portfolio {
    initial_capital: f64,
    cash: f64,
    holdings: BTreeMap<String, Holding>,
    realized_pnl: f64,
    trades: Vec<Trade>,
}

impl Portfolio {
    pub fn new(initial_capital: f64) -> Self {
        Self {
            initial_capital,
            cash: initial_capital,
            holdings: BTreeMap::new(),
            realized_pnl: 0.0,
            trades: Vec::new(),
        }
    }

    pub fn initial_capital(&self) -> f64 {
        self.initial_capital
    }

    /// Cash plus the marked value of every position
    pub fn equity(&self) -> f64 {
        self.cash + self.positions_value()
    }

    pub fn positions_value(&self) -> f64 {
        self.holdings
            .values()
            .map(|h| h.position.market_value(h.mark))
            .sum()
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    pub fn position(&self, ticker: &str) -> Option<&Position> {
        self.holdings.get(ticker).map(|h| &h.position)
    }

    pub fn positions(&self) -> impl Iterator<Item = &Position> {
        self.holdings.values().map(|h| &h.position)
    }

    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    pub fn realized_pnl(&self) -> f64 {
        self.realized_pnl
    }

    /// Mark held tickers to their close at `idx`; a ticker without a bar keeps its last mark
    pub fn mark_to_market(&mut self, panel: &PricePanel, idx: usize) {
        for (ticker, holding) in self.holdings.iter_mut() {
            if let Some(close) = panel.close(ticker, idx) {
                holding.mark = close;
            }
        }
    }

    /// Close every held position at its mark and open `targets` at their entry prices.
    ///
    /// Only the net change per ticker is written to the trade log. Returns the P&L realized
    /// by closing the previous book.
    pub fn rebalance(&mut self, targets: BTreeMap<String, Position>, date: NaiveDate) -> f64 {
        let previous = std::mem::take(&mut self.holdings);

        let mut realized = 0.0;
        for holding in previous.values() {
            realized += holding.position.unrealized_pnl(holding.mark);
            self.cash += holding.position.market_value(holding.mark);
        }
        self.realized_pnl += realized;

        for (ticker, held) in &previous {
            let target = targets.get(ticker);
            let price = target.map(|t| t.entry_price).unwrap_or(held.mark);
            self.record_change(date, ticker, held.position.signed_units(), target, price);
        }
        for (ticker, target) in &targets {
            if !previous.contains_key(ticker) {
                self.record_change(date, ticker, 0, Some(target), target.entry_price);
            }
        }

        for (ticker, position) in targets {
            self.cash -= position.cost();
            let mark = position.entry_price;
            self.holdings.insert(ticker, Holding { position, mark });
        }

        realized
    }

    fn record_change(
        &mut self,
        date: NaiveDate,
        ticker: &str,
        before: i64,
        target: Option<&Position>,
        price: f64,
    ) {
        let after = target.map(|t| t.signed_units()).unwrap_or(0);
        let mut push = |side: Side, units: i64, reason: &str| {
            let units = units.unsigned_abs();
            self.trades.push(Trade {
                date,
                ticker: ticker.to_string(),
                side,
                units,
                price,
                value: units as f64 * price,
                reason: reason.to_string(),
            });
        };

        match (before.signum(), after.signum()) {
            (0, 0) => {}
            (0, 1) => push(Side::Buy, after, "open"),
            (0, -1) => push(Side::Short, after, "open"),
            (1, 0) => push(Side::Sell, before, "close"),
            (-1, 0) => push(Side::Cover, before, "close"),
            (1, -1) => {
                push(Side::Sell, before, "reverse");
                push(Side::Short, after, "reverse");
            }
            (-1, 1) => {
                push(Side::Cover, before, "reverse");
                push(Side::Buy, after, "reverse");
            }
            _ => {
                let delta = after - before;
                let side = match (Direction::from_score(after as f64), delta > 0) {
                    (Direction::Long, true) => Side::Buy,
                    (Direction::Long, false) => Side::Sell,
                    (Direction::Short, true) => Side::Cover,
                    (Direction::Short, false) => Side::Short,
                };
                if delta != 0 {
                    push(side, delta, "resize");
                }
            }
        }
    }
}
