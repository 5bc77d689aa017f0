//! Portfolio state for a single backtest run.
//!
//! A `Portfolio` belongs to exactly one run on one thread; it is not
//! concurrency-safe and does not need to be.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Direction of an executed trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeAction {
    Buy,
    Sell,
}

/// One executed trade in the log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub action: TradeAction,
    pub date: NaiveDate,
    pub price: f64,
    pub quantity: f64,
    /// Realized profit and loss; present on sells.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pnl: Option<f64>,
}

/// Cash, position, and trade log for one backtest run.
#[derive(Debug)]
pub struct Portfolio {
    cash: f64,
    shares: f64,
    avg_cost: f64,
    trades: Vec<Trade>,
}

impl Portfolio {
    /// Creates a portfolio holding only the initial capital.
    #[must_use]
    pub fn new(initial_capital: f64) -> Self {
        Self {
            cash: initial_capital,
            shares: 0.0,
            avg_cost: 0.0,
            trades: Vec::new(),
        }
    }

    /// Remaining cash.
    #[must_use]
    pub fn cash(&self) -> f64 {
        self.cash
    }

    /// Current position size.
    #[must_use]
    pub fn shares(&self) -> f64 {
        self.shares
    }

    /// Total value at the given price.
    #[must_use]
    pub fn equity(&self, price: f64) -> f64 {
        self.cash + self.shares * price
    }

    /// Returns true while no position is held.
    #[must_use]
    pub fn is_flat(&self) -> bool {
        self.shares <= f64::EPSILON
    }

    /// The executed trade log.
    #[must_use]
    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    /// Consumes the portfolio, yielding the trade log.
    #[must_use]
    pub fn into_trades(self) -> Vec<Trade> {
        self.trades
    }

    /// Buys `quantity` at `price`, if cash allows.
    ///
    /// Returns false (and records nothing) for non-positive quantities or
    /// insufficient cash.
    pub fn buy(&mut self, date: NaiveDate, price: f64, quantity: f64) -> bool {
        if quantity <= 0.0 || price <= 0.0 {
            return false;
        }
        let cost = price * quantity;
        if cost > self.cash {
            return false;
        }

        let total_cost = self.avg_cost * self.shares + cost;
        self.shares += quantity;
        self.avg_cost = total_cost / self.shares;
        self.cash -= cost;
        self.trades.push(Trade {
            action: TradeAction::Buy,
            date,
            price,
            quantity,
            pnl: None,
        });
        true
    }

    /// Buys as many shares as the remaining cash affords.
    pub fn buy_max(&mut self, date: NaiveDate, price: f64) -> bool {
        if price <= 0.0 {
            return false;
        }
        self.buy(date, price, self.cash / price)
    }

    /// Sells `quantity` at `price`, capped at the held position.
    pub fn sell(&mut self, date: NaiveDate, price: f64, quantity: f64) -> bool {
        if quantity <= 0.0 || price <= 0.0 || self.is_flat() {
            return false;
        }
        let quantity = quantity.min(self.shares);

        self.cash += price * quantity;
        self.shares -= quantity;
        let pnl = (price - self.avg_cost) * quantity;
        if self.is_flat() {
            self.shares = 0.0;
            self.avg_cost = 0.0;
        }
        self.trades.push(Trade {
            action: TradeAction::Sell,
            date,
            price,
            quantity,
            pnl: Some(pnl),
        });
        true
    }

    /// Liquidates the whole position at `price`.
    pub fn sell_all(&mut self, date: NaiveDate, price: f64) -> bool {
        self.sell(date, price, self.shares)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    #[test]
    fn test_buy_and_sell_roundtrip() {
        let mut portfolio = Portfolio::new(1000.0);

        assert!(portfolio.buy(day(1), 10.0, 50.0));
        assert!((portfolio.cash() - 500.0).abs() < 1e-9);
        assert!((portfolio.shares() - 50.0).abs() < 1e-9);

        assert!(portfolio.sell_all(day(2), 12.0));
        assert!(portfolio.is_flat());
        assert!((portfolio.cash() - 1100.0).abs() < 1e-9);

        let sell = portfolio.trades().last().unwrap();
        assert_eq!(sell.action, TradeAction::Sell);
        assert!((sell.pnl.unwrap() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_buy_rejects_insufficient_cash() {
        let mut portfolio = Portfolio::new(100.0);
        assert!(!portfolio.buy(day(1), 10.0, 20.0));
        assert!(portfolio.trades().is_empty());
    }

    #[test]
    fn test_sell_is_capped_at_position() {
        let mut portfolio = Portfolio::new(100.0);
        portfolio.buy(day(1), 10.0, 5.0);
        assert!(portfolio.sell(day(2), 10.0, 50.0));
        assert!(portfolio.is_flat());
    }

    #[test]
    fn test_sell_without_position_is_a_noop() {
        let mut portfolio = Portfolio::new(100.0);
        assert!(!portfolio.sell(day(1), 10.0, 1.0));
    }

    #[test]
    fn test_equity_tracks_price() {
        let mut portfolio = Portfolio::new(1000.0);
        portfolio.buy_max(day(1), 10.0);
        assert!((portfolio.equity(15.0) - 1500.0).abs() < 1e-9);
    }

    #[test]
    fn test_average_cost_across_buys() {
        let mut portfolio = Portfolio::new(1000.0);
        portfolio.buy(day(1), 10.0, 10.0);
        portfolio.buy(day(2), 20.0, 10.0);
        portfolio.sell_all(day(3), 15.0);
        // Average cost 15: liquidating at 15 realizes zero pnl.
        let sell = portfolio.trades().last().unwrap();
        assert!(sell.pnl.unwrap().abs() < 1e-9);
    }
}
