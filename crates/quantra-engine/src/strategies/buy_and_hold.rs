//! Buy-and-hold baseline strategy.

use crate::portfolio::Portfolio;
use crate::strategy::Strategy;
use chrono::NaiveDate;
use quantra_core::MarketPoint;

/// Buys the full position on the first tick and liquidates at the end.
#[derive(Debug, Default)]
pub struct BuyAndHold {
    last_seen: Option<(NaiveDate, f64)>,
}

impl BuyAndHold {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Strategy for BuyAndHold {
    fn name(&self) -> &str {
        "BuyAndHold"
    }

    fn on_tick(&mut self, point: &MarketPoint, portfolio: &mut Portfolio) {
        if self.last_seen.is_none() {
            portfolio.buy_max(point.date, point.close);
        }
        self.last_seen = Some((point.date, point.close));
    }

    fn on_finish(&mut self, portfolio: &mut Portfolio) {
        if let Some((date, close)) = self.last_seen {
            portfolio.sell_all(date, close);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(day: u32, close: f64) -> MarketPoint {
        MarketPoint {
            symbol: "TEST".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            open: close,
            high: close,
            low: close,
            close,
            volume: 1000,
        }
    }

    #[test]
    fn test_buys_once_and_liquidates() {
        let mut strategy = BuyAndHold::new();
        let mut portfolio = Portfolio::new(1000.0);

        for (day, close) in [(2, 10.0), (3, 11.0), (4, 12.0)] {
            strategy.on_tick(&point(day, close), &mut portfolio);
        }
        strategy.on_finish(&mut portfolio);

        assert!(portfolio.is_flat());
        // Two trades total: the initial buy and the final liquidation.
        assert_eq!(portfolio.trades().len(), 2);
        assert!((portfolio.cash() - 1200.0).abs() < 1e-9);
    }
}
