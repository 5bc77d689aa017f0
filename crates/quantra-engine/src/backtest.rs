//! The backtest tick loop.

use crate::error::{EngineError, EngineResult};
use crate::metrics::{compute_metrics, PerformanceMetrics};
use crate::portfolio::{Portfolio, Trade};
use crate::strategy::Strategy;
use quantra_core::MarketPoint;
use tracing::debug;

/// Inputs to one backtest run.
pub struct BacktestConfig<'a> {
    /// Chronologically sorted market series.
    pub series: &'a [MarketPoint],
    /// Starting capital, strictly positive.
    pub initial_capital: f64,
}

/// Output of one backtest run.
#[derive(Debug, Clone)]
pub struct BacktestOutcome {
    pub metrics: PerformanceMetrics,
    pub trade_log: Vec<Trade>,
    pub final_equity: f64,
}

/// Runs a strategy over a series, producing metrics and the trade log.
///
/// Pure apart from the mutation of the passed strategy: no I/O, no shared
/// state; the run owns its portfolio.
pub fn run_backtest(
    strategy: &mut dyn Strategy,
    config: &BacktestConfig<'_>,
) -> EngineResult<BacktestOutcome> {
    if config.series.is_empty() {
        return Err(EngineError::MissingData);
    }
    if config.initial_capital <= 0.0 || !config.initial_capital.is_finite() {
        return Err(EngineError::InvalidConfig(
            "initial capital must be positive".to_string(),
        ));
    }

    let mut portfolio = Portfolio::new(config.initial_capital);
    let mut equity_curve = Vec::with_capacity(config.series.len());

    for point in config.series {
        strategy.on_tick(point, &mut portfolio);
        equity_curve.push(portfolio.equity(point.close));
    }

    strategy.on_finish(&mut portfolio);

    // on_finish may have liquidated; re-mark the final day at the last close.
    let last_close = config.series[config.series.len() - 1].close;
    let final_equity = portfolio.equity(last_close);
    if let Some(last) = equity_curve.last_mut() {
        *last = final_equity;
    }

    let start = config.series[0].date;
    let end = config.series[config.series.len() - 1].date;
    let metrics = compute_metrics(&equity_curve, config.initial_capital, start, end, portfolio.trades());

    debug!(
        strategy = strategy.name(),
        ticks = config.series.len(),
        total_return = metrics.total_return,
        "Backtest run finished"
    );

    Ok(BacktestOutcome {
        metrics,
        trade_log: portfolio.into_trades(),
        final_equity,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategies::BuyAndHold;
    use chrono::NaiveDate;

    fn series(closes: &[f64]) -> Vec<MarketPoint> {
        closes
            .iter()
            .enumerate()
            .map(|(i, close)| MarketPoint {
                symbol: "TEST".to_string(),
                date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
                    + chrono::Duration::days(i as i64),
                open: *close,
                high: *close,
                low: *close,
                close: *close,
                volume: 1000,
            })
            .collect()
    }

    #[test]
    fn test_empty_series_is_missing_data() {
        let mut strategy = BuyAndHold::new();
        let config = BacktestConfig {
            series: &[],
            initial_capital: 1000.0,
        };
        assert!(matches!(
            run_backtest(&mut strategy, &config),
            Err(EngineError::MissingData)
        ));
    }

    #[test]
    fn test_non_positive_capital_is_rejected() {
        let mut strategy = BuyAndHold::new();
        let points = series(&[10.0]);
        let config = BacktestConfig {
            series: &points,
            initial_capital: 0.0,
        };
        assert!(matches!(
            run_backtest(&mut strategy, &config),
            Err(EngineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_buy_and_hold_on_rising_series() {
        let mut strategy = BuyAndHold::new();
        let points = series(&[10.0, 11.0, 12.0]);
        let config = BacktestConfig {
            series: &points,
            initial_capital: 1000.0,
        };

        let outcome = run_backtest(&mut strategy, &config).unwrap();

        assert!((outcome.final_equity - 1200.0).abs() < 1e-9);
        assert!((outcome.metrics.total_return - 0.2).abs() < 1e-9);
        // One buy, one liquidating sell.
        assert_eq!(outcome.trade_log.len(), 2);
        assert!((outcome.metrics.win_rate - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_buy_and_hold_on_falling_series() {
        let mut strategy = BuyAndHold::new();
        let points = series(&[10.0, 9.0, 8.0]);
        let config = BacktestConfig {
            series: &points,
            initial_capital: 1000.0,
        };

        let outcome = run_backtest(&mut strategy, &config).unwrap();

        assert!(outcome.metrics.total_return < 0.0);
        assert!(outcome.metrics.max_drawdown > 0.0);
        assert_eq!(outcome.metrics.win_rate, 0.0);
    }
}
