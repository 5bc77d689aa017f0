//! Performance statistics over an equity curve and trade log.

use crate::portfolio::{Trade, TradeAction};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Trading days per year, used for annualization.
pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// The fixed statistic set computed for every backtest run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    /// Total return over the interval, as a fraction of initial capital.
    pub total_return: f64,
    /// Compound annual growth rate.
    pub cagr: f64,
    /// Annualized standard deviation of daily returns.
    pub volatility: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    /// Largest peak-to-trough decline, as a positive fraction.
    pub max_drawdown: f64,
    /// Fraction of closing trades with positive realized profit.
    pub win_rate: f64,
}

/// Computes the statistic set from a daily equity curve.
///
/// The curve must contain one point per market day, in order; the first
/// point is compared against `initial_capital`.
#[must_use]
pub fn compute_metrics(
    equity_curve: &[f64],
    initial_capital: f64,
    start: NaiveDate,
    end: NaiveDate,
    trades: &[Trade],
) -> PerformanceMetrics {
    let final_equity = equity_curve.last().copied().unwrap_or(initial_capital);
    let total_return = (final_equity - initial_capital) / initial_capital;

    let returns = daily_returns(equity_curve, initial_capital);
    let mean = mean(&returns);
    let deviation = std_deviation(&returns, mean);
    let downside = downside_deviation(&returns);

    let annualization = TRADING_DAYS_PER_YEAR.sqrt();
    let volatility = deviation * annualization;
    let sharpe_ratio = if deviation > 0.0 {
        mean / deviation * annualization
    } else {
        0.0
    };
    let sortino_ratio = if downside > 0.0 {
        mean / downside * annualization
    } else {
        0.0
    };

    PerformanceMetrics {
        total_return,
        cagr: cagr(initial_capital, final_equity, start, end, total_return),
        volatility,
        sharpe_ratio,
        sortino_ratio,
        max_drawdown: max_drawdown(equity_curve, initial_capital),
        win_rate: win_rate(trades),
    }
}

fn daily_returns(equity_curve: &[f64], initial_capital: f64) -> Vec<f64> {
    let mut previous = initial_capital;
    let mut returns = Vec::with_capacity(equity_curve.len());
    for value in equity_curve {
        if previous > 0.0 {
            returns.push(value / previous - 1.0);
        }
        previous = *value;
    }
    returns
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn std_deviation(values: &[f64], mean: f64) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let variance =
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

/// Root-mean-square of the negative returns, with non-negative returns
/// contributing zero.
fn downside_deviation(returns: &[f64]) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    let sum_sq = returns
        .iter()
        .map(|r| r.min(0.0).powi(2))
        .sum::<f64>();
    (sum_sq / returns.len() as f64).sqrt()
}

fn cagr(
    initial_capital: f64,
    final_equity: f64,
    start: NaiveDate,
    end: NaiveDate,
    total_return: f64,
) -> f64 {
    let days = (end - start).num_days();
    if days <= 0 || final_equity <= 0.0 {
        return total_return;
    }
    let years = days as f64 / 365.25;
    if years < 1.0 / 365.25 {
        return total_return;
    }
    (final_equity / initial_capital).powf(1.0 / years) - 1.0
}

fn max_drawdown(equity_curve: &[f64], initial_capital: f64) -> f64 {
    let mut peak = initial_capital;
    let mut worst: f64 = 0.0;
    for value in equity_curve {
        if *value > peak {
            peak = *value;
        } else if peak > 0.0 {
            worst = worst.max((peak - value) / peak);
        }
    }
    worst
}

fn win_rate(trades: &[Trade]) -> f64 {
    let sells: Vec<&Trade> = trades
        .iter()
        .filter(|t| t.action == TradeAction::Sell)
        .collect();
    if sells.is_empty() {
        return 0.0;
    }
    let wins = sells
        .iter()
        .filter(|t| t.pnl.unwrap_or(0.0) > 0.0)
        .count();
    wins as f64 / sells.len() as f64
}
