//! Moving-average crossover strategy.

use crate::error::{EngineError, EngineResult};
use crate::portfolio::Portfolio;
use crate::strategy::Strategy;
use chrono::NaiveDate;
use quantra_core::MarketPoint;
use std::collections::VecDeque;

const DEFAULT_SHORT_WINDOW: usize = 10;
const DEFAULT_LONG_WINDOW: usize = 30;

/// Goes long when the short moving average crosses above the long one and
/// exits when it crosses back below.
#[derive(Debug)]
pub struct MovingAverageCrossover {
    short_window: usize,
    long_window: usize,
    closes: VecDeque<f64>,
    prev_signal: Option<bool>,
    last_seen: Option<(NaiveDate, f64)>,
}

impl MovingAverageCrossover {
    /// Creates the strategy with explicit window lengths.
    pub fn new(short_window: usize, long_window: usize) -> EngineResult<Self> {
        if short_window == 0 || long_window == 0 {
            return Err(EngineError::InvalidParameter(
                "moving average windows must be positive".to_string(),
            ));
        }
        if short_window >= long_window {
            return Err(EngineError::InvalidParameter(format!(
                "shortWindow ({}) must be smaller than longWindow ({})",
                short_window, long_window
            )));
        }
        Ok(Self {
            short_window,
            long_window,
            closes: VecDeque::with_capacity(long_window),
            prev_signal: None,
            last_seen: None,
        })
    }

    /// Builds the strategy from its opaque parameter blob.
    ///
    /// Recognized keys: `shortWindow`, `longWindow`; both optional.
    pub fn from_parameters(parameters: &serde_json::Value) -> EngineResult<Self> {
        let short_window = window_param(parameters, "shortWindow", DEFAULT_SHORT_WINDOW)?;
        let long_window = window_param(parameters, "longWindow", DEFAULT_LONG_WINDOW)?;
        Self::new(short_window, long_window)
    }

    fn mean_of_last(&self, count: usize) -> f64 {
        let sum: f64 = self.closes.iter().rev().take(count).sum();
        sum / count as f64
    }
}

fn window_param(parameters: &serde_json::Value, key: &str, default: usize) -> EngineResult<usize> {
    match parameters.get(key) {
        None | Some(serde_json::Value::Null) => Ok(default),
        Some(value) => value
            .as_u64()
            .map(|v| v as usize)
            .ok_or_else(|| EngineError::InvalidParameter(format!("{} must be a positive integer", key))),
    }
}

impl Strategy for MovingAverageCrossover {
    fn name(&self) -> &str {
        "MovingAverageCrossover"
    }

    fn on_tick(&mut self, point: &MarketPoint, portfolio: &mut Portfolio) {
        self.last_seen = Some((point.date, point.close));

        self.closes.push_back(point.close);
        if self.closes.len() > self.long_window {
            self.closes.pop_front();
        }
        if self.closes.len() < self.long_window {
            return;
        }

        let short_ma = self.mean_of_last(self.short_window);
        let long_ma = self.mean_of_last(self.long_window);
        let signal = short_ma > long_ma;

        match self.prev_signal {
            Some(prev) if prev != signal => {
                if signal {
                    portfolio.buy_max(point.date, point.close);
                } else {
                    portfolio.sell_all(point.date, point.close);
                }
            }
            None if signal => {
                // Already above at the first full window: enter immediately.
                portfolio.buy_max(point.date, point.close);
            }
            _ => {}
        }
        self.prev_signal = Some(signal);
    }

    fn on_finish(&mut self, portfolio: &mut Portfolio) {
        if let Some((date, close)) = self.last_seen {
            portfolio.sell_all(date, close);
        }
    }
}
