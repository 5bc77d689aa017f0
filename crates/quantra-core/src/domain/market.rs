//! Historical market data point.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One daily bar of historical market data, unique by (symbol, date).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketPoint {
    pub symbol: String,
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}
