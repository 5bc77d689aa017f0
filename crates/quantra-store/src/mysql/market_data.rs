//! MySQL market data store implementation.

use crate::traits::MarketDataStore;
use crate::DatabasePool;
use async_trait::async_trait;
use chrono::NaiveDate;
use quantra_core::{MarketPoint, QuantraResult};
use sqlx::FromRow;
use tracing::debug;

/// MySQL market data store implementation.
#[derive(Clone)]
pub struct MySqlMarketDataStore {
    pool: DatabasePool,
}

impl MySqlMarketDataStore {
    /// Creates a new MySQL market data store.
    #[must_use]
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

/// Database row representation of a market data point.
#[derive(Debug, FromRow)]
struct MarketPointRow {
    symbol: String,
    date: NaiveDate,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: i64,
}

impl From<MarketPointRow> for MarketPoint {
    fn from(row: MarketPointRow) -> Self {
        Self {
            symbol: row.symbol,
            date: row.date,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            volume: row.volume,
        }
    }
}

#[async_trait]
impl MarketDataStore for MySqlMarketDataStore {
    async fn find_series(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> QuantraResult<Vec<MarketPoint>> {
        debug!("Loading market data for {} [{} .. {}]", symbol, start, end);

        let rows = sqlx::query_as::<_, MarketPointRow>(
            "SELECT symbol, date, open, high, low, close, volume \
             FROM market_data \
             WHERE symbol = ? AND date BETWEEN ? AND ? \
             ORDER BY date",
        )
        .bind(symbol)
        .bind(start)
        .bind(end)
        .fetch_all(self.pool.inner())
        .await?;

        Ok(rows.into_iter().map(MarketPoint::from).collect())
    }
}
