//! Read-through cached market data gateway.

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, Weekday};
use parking_lot::RwLock;
use quantra_core::{Interface, MarketPoint, QuantraResult};
use quantra_store::MarketDataStore;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Seed for the deterministic synthetic series generator.
const SYNTHETIC_SEED: u64 = 0x5EED_CAFE;

/// Gateway to historical series, as seen by the executor.
#[async_trait]
pub trait MarketDataProvider: Interface + Send + Sync {
    /// Returns a chronologically sorted series with dates in `[start, end]`.
    async fn load(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> QuantraResult<Vec<MarketPoint>>;
}

type CacheKey = (String, NaiveDate, NaiveDate);

struct CacheEntry {
    loaded_at: Instant,
    series: Arc<Vec<MarketPoint>>,
}

/// Read-through cache over a [`MarketDataStore`], keyed by the exact
/// `(symbol, start, end)` triple with a finite TTL.
///
/// No range-intersection caching: a near-miss range is a plain miss.
/// When the store has nothing for a range, the `synthetic_fallback` knob
/// decides between an empty series (which the executor surfaces as a
/// failure) and a deterministic synthetic one; the executor does not care
/// which.
pub struct CachedMarketDataGateway {
    store: Arc<dyn MarketDataStore>,
    ttl: Duration,
    synthetic_fallback: bool,
    cache: RwLock<HashMap<CacheKey, CacheEntry>>,
}

impl CachedMarketDataGateway {
    /// Creates a gateway over the store.
    #[must_use]
    pub fn new(store: Arc<dyn MarketDataStore>, ttl: Duration, synthetic_fallback: bool) -> Self {
        Self {
            store,
            ttl,
            synthetic_fallback,
            cache: RwLock::new(HashMap::new()),
        }
    }

    fn cached(&self, key: &CacheKey) -> Option<Arc<Vec<MarketPoint>>> {
        let cache = self.cache.read();
        cache
            .get(key)
            .filter(|entry| entry.loaded_at.elapsed() < self.ttl)
            .map(|entry| entry.series.clone())
    }

    fn store_in_cache(&self, key: CacheKey, series: Arc<Vec<MarketPoint>>) {
        let mut cache = self.cache.write();
        cache.retain(|_, entry| entry.loaded_at.elapsed() < self.ttl);
        cache.insert(
            key,
            CacheEntry {
                loaded_at: Instant::now(),
                series,
            },
        );
    }
}

#[async_trait]
impl MarketDataProvider for CachedMarketDataGateway {
    async fn load(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> QuantraResult<Vec<MarketPoint>> {
        let key = (symbol.to_string(), start, end);

        if let Some(series) = self.cached(&key) {
            debug!(symbol, %start, %end, "Market data cache hit");
            return Ok(series.as_ref().clone());
        }

        let mut series = self.store.find_series(symbol, start, end).await?;

        if series.is_empty() && self.synthetic_fallback {
            debug!(symbol, %start, %end, "No persisted data; generating synthetic series");
            series = synthetic_series(symbol, start, end);
        }

        let shared = Arc::new(series);
        self.store_in_cache(key, shared.clone());
        Ok(shared.as_ref().clone())
    }
}

/// Generates a deterministic daily series over the business days of the
/// interval, seeded from a fixed constant and the symbol.
#[must_use]
pub fn synthetic_series(symbol: &str, start: NaiveDate, end: NaiveDate) -> Vec<MarketPoint> {
    let mut state = symbol
        .bytes()
        .fold(SYNTHETIC_SEED, |acc, b| acc.wrapping_mul(31).wrapping_add(u64::from(b)));

    let mut price = 20.0 + (state % 200) as f64;
    let mut series = Vec::new();
    let mut date = start;

    while date <= end {
        if !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
            state = next_state(state);
            // Daily move in [-2%, +2%].
            let drift = ((state >> 33) % 401) as f64 / 100.0 - 2.0;
            let open = price;
            price = (price * (1.0 + drift / 100.0)).max(1.0);

            let high = open.max(price) * 1.01;
            let low = open.min(price) * 0.99;
            let volume = 100_000 + (state % 900_000) as i64;

            series.push(MarketPoint {
                symbol: symbol.to_string(),
                date,
                open,
                high,
                low,
                close: price,
                volume,
            });
        }
        date += chrono::Duration::days(1);
    }

    series
}

fn next_state(state: u64) -> u64 {
    state
        .wrapping_mul(6_364_136_223_846_793_005)
        .wrapping_add(1_442_695_040_888_963_407)
}
