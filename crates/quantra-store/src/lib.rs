//! # Quantra Store
//!
//! Transactional persistence for jobs, sweeps, results, and market data,
//! backed by MySQL through sqlx. Row-level locking primitives
//! (`SELECT ... FOR UPDATE`) and optimistic version checks live here; the
//! orchestration layers compose them through the transaction traits.

pub mod mysql;
pub mod pool;
pub mod traits;

pub use mysql::{MySqlJobStore, MySqlMarketDataStore, MySqlSweepStore};
pub use pool::DatabasePool;
pub use traits::{JobStore, JobStoreTx, MarketDataStore, SweepStore, SweepStoreTx};
