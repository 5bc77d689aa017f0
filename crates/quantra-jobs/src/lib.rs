//! # Quantra Jobs
//!
//! The job orchestration core: a Redis-backed dispatch queue, the executor
//! that locks, runs, and terminates a single job, a fixed-size worker pool,
//! the bounded retry policy, the stale-job janitor, and the cached market
//! data gateway.
//!
//! The dispatch queue is a hint, not the source of truth: workers tolerate
//! duplicate deliveries, deliveries of terminal jobs, and deliveries of ids
//! whose rows vanished. The authoritative check for "is this job still
//! pending?" is the state column read under the row lock inside
//! [`JobExecutor::execute`].

pub mod config;
pub mod error;
pub mod executor;
pub mod janitor;
pub mod market_data;
pub mod metrics;
pub mod queue;
pub mod redis;
pub mod retry;
pub mod worker;

pub mod testing;

pub use config::WorkerPoolConfig;
pub use error::{JobError, JobResult};
pub use executor::{JobExecutor, NullSweepNotifier, SweepNotifier};
pub use janitor::{Janitor, JanitorConfig};
pub use market_data::{CachedMarketDataGateway, MarketDataProvider};
pub use self::metrics::register_metrics;
pub use queue::DispatchQueue;
pub use self::redis::{create_redis_pool, RedisDispatchQueue, RedisKeys};
pub use retry::RetryPolicy;
pub use worker::{WorkerPool, WorkerPoolStats};
