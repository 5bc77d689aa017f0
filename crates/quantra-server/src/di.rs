//! Dependency wiring.
//!
//! Constructor injection from the bottom of the stack up: database pool,
//! stores, queue, gateway, services, executor, worker pool, janitor. The
//! sweep coordinator is shared between the REST layer (as `SweepService`)
//! and the executor (as `SweepNotifier`).

use quantra_config::AppConfig;
use quantra_core::QuantraError;
use quantra_core::QuantraResult;
use quantra_engine::StrategyRegistry;
use quantra_jobs::{
    create_redis_pool, CachedMarketDataGateway, DispatchQueue, Janitor, JanitorConfig,
    JobExecutor, MarketDataProvider, RedisDispatchQueue, RetryPolicy, WorkerPool,
    WorkerPoolConfig,
};
use quantra_service::{SubmissionServiceImpl, SweepCoordinator};
use quantra_store::{
    DatabasePool, JobStore, MarketDataStore, MySqlJobStore, MySqlMarketDataStore, MySqlSweepStore,
    SweepStore,
};
use std::sync::Arc;
use std::time::Duration;

/// The fully wired application.
pub struct AppContext {
    pub db_pool: DatabasePool,
    pub submissions: Arc<SubmissionServiceImpl>,
    pub coordinator: Arc<SweepCoordinator>,
    pub worker_pool: Arc<WorkerPool>,
    pub janitor: Option<Arc<Janitor>>,
}

/// Builds the application from configuration.
pub async fn build_app_context(config: &AppConfig) -> QuantraResult<AppContext> {
    // Persistence
    let db_pool = DatabasePool::connect(&config.database).await?;
    db_pool.run_migrations().await?;

    let job_store: Arc<dyn JobStore> = Arc::new(MySqlJobStore::new(db_pool.clone()));
    let sweep_store: Arc<dyn SweepStore> = Arc::new(MySqlSweepStore::new(db_pool.clone()));
    let market_store: Arc<dyn MarketDataStore> =
        Arc::new(MySqlMarketDataStore::new(db_pool.clone()));

    // Dispatch queue
    let redis_pool = create_redis_pool(&config.redis)
        .map_err(|e| QuantraError::Configuration(e.to_string()))?;
    let queue: Arc<dyn DispatchQueue> =
        Arc::new(RedisDispatchQueue::new(redis_pool, &config.redis.key_prefix));

    // Kernel collaborators
    let registry = Arc::new(StrategyRegistry::standard());
    let market_data: Arc<dyn MarketDataProvider> = Arc::new(CachedMarketDataGateway::new(
        market_store,
        Duration::from_secs(config.market_data.cache_ttl_secs),
        config.market_data.synthetic_fallback,
    ));

    // Services
    let retry = RetryPolicy::from(&config.jobs);
    let submissions = Arc::new(SubmissionServiceImpl::new(
        job_store.clone(),
        queue.clone(),
        registry.clone(),
    ));
    let coordinator = Arc::new(SweepCoordinator::new(
        sweep_store.clone(),
        job_store.clone(),
        queue.clone(),
        registry.clone(),
    ));

    // Orchestration
    let executor = Arc::new(JobExecutor::new(
        job_store.clone(),
        queue.clone(),
        market_data,
        registry,
        retry.clone(),
        coordinator.clone(),
    ));
    let worker_pool = Arc::new(WorkerPool::new(
        queue.clone(),
        job_store.clone(),
        executor,
        retry.clone(),
        WorkerPoolConfig::from(&config.jobs),
    ));
    let janitor = config.jobs.janitor.enabled.then(|| {
        Arc::new(Janitor::new(
            job_store.clone(),
            queue.clone(),
            retry,
            coordinator.clone(),
            JanitorConfig::from(&config.jobs.janitor),
        ))
    });

    Ok(AppContext {
        db_pool,
        submissions,
        coordinator,
        worker_pool,
        janitor,
    })
}
