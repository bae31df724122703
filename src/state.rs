//! Application state wiring.
//!
//! Builds the store, coordination backends, adapters and scheduler from
//! `Settings`. Cloning is cheap since every component is shared.

use std::sync::Arc;

use crate::config::{SchedulerBackend, Settings};
use crate::db::{AsyncDbPool, create_redis_pool, establish_async_connection_pool};
use crate::dispatch::{DeliveryScheduler, FanoutEngine, RetrySweeper};
use crate::error::AppResult;
use crate::lock::{LockManager, MemoryLockManager, RedisLockManager};
use crate::platforms::{AdapterRegistry, build_http_client};
use crate::queue::{MemoryWorkIndex, ReadyQueue, RedisWorkIndex, WorkIndex};
use crate::repositories::{PgDeliveryStore, Repositories};
use crate::services::MessageService;
use crate::store::DeliveryStore;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    /// Direct access to the database connection pool
    pub db_pool: AsyncDbPool,
    pub scheduler: Arc<DeliveryScheduler>,
    pub messages: MessageService,
}

impl AppState {
    /// Connects to PostgreSQL and, for the Redis backend, to Redis.
    pub async fn build(settings: Settings) -> AppResult<Self> {
        let db_pool = establish_async_connection_pool(&settings.database).await?;
        let store: Arc<dyn DeliveryStore> =
            Arc::new(PgDeliveryStore::new(Repositories::new(db_pool.clone())));

        let (index, locks) = coordination_backends(&settings).await?;
        let scheduler_config = settings.scheduler.clone();
        let queue = ReadyQueue::new(
            index,
            locks.clone(),
            scheduler_config.claim_strategy,
            scheduler_config.global_lock_ttl(),
        );

        let client = build_http_client(&settings.platforms)?;
        let registry = Arc::new(AdapterRegistry::with_defaults(client, &settings.platforms));

        let engine = FanoutEngine::new(store.clone(), queue.clone(), registry);
        let sweeper = Arc::new(RetrySweeper::new(
            store.clone(),
            engine.clone(),
            &scheduler_config,
        ));
        let scheduler = Arc::new(DeliveryScheduler::new(
            queue,
            locks,
            store.clone(),
            engine.clone(),
            sweeper.clone(),
            scheduler_config,
        ));
        let messages = MessageService::new(store, engine, sweeper);

        Ok(Self {
            settings: Arc::new(settings),
            db_pool,
            scheduler,
            messages,
        })
    }
}

async fn coordination_backends(
    settings: &Settings,
) -> AppResult<(Arc<dyn WorkIndex>, Arc<dyn LockManager>)> {
    match settings.scheduler.backend {
        SchedulerBackend::Redis => {
            let redis = &settings.redis;
            let pool = create_redis_pool(redis).await?;
            tracing::info!(
                key_prefix = %redis.key_prefix,
                queue_key = %settings.scheduler.queue_key,
                "Using Redis scheduler backend"
            );
            Ok((
                Arc::new(RedisWorkIndex::new(
                    pool.clone(),
                    &redis.key_prefix,
                    &settings.scheduler.queue_key,
                )),
                Arc::new(RedisLockManager::new(pool, redis.key_prefix.clone())),
            ))
        }
        SchedulerBackend::Memory => {
            tracing::warn!("Using in-memory scheduler backend; coordination is single-process only");
            Ok((
                Arc::new(MemoryWorkIndex::new()),
                Arc::new(MemoryLockManager::new()),
            ))
        }
    }
}
