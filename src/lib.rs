pub mod cache;
pub mod config;
pub mod controllers;
pub mod database;
pub mod errors;
pub mod middleware;
pub mod models;
pub mod redis_client;
pub mod services;
pub mod store;

use std::sync::Arc;

use crate::services::{AvailabilityResolver, HoldManager, LifecycleHandler, PricingResolver};
use crate::store::{PgSeatStore, SeatStore};

// Shared state для всего приложения. Репозиторий журнала передаётся в
// каждый компонент явно - никаких процессных синглтонов.
#[derive(Clone)]
pub struct AppState {
    pub db: database::Database,
    pub redis: redis_client::RedisClient,
    pub cache: cache::CacheService,
    pub config: config::Config,
    pub store: Arc<dyn SeatStore>,
    pub holds: HoldManager,
    pub availability: AvailabilityResolver,
    pub lifecycle: LifecycleHandler,
    pub pricing: PricingResolver,
}

impl AppState {
    pub async fn new(config: config::Config) -> anyhow::Result<Arc<Self>> {
        let db = database::Database::new(&config.database.url, config.database.pool_size).await?;

        db.run_migrations().await?;

        let redis = redis_client::RedisClient::new(&config.redis.url).await?;
        let cache = cache::CacheService::new(redis.clone());

        let store: Arc<dyn SeatStore> = Arc::new(PgSeatStore::new(db.pool.clone()));
        let holds = HoldManager::new(store.clone(), config.holds.ttl_seconds);
        let availability = AvailabilityResolver::new(store.clone());
        let pricing = PricingResolver::new(store.clone());
        let lifecycle = LifecycleHandler::new(store.clone(), pricing.clone());

        Ok(Arc::new(Self {
            db,
            redis,
            cache,
            config,
            store,
            holds,
            availability,
            lifecycle,
            pricing,
        }))
    }
}
