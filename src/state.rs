use std::sync::Arc;

use crate::{
    config::AppConfig,
    db::{DbPool, OrmConn, orm_from_pool},
    services::idempotency::IdempotencyStore,
};

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub orm: OrmConn,
    pub idempotency: IdempotencyStore,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(pool: DbPool, config: AppConfig) -> Self {
        Self {
            orm: orm_from_pool(&pool),
            pool,
            idempotency: IdempotencyStore::new(config.idempotency_ttl),
            config: Arc::new(config),
        }
    }
}
