use std::sync::Arc;

use sqlx::SqlitePool;

use crate::config::Config;
use crate::household::DefaultDataset;
use crate::notify::{self, Messenger};
use crate::realtime::ChangeFeed;
use crate::AppResult;

/// Shared handles for every request.
#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub feed: ChangeFeed,
    pub messenger: Arc<dyn Messenger>,
    pub dataset: Arc<DefaultDataset>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(pool: SqlitePool, config: Config) -> AppResult<Self> {
        let messenger: Arc<dyn Messenger> = Arc::from(notify::messenger::from_config(&config.messenger));
        Ok(Self {
            pool,
            feed: ChangeFeed::new(),
            messenger,
            dataset: Arc::new(DefaultDataset::bundled()?),
            config: Arc::new(config),
        })
    }

    pub fn with_messenger(mut self, messenger: Arc<dyn Messenger>) -> Self {
        self.messenger = messenger;
        self
    }

    pub fn pool_clone(&self) -> SqlitePool {
        self.pool.clone()
    }
}
