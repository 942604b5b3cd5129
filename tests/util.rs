#![allow(clippy::unwrap_used, clippy::expect_used, dead_code)]

use std::net::SocketAddr;
use std::path::PathBuf;

use homestock_lib::categories::{self, Category, NewCategory};
use homestock_lib::config::{Config, LogConfig, MessengerConfig};
use homestock_lib::db::open_memory_pool;
use homestock_lib::migrate::apply_migrations;
use homestock_lib::realtime::ChangeFeed;
use homestock_lib::supplies::{self, NewSupply, Supply, SupplyStatus};
use sqlx::SqlitePool;

pub async fn temp_pool() -> SqlitePool {
    let pool = open_memory_pool().await.expect("open in-memory pool");
    apply_migrations(&pool).await.expect("apply migrations");
    pool
}

pub fn test_config() -> Config {
    Config {
        db_path: PathBuf::from(":memory:"),
        bind: SocketAddr::from(([127, 0, 0, 1], 0)),
        log: LogConfig::default(),
        messenger: MessengerConfig::default(),
    }
}

pub async fn add_category(pool: &SqlitePool, feed: &ChangeFeed, hh: &str, id: &str, name: &str) -> Category {
    categories::insert(
        pool,
        feed,
        hh,
        NewCategory {
            id: Some(id.into()),
            name: name.into(),
            ..Default::default()
        },
    )
    .await
    .expect("insert category")
}

pub async fn add_supply(
    pool: &SqlitePool,
    feed: &ChangeFeed,
    hh: &str,
    category: &str,
    name: &str,
    status: SupplyStatus,
) -> Supply {
    supplies::insert(
        pool,
        feed,
        hh,
        NewSupply {
            name: name.into(),
            status: Some(status),
            category: category.into(),
            ..Default::default()
        },
    )
    .await
    .expect("insert supply")
}
