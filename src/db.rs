use anyhow::{Context, Result as AnyResult};
use futures::future::BoxFuture;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite, Transaction};
use std::path::Path;
use std::time::Duration;

pub async fn open_sqlite_pool(db_path: &Path) -> AnyResult<Pool<Sqlite>> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| {
                tracing::error!(
                    target: "homestock",
                    error = %e,
                    event = "db_dir_create_failed",
                    path = %parent.display()
                );
                e
            })?;
        }
    }
    tracing::info!(target: "homestock", event = "db_path", path = %db_path.display());

    let opts = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Full)
        .foreign_keys(true)
        .busy_timeout(Duration::from_millis(5000));

    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .after_connect(|conn, _| {
            Box::pin(async move {
                sqlx::query("PRAGMA wal_autocheckpoint = 1000;")
                    .execute(&mut *conn)
                    .await?;
                Ok::<_, sqlx::Error>(())
            })
        })
        .connect_with(opts)
        .await
        .with_context(|| format!("open sqlite database {}", db_path.display()))?;

    log_effective_pragmas(&pool).await;

    Ok(pool)
}

/// Single-connection in-memory pool, used by tests and dry runs.
pub async fn open_memory_pool() -> AnyResult<Pool<Sqlite>> {
    let opts = SqliteConnectOptions::new()
        .in_memory(true)
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(opts)
        .await?;
    Ok(pool)
}

async fn log_effective_pragmas(pool: &Pool<Sqlite>) {
    use tracing::{info, warn};

    let (sqlite_ver,): (String,) = sqlx::query_as("select sqlite_version()")
        .fetch_one(pool)
        .await
        .unwrap_or((String::from("unknown"),));

    let jm: (String,) = sqlx::query_as("PRAGMA journal_mode;")
        .fetch_one(pool)
        .await
        .unwrap_or((String::from("unknown"),));

    let sync: (i64,) = sqlx::query_as("PRAGMA synchronous;")
        .fetch_one(pool)
        .await
        .unwrap_or((i64::MIN,));

    let fks: (i64,) = sqlx::query_as("PRAGMA foreign_keys;")
        .fetch_one(pool)
        .await
        .unwrap_or((i64::MIN,));

    let busy: (i64,) = sqlx::query_as("PRAGMA busy_timeout;")
        .fetch_one(pool)
        .await
        .unwrap_or((i64::MIN,));

    info!(
        target: "homestock",
        event = "db_open",
        sqlite_version = %sqlite_ver,
        journal_mode = %jm.0,
        synchronous = %sync.0,
        foreign_keys = %fks.0,
        busy_timeout_ms = %busy.0
    );

    if !jm.0.eq_ignore_ascii_case("wal") {
        warn!(
            target: "homestock",
            event = "db_open_warning",
            msg = "journal_mode != WAL; running with reduced crash safety"
        );
    }
}

/// Run work inside a transaction. Commits on success, rolls back on error.
///
/// The closure must return a boxed future that only borrows the transaction,
/// so callers move owned copies of their inputs into it.
pub async fn run_in_tx<R, E, F>(pool: &Pool<Sqlite>, f: F) -> Result<R, E>
where
    E: From<sqlx::Error>,
    F: for<'c> FnOnce(&'c mut Transaction<'static, Sqlite>) -> BoxFuture<'c, Result<R, E>>,
{
    use tracing::{debug, error, warn};

    let mut tx = pool.begin().await.map_err(E::from)?;
    debug!(target: "homestock", event = "db_tx_begin");
    match f(&mut tx).await {
        Ok(val) => {
            tx.commit().await.map_err(E::from)?;
            debug!(target: "homestock", event = "db_tx_commit");
            Ok(val)
        }
        Err(e) => {
            if let Err(rb) = tx.rollback().await {
                error!(target: "homestock", event = "db_tx_rollback_failed", error = %rb);
            } else {
                warn!(target: "homestock", event = "db_tx_rollback");
            }
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AppError;

    async fn pool_with_table() -> Pool<Sqlite> {
        let pool = open_memory_pool().await.unwrap();
        sqlx::query("CREATE TABLE t (id TEXT PRIMARY KEY)")
            .execute(&pool)
            .await
            .unwrap();
        pool
    }

    async fn count(pool: &Pool<Sqlite>) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM t")
            .fetch_one(pool)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn run_in_tx_commits_on_success() {
        let pool = pool_with_table().await;
        let res: Result<(), AppError> = run_in_tx(&pool, |tx| {
            Box::pin(async move {
                sqlx::query("INSERT INTO t (id) VALUES ('a')")
                    .execute(&mut **tx)
                    .await?;
                Ok(())
            })
        })
        .await;
        assert!(res.is_ok());
        assert_eq!(count(&pool).await, 1);
    }

    #[tokio::test]
    async fn run_in_tx_rolls_back_on_error() {
        let pool = pool_with_table().await;
        let res: Result<(), AppError> = run_in_tx(&pool, |tx| {
            Box::pin(async move {
                sqlx::query("INSERT INTO t (id) VALUES ('a')")
                    .execute(&mut **tx)
                    .await?;
                sqlx::query("INSERT INTO t (id) VALUES ('a')")
                    .execute(&mut **tx)
                    .await?;
                Ok(())
            })
        })
        .await;
        assert!(res.is_err());
        assert_eq!(count(&pool).await, 0);
    }

    #[tokio::test]
    async fn file_pool_uses_wal() {
        let dir = tempfile::tempdir().unwrap();
        let pool = open_sqlite_pool(&dir.path().join("nested").join("db.sqlite3"))
            .await
            .unwrap();
        let (mode,): (String,) = sqlx::query_as("PRAGMA journal_mode;")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(mode.to_ascii_lowercase(), "wal");
    }
}
