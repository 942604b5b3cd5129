use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};
use sqlx::{Executor, Row, SqlitePool};
use std::collections::HashMap;

use crate::time::now_ms;
use tracing::{error, info};

static ADD_COLUMN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^ALTER\s+TABLE\s+(\w+)\s+ADD\s+COLUMN\s+(\w+)").expect("add column regex")
});

fn preview(sql: &str) -> String {
    let one_line = sql.replace(['\n', '\t'], " ");
    let trimmed = one_line.trim();
    match trimmed.char_indices().nth(160) {
        Some((idx, _)) => format!("{}…", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}

pub static MIGRATIONS: &[(&str, &str)] = &[
    (
        "202601050900_initial.sql",
        include_str!("../migrations/202601050900_initial.sql"),
    ),
    (
        "202601051000_household_members.sql",
        include_str!("../migrations/202601051000_household_members.sql"),
    ),
    (
        "202601061200_bilingual_names.sql",
        include_str!("../migrations/202601061200_bilingual_names.sql"),
    ),
    (
        "202601071500_attachments.sql",
        include_str!("../migrations/202601071500_attachments.sql"),
    ),
];

fn strip_comments(raw_sql: &str) -> String {
    raw_sql
        .lines()
        .filter(|line| {
            let t = line.trim_start();
            !(t.is_empty() || t.starts_with("--"))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn checksum(cleaned: &str) -> String {
    format!("{:x}", Sha256::digest(cleaned.as_bytes()))
}

/// Outcome of [`apply_migrations`]: file names applied by this call.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    pub applied: Vec<String>,
    pub skipped: Vec<String>,
}

pub async fn apply_migrations(pool: &SqlitePool) -> anyhow::Result<MigrationReport> {
    pool.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (\
           version   TEXT PRIMARY KEY,\
           applied_at INTEGER NOT NULL,\
           checksum TEXT NOT NULL\
         )",
    )
    .await?;

    let rows = sqlx::query("SELECT version, checksum FROM schema_migrations")
        .fetch_all(pool)
        .await?;
    let mut applied: HashMap<String, String> = HashMap::new();
    for r in rows {
        if let (Ok(v), Ok(c)) = (
            r.try_get::<String, _>("version"),
            r.try_get::<String, _>("checksum"),
        ) {
            applied.insert(v, c);
        }
    }

    let mut report = MigrationReport::default();
    for (filename, raw_sql) in MIGRATIONS {
        let cleaned = strip_comments(raw_sql);
        let checksum = checksum(&cleaned);

        if let Some(stored) = applied.get(*filename) {
            if stored != &checksum {
                anyhow::bail!("migration {} edited after application", filename);
            }
            info!(target: "homestock", event = "migration_skip_file", file = %filename);
            report.skipped.push(filename.to_string());
            continue;
        }

        let mut tx = pool.begin().await?;
        for stmt in cleaned.split(';') {
            let s = stmt.trim();
            if s.is_empty() {
                continue;
            }
            let upper = s.to_ascii_uppercase();
            if upper == "BEGIN" || upper == "COMMIT" {
                continue;
            }
            if let Some(caps) = ADD_COLUMN.captures(s) {
                let (table, col) = (&caps[1], &caps[2]);
                let exists: Option<i64> = sqlx::query_scalar(
                    "SELECT 1 FROM pragma_table_info(?) WHERE name = ?",
                )
                .bind(table)
                .bind(col)
                .fetch_optional(&mut *tx)
                .await?;
                if exists.is_some() {
                    info!(target: "homestock", event = "migration_stmt_skip", file = %filename, sql = %preview(s));
                    continue;
                }
            }
            info!(target: "homestock", event = "migration_stmt", file = %filename, sql = %preview(s));
            if let Err(e) = sqlx::query(s).execute(&mut *tx).await {
                error!(target: "homestock", event = "migration_stmt_error", file = %filename, sql = %preview(s), error = %e);
                return Err(e.into());
            }
        }

        sqlx::query(
            "INSERT INTO schema_migrations (version, applied_at, checksum) VALUES (?, ?, ?)",
        )
        .bind(*filename)
        .bind(now_ms())
        .bind(&checksum)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        info!(target: "homestock", event = "migration_file_applied", file = %filename);
        report.applied.push(filename.to_string());
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_memory_pool;

    #[tokio::test]
    async fn applies_all_then_skips() {
        let pool = open_memory_pool().await.unwrap();
        let first = apply_migrations(&pool).await.unwrap();
        assert_eq!(first.applied.len(), MIGRATIONS.len());
        let second = apply_migrations(&pool).await.unwrap();
        assert!(second.applied.is_empty());
        assert_eq!(second.skipped.len(), MIGRATIONS.len());

        let cols: Vec<String> =
            sqlx::query_scalar("SELECT name FROM pragma_table_info('supplies')")
                .fetch_all(&pool)
                .await
                .unwrap();
        assert!(cols.iter().any(|c| c == "name_ar"));
        assert!(cols.iter().any(|c| c == "name_en"));
    }

    #[tokio::test]
    async fn edited_migration_is_rejected() {
        let pool = open_memory_pool().await.unwrap();
        apply_migrations(&pool).await.unwrap();
        sqlx::query("UPDATE schema_migrations SET checksum = 'tampered' WHERE version = ?")
            .bind(MIGRATIONS[0].0)
            .execute(&pool)
            .await
            .unwrap();
        let err = apply_migrations(&pool).await.unwrap_err();
        assert!(err.to_string().contains("edited after application"));
    }

    #[test]
    fn comments_do_not_affect_checksum() {
        let a = checksum(&strip_comments("-- note\nCREATE TABLE x (id TEXT);"));
        let b = checksum(&strip_comments("CREATE TABLE x (id TEXT);\n-- another"));
        assert_eq!(a, b);
    }
}
