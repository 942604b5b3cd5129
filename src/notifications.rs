use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use ts_rs::TS;

use crate::realtime::{ChangeFeed, Row as ChangeRow, RowChange, Table};
use crate::supplies::SupplyStatus;
use crate::util::require_household;
use crate::{AppError, AppResult};

pub const NOT_FOUND_CODE: &str = "NOTIFICATION/NOT_FOUND";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Notification {
    pub id: String,
    pub household_id: String,
    pub item_name: String,
    pub category: String,
    pub status: SupplyStatus,
    pub timestamp: String,
    #[serde(default)]
    pub is_read: bool,
}

impl TryFrom<&SqliteRow> for Notification {
    type Error = AppError;

    fn try_from(row: &SqliteRow) -> Result<Self, Self::Error> {
        let status: String = row.try_get("status")?;
        Ok(Self {
            id: row.try_get("id")?,
            household_id: row.try_get("household_id")?,
            item_name: row.try_get("item_name")?,
            category: row.try_get("category")?,
            status: status.parse()?,
            timestamp: row.try_get("timestamp")?,
            is_read: row.try_get::<i64, _>("is_read")? != 0,
        })
    }
}

const SELECT_COLUMNS: &str =
    "SELECT id, household_id, item_name, category, status, timestamp, is_read FROM notifications";

/// Newest first.
pub async fn list(pool: &SqlitePool, household_id: &str) -> AppResult<Vec<Notification>> {
    let household_id = require_household(household_id)?;
    let rows = sqlx::query(&format!(
        "{SELECT_COLUMNS} WHERE household_id = ? ORDER BY timestamp DESC, id"
    ))
    .bind(household_id)
    .fetch_all(pool)
    .await?;
    rows.iter().map(Notification::try_from).collect()
}

/// Unread notifications whose item name is one of `names`.
pub async fn list_unread_for_names(
    pool: &SqlitePool,
    household_id: &str,
    names: &[String],
) -> AppResult<Vec<Notification>> {
    let household_id = require_household(household_id)?;
    if names.is_empty() {
        return Ok(Vec::new());
    }
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(SELECT_COLUMNS);
    qb.push(" WHERE household_id = ").push_bind(household_id);
    qb.push(" AND is_read = 0 AND item_name IN (");
    let mut separated = qb.separated(", ");
    for name in names {
        separated.push_bind(name.as_str());
    }
    separated.push_unseparated(")");
    let rows = qb.build().fetch_all(pool).await?;
    rows.iter().map(Notification::try_from).collect()
}

async fn write_one(pool: &SqlitePool, household_id: &str, n: &Notification, upsert: bool) -> AppResult<bool> {
    let existed: Option<i64> =
        sqlx::query_scalar("SELECT 1 FROM notifications WHERE household_id = ? AND id = ?")
            .bind(household_id)
            .bind(&n.id)
            .fetch_optional(pool)
            .await?;
    let sql = if upsert {
        "INSERT INTO notifications (id, household_id, item_name, category, status, timestamp, is_read) \
         VALUES (?, ?, ?, ?, ?, ?, ?) \
         ON CONFLICT(household_id, id) DO UPDATE SET \
           item_name = excluded.item_name, category = excluded.category, status = excluded.status, \
           timestamp = excluded.timestamp, is_read = excluded.is_read"
    } else {
        "INSERT INTO notifications (id, household_id, item_name, category, status, timestamp, is_read) \
         VALUES (?, ?, ?, ?, ?, ?, ?)"
    };
    sqlx::query(sql)
        .bind(&n.id)
        .bind(household_id)
        .bind(&n.item_name)
        .bind(&n.category)
        .bind(n.status.as_str())
        .bind(&n.timestamp)
        .bind(n.is_read as i64)
        .execute(pool)
        .await?;
    Ok(existed.is_some())
}

pub async fn insert_many(
    pool: &SqlitePool,
    feed: &ChangeFeed,
    household_id: &str,
    rows: &[Notification],
) -> AppResult<usize> {
    let household_id = require_household(household_id)?;
    for n in rows {
        write_one(pool, household_id, n, false).await?;
        let stored = Notification {
            household_id: household_id.to_string(),
            ..n.clone()
        };
        feed.publish(household_id, RowChange::Inserted(ChangeRow::Notification(stored)));
    }
    Ok(rows.len())
}

pub async fn upsert_many(
    pool: &SqlitePool,
    feed: &ChangeFeed,
    household_id: &str,
    rows: &[Notification],
) -> AppResult<usize> {
    let household_id = require_household(household_id)?;
    for n in rows {
        let existed = write_one(pool, household_id, n, true).await?;
        let stored = ChangeRow::Notification(Notification {
            household_id: household_id.to_string(),
            ..n.clone()
        });
        let change = if existed {
            RowChange::Updated(stored)
        } else {
            RowChange::Inserted(stored)
        };
        feed.publish(household_id, change);
    }
    Ok(rows.len())
}

pub async fn delete_many(
    pool: &SqlitePool,
    feed: &ChangeFeed,
    household_id: &str,
    ids: &[String],
) -> AppResult<u64> {
    let household_id = require_household(household_id)?;
    if ids.is_empty() {
        return Ok(0);
    }
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("DELETE FROM notifications WHERE household_id = ");
    qb.push_bind(household_id);
    qb.push(" AND id IN (");
    let mut separated = qb.separated(", ");
    for id in ids {
        separated.push_bind(id.as_str());
    }
    separated.push_unseparated(")");
    let res = qb.build().execute(pool).await?;
    for id in ids {
        feed.publish(
            household_id,
            RowChange::Deleted {
                table: Table::Notifications,
                id: id.clone(),
            },
        );
    }
    Ok(res.rows_affected())
}

pub async fn mark_read(
    pool: &SqlitePool,
    feed: &ChangeFeed,
    household_id: &str,
    id: &str,
) -> AppResult<Notification> {
    let household_id = require_household(household_id)?;
    let res = sqlx::query("UPDATE notifications SET is_read = 1 WHERE household_id = ? AND id = ?")
        .bind(household_id)
        .bind(id)
        .execute(pool)
        .await?;
    if res.rows_affected() == 0 {
        return Err(AppError::new(NOT_FOUND_CODE, "Notification not found").with_context("id", id));
    }
    let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE household_id = ? AND id = ?"))
        .bind(household_id)
        .bind(id)
        .fetch_one(pool)
        .await?;
    let notification = Notification::try_from(&row)?;
    feed.publish(
        household_id,
        RowChange::Updated(ChangeRow::Notification(notification.clone())),
    );
    Ok(notification)
}
