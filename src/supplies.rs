use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection, SqlitePool};
use ts_rs::TS;

use crate::realtime::{ChangeFeed, Row as ChangeRow, RowChange, Table};
use crate::time::now_ms;
use crate::util::require_household;
use crate::{id, AppError, AppResult};

pub const INVALID_STATUS_CODE: &str = "SUPPLY/INVALID_STATUS";
pub const NOT_FOUND_CODE: &str = "SUPPLY/NOT_FOUND";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, Default)]
#[serde(rename_all = "lowercase")]
#[ts(export, export_to = "bindings/")]
pub enum SupplyStatus {
    #[default]
    Available,
    Low,
    Out,
}

impl SupplyStatus {
    pub const NEEDS_RESTOCK: [SupplyStatus; 2] = [SupplyStatus::Low, SupplyStatus::Out];

    pub fn as_str(self) -> &'static str {
        match self {
            SupplyStatus::Available => "available",
            SupplyStatus::Low => "low",
            SupplyStatus::Out => "out",
        }
    }

    pub fn needs_restock(self) -> bool {
        matches!(self, SupplyStatus::Low | SupplyStatus::Out)
    }
}

impl fmt::Display for SupplyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SupplyStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "available" => Ok(SupplyStatus::Available),
            "low" => Ok(SupplyStatus::Low),
            "out" => Ok(SupplyStatus::Out),
            other => Err(AppError::new(
                INVALID_STATUS_CODE,
                format!("Unknown supply status: {other}"),
            )
            .with_context("status", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Supply {
    pub id: String,
    pub household_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub name_ar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub name_en: Option<String>,
    pub status: SupplyStatus,
    pub category: String,
    #[ts(type = "number")]
    pub created_at: i64,
    #[ts(type = "number")]
    pub updated_at: i64,
}

impl TryFrom<&SqliteRow> for Supply {
    type Error = AppError;

    fn try_from(row: &SqliteRow) -> Result<Self, Self::Error> {
        let status: String = row.try_get("status")?;
        Ok(Self {
            id: row.try_get("id")?,
            household_id: row.try_get("household_id")?,
            name: row.try_get("name")?,
            name_ar: row.try_get("name_ar")?,
            name_en: row.try_get("name_en")?,
            status: status.parse()?,
            category: row.try_get("category")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Input for a new supply. The id defaults to a fresh UUID.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct NewSupply {
    #[serde(default)]
    #[ts(optional)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    #[ts(optional)]
    pub name_ar: Option<String>,
    #[serde(default)]
    #[ts(optional)]
    pub name_en: Option<String>,
    #[serde(default)]
    #[ts(optional)]
    pub status: Option<SupplyStatus>,
    pub category: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct SupplyPatch {
    #[serde(default)]
    #[ts(optional)]
    pub name: Option<String>,
    #[serde(default)]
    #[ts(optional)]
    pub status: Option<SupplyStatus>,
}

const SELECT_COLUMNS: &str =
    "SELECT id, household_id, name, name_ar, name_en, status, category, created_at, updated_at FROM supplies";

fn decode_all(rows: Vec<SqliteRow>) -> AppResult<Vec<Supply>> {
    rows.iter().map(Supply::try_from).collect()
}

pub async fn list(pool: &SqlitePool, household_id: &str) -> AppResult<Vec<Supply>> {
    let household_id = require_household(household_id)?;
    let rows = sqlx::query(&format!(
        "{SELECT_COLUMNS} WHERE household_id = ? ORDER BY created_at, id"
    ))
    .bind(household_id)
    .fetch_all(pool)
    .await?;
    decode_all(rows)
}

pub async fn list_by_status(
    pool: &SqlitePool,
    household_id: &str,
    statuses: &[SupplyStatus],
) -> AppResult<Vec<Supply>> {
    let household_id = require_household(household_id)?;
    if statuses.is_empty() {
        return Ok(Vec::new());
    }
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(SELECT_COLUMNS);
    qb.push(" WHERE household_id = ").push_bind(household_id);
    qb.push(" AND status IN (");
    let mut separated = qb.separated(", ");
    for status in statuses {
        separated.push_bind(status.as_str());
    }
    separated.push_unseparated(") ORDER BY created_at, id");
    let rows = qb.build().fetch_all(pool).await?;
    decode_all(rows)
}

pub async fn count(pool: &SqlitePool, household_id: &str) -> AppResult<i64> {
    let household_id = require_household(household_id)?;
    let n = sqlx::query_scalar("SELECT COUNT(*) FROM supplies WHERE household_id = ?")
        .bind(household_id)
        .fetch_one(pool)
        .await?;
    Ok(n)
}

async fn fetch_optional(
    conn: &mut SqliteConnection,
    household_id: &str,
    id: &str,
) -> AppResult<Option<Supply>> {
    let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE household_id = ? AND id = ?"))
        .bind(household_id)
        .bind(id)
        .fetch_optional(conn)
        .await?;
    row.as_ref().map(Supply::try_from).transpose()
}

fn not_found(id: &str) -> AppError {
    AppError::new(NOT_FOUND_CODE, "Supply not found").with_context("id", id)
}

pub async fn get(pool: &SqlitePool, household_id: &str, id: &str) -> AppResult<Supply> {
    let household_id = require_household(household_id)?;
    let mut conn = pool.acquire().await?;
    fetch_optional(&mut conn, household_id, id)
        .await?
        .ok_or_else(|| not_found(id))
}

pub async fn insert(
    pool: &SqlitePool,
    feed: &ChangeFeed,
    household_id: &str,
    new: NewSupply,
) -> AppResult<Supply> {
    let household_id = require_household(household_id)?;
    let name = new.name.trim();
    if name.is_empty() {
        return Err(AppError::validation("name", "Supply name is required"));
    }
    if new.category.trim().is_empty() {
        return Err(AppError::validation("category", "Supply category is required"));
    }
    let now = now_ms();
    let supply = Supply {
        id: new.id.filter(|id| !id.trim().is_empty()).unwrap_or_else(id::new_uuid_v7),
        household_id: household_id.to_string(),
        name: name.to_string(),
        name_ar: new.name_ar,
        name_en: new.name_en,
        status: new.status.unwrap_or_default(),
        category: new.category.trim().to_string(),
        created_at: now,
        updated_at: now,
    };
    sqlx::query(
        "INSERT INTO supplies (id, household_id, name, name_ar, name_en, status, category, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&supply.id)
    .bind(&supply.household_id)
    .bind(&supply.name)
    .bind(&supply.name_ar)
    .bind(&supply.name_en)
    .bind(supply.status.as_str())
    .bind(&supply.category)
    .bind(supply.created_at)
    .bind(supply.updated_at)
    .execute(pool)
    .await?;
    feed.publish(household_id, RowChange::Inserted(ChangeRow::Supply(supply.clone())));
    Ok(supply)
}

/// Insert or overwrite each row by id. Returns the number of rows written.
pub async fn upsert_many(
    pool: &SqlitePool,
    feed: &ChangeFeed,
    household_id: &str,
    rows: &[Supply],
) -> AppResult<usize> {
    let household_id = require_household(household_id)?;
    let mut conn = pool.acquire().await?;
    for supply in rows {
        let existing = fetch_optional(&mut conn, household_id, &supply.id).await?;
        sqlx::query(
            "INSERT INTO supplies (id, household_id, name, name_ar, name_en, status, category, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(household_id, id) DO UPDATE SET \
               name = excluded.name, name_ar = excluded.name_ar, name_en = excluded.name_en, \
               status = excluded.status, category = excluded.category, updated_at = excluded.updated_at",
        )
        .bind(&supply.id)
        .bind(household_id)
        .bind(&supply.name)
        .bind(&supply.name_ar)
        .bind(&supply.name_en)
        .bind(supply.status.as_str())
        .bind(&supply.category)
        .bind(supply.created_at)
        .bind(supply.updated_at)
        .execute(&mut *conn)
        .await?;

        // The conflict update keeps the stored created_at.
        let mut stored = Supply {
            household_id: household_id.to_string(),
            ..supply.clone()
        };
        let change = match existing {
            Some(previous) => {
                stored.created_at = previous.created_at;
                RowChange::Updated(ChangeRow::Supply(stored))
            }
            None => RowChange::Inserted(ChangeRow::Supply(stored)),
        };
        feed.publish(household_id, change);
    }
    Ok(rows.len())
}

pub async fn update(
    pool: &SqlitePool,
    feed: &ChangeFeed,
    household_id: &str,
    id: &str,
    patch: SupplyPatch,
) -> AppResult<Supply> {
    let household_id = require_household(household_id)?;
    let mut conn = pool.acquire().await?;
    let mut supply = fetch_optional(&mut conn, household_id, id)
        .await?
        .ok_or_else(|| not_found(id))?;
    if let Some(name) = patch.name {
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::validation("name", "Supply name is required"));
        }
        supply.name = name.to_string();
    }
    if let Some(status) = patch.status {
        supply.status = status;
    }
    supply.updated_at = now_ms();
    sqlx::query(
        "UPDATE supplies SET name = ?, status = ?, updated_at = ? WHERE household_id = ? AND id = ?",
    )
    .bind(&supply.name)
    .bind(supply.status.as_str())
    .bind(supply.updated_at)
    .bind(household_id)
    .bind(id)
    .execute(&mut *conn)
    .await?;
    feed.publish(household_id, RowChange::Updated(ChangeRow::Supply(supply.clone())));
    Ok(supply)
}

pub async fn set_status(
    pool: &SqlitePool,
    feed: &ChangeFeed,
    household_id: &str,
    id: &str,
    status: SupplyStatus,
) -> AppResult<Supply> {
    update(
        pool,
        feed,
        household_id,
        id,
        SupplyPatch {
            name: None,
            status: Some(status),
        },
    )
    .await
}

pub async fn delete(
    pool: &SqlitePool,
    feed: &ChangeFeed,
    household_id: &str,
    id: &str,
) -> AppResult<()> {
    let household_id = require_household(household_id)?;
    let res = sqlx::query("DELETE FROM supplies WHERE household_id = ? AND id = ?")
        .bind(household_id)
        .bind(id)
        .execute(pool)
        .await?;
    if res.rows_affected() == 0 {
        return Err(not_found(id));
    }
    feed.publish(
        household_id,
        RowChange::Deleted {
            table: Table::Supplies,
            id: id.to_string(),
        },
    );
    Ok(())
}

/// Resolve a notification's item name back to a supply: exact
/// case-insensitive match first, then the first supply whose name contains
/// the item name.
pub fn find_by_name<'a>(supplies: &'a [Supply], name: &str) -> Option<&'a Supply> {
    let needle = name.trim().to_lowercase();
    if needle.is_empty() {
        return None;
    }
    supplies
        .iter()
        .find(|s| s.name.to_lowercase() == needle)
        .or_else(|| {
            supplies
                .iter()
                .find(|s| s.name.to_lowercase().contains(&needle))
        })
}
