use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use ts_rs::TS;

use crate::util::require_household;
use crate::{AppError, AppResult};

/// A file the household carried along in its backups (receipts, lists).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Attachment {
    pub id: String,
    pub household_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional, type = "number")]
    pub size: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub data_url: Option<String>,
    pub uploaded_at: String,
}

impl TryFrom<&SqliteRow> for Attachment {
    type Error = AppError;

    fn try_from(row: &SqliteRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            household_id: row.try_get("household_id")?,
            name: row.try_get("name")?,
            mime_type: row.try_get("mime_type")?,
            size: row.try_get("size")?,
            data_url: row.try_get("data_url")?,
            uploaded_at: row.try_get("uploaded_at")?,
        })
    }
}

pub async fn list(pool: &SqlitePool, household_id: &str) -> AppResult<Vec<Attachment>> {
    let household_id = require_household(household_id)?;
    let rows = sqlx::query(
        "SELECT id, household_id, name, mime_type, size, data_url, uploaded_at \
         FROM attachments WHERE household_id = ? ORDER BY uploaded_at, id",
    )
    .bind(household_id)
    .fetch_all(pool)
    .await?;
    rows.iter().map(Attachment::try_from).collect()
}

pub async fn upsert_many(
    pool: &SqlitePool,
    household_id: &str,
    rows: &[Attachment],
) -> AppResult<usize> {
    let household_id = require_household(household_id)?;
    for a in rows {
        sqlx::query(
            "INSERT INTO attachments (id, household_id, name, mime_type, size, data_url, uploaded_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(household_id, id) DO UPDATE SET \
               name = excluded.name, mime_type = excluded.mime_type, size = excluded.size, \
               data_url = excluded.data_url, uploaded_at = excluded.uploaded_at",
        )
        .bind(&a.id)
        .bind(household_id)
        .bind(&a.name)
        .bind(&a.mime_type)
        .bind(a.size)
        .bind(&a.data_url)
        .bind(&a.uploaded_at)
        .execute(pool)
        .await?;
    }
    Ok(rows.len())
}
