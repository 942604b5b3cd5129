use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use ts_rs::TS;

use crate::db::run_in_tx;
use crate::realtime::{ChangeFeed, Row as ChangeRow, RowChange, Table};
use crate::time::now_ms;
use crate::util::require_household;
use crate::{id, AppError, AppResult};

pub const NOT_FOUND_CODE: &str = "CATEGORY/NOT_FOUND";
pub const DEFAULT_ICON: &str = "📦";

fn default_icon() -> String {
    DEFAULT_ICON.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Category {
    pub id: String,
    pub household_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub name_ar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub name_en: Option<String>,
    #[serde(default = "default_icon")]
    pub icon: String,
    #[serde(default)]
    pub is_custom: bool,
    #[ts(type = "number")]
    pub created_at: i64,
}

impl TryFrom<&SqliteRow> for Category {
    type Error = AppError;

    fn try_from(row: &SqliteRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            household_id: row.try_get("household_id")?,
            name: row.try_get("name")?,
            name_ar: row.try_get("name_ar")?,
            name_en: row.try_get("name_en")?,
            icon: row.try_get("icon")?,
            is_custom: row.try_get::<i64, _>("is_custom")? != 0,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct NewCategory {
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
    pub icon: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct CategoryPatch {
    #[serde(default)]
    #[ts(optional)]
    pub name: Option<String>,
    #[serde(default)]
    #[ts(optional)]
    pub icon: Option<String>,
}

const SELECT_COLUMNS: &str =
    "SELECT id, household_id, name, name_ar, name_en, icon, is_custom, created_at FROM categories";

/// Name shown to users for a category id, or `Unknown`.
pub fn display_name<'a>(categories: &'a [Category], id: &str) -> &'a str {
    categories
        .iter()
        .find(|c| c.id == id)
        .map(|c| c.name.as_str())
        .unwrap_or("Unknown")
}

pub async fn list(pool: &SqlitePool, household_id: &str) -> AppResult<Vec<Category>> {
    let household_id = require_household(household_id)?;
    let rows = sqlx::query(&format!(
        "{SELECT_COLUMNS} WHERE household_id = ? ORDER BY created_at, id"
    ))
    .bind(household_id)
    .fetch_all(pool)
    .await
    .map_err(|err| {
        AppError::from(err)
            .with_context("operation", "list")
            .with_context("table", "categories")
    })?;
    rows.iter().map(Category::try_from).collect()
}

pub async fn count(pool: &SqlitePool, household_id: &str) -> AppResult<i64> {
    let household_id = require_household(household_id)?;
    let n = sqlx::query_scalar("SELECT COUNT(*) FROM categories WHERE household_id = ?")
        .bind(household_id)
        .fetch_one(pool)
        .await?;
    Ok(n)
}

async fn fetch_optional(
    conn: &mut SqliteConnection,
    household_id: &str,
    id: &str,
) -> AppResult<Option<Category>> {
    let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE household_id = ? AND id = ?"))
        .bind(household_id)
        .bind(id)
        .fetch_optional(conn)
        .await?;
    row.as_ref().map(Category::try_from).transpose()
}

fn not_found(id: &str) -> AppError {
    AppError::new(NOT_FOUND_CODE, "Category not found").with_context("id", id)
}

pub async fn get(pool: &SqlitePool, household_id: &str, id: &str) -> AppResult<Category> {
    let household_id = require_household(household_id)?;
    let mut conn = pool.acquire().await?;
    fetch_optional(&mut conn, household_id, id)
        .await?
        .ok_or_else(|| not_found(id))
}

/// Create a user-defined category. Always marked custom.
pub async fn insert(
    pool: &SqlitePool,
    feed: &ChangeFeed,
    household_id: &str,
    new: NewCategory,
) -> AppResult<Category> {
    let household_id = require_household(household_id)?;
    let name = new.name.trim();
    if name.is_empty() {
        return Err(AppError::validation("name", "Category name is required"));
    }
    let category = Category {
        id: new.id.filter(|id| !id.trim().is_empty()).unwrap_or_else(id::new_uuid_v7),
        household_id: household_id.to_string(),
        name: name.to_string(),
        name_ar: new.name_ar,
        name_en: new.name_en,
        icon: new
            .icon
            .map(|icon| icon.trim().to_string())
            .filter(|icon| !icon.is_empty())
            .unwrap_or_else(default_icon),
        is_custom: true,
        created_at: now_ms(),
    };
    sqlx::query(
        "INSERT INTO categories (id, household_id, name, name_ar, name_en, icon, is_custom, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&category.id)
    .bind(&category.household_id)
    .bind(&category.name)
    .bind(&category.name_ar)
    .bind(&category.name_en)
    .bind(&category.icon)
    .bind(category.is_custom as i64)
    .bind(category.created_at)
    .execute(pool)
    .await?;
    feed.publish(household_id, RowChange::Inserted(ChangeRow::Category(category.clone())));
    Ok(category)
}

/// Insert or overwrite each row by id.
pub async fn upsert_many(
    pool: &SqlitePool,
    feed: &ChangeFeed,
    household_id: &str,
    rows: &[Category],
) -> AppResult<usize> {
    let household_id = require_household(household_id)?;
    let mut conn = pool.acquire().await?;
    for category in rows {
        let existing = fetch_optional(&mut conn, household_id, &category.id).await?;
        sqlx::query(
            "INSERT INTO categories (id, household_id, name, name_ar, name_en, icon, is_custom, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(household_id, id) DO UPDATE SET \
               name = excluded.name, name_ar = excluded.name_ar, name_en = excluded.name_en, \
               icon = excluded.icon, is_custom = excluded.is_custom",
        )
        .bind(&category.id)
        .bind(household_id)
        .bind(&category.name)
        .bind(&category.name_ar)
        .bind(&category.name_en)
        .bind(&category.icon)
        .bind(category.is_custom as i64)
        .bind(category.created_at)
        .execute(&mut *conn)
        .await?;

        // The conflict update keeps the stored created_at.
        let mut stored = Category {
            household_id: household_id.to_string(),
            ..category.clone()
        };
        let change = match existing {
            Some(previous) => {
                stored.created_at = previous.created_at;
                RowChange::Updated(ChangeRow::Category(stored))
            }
            None => RowChange::Inserted(ChangeRow::Category(stored)),
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
    patch: CategoryPatch,
) -> AppResult<Category> {
    let household_id = require_household(household_id)?;
    let mut conn = pool.acquire().await?;
    let mut category = fetch_optional(&mut conn, household_id, id)
        .await?
        .ok_or_else(|| not_found(id))?;
    if let Some(name) = patch.name {
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::validation("name", "Category name is required"));
        }
        category.name = name.to_string();
    }
    if let Some(icon) = patch.icon {
        category.icon = icon;
    }
    sqlx::query("UPDATE categories SET name = ?, icon = ? WHERE household_id = ? AND id = ?")
        .bind(&category.name)
        .bind(&category.icon)
        .bind(household_id)
        .bind(id)
        .execute(&mut *conn)
        .await?;
    feed.publish(household_id, RowChange::Updated(ChangeRow::Category(category.clone())));
    Ok(category)
}

/// Delete a category and every supply filed under it in one transaction.
/// Returns the ids of the removed supplies.
pub async fn delete(
    pool: &SqlitePool,
    feed: &ChangeFeed,
    household_id: &str,
    id: &str,
) -> AppResult<Vec<String>> {
    let household_id = require_household(household_id)?.to_string();
    let category_id = id.to_string();

    let (household, category, removed) = run_in_tx(pool, move |tx| {
        Box::pin(async move {
            let res = sqlx::query("DELETE FROM categories WHERE household_id = ? AND id = ?")
                .bind(&household_id)
                .bind(&category_id)
                .execute(&mut **tx)
                .await?;
            if res.rows_affected() == 0 {
                return Err(not_found(&category_id));
            }
            let removed: Vec<String> = sqlx::query_scalar(
                "SELECT id FROM supplies WHERE household_id = ? AND category = ? ORDER BY id",
            )
            .bind(&household_id)
            .bind(&category_id)
            .fetch_all(&mut **tx)
            .await?;
            sqlx::query("DELETE FROM supplies WHERE household_id = ? AND category = ?")
                .bind(&household_id)
                .bind(&category_id)
                .execute(&mut **tx)
                .await?;
            Ok::<_, AppError>((household_id, category_id, removed))
        })
    })
    .await
    .map_err(|err| err.with_context("operation", "delete"))?;

    feed.publish(
        &household,
        RowChange::Deleted {
            table: Table::Categories,
            id: category,
        },
    );
    for supply_id in &removed {
        feed.publish(
            &household,
            RowChange::Deleted {
                table: Table::Supplies,
                id: supply_id.clone(),
            },
        );
    }
    Ok(removed)
}
