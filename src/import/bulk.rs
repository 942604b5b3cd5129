//! Grouped item lists (`[{category, items: [{name, status}]}]`) pasted or
//! posted in one go. Unlike backups, the ids are generated here.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::SqlitePool;
use ts_rs::TS;

use crate::categories::{self, Category, DEFAULT_ICON};
use crate::id::{random_base36, to_base36};
use crate::realtime::ChangeFeed;
use crate::slug::slugify;
use crate::supplies::{self, Supply, SupplyStatus};
use crate::time::now_ms;
use crate::util::require_household;
use crate::{AppError, AppResult};

pub const INVALID_SHAPE_CODE: &str = "IMPORT/INVALID_SHAPE";
const UNKNOWN_CATEGORY: &str = "Unknown";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkItem {
    pub name: Option<String>,
    pub status: Option<SupplyStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkGroup {
    pub category: String,
    pub items: Vec<BulkItem>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct BulkSummary {
    #[ts(type = "number")]
    pub categories: u64,
    #[ts(type = "number")]
    pub supplies: u64,
}

fn invalid_shape(message: impl Into<String>) -> AppError {
    AppError::new(INVALID_SHAPE_CODE, message)
}

fn text_of(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s.trim().to_string()),
        other => Some(other.to_string()),
    }
}

/// Read the loose JSON shape. The top level must be an array of objects;
/// a group whose `items` is not an array contributes nothing.
pub fn parse_groups(value: &Value) -> AppResult<Vec<BulkGroup>> {
    let groups = value
        .as_array()
        .ok_or_else(|| invalid_shape("Import data must be an array of groups"))?;
    let mut parsed = Vec::with_capacity(groups.len());
    for (index, group) in groups.iter().enumerate() {
        let group = group.as_object().ok_or_else(|| {
            invalid_shape("Each group must be an object").with_context("index", index.to_string())
        })?;
        let category = text_of(group.get("category")).unwrap_or_else(|| UNKNOWN_CATEGORY.to_string());
        let items = match group.get("items").and_then(Value::as_array) {
            Some(items) => items
                .iter()
                .map(|item| {
                    let status = match text_of(item.get("status")) {
                        Some(text) => Some(text.parse::<SupplyStatus>()?),
                        None => None,
                    };
                    Ok(BulkItem {
                        name: text_of(item.get("name")),
                        status,
                    })
                })
                .collect::<AppResult<Vec<_>>>()?,
            None => Vec::new(),
        };
        parsed.push(BulkGroup { category, items });
    }
    Ok(parsed)
}

/// Create one category per group (slug id, custom, default icon) and one
/// supply per item, then upsert categories before supplies.
pub async fn import_groups(
    pool: &SqlitePool,
    feed: &ChangeFeed,
    household_id: &str,
    groups: &[BulkGroup],
) -> AppResult<BulkSummary> {
    let household_id = require_household(household_id)?;
    let now = now_ms();
    let stamp = to_base36(now.max(0) as u64);

    // Two groups with the same slug collapse into one category row.
    let mut category_rows: BTreeMap<String, Category> = BTreeMap::new();
    let mut supply_rows: Vec<Supply> = Vec::new();
    for group in groups {
        let category_id = slugify(&group.category);
        category_rows
            .entry(category_id.clone())
            .or_insert_with(|| Category {
                id: category_id.clone(),
                household_id: household_id.to_string(),
                name: group.category.clone(),
                name_ar: None,
                name_en: None,
                icon: DEFAULT_ICON.to_string(),
                is_custom: true,
                created_at: now,
            });
        for (index, item) in group.items.iter().enumerate() {
            supply_rows.push(Supply {
                id: format!("{category_id}-{index}-{stamp}-{}", random_base36(4)),
                household_id: household_id.to_string(),
                name: item.name.clone().unwrap_or_else(|| format!("item-{index}")),
                name_ar: None,
                name_en: None,
                status: item.status.unwrap_or_default(),
                category: category_id.clone(),
                created_at: now,
                updated_at: now,
            });
        }
    }

    let category_rows: Vec<Category> = category_rows.into_values().collect();
    let categories = categories::upsert_many(pool, feed, household_id, &category_rows)
        .await
        .map_err(|err| err.with_context("step", "categories"))?;
    let supplies = supplies::upsert_many(pool, feed, household_id, &supply_rows)
        .await
        .map_err(|err| err.with_context("step", "supplies"))?;

    tracing::info!(
        target: "homestock",
        event = "bulk_import_applied",
        household_id,
        categories,
        supplies
    );
    Ok(BulkSummary {
        categories: categories as u64,
        supplies: supplies as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn lenient_group_shapes() {
        let groups = parse_groups(&json!([
            { "category": "Spices", "items": [{ "name": "Cumin", "status": "low" }, {}] },
            { "items": "not a list" },
            { "category": 7, "items": [{ "name": "  " }] }
        ]))
        .unwrap();
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0].items[0].status, Some(SupplyStatus::Low));
        assert_eq!(groups[0].items[1], BulkItem { name: None, status: None });
        assert_eq!(groups[1].category, UNKNOWN_CATEGORY);
        assert!(groups[1].items.is_empty());
        assert_eq!(groups[2].category, "7");
        assert_eq!(groups[2].items[0].name, None);
    }

    #[test]
    fn rejects_non_array_input() {
        let err = parse_groups(&json!({ "category": "Spices" })).unwrap_err();
        assert_eq!(err.code(), INVALID_SHAPE_CODE);
        assert!(err.is_validation());

        let err = parse_groups(&json!(["Spices"])).unwrap_err();
        assert_eq!(err.context().get("index"), Some(&"0".to_string()));
    }

    #[test]
    fn rejects_unknown_status() {
        let err = parse_groups(&json!([{ "category": "x", "items": [{ "status": "plenty" }] }]))
            .unwrap_err();
        assert_eq!(err.code(), "SUPPLY/INVALID_STATUS");
    }
}
