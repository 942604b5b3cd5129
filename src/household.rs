use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::info;
use ts_rs::TS;

use crate::categories::{self, Category, DEFAULT_ICON};
use crate::export::document::resolve_name;
use crate::realtime::ChangeFeed;
use crate::slug::try_slugify;
use crate::supplies::{self, Supply, SupplyStatus};
use crate::time::now_ms;
use crate::util::require_household;
use crate::{id, AppError, AppResult};

const BUNDLED_JSON: &str = include_str!("../data/default-bundled.json");

/// Bundled categories that are never seeded.
pub const EXCLUDED_CATEGORIES: [&str; 4] = ["Dairy", "Grains", "Fruits", "Vegetables"];

/// A fresh household code for the setup screen.
pub fn generate_code() -> String {
    id::new_uuid_v4()
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatasetCategory {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub name_ar: Option<String>,
    #[serde(default)]
    pub name_en: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatasetSupply {
    pub category: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub name_ar: Option<String>,
    #[serde(default)]
    pub name_en: Option<String>,
    #[serde(default)]
    pub status: Option<SupplyStatus>,
}

/// Starter categories and supplies for new households.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DefaultDataset {
    #[serde(default)]
    pub categories: Vec<DatasetCategory>,
    #[serde(default)]
    pub supplies: Vec<DatasetSupply>,
}

impl DefaultDataset {
    /// The dataset compiled into the binary.
    pub fn bundled() -> AppResult<Self> {
        Self::from_json(BUNDLED_JSON)
    }

    pub fn from_json(text: &str) -> AppResult<Self> {
        serde_json::from_str(text).map_err(|err| {
            AppError::new("HOUSEHOLD/DATASET", "Default dataset is malformed")
                .with_cause(AppError::from(err))
        })
    }

    /// Rows to seed for `household_id`, excluded categories already dropped.
    pub fn rows(&self, household_id: &str, now: i64) -> (Vec<Category>, Vec<Supply>) {
        let mut categories = Vec::new();
        let mut supplies = Vec::new();
        for (cat_index, entry) in self.categories.iter().enumerate() {
            let name = resolve_name(&[
                entry.name.as_deref(),
                entry.name_en.as_deref(),
                entry.name_ar.as_deref(),
            ]);
            if EXCLUDED_CATEGORIES.contains(&name.as_str()) {
                continue;
            }
            let category_id = try_slugify(&name).unwrap_or_else(|| format!("cat-{cat_index}"));
            let members = self.supplies.iter().filter(|s| s.category == entry.id);
            for (idx, item) in members.enumerate() {
                let item_name = resolve_name(&[
                    item.name.as_deref(),
                    item.name_en.as_deref(),
                    item.name_ar.as_deref(),
                ]);
                let item_name = if item_name.is_empty() {
                    format!("item-{idx}")
                } else {
                    item_name
                };
                let item_slug = try_slugify(&item_name).unwrap_or_else(|| format!("item-{idx}"));
                supplies.push(Supply {
                    id: format!("{category_id}-{item_slug}"),
                    household_id: household_id.to_string(),
                    name: item_name,
                    name_ar: item.name_ar.clone(),
                    name_en: item.name_en.clone(),
                    status: item.status.unwrap_or_default(),
                    category: category_id.clone(),
                    created_at: now,
                    updated_at: now,
                });
            }
            categories.push(Category {
                id: category_id,
                household_id: household_id.to_string(),
                name,
                name_ar: entry.name_ar.clone(),
                name_en: entry.name_en.clone(),
                icon: DEFAULT_ICON.to_string(),
                is_custom: true,
                created_at: now,
            });
        }
        (categories, supplies)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(tag = "outcome", rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum SeedOutcome {
    Skipped,
    Seeded {
        #[ts(type = "number")]
        categories: u64,
        #[ts(type = "number")]
        supplies: u64,
    },
}

/// Seed a household that has neither categories nor supplies. Any existing
/// row of either kind means the household is already set up.
pub async fn initialize_household(
    pool: &SqlitePool,
    feed: &ChangeFeed,
    household_id: &str,
    dataset: &DefaultDataset,
) -> AppResult<SeedOutcome> {
    let household_id = require_household(household_id)?;
    let existing_categories = categories::count(pool, household_id).await?;
    let existing_supplies = supplies::count(pool, household_id).await?;
    if existing_categories > 0 || existing_supplies > 0 {
        info!(
            target: "homestock",
            event = "household_seed_skipped",
            household_id,
            categories = existing_categories,
            supplies = existing_supplies
        );
        return Ok(SeedOutcome::Skipped);
    }

    let (category_rows, supply_rows) = dataset.rows(household_id, now_ms());
    let categories = categories::upsert_many(pool, feed, household_id, &category_rows)
        .await
        .map_err(|err| err.with_context("operation", "seed_categories"))?;
    let supplies = supplies::upsert_many(pool, feed, household_id, &supply_rows)
        .await
        .map_err(|err| err.with_context("operation", "seed_supplies"))?;
    info!(
        target: "homestock",
        event = "household_seeded",
        household_id,
        categories,
        supplies
    );
    Ok(SeedOutcome::Seeded {
        categories: categories as u64,
        supplies: supplies as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundled_dataset_skips_excluded_categories() {
        let dataset = DefaultDataset::bundled().unwrap();
        let (categories, supplies) = dataset.rows("h1", 1);
        let ids: Vec<&str> = categories.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, ["spices", "cleaning-tools", "pantry", "bathroom"]);
        assert!(supplies.iter().all(|s| ids.contains(&s.category.as_str())));
        assert!(supplies.iter().any(|s| s.id == "spices-black-pepper"));
        assert!(supplies.iter().all(|s| s.name != "Milk"));
        assert!(categories.iter().all(|c| c.is_custom && c.icon == DEFAULT_ICON));
    }

    #[test]
    fn keeps_bilingual_names() {
        let dataset = DefaultDataset::bundled().unwrap();
        let (categories, supplies) = dataset.rows("h1", 1);
        assert_eq!(categories[0].name_ar.as_deref(), Some("بهارات"));
        let cumin = supplies.iter().find(|s| s.id == "spices-cumin").unwrap();
        assert_eq!(cumin.name_ar.as_deref(), Some("كمون"));
    }

    #[test]
    fn fallback_ids_for_unsluggable_names() {
        let dataset = DefaultDataset::from_json(
            r#"{"categories":[{"id":"x","name":"!!!"}],
                "supplies":[{"category":"x","name":"???"},{"category":"x"}]}"#,
        )
        .unwrap();
        let (categories, supplies) = dataset.rows("h1", 1);
        assert_eq!(categories[0].id, "cat-0");
        assert_eq!(supplies[0].id, "cat-0-item-0");
        assert_eq!(supplies[1].id, "cat-0-item-1");
        assert_eq!(supplies[1].name, "item-1");
        assert_eq!(supplies[1].status, SupplyStatus::Available);
    }

    #[test]
    fn codes_are_unique() {
        assert_ne!(generate_code(), generate_code());
    }
}
