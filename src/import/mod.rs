use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::info;
use ts_rs::TS;

use crate::categories::{self, Category};
use crate::export::document::ImportDocument;
use crate::notifications::{self, Notification};
use crate::realtime::ChangeFeed;
use crate::supplies::{self, Supply};
use crate::time::now_ms;
use crate::util::require_household;
use crate::{attachments, repo, AppError, AppResult};

pub mod bulk;

pub use bulk::{import_groups, parse_groups, BulkGroup, BulkItem, BulkSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export, export_to = "bindings/")]
pub enum ImportMode {
    /// Upsert only; rows absent from the import stay.
    #[default]
    Merge,
    /// Upsert, then delete categories and supplies absent from the import.
    Replace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportStep {
    Validate,
    Categories,
    Supplies,
    Prune,
    Notifications,
    Attachments,
}

impl ImportStep {
    pub fn as_str(self) -> &'static str {
        match self {
            ImportStep::Validate => "validate",
            ImportStep::Categories => "categories",
            ImportStep::Supplies => "supplies",
            ImportStep::Prune => "prune",
            ImportStep::Notifications => "notifications",
            ImportStep::Attachments => "attachments",
        }
    }
}

impl fmt::Display for ImportStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("{step} sync failed: {source}")]
    Step {
        step: ImportStep,
        #[source]
        source: AppError,
    },
}

impl From<ImportError> for AppError {
    fn from(err: ImportError) -> Self {
        match err {
            ImportError::Step { step, source } => {
                let message = format!("{} sync failed: {}", capitalize(step.as_str()), source.message());
                // Validation problems keep their own code so they map to 400.
                let code = if source.is_validation() {
                    source.code().to_string()
                } else {
                    "IMPORT/STEP_FAILED".to_string()
                };
                AppError::new(code, message)
                    .with_context("step", step.as_str())
                    .with_cause(source)
            }
        }
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

trait StepExt<T> {
    fn at(self, step: ImportStep) -> Result<T, ImportError>;
}

impl<T> StepExt<T> for AppResult<T> {
    fn at(self, step: ImportStep) -> Result<T, ImportError> {
        self.map_err(|source| ImportError::Step { step, source })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct CollectionSummary {
    #[ts(type = "number")]
    pub upserted: u64,
    #[ts(type = "number")]
    pub pruned: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct ImportReport {
    pub mode: ImportMode,
    pub categories: CollectionSummary,
    pub supplies: CollectionSummary,
    pub notifications: CollectionSummary,
    pub attachments: CollectionSummary,
}

impl ImportReport {
    fn new(mode: ImportMode) -> Self {
        Self {
            mode,
            categories: CollectionSummary::default(),
            supplies: CollectionSummary::default(),
            notifications: CollectionSummary::default(),
            attachments: CollectionSummary::default(),
        }
    }
}

/// Rows of an import bound to one household.
pub struct PreparedImport {
    pub categories: Vec<Category>,
    pub supplies: Vec<Supply>,
    pub notifications: Vec<Notification>,
    pub attachments: Vec<attachments::Attachment>,
}

/// Convert every record up front, so malformed statuses are rejected before
/// anything is written.
pub fn prepare(household_id: &str, doc: &ImportDocument) -> AppResult<PreparedImport> {
    let now = now_ms();
    Ok(PreparedImport {
        categories: doc.categories.iter().map(|c| c.to_row(household_id, now)).collect(),
        supplies: doc
            .supplies
            .iter()
            .map(|s| s.to_row(household_id, now))
            .collect::<AppResult<_>>()?,
        notifications: doc
            .notifications
            .iter()
            .map(|n| n.to_row(household_id))
            .collect::<AppResult<_>>()?,
        attachments: doc.uploaded_files.iter().map(|a| a.to_row(household_id)).collect(),
    })
}

/// Sync an import into the household. Steps run in order (categories,
/// supplies, prune when replacing, notifications, attachments); the first
/// failure stops the rest and leaves earlier steps applied.
pub async fn apply_import(
    pool: &SqlitePool,
    feed: &ChangeFeed,
    household_id: &str,
    doc: &ImportDocument,
    mode: ImportMode,
) -> AppResult<ImportReport> {
    let household_id = require_household(household_id)?;
    let report = run_steps(pool, feed, household_id, doc, mode).await?;
    info!(
        target: "homestock",
        event = "import_applied",
        household_id,
        mode = ?mode,
        categories = report.categories.upserted,
        supplies = report.supplies.upserted,
        pruned_categories = report.categories.pruned,
        pruned_supplies = report.supplies.pruned,
        notifications = report.notifications.upserted,
        attachments = report.attachments.upserted
    );
    Ok(report)
}

async fn run_steps(
    pool: &SqlitePool,
    feed: &ChangeFeed,
    household_id: &str,
    doc: &ImportDocument,
    mode: ImportMode,
) -> Result<ImportReport, ImportError> {
    let prepared = prepare(household_id, doc).at(ImportStep::Validate)?;
    let mut report = ImportReport::new(mode);

    report.categories.upserted =
        categories::upsert_many(pool, feed, household_id, &prepared.categories)
            .await
            .at(ImportStep::Categories)? as u64;

    report.supplies.upserted = supplies::upsert_many(pool, feed, household_id, &prepared.supplies)
        .await
        .at(ImportStep::Supplies)? as u64;

    if mode == ImportMode::Replace {
        let keep: HashSet<String> = prepared.categories.iter().map(|c| c.id.clone()).collect();
        report.categories.pruned = repo::prune_missing(pool, feed, "categories", household_id, &keep)
            .await
            .at(ImportStep::Prune)?
            .len() as u64;
        let keep: HashSet<String> = prepared.supplies.iter().map(|s| s.id.clone()).collect();
        report.supplies.pruned = repo::prune_missing(pool, feed, "supplies", household_id, &keep)
            .await
            .at(ImportStep::Prune)?
            .len() as u64;
    }

    report.notifications.upserted =
        notifications::upsert_many(pool, feed, household_id, &prepared.notifications)
            .await
            .at(ImportStep::Notifications)? as u64;

    report.attachments.upserted = attachments::upsert_many(pool, household_id, &prepared.attachments)
        .await
        .at(ImportStep::Attachments)? as u64;

    Ok(report)
}
