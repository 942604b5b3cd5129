use std::collections::HashSet;

use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use crate::realtime::{ChangeFeed, RowChange, Table};
use crate::util::require_household;
use crate::{AppError, AppResult};

const PRUNABLE_TABLES: &[(&str, Table)] = &[
    ("categories", Table::Categories),
    ("supplies", Table::Supplies),
];

fn ensure_table(table: &str) -> AppResult<Table> {
    PRUNABLE_TABLES
        .iter()
        .find(|(name, _)| *name == table)
        .map(|(_, t)| *t)
        .ok_or_else(|| AppError::new("REPO/INVALID_TABLE", "invalid table").with_context("table", table))
}

/// Delete every row of `table` in the household whose id is not in `keep`.
/// Returns the removed ids.
pub async fn prune_missing(
    pool: &SqlitePool,
    feed: &ChangeFeed,
    table: &str,
    household_id: &str,
    keep: &HashSet<String>,
) -> AppResult<Vec<String>> {
    let kind = ensure_table(table)?;
    let household_id = require_household(household_id)?;

    let existing: Vec<String> =
        sqlx::query_scalar(&format!("SELECT id FROM {table} WHERE household_id = ? ORDER BY id"))
            .bind(household_id)
            .fetch_all(pool)
            .await?;
    let doomed: Vec<String> = existing.into_iter().filter(|id| !keep.contains(id)).collect();
    if doomed.is_empty() {
        return Ok(doomed);
    }

    let mut qb: QueryBuilder<Sqlite> =
        QueryBuilder::new(format!("DELETE FROM {table} WHERE household_id = "));
    qb.push_bind(household_id);
    qb.push(" AND id IN (");
    let mut separated = qb.separated(", ");
    for id in &doomed {
        separated.push_bind(id.as_str());
    }
    separated.push_unseparated(")");
    qb.build().execute(pool).await?;

    for id in &doomed {
        feed.publish(
            household_id,
            RowChange::Deleted {
                table: kind,
                id: id.clone(),
            },
        );
    }
    Ok(doomed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unknown_tables() {
        assert!(ensure_table("categories").is_ok());
        let err = ensure_table("household_members").unwrap_err();
        assert_eq!(err.code(), "REPO/INVALID_TABLE");
    }
}
