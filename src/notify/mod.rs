//! Restock notification job.
//!
//! Each run sweeps notifications whose item is no longer low or out, then
//! creates one unread notification per low/out supply that does not already
//! have an unread notification with the same status. Running it repeatedly
//! never produces two unread notifications for the same (name, status).

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::{debug, info, warn};

use crate::categories::{self, display_name};
use crate::members::{self, Role};
use crate::notifications::{self, Notification};
use crate::realtime::ChangeFeed;
use crate::supplies::{self, find_by_name, Supply, SupplyStatus};
use crate::time::now_rfc3339;
use crate::util::require_household;
use crate::{id, AppError, AppResult};

pub mod messenger;

pub use messenger::{DisabledMessenger, Messenger, TwilioMessenger};

pub const NOTHING_TO_NOTIFY: &str = "No items to notify";
pub const NOTIFICATIONS_CREATED: &str = "Notifications created";

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct NotifyOptions {
    /// Text the husband's phone after creating notifications.
    pub send_message: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum NotifyOutcome {
    NothingToNotify,
    Created { count: usize },
}

impl NotifyOutcome {
    pub fn message(&self) -> &'static str {
        match self {
            NotifyOutcome::NothingToNotify => NOTHING_TO_NOTIFY,
            NotifyOutcome::Created { .. } => NOTIFICATIONS_CREATED,
        }
    }

    pub fn created(&self) -> usize {
        match self {
            NotifyOutcome::NothingToNotify => 0,
            NotifyOutcome::Created { count } => *count,
        }
    }
}

pub fn reminder_text(count: usize) -> String {
    format!("Reminder: {count} item(s) need restocking. Check the Household Supplies app.")
}

pub async fn run_notification_job(
    pool: &SqlitePool,
    feed: &ChangeFeed,
    messenger: &dyn Messenger,
    household_id: &str,
    options: NotifyOptions,
) -> AppResult<NotifyOutcome> {
    let household_id = require_household(household_id)?;

    let needing = supplies::list_by_status(pool, household_id, &SupplyStatus::NEEDS_RESTOCK).await?;
    if needing.is_empty() {
        debug!(target: "homestock", event = "notify_nothing_low", household_id);
        return Ok(NotifyOutcome::NothingToNotify);
    }
    let current_names: HashSet<&str> = needing.iter().map(|s| s.name.as_str()).collect();

    let existing = notifications::list(pool, household_id).await?;
    let stale: Vec<String> = existing
        .iter()
        .filter(|n| !current_names.contains(n.item_name.as_str()))
        .map(|n| n.id.clone())
        .collect();
    if !stale.is_empty() {
        notifications::delete_many(pool, feed, household_id, &stale).await?;
        info!(target: "homestock", event = "notify_stale_removed", household_id, removed = stale.len());
    }

    let names: Vec<String> = current_names.iter().map(|name| name.to_string()).collect();
    let unread = notifications::list_unread_for_names(pool, household_id, &names).await?;
    let mut covered: HashSet<(String, SupplyStatus)> = unread
        .into_iter()
        .map(|n| (n.item_name, n.status))
        .collect();

    let categories = categories::list(pool, household_id).await?;
    let timestamp = now_rfc3339();
    let mut fresh = Vec::new();
    for supply in &needing {
        // Also guards against two supplies sharing a name and status.
        if !covered.insert((supply.name.clone(), supply.status)) {
            continue;
        }
        fresh.push(Notification {
            id: id::new_uuid_v4(),
            household_id: household_id.to_string(),
            item_name: supply.name.clone(),
            category: display_name(&categories, &supply.category).to_string(),
            status: supply.status,
            timestamp: timestamp.clone(),
            is_read: false,
        });
    }

    if fresh.is_empty() {
        return Ok(NotifyOutcome::NothingToNotify);
    }
    notifications::insert_many(pool, feed, household_id, &fresh).await?;
    info!(target: "homestock", event = "notify_created", household_id, created = fresh.len());

    if options.send_message {
        send_reminder(pool, messenger, household_id, fresh.len()).await;
    }

    Ok(NotifyOutcome::Created { count: fresh.len() })
}

/// Act on a notification from the shopping side: set the status of the
/// supply its item name matches, then mark it read. Nothing is marked when
/// no supply matches.
pub async fn resolve_notification(
    pool: &SqlitePool,
    feed: &ChangeFeed,
    household_id: &str,
    notification_id: &str,
    status: SupplyStatus,
) -> AppResult<Supply> {
    let household_id = require_household(household_id)?;
    let notification = notifications::list(pool, household_id)
        .await?
        .into_iter()
        .find(|n| n.id == notification_id)
        .ok_or_else(|| {
            AppError::new(notifications::NOT_FOUND_CODE, "Notification not found")
                .with_context("id", notification_id)
        })?;
    let all = supplies::list(pool, household_id).await?;
    let target = find_by_name(&all, &notification.item_name).ok_or_else(|| {
        AppError::new(supplies::NOT_FOUND_CODE, "No matching supply found to update")
            .with_context("item_name", notification.item_name.clone())
    })?;
    let updated = supplies::set_status(pool, feed, household_id, &target.id, status).await?;
    notifications::mark_read(pool, feed, household_id, notification_id).await?;
    info!(
        target: "homestock",
        event = "notification_resolved",
        household_id,
        notification_id,
        supply_id = %updated.id,
        status = %status
    );
    Ok(updated)
}

/// Best effort: every failure is logged and swallowed.
async fn send_reminder(pool: &SqlitePool, messenger: &dyn Messenger, household_id: &str, count: usize) {
    if !messenger.is_enabled() {
        debug!(target: "homestock", event = "notify_message_skipped", household_id, reason = "messenger_disabled");
        return;
    }
    let recipient = match members::first_with_role(pool, household_id, Role::Husband).await {
        Ok(member) => member,
        Err(err) => {
            warn!(target: "homestock", event = "notify_message_failed", household_id, error = %err);
            return;
        }
    };
    let Some(phone) = recipient.and_then(|m| m.phone) else {
        debug!(target: "homestock", event = "notify_message_skipped", household_id, reason = "no_phone");
        return;
    };
    match messenger.send(&phone, &reminder_text(count)).await {
        Ok(()) => info!(target: "homestock", event = "notify_message_sent", household_id, count),
        Err(err) => warn!(target: "homestock", event = "notify_message_failed", household_id, error = %err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reminder_text_matches_wording() {
        assert_eq!(
            reminder_text(2),
            "Reminder: 2 item(s) need restocking. Check the Household Supplies app."
        );
    }

    #[test]
    fn outcome_messages() {
        assert_eq!(NotifyOutcome::NothingToNotify.message(), NOTHING_TO_NOTIFY);
        assert_eq!(NotifyOutcome::Created { count: 3 }.created(), 3);
    }
}
