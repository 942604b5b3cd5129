//! Row-change events for one household and the fold that applies them to a
//! client's in-memory collections.
//!
//! Every gateway write publishes on the [`ChangeFeed`]. Consumers either
//! subscribe directly (the SSE endpoint) or forward events into a
//! [`Reconciler`], which owns a [`Collections`] and applies them strictly in
//! delivery order.

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, warn};
use ts_rs::TS;

use crate::categories::Category;
use crate::members::HouseholdMember;
use crate::notifications::Notification;
use crate::supplies::Supply;

const FEED_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum Table {
    Categories,
    Supplies,
    Notifications,
    HouseholdMembers,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(tag = "table", content = "row", rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum Row {
    Category(Category),
    Supply(Supply),
    Notification(Notification),
    Member(HouseholdMember),
}

impl Row {
    pub fn table(&self) -> Table {
        match self {
            Row::Category(_) => Table::Categories,
            Row::Supply(_) => Table::Supplies,
            Row::Notification(_) => Table::Notifications,
            Row::Member(_) => Table::HouseholdMembers,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Row::Category(row) => &row.id,
            Row::Supply(row) => &row.id,
            Row::Notification(row) => &row.id,
            Row::Member(row) => &row.id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum RowChange {
    Inserted(Row),
    Updated(Row),
    Deleted { table: Table, id: String },
}

impl RowChange {
    pub fn table(&self) -> Table {
        match self {
            RowChange::Inserted(row) | RowChange::Updated(row) => row.table(),
            RowChange::Deleted { table, .. } => *table,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub household_id: String,
    pub change: RowChange,
}

/// In-process fan-out of row changes.
#[derive(Clone)]
pub struct ChangeFeed {
    sender: broadcast::Sender<ChangeEvent>,
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeFeed {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(FEED_CAPACITY);
        Self { sender }
    }

    /// Never blocks and never fails; with no subscribers the event is dropped.
    pub fn publish(&self, household_id: &str, change: RowChange) {
        let table = change.table();
        let event = ChangeEvent {
            household_id: household_id.to_string(),
            change,
        };
        if self.sender.send(event).is_err() {
            debug!(
                target: "homestock",
                event = "change_feed_no_listeners",
                household_id,
                table = ?table
            );
        }
    }

    pub fn subscribe(&self, household_id: &str) -> HouseholdSubscription {
        HouseholdSubscription {
            household_id: household_id.to_string(),
            receiver: self.sender.subscribe(),
        }
    }
}

/// Receiver that only yields one household's changes.
pub struct HouseholdSubscription {
    household_id: String,
    receiver: broadcast::Receiver<ChangeEvent>,
}

impl HouseholdSubscription {
    pub fn household_id(&self) -> &str {
        &self.household_id
    }

    /// Next change for this household; `None` once the feed is gone.
    pub async fn recv(&mut self) -> Option<RowChange> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if event.household_id == self.household_id => return Some(event.change),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(
                        target: "homestock",
                        event = "change_feed_lagged",
                        household_id = %self.household_id,
                        skipped
                    );
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = RowChange> + Send + 'static {
        let household_id = self.household_id;
        BroadcastStream::new(self.receiver).filter_map(move |item| match item {
            Ok(event) if event.household_id == household_id => Some(event.change),
            Ok(_) => None,
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                warn!(
                    target: "homestock",
                    event = "change_feed_lagged",
                    household_id = %household_id,
                    skipped
                );
                None
            }
        })
    }

    /// Forward this household's changes into `queue` until either side closes.
    pub fn forward(mut self, queue: mpsc::UnboundedSender<RowChange>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(change) = self.recv().await {
                if queue.send(change).is_err() {
                    break;
                }
            }
        })
    }
}

/// A device's local view of one household.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Collections {
    pub categories: Vec<Category>,
    pub supplies: Vec<Supply>,
    pub notifications: Vec<Notification>,
    pub members: Vec<HouseholdMember>,
}

fn replace_by_id<T, F>(items: &mut [T], id: &str, key: F, value: T) -> bool
where
    F: Fn(&T) -> &str,
{
    match items.iter_mut().find(|item| key(item) == id) {
        Some(slot) => {
            *slot = value;
            true
        }
        None => false,
    }
}

/// Apply one change. Inserts append (notifications are prepended, newest
/// first), updates replace in place, deletes remove by id. An update for an
/// unknown id is dropped.
pub fn fold(collections: &mut Collections, change: RowChange) {
    match change {
        RowChange::Inserted(row) => match row {
            Row::Category(row) => collections.categories.push(row),
            Row::Supply(row) => collections.supplies.push(row),
            Row::Notification(row) => collections.notifications.insert(0, row),
            Row::Member(row) => collections.members.push(row),
        },
        RowChange::Updated(row) => {
            let table = row.table();
            let id = row.id().to_string();
            let applied = match row {
                Row::Category(row) => {
                    replace_by_id(&mut collections.categories, &id, |c| &c.id, row)
                }
                Row::Supply(row) => replace_by_id(&mut collections.supplies, &id, |s| &s.id, row),
                Row::Notification(row) => {
                    replace_by_id(&mut collections.notifications, &id, |n| &n.id, row)
                }
                Row::Member(row) => replace_by_id(&mut collections.members, &id, |m| &m.id, row),
            };
            if !applied {
                debug!(target: "homestock", event = "fold_update_dropped", table = ?table, id = %id);
            }
        }
        RowChange::Deleted { table, id } => match table {
            Table::Categories => collections.categories.retain(|c| c.id != id),
            Table::Supplies => collections.supplies.retain(|s| s.id != id),
            Table::Notifications => collections.notifications.retain(|n| n.id != id),
            Table::HouseholdMembers => collections.members.retain(|m| m.id != id),
        },
    }
}

/// Owns a [`Collections`] and applies queued changes in delivery order.
pub struct Reconciler {
    collections: Collections,
    queue: mpsc::UnboundedReceiver<RowChange>,
}

impl Reconciler {
    pub fn new(collections: Collections) -> (Self, mpsc::UnboundedSender<RowChange>) {
        let (sender, queue) = mpsc::unbounded_channel();
        (Self { collections, queue }, sender)
    }

    pub fn collections(&self) -> &Collections {
        &self.collections
    }

    /// Apply everything already queued without waiting.
    pub fn drain_pending(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(change) = self.queue.try_recv() {
            fold(&mut self.collections, change);
            applied += 1;
        }
        applied
    }

    /// Apply changes until every sender is dropped, then hand back the state.
    pub async fn run(mut self) -> Collections {
        while let Some(change) = self.queue.recv().await {
            fold(&mut self.collections, change);
        }
        self.collections
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::supplies::SupplyStatus;

    fn supply(id: &str, status: SupplyStatus) -> Supply {
        Supply {
            id: id.into(),
            household_id: "h1".into(),
            name: format!("item {id}"),
            name_ar: None,
            name_en: None,
            status,
            category: "pantry".into(),
            created_at: 1,
            updated_at: 1,
        }
    }

    fn notification(id: &str) -> Notification {
        Notification {
            id: id.into(),
            household_id: "h1".into(),
            item_name: "Milk".into(),
            category: "Dairy".into(),
            status: SupplyStatus::Low,
            timestamp: "2026-01-01T00:00:00.000Z".into(),
            is_read: false,
        }
    }

    #[test]
    fn fold_insert_update_delete() {
        let mut c = Collections::default();
        fold(&mut c, RowChange::Inserted(Row::Supply(supply("a", SupplyStatus::Available))));
        fold(&mut c, RowChange::Inserted(Row::Supply(supply("b", SupplyStatus::Available))));
        fold(&mut c, RowChange::Updated(Row::Supply(supply("a", SupplyStatus::Out))));
        assert_eq!(c.supplies[0].status, SupplyStatus::Out);
        assert_eq!(c.supplies[1].id, "b");

        fold(
            &mut c,
            RowChange::Deleted {
                table: Table::Supplies,
                id: "a".into(),
            },
        );
        assert_eq!(c.supplies.len(), 1);
        assert_eq!(c.supplies[0].id, "b");
    }

    #[test]
    fn notifications_insert_newest_first() {
        let mut c = Collections::default();
        fold(&mut c, RowChange::Inserted(Row::Notification(notification("n1"))));
        fold(&mut c, RowChange::Inserted(Row::Notification(notification("n2"))));
        let ids: Vec<_> = c.notifications.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, ["n2", "n1"]);
    }

    #[test]
    fn update_for_unknown_id_is_dropped() {
        let mut c = Collections::default();
        fold(&mut c, RowChange::Updated(Row::Supply(supply("ghost", SupplyStatus::Low))));
        assert!(c.supplies.is_empty());
    }

    #[test]
    fn change_serializes_with_type_tag() {
        let change = RowChange::Deleted {
            table: Table::Categories,
            id: "spices".into(),
        };
        let json = serde_json::to_value(&change).unwrap();
        assert_eq!(json["type"], "deleted");
        assert_eq!(json["data"]["table"], "categories");
    }

    #[tokio::test]
    async fn subscription_filters_by_household() {
        let feed = ChangeFeed::new();
        let mut sub = feed.subscribe("h1");
        feed.publish("other", RowChange::Inserted(Row::Supply(supply("x", SupplyStatus::Low))));
        feed.publish("h1", RowChange::Inserted(Row::Supply(supply("y", SupplyStatus::Low))));
        match sub.recv().await {
            Some(RowChange::Inserted(Row::Supply(s))) => assert_eq!(s.id, "y"),
            other => panic!("unexpected change: {other:?}"),
        }
    }

    #[test]
    fn publish_without_listeners_is_silent() {
        let feed = ChangeFeed::new();
        feed.publish("h1", RowChange::Deleted { table: Table::Supplies, id: "a".into() });
    }

    #[tokio::test]
    async fn reconciler_applies_in_delivery_order() {
        let (reconciler, tx) = Reconciler::new(Collections::default());
        tx.send(RowChange::Inserted(Row::Supply(supply("a", SupplyStatus::Available))))
            .unwrap();
        tx.send(RowChange::Updated(Row::Supply(supply("a", SupplyStatus::Low))))
            .unwrap();
        tx.send(RowChange::Updated(Row::Supply(supply("a", SupplyStatus::Out))))
            .unwrap();
        drop(tx);
        let collections = reconciler.run().await;
        assert_eq!(collections.supplies.len(), 1);
        assert_eq!(collections.supplies[0].status, SupplyStatus::Out);
    }

    #[test]
    fn drain_pending_applies_only_what_is_queued() {
        let (mut reconciler, tx) = Reconciler::new(Collections::default());
        assert_eq!(reconciler.drain_pending(), 0);
        tx.send(RowChange::Inserted(Row::Notification(notification("n1"))))
            .unwrap();
        tx.send(RowChange::Deleted { table: Table::Notifications, id: "n1".into() })
            .unwrap();
        assert_eq!(reconciler.drain_pending(), 2);
        assert!(reconciler.collections().notifications.is_empty());
    }

    #[tokio::test]
    async fn forwarded_feed_drives_the_reconciler() {
        let feed = ChangeFeed::new();
        let (reconciler, tx) = Reconciler::new(Collections::default());
        let task = feed.subscribe("h1").forward(tx);
        feed.publish("h1", RowChange::Inserted(Row::Supply(supply("a", SupplyStatus::Low))));
        feed.publish("h2", RowChange::Inserted(Row::Supply(supply("b", SupplyStatus::Low))));
        drop(feed);
        task.await.unwrap();

        let collections = reconciler.run().await;
        let ids: Vec<_> = collections.supplies.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, ["a"]);
    }
}
