//! One device's view of a household: the session, the local collections,
//! and every action the dashboard offers on top of the gateway.

use std::sync::Arc;

use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::attachments::{self, Attachment};
use crate::categories::{self, Category, CategoryPatch, NewCategory};
use crate::export::{self, ExportDocument, ImportDocument};
use crate::household::{self, DefaultDataset, SeedOutcome};
use crate::import::{self, ImportMode, ImportReport};
use crate::members::{self, HouseholdMember};
use crate::notifications;
use crate::notify::{self, Messenger, NotifyOptions, NotifyOutcome};
use crate::realtime::{fold, ChangeFeed, Collections, RowChange};
use crate::session::{CachedSnapshot, PendingAction, SessionContext, SessionStore};
use crate::shopping_list::ShoppingList;
use crate::supplies::{self, NewSupply, Supply, SupplyPatch, SupplyStatus};
use crate::{AppError, AppResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    Connected { household_id: String, seed: SeedOutcome },
    /// A join was requested before sign-in; the code still has to be entered.
    NeedsCode,
    NeedsSetup,
}

/// An optimistic status write that has been applied locally but not yet
/// confirmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub supply_id: String,
    pub previous: Option<SupplyStatus>,
    pub written: SupplyStatus,
}

pub struct Dashboard {
    pool: SqlitePool,
    feed: ChangeFeed,
    messenger: Arc<dyn Messenger>,
    sessions: SessionStore,
    dataset: DefaultDataset,
    session: SessionContext,
    collections: Collections,
    attachments: Vec<Attachment>,
}

impl Dashboard {
    pub fn new(
        pool: SqlitePool,
        feed: ChangeFeed,
        messenger: Arc<dyn Messenger>,
        sessions: SessionStore,
        dataset: DefaultDataset,
    ) -> Self {
        Self {
            pool,
            feed,
            messenger,
            sessions,
            dataset,
            session: SessionContext::default(),
            collections: Collections::default(),
            attachments: Vec::new(),
        }
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    pub fn collections(&self) -> &Collections {
        &self.collections
    }

    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }

    fn household(&self) -> AppResult<String> {
        self.session
            .household_id
            .clone()
            .ok_or_else(|| AppError::new("HOUSEHOLD/REQUIRED", "Not connected to a household"))
    }

    fn persist_session(&self) {
        if let Err(err) = self.sessions.save(&self.session) {
            warn!(target: "homestock", event = "session_save_failed", error = %err);
        }
    }

    /// Restore the stored session and resolve a household: the stored code,
    /// then a deferred generate/join, then an invite matching `email`.
    pub async fn start(&mut self, email: Option<&str>) -> AppResult<StartOutcome> {
        self.session = self.sessions.load();
        if self.session.household_id.is_some() {
            if let Some(temp) = self.session.temp_role.take() {
                self.session.role.get_or_insert(temp);
            }
            return self.open_household().await;
        }

        match self.session.take_pending() {
            Some(PendingAction::AutoGenerate) => {
                self.generate_household().await?;
                return self.open_household().await;
            }
            Some(PendingAction::AutoJoin) => {
                self.persist_session();
                return Ok(StartOutcome::NeedsCode);
            }
            None => {}
        }

        if let Some(email) = email {
            self.session.remember_email(email);
            if let Some(member) = members::find_by_email(&self.pool, email).await? {
                info!(
                    target: "homestock",
                    event = "household_auto_joined",
                    household_id = %member.household_id,
                    role = %member.role
                );
                self.session.role.get_or_insert(member.role);
                self.session.connect(&member.household_id)?;
                return self.open_household().await;
            }
        }

        self.persist_session();
        Ok(StartOutcome::NeedsSetup)
    }

    async fn open_household(&mut self) -> AppResult<StartOutcome> {
        let household_id = self.household()?;
        let seed =
            household::initialize_household(&self.pool, &self.feed, &household_id, &self.dataset)
                .await?;
        self.reload().await?;
        Ok(StartOutcome::Connected { household_id, seed })
    }

    /// Reload every collection and refresh the offline cache.
    pub async fn reload(&mut self) -> AppResult<()> {
        let household_id = self.household()?;
        self.collections = Collections {
            categories: categories::list(&self.pool, &household_id).await?,
            supplies: supplies::list(&self.pool, &household_id).await?,
            notifications: notifications::list(&self.pool, &household_id).await?,
            members: members::list(&self.pool, &household_id).await?,
        };
        self.attachments = attachments::list(&self.pool, &household_id).await?;
        self.session.cache(CachedSnapshot {
            supplies: self.collections.supplies.clone(),
            categories: self.collections.categories.clone(),
            notifications: self.collections.notifications.clone(),
            uploaded_files: self.attachments.clone(),
        });
        self.persist_session();
        Ok(())
    }

    pub async fn generate_household(&mut self) -> AppResult<String> {
        let code = household::generate_code();
        self.session.connect(&code)?;
        self.open_household().await?;
        info!(target: "homestock", event = "household_generated", household_id = %code);
        Ok(code)
    }

    pub async fn join_household(&mut self, code: &str) -> AppResult<StartOutcome> {
        self.session.connect(code)?;
        self.open_household().await
    }

    /// Remove this device's membership rows and forget the household.
    pub async fn leave_household(&mut self, email: &str) -> AppResult<usize> {
        let household_id = self.household()?;
        let removed = members::leave(&self.pool, &self.feed, &household_id, email).await?;
        self.session.household_id = None;
        self.session.cached = None;
        self.collections = Collections::default();
        self.attachments.clear();
        self.persist_session();
        Ok(removed)
    }

    pub fn sign_out(&mut self) {
        self.session.sign_out();
        self.collections = Collections::default();
        self.attachments.clear();
        self.persist_session();
    }

    pub fn apply(&mut self, change: RowChange) {
        fold(&mut self.collections, change);
    }

    /// Apply `status` locally and remember what it replaced.
    pub fn begin_status_change(&mut self, supply_id: &str, status: SupplyStatus) -> StatusChange {
        let slot = self.collections.supplies.iter_mut().find(|s| s.id == supply_id);
        let previous = slot.map(|supply| std::mem::replace(&mut supply.status, status));
        StatusChange {
            supply_id: supply_id.to_string(),
            previous,
            written: status,
        }
    }

    /// Settle an optimistic change. A failure reverts the local copy only
    /// while it still holds the value this change wrote.
    pub fn finish_status_change(
        &mut self,
        change: &StatusChange,
        result: AppResult<Supply>,
    ) -> AppResult<Supply> {
        let slot = self
            .collections
            .supplies
            .iter_mut()
            .find(|s| s.id == change.supply_id);
        match (result, slot) {
            (Ok(stored), Some(local)) => {
                if local.status == change.written {
                    *local = stored.clone();
                }
                Ok(stored)
            }
            (Ok(stored), None) => Ok(stored),
            (Err(err), Some(local)) => {
                if let Some(previous) = change.previous {
                    if local.status == change.written {
                        local.status = previous;
                    }
                }
                warn!(
                    target: "homestock",
                    event = "status_change_reverted",
                    supply_id = %change.supply_id,
                    error = %err
                );
                Err(err)
            }
            (Err(err), None) => Err(err),
        }
    }

    pub async fn set_status(&mut self, supply_id: &str, status: SupplyStatus) -> AppResult<Supply> {
        let household_id = self.household()?;
        let change = self.begin_status_change(supply_id, status);
        let result =
            supplies::set_status(&self.pool, &self.feed, &household_id, supply_id, status).await;
        self.finish_status_change(&change, result)
    }

    pub async fn add_supply(&mut self, new: NewSupply) -> AppResult<Supply> {
        let household_id = self.household()?;
        let supply = supplies::insert(&self.pool, &self.feed, &household_id, new).await?;
        self.reload().await?;
        Ok(supply)
    }

    pub async fn update_supply(&mut self, id: &str, patch: SupplyPatch) -> AppResult<Supply> {
        let household_id = self.household()?;
        let supply = supplies::update(&self.pool, &self.feed, &household_id, id, patch).await?;
        self.reload().await?;
        Ok(supply)
    }

    pub async fn delete_supply(&mut self, id: &str) -> AppResult<()> {
        let household_id = self.household()?;
        supplies::delete(&self.pool, &self.feed, &household_id, id).await?;
        self.reload().await
    }

    pub async fn add_category(&mut self, new: NewCategory) -> AppResult<Category> {
        let household_id = self.household()?;
        let category = categories::insert(&self.pool, &self.feed, &household_id, new).await?;
        self.reload().await?;
        Ok(category)
    }

    pub async fn update_category(&mut self, id: &str, patch: CategoryPatch) -> AppResult<Category> {
        let household_id = self.household()?;
        let category = categories::update(&self.pool, &self.feed, &household_id, id, patch).await?;
        self.reload().await?;
        Ok(category)
    }

    /// Deletes the category and its supplies.
    pub async fn delete_category(&mut self, id: &str) -> AppResult<Vec<String>> {
        let household_id = self.household()?;
        let removed = categories::delete(&self.pool, &self.feed, &household_id, id).await?;
        self.reload().await?;
        Ok(removed)
    }

    /// Show the imported collections right away, then sync them when a
    /// household is connected. `None` means nothing was synced.
    pub async fn import_document(
        &mut self,
        doc: &ImportDocument,
        mode: ImportMode,
    ) -> AppResult<Option<ImportReport>> {
        let household_id = self.session.household_id.clone().unwrap_or_default();
        let prepared = import::prepare(&household_id, doc)?;
        self.collections.categories = prepared.categories;
        self.collections.supplies = prepared.supplies;
        self.collections.notifications = prepared.notifications;
        self.attachments = prepared.attachments;
        if household_id.is_empty() {
            info!(target: "homestock", event = "import_local_only", supplies = self.collections.supplies.len());
            return Ok(None);
        }

        let result = import::apply_import(&self.pool, &self.feed, &household_id, doc, mode).await;
        // Earlier steps may have landed even when a later one failed.
        self.reload().await?;
        result.map(Some)
    }

    pub async fn export_document(&self) -> AppResult<ExportDocument> {
        export::build_document(&self.pool, &self.household()?).await
    }

    pub async fn export_token(&self) -> AppResult<String> {
        export::encode_token(&self.export_document().await?)
    }

    /// The list of what to buy. Also runs the reminder job, whose failure is
    /// only logged.
    pub async fn shopping_list(&mut self) -> AppResult<ShoppingList> {
        let list =
            ShoppingList::from_collections(&self.collections.categories, &self.collections.supplies)?;
        if let Err(err) = self.send_reminders().await {
            warn!(target: "homestock", event = "shopping_list_notify_failed", error = %err);
        }
        Ok(list)
    }

    pub async fn send_reminders(&mut self) -> AppResult<NotifyOutcome> {
        let household_id = self.household()?;
        let outcome = notify::run_notification_job(
            &self.pool,
            &self.feed,
            self.messenger.as_ref(),
            &household_id,
            NotifyOptions { send_message: true },
        )
        .await?;
        self.collections.notifications = notifications::list(&self.pool, &household_id).await?;
        Ok(outcome)
    }

    pub async fn resolve_notification(
        &mut self,
        notification_id: &str,
        status: SupplyStatus,
    ) -> AppResult<Supply> {
        let household_id = self.household()?;
        let supply = notify::resolve_notification(
            &self.pool,
            &self.feed,
            &household_id,
            notification_id,
            status,
        )
        .await?;
        self.reload().await?;
        Ok(supply)
    }

    pub fn members(&self) -> &[HouseholdMember] {
        &self.collections.members
    }
}
