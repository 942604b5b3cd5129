//! Per-device session: who is signed in, which household they joined, and
//! the last snapshot shown. Persisted through a small key-value store.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::attachments::Attachment;
use crate::categories::Category;
use crate::export::write_atomic;
use crate::members::Role;
use crate::notifications::Notification;
use crate::supplies::Supply;
use crate::util::require_household;
use crate::AppResult;

pub const SESSION_KEY: &str = "session";

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
    fn remove(&self, key: &str);
    fn save(&self) -> anyhow::Result<()>;
}

#[derive(Default)]
pub struct MemoryStore {
    data: Mutex<HashMap<String, String>>,
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.data
            .lock()
            .map(|guard| guard.get(key).cloned())
            .unwrap_or_default()
    }

    fn set(&self, key: &str, value: &str) {
        if let Ok(mut guard) = self.data.lock() {
            guard.insert(key.to_string(), value.to_string());
        }
    }

    fn remove(&self, key: &str) {
        if let Ok(mut guard) = self.data.lock() {
            guard.remove(key);
        }
    }

    fn save(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// One JSON object per device. Changes stay in memory until `save`.
pub struct JsonFileStore {
    path: PathBuf,
    data: Mutex<BTreeMap<String, String>>,
}

impl JsonFileStore {
    pub fn open(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let data = match fs::read_to_string(&path) {
            Ok(text) if text.trim().is_empty() => BTreeMap::new(),
            Ok(text) => serde_json::from_str(&text)
                .with_context(|| format!("parse session store {}", path.display()))?,
            Err(err) if err.kind() == ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => {
                return Err(err).with_context(|| format!("read session store {}", path.display()))
            }
        };
        Ok(Self {
            path,
            data: Mutex::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.data
            .lock()
            .map(|guard| guard.get(key).cloned())
            .unwrap_or_default()
    }

    fn set(&self, key: &str, value: &str) {
        if let Ok(mut guard) = self.data.lock() {
            guard.insert(key.to_string(), value.to_string());
        }
    }

    fn remove(&self, key: &str) {
        if let Ok(mut guard) = self.data.lock() {
            guard.remove(key);
        }
    }

    fn save(&self) -> anyhow::Result<()> {
        let json = {
            let guard = self
                .data
                .lock()
                .map_err(|_| anyhow::anyhow!("session store lock poisoned"))?;
            serde_json::to_vec_pretty(&*guard)?
        };
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create session dir {}", parent.display()))?;
        }
        write_atomic(&self.path, &json)?;
        Ok(())
    }
}

/// Work deferred across an authentication redirect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingAction {
    /// Create a new household code once signed in.
    AutoGenerate,
    /// Join the household code already entered once signed in.
    AutoJoin,
}

/// Last collections shown, for display while offline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedSnapshot {
    #[serde(default)]
    pub supplies: Vec<Supply>,
    #[serde(default)]
    pub categories: Vec<Category>,
    #[serde(default)]
    pub notifications: Vec<Notification>,
    #[serde(default)]
    pub uploaded_files: Vec<Attachment>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionContext {
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub household_id: Option<String>,
    #[serde(default)]
    pub remembered_email: Option<String>,
    #[serde(default)]
    pub pending: Option<PendingAction>,
    #[serde(default)]
    pub temp_role: Option<Role>,
    #[serde(default)]
    pub cached: Option<CachedSnapshot>,
    #[serde(default)]
    pub has_account: bool,
}

impl SessionContext {
    pub fn sign_in(role: Role) -> Self {
        Self {
            role: Some(role),
            ..Self::default()
        }
    }

    /// Sign in again on a device that was signed out, keeping what it
    /// remembers about the account.
    pub fn resume(self, role: Role) -> Self {
        Self {
            role: Some(role),
            remembered_email: self.remembered_email,
            has_account: self.has_account,
            ..Self::default()
        }
    }

    pub fn is_signed_in(&self) -> bool {
        self.role.is_some()
    }

    pub fn is_connected(&self) -> bool {
        self.household_id.is_some()
    }

    /// Join a household. Switching households drops the cached snapshot.
    pub fn connect(&mut self, code: &str) -> AppResult<()> {
        let code = require_household(code)?;
        if self.household_id.as_deref() != Some(code) {
            self.cached = None;
        }
        self.household_id = Some(code.to_string());
        Ok(())
    }

    pub fn remember_email(&mut self, email: &str) {
        let email = email.trim().to_lowercase();
        self.remembered_email = (!email.is_empty()).then_some(email);
    }

    /// Park an action and the role picked before leaving for sign-in.
    pub fn defer(&mut self, action: PendingAction, temp_role: Role) {
        self.pending = Some(action);
        self.temp_role = Some(temp_role);
    }

    /// Consume the deferred action. The parked role becomes the session role
    /// when none is set yet. A second call returns `None`.
    pub fn take_pending(&mut self) -> Option<PendingAction> {
        if let Some(temp) = self.temp_role.take() {
            self.role.get_or_insert(temp);
        }
        self.pending.take()
    }

    pub fn cache(&mut self, snapshot: CachedSnapshot) {
        self.cached = Some(snapshot);
    }

    pub fn sign_out(&mut self) {
        self.role = None;
        self.household_id = None;
        self.cached = None;
        self.pending = None;
        self.temp_role = None;
        self.has_account = true;
    }
}

#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<dyn KeyValueStore>,
}

impl SessionStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { inner: store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::default()))
    }

    pub fn json_file(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        Ok(Self::new(Arc::new(JsonFileStore::open(path)?)))
    }

    /// Stored session, or a blank one when nothing (or nothing readable) is
    /// stored.
    pub fn load(&self) -> SessionContext {
        let Some(raw) = self.inner.get(SESSION_KEY) else {
            return SessionContext::default();
        };
        match serde_json::from_str(&raw) {
            Ok(ctx) => ctx,
            Err(err) => {
                warn!(target: "homestock", event = "session_load_failed", error = %err);
                SessionContext::default()
            }
        }
    }

    pub fn save(&self, ctx: &SessionContext) -> anyhow::Result<()> {
        let json = serde_json::to_string(ctx)?;
        self.inner.set(SESSION_KEY, &json);
        self.inner.save().context("persist session")
    }

    pub fn clear(&self) -> anyhow::Result<()> {
        self.inner.remove(SESSION_KEY);
        self.inner.save().context("persist cleared session")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            attempts: 15,
            delay: Duration::from_millis(300),
        }
    }
}

/// Poll `probe` until it yields a session or the attempts run out. Running
/// out is `None`, not an error; probe errors count as a miss.
pub async fn wait_for_session<T, F, Fut>(mut probe: F, policy: PollPolicy) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<Option<T>>>,
{
    for attempt in 1..=policy.attempts {
        match probe().await {
            Ok(Some(session)) => {
                debug!(target: "homestock", event = "session_found", attempt);
                return Some(session);
            }
            Ok(None) => {}
            Err(err) => {
                debug!(target: "homestock", event = "session_probe_failed", attempt, error = %err);
            }
        }
        if attempt < policy.attempts {
            tokio::time::sleep(policy.delay).await;
        }
    }
    info!(target: "homestock", event = "session_wait_exhausted", attempts = policy.attempts);
    None
}
