//! Session state repository
//!
//! [`SessionStore`] is the raw per-visitor storage: a map from panel id to
//! an untyped JSON entry, keyed by the anonymous session key. The wizard
//! talks to it through [`WizardSessions`], which validates entries on load.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tasex_common::{Error, Result};
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use super::state::WizardState;

/// Anonymous visitor identifier, as carried in the session cookie
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey(String);

impl SessionKey {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Accept only keys this service could have issued
    pub fn parse(raw: &str) -> Option<Self> {
        Uuid::parse_str(raw)
            .ok()
            .map(|uuid| Self(uuid.simple().to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Storage backend for session entries
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self, key: &SessionKey, panel_id: Uuid) -> Result<Option<Value>>;

    async fn save(&self, key: &SessionKey, panel_id: Uuid, entry: Value) -> Result<()>;
}

/// Expired visitors are swept out on writes at most this often
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

struct VisitorEntries {
    panels: HashMap<Uuid, Value>,
    last_seen: Instant,
}

struct MemoryEntries {
    visitors: HashMap<SessionKey, VisitorEntries>,
    last_sweep: Instant,
}

impl MemoryEntries {
    fn purge(&mut self, now: Instant, idle_timeout: Duration) -> usize {
        let before = self.visitors.len();
        self.visitors
            .retain(|_, visitor| !is_idle(visitor.last_seen, now, idle_timeout));
        self.last_sweep = now;

        let removed = before - self.visitors.len();
        if removed > 0 {
            debug!(removed, remaining = self.visitors.len(), "Dropped idle wizard sessions");
        }
        removed
    }
}

fn is_idle(last_seen: Instant, now: Instant, idle_timeout: Duration) -> bool {
    now.saturating_duration_since(last_seen) >= idle_timeout
}

/// Process-local store
///
/// A visitor's entries are dropped once the session key goes untouched for
/// `idle_timeout`. Idle keys read as empty immediately and are removed from
/// memory by the next sweep.
pub struct MemorySessionStore {
    entries: RwLock<MemoryEntries>,
    idle_timeout: Duration,
}

impl MemorySessionStore {
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            entries: RwLock::new(MemoryEntries {
                visitors: HashMap::new(),
                last_sweep: Instant::now(),
            }),
            idle_timeout,
        }
    }

    /// Drop every visitor idle as of `now`, returning how many went
    pub async fn purge_idle(&self, now: Instant) -> usize {
        self.entries.write().await.purge(now, self.idle_timeout)
    }

    /// Number of session keys currently held
    pub async fn visitor_count(&self) -> usize {
        self.entries.read().await.visitors.len()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, key: &SessionKey, panel_id: Uuid) -> Result<Option<Value>> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;

        match entries.visitors.entry(key.clone()) {
            Entry::Vacant(_) => Ok(None),
            Entry::Occupied(visitor) if is_idle(visitor.get().last_seen, now, self.idle_timeout) => {
                visitor.remove();
                Ok(None)
            }
            Entry::Occupied(mut visitor) => {
                let visitor = visitor.get_mut();
                visitor.last_seen = now;
                Ok(visitor.panels.get(&panel_id).cloned())
            }
        }
    }

    async fn save(&self, key: &SessionKey, panel_id: Uuid, entry: Value) -> Result<()> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;

        if now.saturating_duration_since(entries.last_sweep) >= SWEEP_INTERVAL {
            entries.purge(now, self.idle_timeout);
        }

        let visitor = entries
            .visitors
            .entry(key.clone())
            .or_insert_with(|| VisitorEntries {
                panels: HashMap::new(),
                last_seen: now,
            });
        visitor.last_seen = now;
        visitor.panels.insert(panel_id, entry);
        Ok(())
    }
}

/// Typed access to wizard state
#[derive(Clone)]
pub struct WizardSessions {
    store: Arc<dyn SessionStore>,
}

impl WizardSessions {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }

    /// Process-local sessions dropped after `idle_timeout` without a visit
    pub fn in_memory(idle_timeout: Duration) -> Self {
        Self::new(Arc::new(MemorySessionStore::new(idle_timeout)))
    }

    /// Load the state for a panel
    ///
    /// Entries that fail validation are replaced with a fresh state and
    /// written back.
    pub async fn get(&self, key: &SessionKey, panel_id: Uuid) -> Result<Option<WizardState>> {
        let Some(entry) = self.store.load(key, panel_id).await? else {
            return Ok(None);
        };

        match WizardState::from_stored(entry, panel_id) {
            Ok(state) => Ok(Some(state)),
            Err(Error::Invariant(reason)) => {
                warn!(panel_id = %panel_id, reason = %reason, "Repairing malformed session entry");
                let state = WizardState::new(panel_id);
                self.put(key, &state).await?;
                Ok(Some(state))
            }
            Err(e) => Err(e),
        }
    }

    pub async fn put(&self, key: &SessionKey, state: &WizardState) -> Result<()> {
        self.store.save(key, state.panel_id(), state.to_stored()).await
    }

    /// Raw entry access, for stores shared with other components
    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }
}
