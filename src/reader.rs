//! Ledger reader - mirrored collections with coalesced invalidation
//!
//! Keeps three independently invalidable scopes fresh: the operator
//! address, the event catalog, and per-address presence lists. Every
//! refresh replaces a scope's snapshot wholesale (`Arc` swap), so an
//! observer never sees a half-updated collection, and two reads with no
//! intervening refresh return the same allocation.
//!
//! Reads are best-effort: a failed refresh keeps the previous snapshot
//! and records the failure in a per-scope side channel. A mirroring
//! layer prefers staleness over blanking a UI that is being viewed.

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{broadcast, watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::identity::IdentityContext;
use crate::ledger::Ledger;
use crate::types::{Address, EventRecord, PresenceRecord};

/// One named mirrored collection, the unit of invalidation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Operator,
    Catalog,
    Presences(Address),
}

/// Read-through cache over the ledger's collections
pub struct LedgerReader {
    ledger: Arc<dyn Ledger>,
    /// Operator address; watch channel so `is_owner` derivation can react
    operator: watch::Sender<Option<Address>>,
    catalog: RwLock<Arc<Vec<EventRecord>>>,
    presences: DashMap<Address, Arc<Vec<PresenceRecord>>>,
    /// Shared empty list for addresses never fetched
    no_presences: Arc<Vec<PresenceRecord>>,
    /// Last refresh failure per scope; cleared by the next success
    errors: DashMap<Scope, String>,
    /// In-flight fetch registry; concurrent invalidations of one scope
    /// join the existing fetch instead of issuing another
    pending: Mutex<HashMap<Scope, broadcast::Sender<()>>>,
}

impl LedgerReader {
    pub fn new(ledger: Arc<dyn Ledger>) -> Self {
        let (operator, _) = watch::channel(None);
        Self {
            ledger,
            operator,
            catalog: RwLock::new(Arc::new(Vec::new())),
            presences: DashMap::new(),
            no_presences: Arc::new(Vec::new()),
            errors: DashMap::new(),
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Last-known operator address; `None` until the first successful read
    pub fn operator(&self) -> Option<Address> {
        *self.operator.borrow()
    }

    /// Subscribe to operator changes
    pub fn subscribe_operator(&self) -> watch::Receiver<Option<Address>> {
        self.operator.subscribe()
    }

    /// Current catalog snapshot, in ledger order
    pub async fn event_catalog(&self) -> Arc<Vec<EventRecord>> {
        Arc::clone(&*self.catalog.read().await)
    }

    /// Presence records observed for one address; empty if never fetched
    pub fn presences_for(&self, address: Address) -> Arc<Vec<PresenceRecord>> {
        self.presences
            .get(&address)
            .map(|entry| Arc::clone(&entry))
            .unwrap_or_else(|| Arc::clone(&self.no_presences))
    }

    /// Last refresh failure for a scope, if its snapshot is stale
    pub fn read_error(&self, scope: Scope) -> Option<String> {
        self.errors.get(&scope).map(|entry| entry.clone())
    }

    /// Force a re-fetch of one scope, waiting for it to complete.
    ///
    /// Overlapping invalidations of the same scope collapse into one
    /// request; every caller returns once that single fetch resolves.
    pub async fn invalidate(&self, scope: Scope) {
        let joined = {
            let mut pending = self.pending.lock().await;
            match pending.get(&scope) {
                Some(tx) => Some(tx.subscribe()),
                None => {
                    let (tx, _) = broadcast::channel(1);
                    pending.insert(scope, tx);
                    None
                }
            }
        };

        match joined {
            Some(mut done) => {
                // Another caller's fetch is in flight for this scope
                let _ = done.recv().await;
            }
            None => {
                self.refresh(scope).await;
                let mut pending = self.pending.lock().await;
                if let Some(tx) = pending.remove(&scope) {
                    let _ = tx.send(());
                }
            }
        }
    }

    /// Fetch one scope and swap in the new snapshot
    async fn refresh(&self, scope: Scope) {
        match scope {
            Scope::Operator => match self.ledger.read_operator().await {
                Ok(address) => {
                    self.errors.remove(&scope);
                    self.operator.send_if_modified(|current| {
                        if *current != Some(address) {
                            *current = Some(address);
                            true
                        } else {
                            false
                        }
                    });
                }
                Err(e) => {
                    warn!("operator refresh failed, keeping last-known value: {}", e);
                    self.errors.insert(scope, e.to_string());
                }
            },
            Scope::Catalog => match self.ledger.read_event_catalog().await {
                Ok(events) => {
                    let events = dedup_catalog(events);
                    debug!(count = events.len(), "catalog refreshed");
                    *self.catalog.write().await = Arc::new(events);
                    self.errors.remove(&scope);
                }
                Err(e) => {
                    warn!("catalog refresh failed, keeping snapshot: {}", e);
                    self.errors.insert(scope, e.to_string());
                }
            },
            Scope::Presences(address) => match self.ledger.read_presences(address).await {
                Ok(records) => {
                    debug!(address = %address, count = records.len(), "presences refreshed");
                    self.presences.insert(address, Arc::new(records));
                    self.errors.remove(&scope);
                }
                Err(e) => {
                    warn!(address = %address, "presence refresh failed, keeping snapshot: {}", e);
                    self.errors.insert(scope, e.to_string());
                }
            },
        }
    }
}

/// Drop duplicate `location_id`s, preserving first-seen order. The
/// ledger never assigns duplicates, but a refresh race in the
/// underlying source could resend an entry.
fn dedup_catalog(events: Vec<EventRecord>) -> Vec<EventRecord> {
    let mut seen = HashSet::with_capacity(events.len());
    events
        .into_iter()
        .filter(|event| seen.insert(event.location_id))
        .collect()
}

/// Start the background refresh task: re-fetches the operator, the
/// catalog, and the connected caller's presences on a fixed cadence.
pub fn spawn_poller(
    reader: Arc<LedgerReader>,
    identity: IdentityContext,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            reader.invalidate(Scope::Operator).await;
            reader.invalidate(Scope::Catalog).await;
            if let Some(address) = identity.current() {
                reader.invalidate(Scope::Presences(address)).await;
            }
        }
    })
}
