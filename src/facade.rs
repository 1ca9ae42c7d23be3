//! Sync facade - the single surface the application consumes
//!
//! Composes the identity context, the ledger reader and the action
//! executor. Owns the background refresh task and the `is_owner`
//! derivation; both stop when the facade is dropped.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::SyncConfig;
use crate::executor::{ActionExecutor, Lifecycle};
use crate::identity::IdentityContext;
use crate::ledger::Ledger;
use crate::notify::NotificationSink;
use crate::reader::{spawn_poller, LedgerReader, Scope};
use crate::types::{Action, Address, EventRecord, PresenceRecord};

/// Ledger sync surface: mirrored collections plus action submission
pub struct SyncFacade {
    identity: IdentityContext,
    reader: Arc<LedgerReader>,
    executor: ActionExecutor,
    owner: watch::Receiver<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl SyncFacade {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        sink: Arc<dyn NotificationSink>,
        config: SyncConfig,
    ) -> Self {
        let identity = IdentityContext::new();
        let reader = Arc::new(LedgerReader::new(Arc::clone(&ledger)));
        let executor = ActionExecutor::new(ledger, Arc::clone(&reader), sink);

        let poller = spawn_poller(
            Arc::clone(&reader),
            identity.clone(),
            config.refresh_interval,
        );
        let (owner, derivation) = spawn_owner_derivation(&identity, &reader);

        Self {
            identity,
            reader,
            executor,
            owner,
            tasks: vec![poller, derivation],
        }
    }

    /// The active identity; connect/disconnect through this handle
    pub fn identity(&self) -> &IdentityContext {
        &self.identity
    }

    /// Direct access to the reader (error side channel, targeted invalidation)
    pub fn reader(&self) -> &Arc<LedgerReader> {
        &self.reader
    }

    /// Whether the connected caller is the ledger operator.
    /// Always derived from the latest identity and operator values.
    pub fn is_owner(&self) -> bool {
        derive_owner(self.identity.current(), self.reader.operator())
    }

    /// Reactive view of `is_owner`; updates whenever identity or the
    /// operator read changes
    pub fn subscribe_owner(&self) -> watch::Receiver<bool> {
        self.owner.clone()
    }

    /// Current event catalog snapshot
    pub async fn event_catalog(&self) -> Arc<Vec<EventRecord>> {
        self.reader.event_catalog().await
    }

    /// Attendance records for the connected caller; empty when disconnected
    pub fn my_presences(&self) -> Arc<Vec<PresenceRecord>> {
        match self.identity.current() {
            Some(address) => self.reader.presences_for(address),
            None => Arc::new(Vec::new()),
        }
    }

    /// Re-fetch every scope relevant to the current identity, now
    pub async fn sync(&self) {
        self.reader.invalidate(Scope::Operator).await;
        self.reader.invalidate(Scope::Catalog).await;
        if let Some(address) = self.identity.current() {
            self.reader.invalidate(Scope::Presences(address)).await;
        }
    }

    /// Operator-only: append an event to the catalog.
    /// Name and description emptiness is the form layer's concern;
    /// this layer forwards whatever it is handed.
    pub fn add_event(
        &self,
        location_name: impl Into<String>,
        event_description: impl Into<String>,
        event_date: u64,
    ) -> Lifecycle {
        self.submit(Action::AddEvent {
            location_name: location_name.into(),
            event_description: event_description.into(),
            event_date,
        })
    }

    /// Operator-only: remove an event. Existence is not checked locally;
    /// the ledger is authoritative and may reject.
    pub fn remove_event(&self, location_id: u64) -> Lifecycle {
        self.submit(Action::RemoveEvent { location_id })
    }

    /// Register attendance for the connected caller
    pub fn register_presence(&self, location_id: u64, metadata: impl Into<String>) -> Lifecycle {
        self.submit(Action::RegisterPresence {
            location_id,
            metadata: metadata.into(),
        })
    }

    /// The uniform connected gate: every action resolves the caller here,
    /// so the per-kind functions never duplicate the check
    fn submit(&self, action: Action) -> Lifecycle {
        self.executor.submit(action, self.identity.current())
    }
}

impl Drop for SyncFacade {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

fn derive_owner(identity: Option<Address>, operator: Option<Address>) -> bool {
    match (identity, operator) {
        (Some(caller), Some(operator)) => caller == operator,
        _ => false,
    }
}

/// Recompute `is_owner` whenever either input watch fires
fn spawn_owner_derivation(
    identity: &IdentityContext,
    reader: &LedgerReader,
) -> (watch::Receiver<bool>, JoinHandle<()>) {
    let mut identity_rx = identity.subscribe();
    let mut operator_rx = reader.subscribe_operator();

    let initial = derive_owner(*identity_rx.borrow(), *operator_rx.borrow());
    let (tx, rx) = watch::channel(initial);

    let task = tokio::spawn(async move {
        loop {
            tokio::select! {
                changed = identity_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                changed = operator_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
            let value = derive_owner(
                *identity_rx.borrow_and_update(),
                *operator_rx.borrow_and_update(),
            );
            tx.send_if_modified(|current| {
                if *current != value {
                    *current = value;
                    true
                } else {
                    false
                }
            });
        }
    });

    (rx, task)
}
