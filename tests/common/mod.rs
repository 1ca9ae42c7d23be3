//! Scripted in-memory ledger for integration tests
//!
//! Holds catalog and presence state behind the `Ledger` trait, counts
//! reads and submissions, and lets tests control when (and how) each
//! submitted request confirms. Catalog reads can be gated on a semaphore
//! to hold a fetch open while concurrent invalidations pile up.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{oneshot, Mutex, Semaphore};

use turnout::{
    Action, ActionState, Address, Confirmation, EventRecord, Ledger, LedgerError,
    NotificationSink, PresenceRecord, RequestHandle,
};

pub fn addr(byte: u8) -> Address {
    Address::from_bytes([byte; 20])
}

struct LedgerState {
    operator: Address,
    next_location_id: u64,
    events: Vec<EventRecord>,
    presences: HashMap<Address, Vec<PresenceRecord>>,
    next_timestamp: u64,
}

enum PendingOp {
    Add {
        name: String,
        description: String,
        date: u64,
    },
    Remove {
        location_id: u64,
    },
    Register {
        location_id: u64,
        metadata: String,
        caller: Address,
    },
}

pub struct MockLedger {
    state: Mutex<LedgerState>,
    /// Submitted-but-unresolved requests in submission order
    resolvers: Mutex<Vec<(RequestHandle, PendingOp, oneshot::Sender<Confirmation>)>>,
    waiters: Mutex<HashMap<RequestHandle, oneshot::Receiver<Confirmation>>>,
    /// The identity the transport signs submissions as
    signer: Mutex<Option<Address>>,
    next_handle: AtomicU64,
    pub catalog_reads: AtomicUsize,
    pub submits: AtomicUsize,
    auto_confirm: AtomicBool,
    fail_reads: AtomicBool,
    gate_catalog: AtomicBool,
    catalog_gate: Semaphore,
}

impl MockLedger {
    pub fn new(operator: Address) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(LedgerState {
                operator,
                next_location_id: 1,
                events: Vec::new(),
                presences: HashMap::new(),
                next_timestamp: 1_700_000_000,
            }),
            resolvers: Mutex::new(Vec::new()),
            waiters: Mutex::new(HashMap::new()),
            signer: Mutex::new(None),
            next_handle: AtomicU64::new(1),
            catalog_reads: AtomicUsize::new(0),
            submits: AtomicUsize::new(0),
            auto_confirm: AtomicBool::new(false),
            fail_reads: AtomicBool::new(false),
            gate_catalog: AtomicBool::new(false),
            catalog_gate: Semaphore::new(0),
        })
    }

    pub async fn set_signer(&self, address: Address) {
        *self.signer.lock().await = Some(address);
    }

    /// Resolve every submission as soon as it arrives
    pub fn set_auto_confirm(&self, enabled: bool) {
        self.auto_confirm.store(enabled, Ordering::SeqCst);
    }

    /// Make all reads fail until cleared
    pub fn set_fail_reads(&self, enabled: bool) {
        self.fail_reads.store(enabled, Ordering::SeqCst);
    }

    /// Block catalog reads on the gate semaphore
    pub fn hold_catalog_reads(&self) {
        self.gate_catalog.store(true, Ordering::SeqCst);
    }

    /// Let `count` held catalog reads proceed
    pub fn release_catalog_reads(&self, count: usize) {
        self.gate_catalog.store(false, Ordering::SeqCst);
        self.catalog_gate.add_permits(count);
    }

    /// Insert an event directly, bypassing the submission path
    pub async fn seed_event(&self, name: &str, description: &str, date: u64) -> u64 {
        let mut state = self.state.lock().await;
        let id = state.next_location_id;
        state.next_location_id += 1;
        state.events.push(EventRecord {
            location_id: id,
            location_name: name.into(),
            event_description: description.into(),
            event_date: date,
        });
        id
    }

    /// Handles of submissions not yet resolved, oldest first
    pub async fn pending_handles(&self) -> Vec<RequestHandle> {
        self.resolvers
            .lock()
            .await
            .iter()
            .map(|(handle, _, _)| handle.clone())
            .collect()
    }

    /// Wait until at least `count` submissions are pending resolution
    pub async fn wait_for_pending(&self, count: usize) -> Vec<RequestHandle> {
        for _ in 0..200 {
            let handles = self.pending_handles().await;
            if handles.len() >= count {
                return handles;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("ledger never saw {count} pending submission(s)");
    }

    /// Process one pending request the way the real ledger would:
    /// apply it if valid, or report failure
    pub async fn confirm(&self, handle: &RequestHandle) {
        let (op, tx) = {
            let mut resolvers = self.resolvers.lock().await;
            let index = resolvers
                .iter()
                .position(|(h, _, _)| h == handle)
                .expect("unknown request handle");
            let (_, op, tx) = resolvers.remove(index);
            (op, tx)
        };

        let outcome = self.apply(op).await;
        let _ = tx.send(outcome);
    }

    /// Reject one pending request with the given reason
    pub async fn fail(&self, handle: &RequestHandle, reason: &str) {
        let tx = {
            let mut resolvers = self.resolvers.lock().await;
            let index = resolvers
                .iter()
                .position(|(h, _, _)| h == handle)
                .expect("unknown request handle");
            let (_, _, tx) = resolvers.remove(index);
            tx
        };
        let _ = tx.send(Confirmation::Failed(reason.into()));
    }

    async fn apply(&self, op: PendingOp) -> Confirmation {
        let mut state = self.state.lock().await;
        match op {
            PendingOp::Add {
                name,
                description,
                date,
            } => {
                let id = state.next_location_id;
                state.next_location_id += 1;
                state.events.push(EventRecord {
                    location_id: id,
                    location_name: name,
                    event_description: description,
                    event_date: date,
                });
                Confirmation::Confirmed
            }
            PendingOp::Remove { location_id } => {
                let before = state.events.len();
                state.events.retain(|e| e.location_id != location_id);
                if state.events.len() == before {
                    Confirmation::Failed("unknown location".into())
                } else {
                    Confirmation::Confirmed
                }
            }
            PendingOp::Register {
                location_id,
                metadata,
                caller,
            } => {
                let event = match state.events.iter().find(|e| e.location_id == location_id) {
                    Some(event) => event.clone(),
                    None => return Confirmation::Failed("unknown location".into()),
                };
                let already = state
                    .presences
                    .get(&caller)
                    .is_some_and(|records| records.iter().any(|p| p.location_id == location_id));
                if already {
                    return Confirmation::Failed("already registered".into());
                }
                let timestamp = state.next_timestamp;
                state.next_timestamp += 1;
                state.presences.entry(caller).or_default().push(PresenceRecord {
                    timestamp,
                    location_id: event.location_id,
                    location_name: event.location_name,
                    event_description: event.event_description,
                    event_date: event.event_date,
                    metadata,
                });
                Confirmation::Confirmed
            }
        }
    }

    async fn enqueue(&self, op: PendingOp) -> Result<RequestHandle, LedgerError> {
        self.submits.fetch_add(1, Ordering::SeqCst);
        let handle = RequestHandle(format!(
            "req-{}",
            self.next_handle.fetch_add(1, Ordering::SeqCst)
        ));

        let (tx, rx) = oneshot::channel();
        self.resolvers.lock().await.push((handle.clone(), op, tx));
        self.waiters.lock().await.insert(handle.clone(), rx);

        if self.auto_confirm.load(Ordering::SeqCst) {
            self.confirm(&handle).await;
        }

        Ok(handle)
    }

    async fn current_signer(&self) -> Address {
        self.signer
            .lock()
            .await
            .expect("test submitted without setting a signer")
    }
}

#[async_trait]
impl Ledger for MockLedger {
    async fn read_operator(&self) -> Result<Address, LedgerError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(LedgerError::Transport("endpoint unreachable".into()));
        }
        Ok(self.state.lock().await.operator)
    }

    async fn read_event_catalog(&self) -> Result<Vec<EventRecord>, LedgerError> {
        self.catalog_reads.fetch_add(1, Ordering::SeqCst);
        if self.gate_catalog.load(Ordering::SeqCst) {
            let permit = self
                .catalog_gate
                .acquire()
                .await
                .expect("catalog gate closed");
            permit.forget();
        }
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(LedgerError::Transport("endpoint unreachable".into()));
        }
        Ok(self.state.lock().await.events.clone())
    }

    async fn read_presences(
        &self,
        address: Address,
    ) -> Result<Vec<PresenceRecord>, LedgerError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(LedgerError::Transport("endpoint unreachable".into()));
        }
        Ok(self
            .state
            .lock()
            .await
            .presences
            .get(&address)
            .cloned()
            .unwrap_or_default())
    }

    async fn submit_add_event(
        &self,
        location_name: &str,
        event_description: &str,
        event_date: u64,
    ) -> Result<RequestHandle, LedgerError> {
        self.enqueue(PendingOp::Add {
            name: location_name.into(),
            description: event_description.into(),
            date: event_date,
        })
        .await
    }

    async fn submit_remove_event(&self, location_id: u64) -> Result<RequestHandle, LedgerError> {
        self.enqueue(PendingOp::Remove { location_id }).await
    }

    async fn submit_register_presence(
        &self,
        location_id: u64,
        metadata: &str,
    ) -> Result<RequestHandle, LedgerError> {
        let caller = self.current_signer().await;
        self.enqueue(PendingOp::Register {
            location_id,
            metadata: metadata.into(),
            caller,
        })
        .await
    }

    async fn await_confirmation(
        &self,
        handle: &RequestHandle,
    ) -> Result<Confirmation, LedgerError> {
        let rx = self
            .waiters
            .lock()
            .await
            .remove(handle)
            .ok_or_else(|| LedgerError::Declined("unknown handle".into()))?;
        rx.await
            .map_err(|_| LedgerError::Transport("ledger dropped the request".into()))
    }
}

/// Sink that records every transition it is handed, in order
#[derive(Default)]
pub struct RecordingSink {
    transitions: Mutex<Vec<(&'static str, ActionState)>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn transitions(&self) -> Vec<(&'static str, ActionState)> {
        self.transitions.lock().await.clone()
    }

    /// Just the states, ignoring which action produced them
    pub async fn states(&self) -> Vec<ActionState> {
        self.transitions
            .lock()
            .await
            .iter()
            .map(|(_, state)| state.clone())
            .collect()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn on_transition(&self, action: &Action, state: &ActionState) {
        self.transitions
            .lock()
            .await
            .push((action.kind(), state.clone()));
    }
}
