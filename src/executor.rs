//! Action executor - the confirmation lifecycle state machine
//!
//! One lifecycle exists per submitted action:
//!
//! ```text
//! Idle -> Rejected       precondition failed locally
//! Idle -> Submitting     handed to the ledger
//! Submitting -> Failed   submission declined before acceptance
//! Submitting -> Pending  ledger returned a request handle
//! Pending -> Confirmed   durably accepted; affected scope invalidated
//! Pending -> Failed      ledger reports the change did not take effect
//! ```
//!
//! `Rejected`, `Confirmed` and `Failed` are terminal. There is no
//! cancellation and no client-side timeout on `Pending`: a stalled ledger
//! leaves the lifecycle pending rather than reporting a false failure.
//!
//! Unrelated lifecycles run concurrently (the ledger is the serialization
//! point), but an identical request (same kind, arguments and caller) is
//! rejected locally while the first is still in flight.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::watch;
use tracing::debug;

use crate::error::ActionError;
use crate::ledger::{Confirmation, Ledger};
use crate::notify::NotificationSink;
use crate::reader::{LedgerReader, Scope};
use crate::types::{Action, ActionRequest, Address};

/// Observable lifecycle state of one submitted action
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionState {
    Idle,
    /// Precondition failed; the request never reached the ledger
    Rejected(ActionError),
    Submitting,
    Pending,
    Confirmed,
    Failed(ActionError),
}

impl ActionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ActionState::Rejected(_) | ActionState::Confirmed | ActionState::Failed(_)
        )
    }
}

/// Handle to one in-flight action; observe transitions or await the outcome
pub struct Lifecycle {
    action: Action,
    rx: watch::Receiver<ActionState>,
}

impl Lifecycle {
    pub fn action(&self) -> &Action {
        &self.action
    }

    /// Current state
    pub fn state(&self) -> ActionState {
        self.rx.borrow().clone()
    }

    /// Subscribe to every state change
    pub fn subscribe(&self) -> watch::Receiver<ActionState> {
        self.rx.clone()
    }

    /// Wait for a terminal state
    pub async fn outcome(&mut self) -> ActionState {
        loop {
            let state = self.rx.borrow_and_update().clone();
            if state.is_terminal() {
                return state;
            }
            if self.rx.changed().await.is_err() {
                return self.rx.borrow().clone();
            }
        }
    }
}

/// Drives state-changing requests through their confirmation lifecycle
pub struct ActionExecutor {
    ledger: Arc<dyn Ledger>,
    reader: Arc<LedgerReader>,
    sink: Arc<dyn NotificationSink>,
    /// Fingerprints of requests between submission and terminal state
    in_flight: Arc<DashMap<ActionRequest, ()>>,
}

impl ActionExecutor {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        reader: Arc<LedgerReader>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            ledger,
            reader,
            sink,
            in_flight: Arc::new(DashMap::new()),
        }
    }

    /// Submit an action for the given caller (`None` = not connected).
    ///
    /// Returns immediately with a lifecycle handle; preconditions that fail
    /// locally yield an already-`Rejected` lifecycle without any ledger call.
    pub fn submit(&self, action: Action, caller: Option<Address>) -> Lifecycle {
        let (tx, rx) = watch::channel(ActionState::Idle);
        let lifecycle = Lifecycle {
            action: action.clone(),
            rx,
        };

        let caller = match caller {
            Some(address) => address,
            None => {
                self.reject(tx, action, ActionError::NotConnected);
                return lifecycle;
            }
        };

        // Privileged actions require the caller to be the ledger operator.
        // Until the first operator read succeeds nothing can be verified,
        // so privileged actions are rejected rather than forwarded blind.
        if action.requires_operator() && self.reader.operator() != Some(caller) {
            self.reject(tx, action, ActionError::Unauthorized);
            return lifecycle;
        }

        let request = ActionRequest { action, caller };

        // Duplicate-in-flight: the fingerprint already present means the
        // original lifecycle owns the registry entry; leave it untouched.
        if self.in_flight.insert(request.clone(), ()).is_some() {
            self.reject(tx, request.action, ActionError::DuplicateInFlight);
            return lifecycle;
        }

        self.spawn_run(request, tx);
        lifecycle
    }

    /// Terminate in `Rejected` before submission, notifying the sink once
    fn reject(&self, tx: watch::Sender<ActionState>, action: Action, error: ActionError) {
        debug!(action = action.kind(), error = %error, "action rejected locally");
        let state = ActionState::Rejected(error);
        tx.send_replace(state.clone());
        let sink = Arc::clone(&self.sink);
        tokio::spawn(async move {
            sink.on_transition(&action, &state).await;
        });
    }

    /// Run one lifecycle to its terminal state
    fn spawn_run(&self, request: ActionRequest, tx: watch::Sender<ActionState>) {
        let ledger = Arc::clone(&self.ledger);
        let reader = Arc::clone(&self.reader);
        let sink = Arc::clone(&self.sink);
        let in_flight = Arc::clone(&self.in_flight);

        tokio::spawn(async move {
            let transition = |state: ActionState| {
                let tx = &tx;
                let sink = &sink;
                let action = &request.action;
                async move {
                    tx.send_replace(state.clone());
                    sink.on_transition(action, &state).await;
                }
            };

            transition(ActionState::Submitting).await;

            let submitted = match &request.action {
                Action::AddEvent {
                    location_name,
                    event_description,
                    event_date,
                } => {
                    ledger
                        .submit_add_event(location_name, event_description, *event_date)
                        .await
                }
                Action::RemoveEvent { location_id } => {
                    ledger.submit_remove_event(*location_id).await
                }
                Action::RegisterPresence {
                    location_id,
                    metadata,
                } => {
                    ledger
                        .submit_register_presence(*location_id, metadata)
                        .await
                }
            };

            let handle = match submitted {
                Ok(handle) => handle,
                Err(e) => {
                    in_flight.remove(&request);
                    transition(ActionState::Failed(ActionError::SubmissionRejected(
                        e.to_string(),
                    )))
                    .await;
                    return;
                }
            };

            transition(ActionState::Pending).await;

            let outcome = ledger.await_confirmation(&handle).await;
            in_flight.remove(&request);

            match outcome {
                Ok(Confirmation::Confirmed) => {
                    // Re-fetch the affected scope before reporting success,
                    // so a caller observing Confirmed reads its own write
                    if let Some(scope) = affected_scope(&request) {
                        reader.invalidate(scope).await;
                    }
                    transition(ActionState::Confirmed).await;
                }
                Ok(Confirmation::Failed(reason)) => {
                    transition(ActionState::Failed(ActionError::LedgerRejected(reason))).await;
                }
                Err(e) => {
                    transition(ActionState::Failed(ActionError::LedgerRejected(
                        e.to_string(),
                    )))
                    .await;
                }
            }
        });
    }
}

/// The mirrored scope a confirmed action invalidates
fn affected_scope(request: &ActionRequest) -> Option<Scope> {
    match request.action {
        Action::AddEvent { .. } | Action::RemoveEvent { .. } => Some(Scope::Catalog),
        Action::RegisterPresence { .. } => Some(Scope::Presences(request.caller)),
    }
}
