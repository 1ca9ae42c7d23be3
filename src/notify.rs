//! Lifecycle outcome reporting
//!
//! The executor reports every lifecycle transition to a `NotificationSink`.
//! The presentation layer supplies its own sink (toasts, status bars);
//! `LogSink` is the built-in default that writes transitions to the log.

use async_trait::async_trait;
use tracing::{info, warn};

use crate::executor::ActionState;
use crate::types::Action;

/// Collaborator receiving one call per lifecycle state change.
///
/// Terminal states (`Rejected`, `Confirmed`, `Failed`) arrive exactly once
/// per lifecycle; there are no duplicate or silent outcomes.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn on_transition(&self, action: &Action, state: &ActionState);
}

/// Default sink that logs transitions
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn on_transition(&self, action: &Action, state: &ActionState) {
        match state {
            ActionState::Confirmed => {
                info!(action = action.kind(), "action confirmed");
            }
            ActionState::Rejected(e) => {
                warn!(action = action.kind(), error = %e, "action rejected");
            }
            ActionState::Failed(e) => {
                warn!(action = action.kind(), error = %e, "action failed");
            }
            other => {
                info!(action = action.kind(), state = ?other, "action progress");
            }
        }
    }
}
