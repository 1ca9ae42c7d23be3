//! Error taxonomy for the sync layer
//!
//! `ActionError` covers everything that can stop a submitted action:
//! locally-resolved preconditions (`NotConnected`, `Unauthorized`,
//! `DuplicateInFlight`) never reach the ledger, while `SubmissionRejected`
//! and `LedgerRejected` terminate an already-started lifecycle.
//!
//! Background refresh failures are NOT errors to the reader's consumers;
//! they surface through the per-scope side channel on `LedgerReader`.

use thiserror::Error;

/// Reasons an action lifecycle ends in `Rejected` or `Failed`
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ActionError {
    /// No identity available for an action requiring one
    #[error("no connected identity")]
    NotConnected,

    /// Non-operator invoked a privileged action
    #[error("caller is not the operator")]
    Unauthorized,

    /// An identical request (same kind, arguments, caller) is already pending
    #[error("identical request already in flight")]
    DuplicateInFlight,

    /// The wallet/transport declined before the request reached the ledger
    #[error("submission rejected: {0}")]
    SubmissionRejected(String),

    /// The ledger processed the request and declined the change
    #[error("ledger rejected: {0}")]
    LedgerRejected(String),
}

/// Transport-level failures from the ledger collaborator
#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    /// Connection-level failure (unreachable, closed mid-request, timeout)
    #[error("transport error: {0}")]
    Transport(String),

    /// The endpoint answered with a malformed or unexpected frame
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The endpoint answered the request with an error
    #[error("request declined: {0}")]
    Declined(String),
}
