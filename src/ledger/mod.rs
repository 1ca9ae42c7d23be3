//! Ledger collaborator interface
//!
//! The ledger is the single source of truth: three reads producing the
//! mirrored collections, three submits each returning a request handle,
//! and a confirmation wait that resolves a handle to its terminal outcome.
//!
//! `RemoteLedger` is the production implementation over a persistent
//! WebSocket; tests substitute their own `Ledger` impls.

mod connection;
mod remote;

pub use connection::LedgerConnection;
pub use remote::RemoteLedger;

use async_trait::async_trait;

use crate::error::LedgerError;
use crate::types::{Address, EventRecord, PresenceRecord};

/// Opaque handle to an accepted but not yet durable request
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct RequestHandle(pub String);

/// Terminal outcome the ledger reports for a submitted request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Confirmation {
    /// The change is durably accepted
    Confirmed,
    /// The ledger processed the request and it did not take effect
    Failed(String),
}

/// Narrow contract to the external ledger.
///
/// Submissions return as soon as the ledger accepts the request;
/// durability is observed separately via `await_confirmation`, which may
/// wait indefinitely (the ledger's finality latency is not ours to bound).
#[async_trait]
pub trait Ledger: Send + Sync + 'static {
    /// The single privileged address authorized to curate the catalog
    async fn read_operator(&self) -> Result<Address, LedgerError>;

    /// All non-removed events, in ledger order
    async fn read_event_catalog(&self) -> Result<Vec<EventRecord>, LedgerError>;

    /// Attendance records observed for one address
    async fn read_presences(&self, address: Address)
        -> Result<Vec<PresenceRecord>, LedgerError>;

    async fn submit_add_event(
        &self,
        location_name: &str,
        event_description: &str,
        event_date: u64,
    ) -> Result<RequestHandle, LedgerError>;

    async fn submit_remove_event(&self, location_id: u64) -> Result<RequestHandle, LedgerError>;

    async fn submit_register_presence(
        &self,
        location_id: u64,
        metadata: &str,
    ) -> Result<RequestHandle, LedgerError>;

    /// Wait for the ledger to report a terminal outcome for a handle
    async fn await_confirmation(&self, handle: &RequestHandle)
        -> Result<Confirmation, LedgerError>;
}
