//! Turnout - ledger-mirroring sync client for proof-of-presence events
//!
//! The ledger is the single source of truth for the event catalog and
//! attendance records; this crate is the client-side state manager that
//! mirrors it and drives every state change through a confirmation
//! lifecycle.
//!
//! ## Components
//!
//! - **IdentityContext**: active caller address and connectivity
//! - **LedgerReader**: mirrored collections with coalesced invalidation
//! - **ActionExecutor**: submit/pending/confirmed lifecycles
//! - **NotificationSink**: outcome reporting collaborator
//! - **SyncFacade**: the one surface the application consumes

pub mod config;
pub mod error;
pub mod executor;
pub mod facade;
pub mod identity;
pub mod ledger;
pub mod notify;
pub mod reader;
pub mod types;

pub use config::SyncConfig;
pub use error::{ActionError, LedgerError};
pub use executor::{ActionState, Lifecycle};
pub use facade::SyncFacade;
pub use identity::IdentityContext;
pub use ledger::{Confirmation, Ledger, RemoteLedger, RequestHandle};
pub use notify::{LogSink, NotificationSink};
pub use reader::{LedgerReader, Scope};
pub use types::{Action, ActionRequest, Address, EventRecord, PresenceRecord};
