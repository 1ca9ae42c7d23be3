//! Identity context
//!
//! Tracks the active caller address and connectivity. Cheap to clone;
//! all clones share one watch channel so dependents (the facade's owner
//! derivation, the background poller) observe connect/disconnect changes.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use crate::types::Address;

/// Shared handle to the active identity. Connected iff an address is set.
#[derive(Clone)]
pub struct IdentityContext {
    tx: Arc<watch::Sender<Option<Address>>>,
}

impl IdentityContext {
    /// Create a disconnected identity context
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Set the active address, notifying subscribers
    pub fn connect(&self, address: Address) {
        info!(address = %address, "identity connected");
        self.tx.send_replace(Some(address));
    }

    /// Clear the active address, notifying subscribers
    pub fn disconnect(&self) {
        info!("identity disconnected");
        self.tx.send_replace(None);
    }

    /// The current address, if connected
    pub fn current(&self) -> Option<Address> {
        *self.tx.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.tx.borrow().is_some()
    }

    /// Subscribe to identity changes
    pub fn subscribe(&self) -> watch::Receiver<Option<Address>> {
        self.tx.subscribe()
    }
}

impl Default for IdentityContext {
    fn default() -> Self {
        Self::new()
    }
}
