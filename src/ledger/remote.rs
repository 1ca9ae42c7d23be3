//! Remote ledger over the persistent connection
//!
//! Maps each ledger operation to a named JSON method. Reads and submits
//! use the configured request timeout; confirmation waits are unbounded
//! and survive reconnects by re-issuing the wait for the same handle.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::{Confirmation, Ledger, LedgerConnection, RequestHandle};
use crate::error::LedgerError;
use crate::types::{Address, EventRecord, PresenceRecord};

/// `Ledger` implementation speaking JSON frames to a remote endpoint
pub struct RemoteLedger {
    conn: LedgerConnection,
    request_timeout: Duration,
}

impl RemoteLedger {
    /// Connect to the ledger RPC endpoint
    pub async fn connect(url: &str, request_timeout: Duration) -> Result<Self, LedgerError> {
        let conn = LedgerConnection::connect(url).await?;
        Ok(Self {
            conn,
            request_timeout,
        })
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, LedgerError> {
        self.conn
            .request(method, params, Some(self.request_timeout))
            .await
    }

    fn parse_handle(value: Value) -> Result<RequestHandle, LedgerError> {
        value
            .as_str()
            .map(|s| RequestHandle(s.to_string()))
            .ok_or_else(|| LedgerError::Protocol("submit result is not a handle".into()))
    }
}

#[async_trait]
impl Ledger for RemoteLedger {
    async fn read_operator(&self) -> Result<Address, LedgerError> {
        let value = self.call("readOperator", json!({})).await?;
        let raw = value
            .as_str()
            .ok_or_else(|| LedgerError::Protocol("operator result is not a string".into()))?;
        raw.parse()
            .map_err(|e: String| LedgerError::Protocol(format!("bad operator address: {e}")))
    }

    async fn read_event_catalog(&self) -> Result<Vec<EventRecord>, LedgerError> {
        let value = self.call("readEventCatalog", json!({})).await?;
        serde_json::from_value(value)
            .map_err(|e| LedgerError::Protocol(format!("bad catalog payload: {e}")))
    }

    async fn read_presences(
        &self,
        address: Address,
    ) -> Result<Vec<PresenceRecord>, LedgerError> {
        let value = self
            .call("readPresences", json!({ "address": address }))
            .await?;
        serde_json::from_value(value)
            .map_err(|e| LedgerError::Protocol(format!("bad presences payload: {e}")))
    }

    async fn submit_add_event(
        &self,
        location_name: &str,
        event_description: &str,
        event_date: u64,
    ) -> Result<RequestHandle, LedgerError> {
        let value = self
            .call(
                "submitAddEvent",
                json!({
                    "locationName": location_name,
                    "eventDescription": event_description,
                    "eventDate": event_date,
                }),
            )
            .await?;
        Self::parse_handle(value)
    }

    async fn submit_remove_event(&self, location_id: u64) -> Result<RequestHandle, LedgerError> {
        let value = self
            .call("submitRemoveEvent", json!({ "locationId": location_id }))
            .await?;
        Self::parse_handle(value)
    }

    async fn submit_register_presence(
        &self,
        location_id: u64,
        metadata: &str,
    ) -> Result<RequestHandle, LedgerError> {
        let value = self
            .call(
                "submitRegisterPresence",
                json!({ "locationId": location_id, "metadata": metadata }),
            )
            .await?;
        Self::parse_handle(value)
    }

    async fn await_confirmation(
        &self,
        handle: &RequestHandle,
    ) -> Result<Confirmation, LedgerError> {
        // Unbounded wait: a pending write has no client-side timeout. On a
        // dropped session, re-issue the wait once the endpoint is back; the
        // ledger answers for any handle it has seen.
        loop {
            let result = self
                .conn
                .request("awaitConfirmation", json!({ "handle": handle.0 }), None)
                .await;

            match result {
                Ok(value) => {
                    let status = value
                        .get("status")
                        .and_then(Value::as_str)
                        .ok_or_else(|| {
                            LedgerError::Protocol("confirmation missing status".into())
                        })?;
                    return match status {
                        "confirmed" => Ok(Confirmation::Confirmed),
                        "failed" => {
                            let reason = value
                                .get("reason")
                                .and_then(Value::as_str)
                                .unwrap_or("unspecified")
                                .to_string();
                            Ok(Confirmation::Failed(reason))
                        }
                        other => Err(LedgerError::Protocol(format!(
                            "unknown confirmation status: {other}"
                        ))),
                    };
                }
                Err(LedgerError::Transport(reason)) => {
                    warn!(
                        handle = %handle.0,
                        "confirmation wait interrupted ({}), retrying",
                        reason
                    );
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    debug!(handle = %handle.0, "re-issuing confirmation wait");
                }
                Err(e) => return Err(e),
            }
        }
    }
}
