//! Core types mirrored from the ledger
//!
//! Field names serialize in the ledger's camelCase wire shape
//! (`locationId`, `eventDate`, ...) so records round-trip unchanged
//! through the JSON transport.

use std::fmt;
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

/// A 20-byte ledger address, canonicalized to lowercase hex
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address([u8; 20]);

impl Address {
    /// Construct from raw bytes
    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Raw byte view
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl FromStr for Address {
    type Err = String;

    /// Parse a `0x`-prefixed (or bare) hex address, case-insensitive
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex_part = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(hex_part).map_err(|e| format!("invalid address hex: {e}"))?;
        let bytes: [u8; 20] = bytes
            .try_into()
            .map_err(|_| format!("address must be 20 bytes, got {}", hex_part.len() / 2))?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// A cataloged event as the ledger reports it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    /// Ledger-assigned id; unique, monotonically increasing, never reused
    pub location_id: u64,
    pub location_name: String,
    pub event_description: String,
    /// Epoch seconds; past or future both valid
    pub event_date: u64,
}

/// One attendance claim, with the event fields snapshotted at registration.
///
/// The snapshot is intentionally never re-synced: history stays meaningful
/// even after the event itself is removed from the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceRecord {
    /// Ledger-assigned registration time, epoch seconds
    pub timestamp: u64,
    pub location_id: u64,
    pub location_name: String,
    pub event_description: String,
    pub event_date: u64,
    /// Caller-supplied free text, may be empty
    pub metadata: String,
}

/// One state-changing request against the ledger
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Action {
    /// Operator-only: append an event to the catalog
    AddEvent {
        location_name: String,
        event_description: String,
        event_date: u64,
    },
    /// Operator-only: remove an event from the catalog
    RemoveEvent { location_id: u64 },
    /// Any connected identity: register attendance at an event
    RegisterPresence { location_id: u64, metadata: String },
}

impl Action {
    /// Whether this action requires operator privilege
    pub fn requires_operator(&self) -> bool {
        matches!(self, Action::AddEvent { .. } | Action::RemoveEvent { .. })
    }

    /// Short name for logging
    pub fn kind(&self) -> &'static str {
        match self {
            Action::AddEvent { .. } => "add_event",
            Action::RemoveEvent { .. } => "remove_event",
            Action::RegisterPresence { .. } => "register_presence",
        }
    }
}

/// An action bound to its caller. Hash + Eq make this the fingerprint
/// for the executor's duplicate-in-flight registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ActionRequest {
    pub action: Action,
    pub caller: Address,
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADDR: &str = "0x00112233445566778899aabbccddeeff00112233";

    #[test]
    fn test_address_round_trip() {
        let addr: Address = ADDR.parse().unwrap();
        assert_eq!(addr.to_string(), ADDR);
    }

    #[test]
    fn test_address_case_insensitive() {
        let lower: Address = ADDR.parse().unwrap();
        let upper: Address = ADDR.to_uppercase().replace("0X", "0x").parse().unwrap();
        assert_eq!(lower, upper);
    }

    #[test]
    fn test_address_rejects_wrong_length() {
        assert!("0x1234".parse::<Address>().is_err());
        assert!("not hex".parse::<Address>().is_err());
    }

    #[test]
    fn test_event_record_wire_shape() {
        let event = EventRecord {
            location_id: 7,
            location_name: "Summit".into(),
            event_description: "Annual summit".into(),
            event_date: 1735689600,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["locationId"], 7);
        assert_eq!(json["eventDate"], 1735689600u64);
    }

    #[test]
    fn test_fingerprint_equality() {
        let caller: Address = ADDR.parse().unwrap();
        let a = ActionRequest {
            action: Action::RegisterPresence {
                location_id: 5,
                metadata: String::new(),
            },
            caller,
        };
        let b = a.clone();
        assert_eq!(a, b);

        let c = ActionRequest {
            action: Action::RegisterPresence {
                location_id: 5,
                metadata: "front row".into(),
            },
            caller,
        };
        assert_ne!(a, c);
    }
}
