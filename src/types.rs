//! Core data types for the corporate-action event engine

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::MalformedRecord;

/// Composite business key naming one event's evolution line.
///
/// The triple is immutable for the lifetime of the entity; every version of
/// the same announcement carries the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventKey {
    pub event_reference: String,
    pub financial_instrument_id: String,
    pub sender_bic: String,
}

impl EventKey {
    /// Create a new key from its three components
    pub fn new(
        event_reference: impl Into<String>,
        financial_instrument_id: impl Into<String>,
        sender_bic: impl Into<String>,
    ) -> Self {
        Self {
            event_reference: event_reference.into(),
            financial_instrument_id: financial_instrument_id.into(),
            sender_bic: sender_bic.into(),
        }
    }
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}|{}|{}",
            self.event_reference, self.financial_instrument_id, self.sender_bic
        )
    }
}

/// Content fingerprint of an event's business fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint(pub [u8; 32]);

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

// Fingerprints travel inside JSON snapshots, so they serialize as hex
// strings rather than byte arrays.
impl Serialize for Fingerprint {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for Fingerprint {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        let bytes = hex::decode(&text).map_err(serde::de::Error::custom)?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("fingerprint must be 32 bytes"))?;
        Ok(Fingerprint(bytes))
    }
}

/// Mutable business attributes of a corporate-action event.
///
/// This is the exact field set the fingerprint is computed over; the key
/// components and the engine's bookkeeping columns are deliberately outside
/// this struct.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDetails {
    pub related_message_reference: Option<String>,
    pub corporate_action_event_id: Option<String>,
    pub corporate_action_event_type: Option<String>,
    pub mandatory_voluntary_indicator: Option<String>,
    pub event_processing_status: Option<String>,
    pub event_status_code: Option<String>,
    pub official_corporate_action_event_id: Option<String>,
    pub link_event_id: Option<String>,
    pub safekeeping_account: Option<String>,
    pub place_of_safekeeping: Option<String>,
    pub event_creation_datetime: Option<DateTime<Utc>>,
    pub effective_date: Option<NaiveDate>,
    pub record_date: Option<NaiveDate>,
    pub ex_date: Option<NaiveDate>,
    pub announcement_date: Option<NaiveDate>,
    pub response_deadline: Option<NaiveDate>,
    pub general_meeting_date: Option<NaiveDate>,
    pub narrative: Option<String>,
    pub market_disclosure_flag: Option<bool>,
}

/// One incoming record from the external feed.
///
/// Key components arrive as optional raw strings; a record that cannot name
/// a complete [`EventKey`] is malformed and is skipped by the reconciler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub event_reference: Option<String>,
    pub financial_instrument_id: Option<String>,
    pub sender_bic: Option<String>,
    #[serde(flatten)]
    pub details: EventDetails,
    /// Time the record entered the pipeline; used as the write timestamp
    /// for any state this record produces.
    pub received_at: DateTime<Utc>,
}

impl EventRecord {
    /// Extract the composite key, reporting which components are missing.
    ///
    /// A component that is absent or an empty string does not name a key.
    pub fn key(&self) -> Result<EventKey, MalformedRecord> {
        fn present(value: &Option<String>) -> bool {
            value.as_deref().is_some_and(|v| !v.is_empty())
        }

        let mut missing = Vec::new();
        if !present(&self.event_reference) {
            missing.push("event_reference");
        }
        if !present(&self.financial_instrument_id) {
            missing.push("financial_instrument_id");
        }
        if !present(&self.sender_bic) {
            missing.push("sender_bic");
        }
        if !missing.is_empty() {
            return Err(MalformedRecord { missing });
        }

        Ok(EventKey {
            event_reference: self.event_reference.clone().unwrap_or_default(),
            financial_instrument_id: self.financial_instrument_id.clone().unwrap_or_default(),
            sender_bic: self.sender_bic.clone().unwrap_or_default(),
        })
    }
}

/// Current persisted state of one event, one row per [`EventKey`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorporateActionEvent {
    #[serde(flatten)]
    pub key: EventKey,
    /// Monotonically increasing content version, 1 on first insert
    pub version: u32,
    pub fingerprint: Fingerprint,
    #[serde(flatten)]
    pub details: EventDetails,
    /// Set once on insert, never touched afterwards
    pub created_at: DateTime<Utc>,
    /// Refreshed on every accepted write
    pub updated_at: DateTime<Utc>,
}

/// Immutable point-in-time snapshot of one persisted version.
///
/// Keyed by `(key, version)`; the payload is the JSON-serialized
/// [`CorporateActionEvent`] at that version. Create-once: the audit log
/// exposes no update or delete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub key: EventKey,
    pub version: u32,
    pub fingerprint: Fingerprint,
    pub updated_at: DateTime<Utc>,
    pub snapshot: String,
}
