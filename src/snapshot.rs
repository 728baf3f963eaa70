//! JSON snapshot encoding for audit records

use crate::error::SnapshotError;
use crate::types::CorporateActionEvent;
use serde_json::{Map, Value};

/// Encodes persisted event states into the serialized snapshot payload an
/// [`AuditRecord`](crate::types::AuditRecord) carries, and decodes payloads
/// back for delta computation.
///
/// Snapshots are JSON with a flat field layout so the delta engine can walk
/// them as plain field→value maps.
#[derive(Debug, Clone)]
pub struct SnapshotCodec;

impl SnapshotCodec {
    /// Create a new codec
    pub fn new() -> Self {
        Self
    }

    /// Serialize the full event state at its current version
    pub fn encode(&self, event: &CorporateActionEvent) -> Result<String, SnapshotError> {
        serde_json::to_string(event).map_err(|e| SnapshotError::Encode {
            reason: e.to_string(),
        })
    }

    /// Decode a snapshot payload back into a typed event state
    pub fn decode(&self, snapshot: &str) -> Result<CorporateActionEvent, SnapshotError> {
        serde_json::from_str(snapshot).map_err(|e| SnapshotError::Decode {
            reason: e.to_string(),
        })
    }

    /// Decode a snapshot payload into an untyped field→value map.
    ///
    /// The delta engine compares snapshots through this form rather than the
    /// typed one, so a payload written by an older schema still diffs.
    pub fn decode_fields(&self, snapshot: &str) -> Result<Map<String, Value>, SnapshotError> {
        let value: Value = serde_json::from_str(snapshot).map_err(|e| SnapshotError::Decode {
            reason: e.to_string(),
        })?;

        match value {
            Value::Object(fields) => Ok(fields),
            other => Err(SnapshotError::Decode {
                reason: format!("snapshot root must be a JSON object, got {}", other),
            }),
        }
    }
}

impl Default for SnapshotCodec {
    fn default() -> Self {
        Self::new()
    }
}
