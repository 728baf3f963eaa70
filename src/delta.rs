//! Field-level delta computation over the audit log

use crate::error::{DeltaError, SnapshotError};
use crate::snapshot::SnapshotCodec;
use crate::traits::AuditStore;
use crate::types::{AuditRecord, EventKey};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use tracing::warn;

/// Snapshot fields owned by the engine rather than the business payload.
///
/// These change on every accepted write by construction, so comparing them
/// would drown the business-field changes the report exists for.
const BOOKKEEPING_FIELDS: &[&str] = &[
    "event_reference",
    "financial_instrument_id",
    "sender_bic",
    "version",
    "fingerprint",
    "created_at",
    "updated_at",
];

/// Old and new rendering of one changed field; `None` is a JSON null
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldChange {
    pub old: Option<String>,
    pub new: Option<String>,
}

/// Field-level difference between two adjacent versions of one event.
///
/// Derived on demand from audit snapshots, never persisted. `timestamp` is
/// the `updated_at` of the newer version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventDelta {
    pub key: EventKey,
    pub version_from: u32,
    pub version_to: u32,
    pub changed_fields: BTreeMap<String, FieldChange>,
    pub timestamp: DateTime<Utc>,
}

/// A key whose delta computation was abandoned
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedDelta {
    pub key: EventKey,
    pub reason: String,
}

/// Deltas plus the keys whose history could not be decoded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeltaReport {
    pub deltas: Vec<EventDelta>,
    pub failures: Vec<FailedDelta>,
}

/// Delta engine computes field-level differences between consecutive
/// versions recorded in the audit log.
///
/// Independent of the ingestion path: it only reads audit snapshots.
#[derive(Debug)]
pub struct DeltaEngine<A> {
    audit: A,
    codec: SnapshotCodec,
}

impl<A: AuditStore> DeltaEngine<A> {
    /// Create a delta engine over an audit store
    pub fn new(audit: A) -> Self {
        Self {
            audit,
            codec: SnapshotCodec::new(),
        }
    }

    /// All field-level deltas whose newer version landed in `[from, to)`.
    ///
    /// Keys with an undecodable snapshot are dropped from the result after a
    /// warning; use [`deltas_between_report`](Self::deltas_between_report)
    /// when the caller needs to see them.
    pub fn deltas_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<EventDelta>, DeltaError> {
        let report = self.deltas_between_report(from, to)?;
        for failure in &report.failures {
            warn!(
                key = %failure.key,
                reason = %failure.reason,
                "dropping deltas for undecodable history"
            );
        }
        Ok(report.deltas)
    }

    /// Like [`deltas_between`](Self::deltas_between), but per-key decode
    /// failures are returned alongside the deltas instead of being dropped.
    ///
    /// A decode failure abandons only that key's group; every other group in
    /// the window still computes. Output is sorted by `(key, version_from)`.
    pub fn deltas_between_report(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<DeltaReport, DeltaError> {
        let audits = self.audit.query_updated_between(from, to)?;

        let mut groups: HashMap<EventKey, Vec<AuditRecord>> = HashMap::new();
        for record in audits {
            groups.entry(record.key.clone()).or_default().push(record);
        }

        let mut deltas = Vec::new();
        let mut failures = Vec::new();
        for (key, mut versions) in groups {
            versions.sort_by_key(|record| record.version);
            match self.group_deltas(&versions) {
                Ok(group_deltas) => deltas.extend(group_deltas),
                Err(source) => failures.push(FailedDelta {
                    key,
                    reason: source.to_string(),
                }),
            }
        }

        deltas.sort_by(|a, b| {
            a.key
                .cmp(&b.key)
                .then(a.version_from.cmp(&b.version_from))
        });

        Ok(DeltaReport { deltas, failures })
    }

    fn group_deltas(&self, versions: &[AuditRecord]) -> Result<Vec<EventDelta>, SnapshotError> {
        let mut out = Vec::new();
        for pair in versions.windows(2) {
            if let Some(delta) = self.pair_delta(&pair[0], &pair[1])? {
                out.push(delta);
            }
        }
        Ok(out)
    }

    /// Diff one adjacent version pair, or `None` when no business field
    /// differs (empty diffs are suppressed).
    fn pair_delta(
        &self,
        older: &AuditRecord,
        newer: &AuditRecord,
    ) -> Result<Option<EventDelta>, SnapshotError> {
        let older_fields = self.codec.decode_fields(&older.snapshot)?;
        let newer_fields = self.codec.decode_fields(&newer.snapshot)?;

        let mut changed = BTreeMap::new();
        // Only the older snapshot's field names are walked: a field that
        // first appears in the newer version is not reported.
        for (field, old_value) in &older_fields {
            if BOOKKEEPING_FIELDS.contains(&field.as_str()) {
                continue;
            }
            // Absent from the newer snapshot is not the same as null there.
            let Some(new_value) = newer_fields.get(field) else {
                continue;
            };
            if new_value != old_value {
                changed.insert(
                    field.clone(),
                    FieldChange {
                        old: render(old_value),
                        new: render(new_value),
                    },
                );
            }
        }

        if changed.is_empty() {
            return Ok(None);
        }

        Ok(Some(EventDelta {
            key: older.key.clone(),
            version_from: older.version,
            version_to: newer.version,
            changed_fields: changed,
            timestamp: newer.updated_at,
        }))
    }
}

/// Canonical text rendering of a JSON value; null maps to `None`
fn render(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::InMemoryAuditLog;
    use crate::types::Fingerprint;
    use chrono::TimeZone;

    fn audit(key: &EventKey, version: u32, at: DateTime<Utc>, snapshot: &str) -> AuditRecord {
        AuditRecord {
            key: key.clone(),
            version,
            fingerprint: Fingerprint([version as u8; 32]),
            updated_at: at,
            snapshot: snapshot.to_string(),
        }
    }

    #[test]
    fn renders_null_as_none_and_scalars_as_text() {
        assert_eq!(render(&Value::Null), None);
        assert_eq!(render(&serde_json::json!("COMP")), Some("COMP".to_string()));
        assert_eq!(render(&serde_json::json!(3)), Some("3".to_string()));
        assert_eq!(render(&serde_json::json!(true)), Some("true".to_string()));
    }

    #[test]
    fn bookkeeping_fields_are_never_reported() {
        let log = InMemoryAuditLog::new();
        let key = EventKey::new("EVT001", "ISIN123", "BICAAAAA");
        let t1 = Utc.with_ymd_and_hms(2024, 6, 10, 9, 0, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2024, 6, 10, 10, 0, 0).unwrap();

        // Identical business content, different bookkeeping.
        log.append_many(vec![
            audit(&key, 1, t1, r#"{"version":1,"fingerprint":"aa","narrative":"x"}"#),
            audit(&key, 2, t2, r#"{"version":2,"fingerprint":"bb","narrative":"x"}"#),
        ])
        .unwrap();

        let engine = DeltaEngine::new(log);
        let deltas = engine
            .deltas_between(t1, t2 + chrono::Duration::hours(1))
            .unwrap();
        assert!(deltas.is_empty());
    }
}
