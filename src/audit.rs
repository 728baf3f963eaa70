//! In-memory append-only audit log

use crate::error::StoreError;
use crate::traits::{AuditFailure, AuditStore};
use crate::types::{AuditRecord, EventKey};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::RwLock;

/// BTreeMap-backed [`AuditStore`], keyed by `(key, version)`.
///
/// Create-once: a second append for the same `(key, version)` is rejected as
/// an [`AuditFailure`] without disturbing the records that already exist or
/// the rest of the batch.
#[derive(Debug, Default)]
pub struct InMemoryAuditLog {
    records: RwLock<BTreeMap<(EventKey, u32), AuditRecord>>,
}

impl InMemoryAuditLog {
    /// Create a new empty log
    pub fn new() -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
        }
    }

    /// Total number of audit records
    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All versions recorded for one key, ascending
    pub fn versions(&self, key: &EventKey) -> Vec<u32> {
        self.records
            .read()
            .map(|records| {
                records
                    .keys()
                    .filter(|(k, _)| k == key)
                    .map(|(_, version)| *version)
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn poisoned(_: impl std::fmt::Debug) -> StoreError {
    StoreError::Unavailable {
        reason: "audit log lock poisoned".to_string(),
    }
}

impl AuditStore for InMemoryAuditLog {
    fn append_many(&self, records: Vec<AuditRecord>) -> Result<Vec<AuditFailure>, StoreError> {
        let mut log = self.records.write().map_err(poisoned)?;

        let mut failures = Vec::new();
        for record in records {
            let slot = (record.key.clone(), record.version);
            if log.contains_key(&slot) {
                failures.push(AuditFailure {
                    key: record.key.clone(),
                    version: record.version,
                    reason: "audit record already exists".to_string(),
                });
                continue;
            }
            log.insert(slot, record);
        }

        Ok(failures)
    }

    fn query_updated_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<AuditRecord>, StoreError> {
        let log = self.records.read().map_err(poisoned)?;
        Ok(log
            .values()
            .filter(|record| record.updated_at >= from && record.updated_at < to)
            .cloned()
            .collect())
    }
}
