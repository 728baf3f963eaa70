//! Storage contracts for the engine's external collaborators

use crate::error::StoreError;
use crate::types::{AuditRecord, CorporateActionEvent, EventKey};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Store holding the single current state per [`EventKey`].
///
/// `upsert_many` is the engine's one shared-mutation point and carries the
/// optimistic-concurrency guard: a write whose expected predecessor version
/// no longer matches fails with [`StoreError::Conflict`], all-or-nothing, so
/// a conflicted batch write applies none of its states.
pub trait VersionStore: Send + Sync {
    /// Bulk-fetch current states for exactly the given keys; keys with no
    /// current state are simply absent from the result.
    fn get_many(
        &self,
        keys: &[EventKey],
    ) -> Result<HashMap<EventKey, CorporateActionEvent>, StoreError>;

    /// Persist a batch of inserts (version 1, key must be absent) and
    /// updates (key must currently hold version - 1), atomically.
    fn upsert_many(
        &self,
        states: Vec<CorporateActionEvent>,
    ) -> Result<Vec<CorporateActionEvent>, StoreError>;

    /// Current-state lookup for a single key
    fn get(&self, key: &EventKey) -> Result<Option<CorporateActionEvent>, StoreError> {
        Ok(self.get_many(std::slice::from_ref(key))?.remove(key))
    }
}

/// One audit record the store could not accept
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditFailure {
    pub key: EventKey,
    pub version: u32,
    pub reason: String,
}

/// Append-only store of immutable version snapshots.
///
/// No update or delete operation is ever exposed. Appends are best-effort
/// per record: a rejected record (duplicate `(key, version)`) comes back as
/// an [`AuditFailure`] while the rest of the batch lands; only a transport
/// outage fails the call as a whole.
pub trait AuditStore: Send + Sync {
    fn append_many(&self, records: Vec<AuditRecord>) -> Result<Vec<AuditFailure>, StoreError>;

    /// All records with `from <= updated_at < to`, in no particular order
    fn query_updated_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<AuditRecord>, StoreError>;
}

// Shared handles: concurrent batch workers hold the same store behind an Arc.

impl<T: VersionStore + ?Sized> VersionStore for Arc<T> {
    fn get_many(
        &self,
        keys: &[EventKey],
    ) -> Result<HashMap<EventKey, CorporateActionEvent>, StoreError> {
        (**self).get_many(keys)
    }

    fn upsert_many(
        &self,
        states: Vec<CorporateActionEvent>,
    ) -> Result<Vec<CorporateActionEvent>, StoreError> {
        (**self).upsert_many(states)
    }

    fn get(&self, key: &EventKey) -> Result<Option<CorporateActionEvent>, StoreError> {
        (**self).get(key)
    }
}

impl<T: AuditStore + ?Sized> AuditStore for Arc<T> {
    fn append_many(&self, records: Vec<AuditRecord>) -> Result<Vec<AuditFailure>, StoreError> {
        (**self).append_many(records)
    }

    fn query_updated_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<AuditRecord>, StoreError> {
        (**self).query_updated_between(from, to)
    }
}
