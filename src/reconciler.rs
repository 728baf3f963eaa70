//! Batch reconciliation: insert / update / no-op decisions and the bulk write

use crate::error::{ReconcileError, StoreError};
use crate::fingerprint::Fingerprinter;
use crate::snapshot::SnapshotCodec;
use crate::traits::{AuditFailure, AuditStore, VersionStore};
use crate::types::{AuditRecord, CorporateActionEvent, EventKey, EventRecord, Fingerprint};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, error, warn};

/// Default bound on optimistic-concurrency retries per batch
pub const DEFAULT_MAX_CONFLICT_RETRIES: u32 = 3;

/// Outcome counts for one processed batch.
///
/// `audit_failures` lists the records whose snapshot could not be built or
/// appended; the entity-state writes behind them are still durable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub malformed: usize,
    pub duplicates: usize,
    pub conflict_retries: u32,
    pub audit_failures: Vec<AuditFailure>,
}

impl BatchSummary {
    /// Number of entity states actually written
    pub fn written(&self) -> usize {
        self.inserted + self.updated
    }
}

/// Reconciler consumes batches of incoming records and upserts the changed
/// ones.
///
/// Per record the decision is: no current state → insert at version 1;
/// fingerprint unchanged → no-op; fingerprint differs → update at
/// version + 1. Writes go through the version store's conflict-checked bulk
/// upsert; a concurrent writer advancing the same key surfaces as a conflict
/// and the whole batch is re-decided against refreshed state, at most
/// `max_conflict_retries` times.
#[derive(Debug)]
pub struct Reconciler<S, A> {
    store: S,
    audit: A,
    fingerprinter: Fingerprinter,
    codec: SnapshotCodec,
    max_conflict_retries: u32,
}

impl<S, A> Reconciler<S, A>
where
    S: VersionStore,
    A: AuditStore,
{
    /// Create a reconciler with the default retry bound
    pub fn new(store: S, audit: A) -> Self {
        Self {
            store,
            audit,
            fingerprinter: Fingerprinter::new(),
            codec: SnapshotCodec::new(),
            max_conflict_retries: DEFAULT_MAX_CONFLICT_RETRIES,
        }
    }

    /// Create a builder for constructing a reconciler
    pub fn builder() -> ReconcilerBuilder<S, A> {
        ReconcilerBuilder::new()
    }

    /// Process one batch of incoming records.
    ///
    /// Malformed records are skipped and counted. Duplicate keys within the
    /// batch collapse to the last occurrence in batch order. Reprocessing an
    /// identical batch is a guaranteed all-no-op, which is what makes
    /// at-least-once redelivery safe.
    ///
    /// # Errors
    ///
    /// Store fetch/write failures and exhausted conflict retries are
    /// batch-fatal; no entity state from this batch is applied in that case.
    pub fn process_batch(&self, records: Vec<EventRecord>) -> Result<BatchSummary, ReconcileError> {
        let mut summary = BatchSummary::default();

        // Malformed records cannot name an evolution line; skip and count.
        let mut keyed: Vec<(EventKey, EventRecord)> = Vec::with_capacity(records.len());
        for record in records {
            match record.key() {
                Ok(key) => keyed.push((key, record)),
                Err(e) => {
                    warn!(error = %e, "skipping malformed record");
                    summary.malformed += 1;
                }
            }
        }

        // Duplicate keys within one batch: last occurrence wins.
        let total = keyed.len();
        let mut deduped: HashMap<EventKey, EventRecord> = HashMap::with_capacity(total);
        for (key, record) in keyed {
            deduped.insert(key, record);
        }
        summary.duplicates = total - deduped.len();

        // Fingerprinting is per-record and side-effect free, so it fans out.
        let incoming: Vec<(EventKey, EventRecord, Fingerprint)> = deduped
            .into_par_iter()
            .map(|(key, record)| {
                let fingerprint = self.fingerprinter.fingerprint(&record.details);
                (key, record, fingerprint)
            })
            .collect();

        if incoming.is_empty() {
            return Ok(summary);
        }

        let written = self.decide_and_write(&incoming, &mut summary)?;
        self.append_audits(&written, &mut summary);

        Ok(summary)
    }

    /// Fetch current state, partition the batch, and perform the bulk write.
    ///
    /// The loop re-decides the entire batch after a conflict: the losing
    /// record may have become a plain update or even a no-op against the
    /// winner's state. Counts are committed only from the round that lands.
    fn decide_and_write(
        &self,
        incoming: &[(EventKey, EventRecord, Fingerprint)],
        summary: &mut BatchSummary,
    ) -> Result<Vec<CorporateActionEvent>, ReconcileError> {
        let keys: Vec<EventKey> = incoming.iter().map(|(key, _, _)| key.clone()).collect();
        let mut retries = 0;

        loop {
            let existing = self.store.get_many(&keys)?;

            let mut to_write = Vec::new();
            let mut inserted = 0usize;
            let mut updated = 0usize;
            let mut unchanged = 0usize;

            for (key, record, fingerprint) in incoming {
                match existing.get(key) {
                    None => {
                        inserted += 1;
                        to_write.push(CorporateActionEvent {
                            key: key.clone(),
                            version: 1,
                            fingerprint: *fingerprint,
                            details: record.details.clone(),
                            created_at: record.received_at,
                            updated_at: record.received_at,
                        });
                    }
                    Some(current) if current.fingerprint == *fingerprint => {
                        unchanged += 1;
                    }
                    Some(current) => {
                        updated += 1;
                        let mut next = current.clone();
                        next.details = record.details.clone();
                        next.fingerprint = *fingerprint;
                        next.version = current.version + 1;
                        next.updated_at = record.received_at;
                        to_write.push(next);
                    }
                }
            }

            if to_write.is_empty() {
                summary.unchanged = unchanged;
                summary.conflict_retries = retries;
                return Ok(Vec::new());
            }

            match self.store.upsert_many(to_write) {
                Ok(written) => {
                    summary.inserted = inserted;
                    summary.updated = updated;
                    summary.unchanged = unchanged;
                    summary.conflict_retries = retries;
                    return Ok(written);
                }
                Err(StoreError::Conflict {
                    key,
                    attempted,
                    current,
                }) => {
                    if retries >= self.max_conflict_retries {
                        return Err(ReconcileError::ConflictRetriesExhausted { key, retries });
                    }
                    retries += 1;
                    debug!(
                        %key,
                        attempted,
                        ?current,
                        retry = retries,
                        "write conflict, re-deciding against refreshed state"
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Build and append one audit record per written state.
    ///
    /// Failures here are per-record and never unwind the entity write: a
    /// snapshot that fails to serialize is skipped, a rejected or failed
    /// append is reported through the summary, and the remaining records
    /// still land.
    fn append_audits(&self, written: &[CorporateActionEvent], summary: &mut BatchSummary) {
        if written.is_empty() {
            return;
        }

        let mut audit_records = Vec::with_capacity(written.len());
        for event in written {
            match self.codec.encode(event) {
                Ok(snapshot) => audit_records.push(AuditRecord {
                    key: event.key.clone(),
                    version: event.version,
                    fingerprint: event.fingerprint,
                    updated_at: event.updated_at,
                    snapshot,
                }),
                Err(e) => {
                    error!(
                        key = %event.key,
                        version = event.version,
                        error = %e,
                        "snapshot serialization failed, audit entry skipped"
                    );
                    summary.audit_failures.push(AuditFailure {
                        key: event.key.clone(),
                        version: event.version,
                        reason: e.to_string(),
                    });
                }
            }
        }

        if audit_records.is_empty() {
            return;
        }

        let attempted: Vec<(EventKey, u32)> = audit_records
            .iter()
            .map(|record| (record.key.clone(), record.version))
            .collect();

        match self.audit.append_many(audit_records) {
            Ok(failures) => {
                for failure in &failures {
                    error!(
                        key = %failure.key,
                        version = failure.version,
                        reason = %failure.reason,
                        "audit append rejected"
                    );
                }
                summary.audit_failures.extend(failures);
            }
            Err(e) => {
                // The entity write is already durable; an audit outage must
                // not unwind it.
                error!(error = %e, "audit append failed for the whole batch");
                for (key, version) in attempted {
                    summary.audit_failures.push(AuditFailure {
                        key,
                        version,
                        reason: e.to_string(),
                    });
                }
            }
        }
    }

    /// Get access to the underlying version store
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Get access to the underlying audit log
    pub fn audit_log(&self) -> &A {
        &self.audit
    }

    /// Configured retry bound
    pub fn max_conflict_retries(&self) -> u32 {
        self.max_conflict_retries
    }
}

/// Builder for constructing reconcilers with a fluent API
pub struct ReconcilerBuilder<S, A> {
    store: Option<S>,
    audit: Option<A>,
    max_conflict_retries: u32,
}

impl<S, A> ReconcilerBuilder<S, A>
where
    S: VersionStore,
    A: AuditStore,
{
    /// Create a new builder
    pub fn new() -> Self {
        Self {
            store: None,
            audit: None,
            max_conflict_retries: DEFAULT_MAX_CONFLICT_RETRIES,
        }
    }

    /// Set the version store
    pub fn with_store(mut self, store: S) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the audit log
    pub fn with_audit_log(mut self, audit: A) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Bound the number of optimistic-concurrency retries per batch
    pub fn with_max_conflict_retries(mut self, retries: u32) -> Self {
        self.max_conflict_retries = retries;
        self
    }

    /// Build the reconciler
    pub fn build(self) -> Result<Reconciler<S, A>, String> {
        let store = self.store.ok_or("version store is required")?;
        let audit = self.audit.ok_or("audit log is required")?;

        Ok(Reconciler {
            store,
            audit,
            fingerprinter: Fingerprinter::new(),
            codec: SnapshotCodec::new(),
            max_conflict_retries: self.max_conflict_retries,
        })
    }
}

impl<S, A> Default for ReconcilerBuilder<S, A>
where
    S: VersionStore,
    A: AuditStore,
{
    fn default() -> Self {
        Self::new()
    }
}
