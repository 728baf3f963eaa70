//! Error types for the engine

use crate::types::EventKey;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CadreError {
    #[error("Reconcile error: {0}")]
    Reconcile(#[from] ReconcileError),

    #[error("Delta error: {0}")]
    Delta(#[from] DeltaError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),
}

/// Failures raised by a version store or audit store.
///
/// A `Conflict` is the optimistic-concurrency guard firing and is retryable;
/// `Unavailable` is a transport or storage outage and is batch-fatal.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("write conflict on {key}: attempted version {attempted}, current version {current:?}")]
    Conflict {
        key: EventKey,
        attempted: u32,
        current: Option<u32>,
    },

    #[error("store unavailable: {reason}")]
    Unavailable { reason: String },
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot encoding failed: {reason}")]
    Encode { reason: String },

    #[error("snapshot decoding failed: {reason}")]
    Decode { reason: String },
}

/// Batch-fatal reconciliation failures.
///
/// Per-record problems (malformed input, audit serialization) never surface
/// here; they are reported through the batch summary instead.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("conflict retries exhausted for {key} after {retries} attempts")]
    ConflictRetriesExhausted { key: EventKey, retries: u32 },
}

#[derive(Debug, Error)]
pub enum DeltaError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("snapshot decode failed for {key}")]
    Snapshot {
        key: EventKey,
        #[source]
        source: SnapshotError,
    },
}

/// An incoming record that does not name a complete [`EventKey`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("record is missing identity components: {missing:?}")]
pub struct MalformedRecord {
    pub missing: Vec<&'static str>,
}
