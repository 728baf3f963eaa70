//! Corporate-Action Delta & Reconciliation Engine (CADRE)
//!
//! A library for change detection, versioning, and field-level audit deltas
//! over recurring batches of corporate-action event records.

pub mod audit;
pub mod delta;
pub mod error;
pub mod fingerprint;
pub mod reconciler;
pub mod snapshot;
pub mod store;
pub mod traits;
pub mod types;

// Re-export core types and traits
pub use audit::InMemoryAuditLog;
pub use delta::{DeltaEngine, DeltaReport, EventDelta, FailedDelta, FieldChange};
pub use error::{
    CadreError, DeltaError, MalformedRecord, ReconcileError, SnapshotError, StoreError,
};
pub use fingerprint::Fingerprinter;
pub use reconciler::{BatchSummary, Reconciler, ReconcilerBuilder, DEFAULT_MAX_CONFLICT_RETRIES};
pub use snapshot::SnapshotCodec;
pub use store::InMemoryVersionStore;
pub use traits::{AuditFailure, AuditStore, VersionStore};
pub use types::{
    AuditRecord, CorporateActionEvent, EventDetails, EventKey, EventRecord, Fingerprint,
};
