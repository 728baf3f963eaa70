use cadre::{
    AuditRecord, AuditStore, CorporateActionEvent, EventDetails, EventKey, EventRecord,
    Fingerprint, InMemoryAuditLog, InMemoryVersionStore, Reconciler, ReconcileError, StoreError,
    VersionStore,
};
use chrono::{TimeZone, Utc};
use std::collections::HashMap;

// Test fixtures

fn record(reference: &str, instrument: &str, status: &str) -> EventRecord {
    EventRecord {
        event_reference: Some(reference.to_string()),
        financial_instrument_id: Some(instrument.to_string()),
        sender_bic: Some("BNPAFRPP".to_string()),
        details: EventDetails {
            corporate_action_event_type: Some("DVCA".to_string()),
            event_processing_status: Some(status.to_string()),
            narrative: Some("Cash dividend".to_string()),
            ..EventDetails::default()
        },
        received_at: Utc.with_ymd_and_hms(2024, 6, 10, 8, 0, 0).unwrap(),
    }
}

fn key(reference: &str, instrument: &str) -> EventKey {
    EventKey::new(reference, instrument, "BNPAFRPP")
}

/// Version store that is permanently down
struct UnavailableStore;

impl VersionStore for UnavailableStore {
    fn get_many(
        &self,
        _keys: &[EventKey],
    ) -> Result<HashMap<EventKey, CorporateActionEvent>, StoreError> {
        Err(StoreError::Unavailable {
            reason: "connection refused".to_string(),
        })
    }

    fn upsert_many(
        &self,
        _states: Vec<CorporateActionEvent>,
    ) -> Result<Vec<CorporateActionEvent>, StoreError> {
        Err(StoreError::Unavailable {
            reason: "connection refused".to_string(),
        })
    }
}

/// Version store whose writes always lose the optimistic-concurrency race
struct AlwaysConflictingStore;

impl VersionStore for AlwaysConflictingStore {
    fn get_many(
        &self,
        _keys: &[EventKey],
    ) -> Result<HashMap<EventKey, CorporateActionEvent>, StoreError> {
        Ok(HashMap::new())
    }

    fn upsert_many(
        &self,
        states: Vec<CorporateActionEvent>,
    ) -> Result<Vec<CorporateActionEvent>, StoreError> {
        let state = &states[0];
        Err(StoreError::Conflict {
            key: state.key.clone(),
            attempted: state.version,
            current: Some(state.version),
        })
    }
}

#[test]
fn batch_partitions_into_insert_update_and_no_op() {
    let reconciler = Reconciler::new(InMemoryVersionStore::new(), InMemoryAuditLog::new());

    // Seed two known events.
    reconciler
        .process_batch(vec![
            record("EVT001", "ISIN001", "PEND"),
            record("EVT002", "ISIN002", "PEND"),
        ])
        .unwrap();

    // One brand-new, one unchanged, one changed.
    let summary = reconciler
        .process_batch(vec![
            record("EVT003", "ISIN003", "PEND"),
            record("EVT001", "ISIN001", "PEND"),
            record("EVT002", "ISIN002", "COMP"),
        ])
        .unwrap();

    assert_eq!(summary.inserted, 1);
    assert_eq!(summary.unchanged, 1);
    assert_eq!(summary.updated, 1);
    assert!(summary.audit_failures.is_empty());

    let store = reconciler.store();
    assert_eq!(store.get(&key("EVT003", "ISIN003")).unwrap().unwrap().version, 1);
    assert_eq!(store.get(&key("EVT001", "ISIN001")).unwrap().unwrap().version, 1);
    assert_eq!(store.get(&key("EVT002", "ISIN002")).unwrap().unwrap().version, 2);

    // Audit entries exist only for the two written records of this batch.
    let audit = reconciler.audit_log();
    assert_eq!(audit.versions(&key("EVT003", "ISIN003")), vec![1]);
    assert_eq!(audit.versions(&key("EVT001", "ISIN001")), vec![1]);
    assert_eq!(audit.versions(&key("EVT002", "ISIN002")), vec![1, 2]);
}

#[test]
fn reprocessing_an_identical_batch_is_idempotent() {
    let reconciler = Reconciler::new(InMemoryVersionStore::new(), InMemoryAuditLog::new());
    let batch = vec![
        record("EVT001", "ISIN001", "PEND"),
        record("EVT002", "ISIN002", "COMP"),
    ];

    let first = reconciler.process_batch(batch.clone()).unwrap();
    assert_eq!(first.inserted, 2);
    let audit_len_after_first = reconciler.audit_log().len();

    let second = reconciler.process_batch(batch).unwrap();
    assert_eq!(second.written(), 0);
    assert_eq!(second.unchanged, 2);
    assert_eq!(reconciler.audit_log().len(), audit_len_after_first);
    assert_eq!(
        reconciler.store().get(&key("EVT001", "ISIN001")).unwrap().unwrap().version,
        1
    );
}

#[test]
fn versions_stay_gapless_across_interleaved_no_op_batches() {
    let reconciler = Reconciler::new(InMemoryVersionStore::new(), InMemoryAuditLog::new());

    for (round, status) in ["PEND", "PEND", "INTV", "INTV", "COMP"].iter().enumerate() {
        let summary = reconciler
            .process_batch(vec![record("EVT001", "ISIN001", status)])
            .unwrap();
        // Odd rounds repeat the previous content and must not write.
        if round % 2 == 1 {
            assert_eq!(summary.written(), 0);
        }
    }

    assert_eq!(
        reconciler.audit_log().versions(&key("EVT001", "ISIN001")),
        vec![1, 2, 3]
    );
}

#[test]
fn last_duplicate_in_batch_order_wins() {
    let reconciler = Reconciler::new(InMemoryVersionStore::new(), InMemoryAuditLog::new());

    let summary = reconciler
        .process_batch(vec![
            record("EVT001", "ISIN001", "PEND"),
            record("EVT001", "ISIN001", "COMP"),
        ])
        .unwrap();

    assert_eq!(summary.duplicates, 1);
    assert_eq!(summary.inserted, 1);

    let state = reconciler.store().get(&key("EVT001", "ISIN001")).unwrap().unwrap();
    assert_eq!(state.version, 1);
    assert_eq!(state.details.event_processing_status.as_deref(), Some("COMP"));
}

#[test]
fn malformed_records_are_skipped_not_fatal() {
    let reconciler = Reconciler::new(InMemoryVersionStore::new(), InMemoryAuditLog::new());

    let mut broken = record("EVT002", "ISIN002", "PEND");
    broken.sender_bic = None;

    let summary = reconciler
        .process_batch(vec![record("EVT001", "ISIN001", "PEND"), broken])
        .unwrap();

    assert_eq!(summary.malformed, 1);
    assert_eq!(summary.inserted, 1);
    assert!(reconciler.store().get(&key("EVT001", "ISIN001")).unwrap().is_some());
}

#[test]
fn store_outage_is_batch_fatal() {
    let reconciler = Reconciler::new(UnavailableStore, InMemoryAuditLog::new());

    let err = reconciler
        .process_batch(vec![record("EVT001", "ISIN001", "PEND")])
        .unwrap_err();

    assert!(matches!(
        err,
        ReconcileError::Store(StoreError::Unavailable { .. })
    ));
    // Nothing reached the audit log.
    assert_eq!(reconciler.audit_log().len(), 0);
}

#[test]
fn exhausted_conflict_retries_fail_the_batch() {
    let reconciler = Reconciler::builder()
        .with_store(AlwaysConflictingStore)
        .with_audit_log(InMemoryAuditLog::new())
        .with_max_conflict_retries(2)
        .build()
        .unwrap();

    let err = reconciler
        .process_batch(vec![record("EVT001", "ISIN001", "PEND")])
        .unwrap_err();

    assert!(matches!(
        err,
        ReconcileError::ConflictRetriesExhausted { retries: 2, .. }
    ));
}

#[test]
fn audit_rejection_is_isolated_and_leaves_entity_writes_intact() {
    let store = InMemoryVersionStore::new();
    let audit = InMemoryAuditLog::new();

    // Occupy the (key, 1) audit slot so the upcoming insert's append is
    // rejected by the create-once rule.
    audit
        .append_many(vec![AuditRecord {
            key: key("EVT001", "ISIN001"),
            version: 1,
            fingerprint: Fingerprint([0u8; 32]),
            updated_at: Utc.with_ymd_and_hms(2024, 6, 9, 0, 0, 0).unwrap(),
            snapshot: "{}".to_string(),
        }])
        .unwrap();

    let reconciler = Reconciler::new(store, audit);
    let summary = reconciler
        .process_batch(vec![
            record("EVT001", "ISIN001", "PEND"),
            record("EVT002", "ISIN002", "PEND"),
        ])
        .unwrap();

    // Both entity states are durable despite the audit rejection.
    assert_eq!(summary.inserted, 2);
    assert!(reconciler.store().get(&key("EVT001", "ISIN001")).unwrap().is_some());
    assert!(reconciler.store().get(&key("EVT002", "ISIN002")).unwrap().is_some());

    // Exactly one audit failure, and the sibling record still landed.
    assert_eq!(summary.audit_failures.len(), 1);
    assert_eq!(summary.audit_failures[0].key, key("EVT001", "ISIN001"));
    assert_eq!(reconciler.audit_log().versions(&key("EVT002", "ISIN002")), vec![1]);
}
