//! Daily Feed Example
//!
//! This example demonstrates the full ingestion-to-reporting path:
//! - Day 1: a feed batch with two announcements is reconciled (both insert)
//! - Day 2: one announcement changes, one is redelivered unchanged, and a
//!   brand-new one arrives
//! - The delta report over day 2 then shows exactly which fields moved

use chrono::{DateTime, NaiveDate, TimeZone, Utc};

use cadre::{
    DeltaEngine, EventDetails, EventKey, EventRecord, InMemoryAuditLog, InMemoryVersionStore,
    Reconciler, VersionStore,
};
use std::sync::Arc;

fn announcement(
    reference: &str,
    instrument: &str,
    status: &str,
    record_date: Option<NaiveDate>,
    received_at: DateTime<Utc>,
) -> EventRecord {
    EventRecord {
        event_reference: Some(reference.to_string()),
        financial_instrument_id: Some(instrument.to_string()),
        sender_bic: Some("BNPAFRPP".to_string()),
        details: EventDetails {
            corporate_action_event_type: Some("DVCA".to_string()),
            event_processing_status: Some(status.to_string()),
            record_date,
            narrative: Some(format!("Cash dividend for {}", instrument)),
            ..EventDetails::default()
        },
        received_at,
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_target(false).init();

    let store = Arc::new(InMemoryVersionStore::new());
    let audit = Arc::new(InMemoryAuditLog::new());
    let reconciler = Reconciler::new(Arc::clone(&store), Arc::clone(&audit));

    let day1 = Utc.with_ymd_and_hms(2024, 6, 10, 8, 0, 0).unwrap();
    let day2 = Utc.with_ymd_and_hms(2024, 6, 11, 8, 0, 0).unwrap();

    // Day 1: first sight of both announcements.
    let summary = reconciler.process_batch(vec![
        announcement("EVT001", "FR0000120271", "PEND", NaiveDate::from_ymd_opt(2024, 6, 20), day1),
        announcement("EVT002", "DE0005557508", "PEND", NaiveDate::from_ymd_opt(2024, 6, 22), day1),
    ])?;
    println!(
        "day 1: {} inserted, {} updated, {} unchanged",
        summary.inserted, summary.updated, summary.unchanged
    );

    // Day 2: EVT001 moves its record date, EVT002 is redelivered unchanged,
    // EVT003 is new.
    let summary = reconciler.process_batch(vec![
        announcement("EVT001", "FR0000120271", "COMP", NaiveDate::from_ymd_opt(2024, 6, 21), day2),
        announcement("EVT002", "DE0005557508", "PEND", NaiveDate::from_ymd_opt(2024, 6, 22), day2),
        announcement("EVT003", "NL0000235190", "PEND", NaiveDate::from_ymd_opt(2024, 6, 25), day2),
    ])?;
    println!(
        "day 2: {} inserted, {} updated, {} unchanged",
        summary.inserted, summary.updated, summary.unchanged
    );

    let key = EventKey::new("EVT001", "FR0000120271", "BNPAFRPP");
    let current = store.get(&key)?.expect("EVT001 is present");
    println!("EVT001 is now at version {}", current.version);

    // What changed across the two days? Both versions of a pair must fall
    // inside the window for the pair to be compared.
    let engine = DeltaEngine::new(Arc::clone(&audit));
    let deltas = engine.deltas_between(day1, day2 + chrono::Duration::days(1))?;
    for delta in deltas {
        println!(
            "{} v{} -> v{} at {}:",
            delta.key, delta.version_from, delta.version_to, delta.timestamp
        );
        for (field, change) in &delta.changed_fields {
            println!(
                "  {}: {:?} -> {:?}",
                field,
                change.old.as_deref(),
                change.new.as_deref()
            );
        }
    }

    Ok(())
}
