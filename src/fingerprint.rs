//! Content fingerprinting using Blake3

use crate::types::{EventDetails, Fingerprint};
use blake3::Hasher as Blake3Hasher;
use chrono::{DateTime, NaiveDate, Utc};

/// Placeholder for an absent non-text field.
///
/// Distinct from the empty string that an absent text field normalizes to,
/// so "no date" can never collide with an empty narrative shifting position.
const NULL_PLACEHOLDER: &str = "null";

const FIELD_SEPARATOR: &[u8] = b"|";

/// Fingerprinter computes the content digest of an event's business fields.
///
/// The digest covers the explicitly enumerated [`EventDetails`] field list in
/// a fixed order; key components and bookkeeping timestamps never participate.
/// Pure and deterministic: equal field values always give equal digests.
#[derive(Debug, Clone)]
pub struct Fingerprinter;

impl Fingerprinter {
    /// Create a new Fingerprinter
    pub fn new() -> Self {
        Self
    }

    /// Compute the fingerprint of a set of business fields.
    ///
    /// Each field is rendered to its canonical text form and fed to Blake3
    /// with a separator, in the fixed order of the `EventDetails` declaration.
    pub fn fingerprint(&self, details: &EventDetails) -> Fingerprint {
        let mut hasher = Blake3Hasher::new();

        let mut feed = |value: &str| {
            hasher.update(value.as_bytes());
            hasher.update(FIELD_SEPARATOR);
        };

        feed(text(&details.related_message_reference));
        feed(text(&details.corporate_action_event_id));
        feed(text(&details.corporate_action_event_type));
        feed(text(&details.mandatory_voluntary_indicator));
        feed(text(&details.event_processing_status));
        feed(text(&details.event_status_code));
        feed(text(&details.official_corporate_action_event_id));
        feed(text(&details.link_event_id));
        feed(text(&details.safekeeping_account));
        feed(text(&details.place_of_safekeeping));
        feed(&datetime(&details.event_creation_datetime));
        feed(&date(&details.effective_date));
        feed(&date(&details.record_date));
        feed(&date(&details.ex_date));
        feed(&date(&details.announcement_date));
        feed(&date(&details.response_deadline));
        feed(&date(&details.general_meeting_date));
        feed(text(&details.narrative));
        feed(&flag(&details.market_disclosure_flag));

        let hash = hasher.finalize();
        Fingerprint(*hash.as_bytes())
    }
}

impl Default for Fingerprinter {
    fn default() -> Self {
        Self::new()
    }
}

// Canonical field renderers. Absent text fields normalize to "", absent
// typed fields to the null placeholder.

fn text(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("")
}

fn datetime(value: &Option<DateTime<Utc>>) -> String {
    match value {
        Some(v) => v.to_rfc3339(),
        None => NULL_PLACEHOLDER.to_string(),
    }
}

fn date(value: &Option<NaiveDate>) -> String {
    match value {
        Some(v) => v.to_string(),
        None => NULL_PLACEHOLDER.to_string(),
    }
}

fn flag(value: &Option<bool>) -> String {
    match value {
        Some(v) => v.to_string(),
        None => NULL_PLACEHOLDER.to_string(),
    }
}
