//! Row identity recovery and schedule signatures.
//!
//! Identity is stored on the calendar object as a tag equal to the row id. Rows
//! that lost their id (new rows, or ids wiped by hand) get it back from a same-day
//! event that looks like theirs, or get a fresh one.

use chrono::SecondsFormat;
use chrono_tz::Tz;
use serde::Serialize;

use crate::calendar::{CalendarEvent, CalendarService, DateRange};
use crate::error::SyncResult;
use crate::normalize::EventRecord;

/// `start|end|days`, instants as UTC ISO-8601 with milliseconds.
///
/// Only start, end and weekdays feed the signature; title, location and guest edits
/// leave it alone.
pub fn signature(record: &EventRecord) -> String {
    format!(
        "{}|{}|{}",
        record.start.to_rfc3339_opts(SecondsFormat::Millis, true),
        record.end.to_rfc3339_opts(SecondsFormat::Millis, true),
        record.days_label
    )
}

/// `<prefix><12 hex chars>`.
pub fn synthesize_id(prefix: &str) -> String {
    let simple = uuid::Uuid::new_v4().simple().to_string();
    format!("{prefix}{}", &simple[..12])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentitySource {
    /// Taken from an existing tagged calendar event.
    Recovered,
    /// Newly generated.
    Synthesized,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: String,
    pub source: IdentitySource,
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Whether `event` plausibly represents `record`: title contains the row name, and
/// when both have a location, one contains the other.
pub fn looks_like(record: &EventRecord, event: &CalendarEvent) -> bool {
    if !contains_ci(&event.title, &record.name) {
        return false;
    }
    if record.location.is_empty() || event.location.is_empty() {
        return true;
    }
    contains_ci(&event.location, &record.location) || contains_ci(&record.location, &event.location)
}

/// Identity donated by the first lookalike carrying an identity tag.
///
/// Two same-day events sharing a name substring both qualify; the first one in
/// `events` wins.
pub fn find_identity(
    record: &EventRecord,
    events: &[CalendarEvent],
    identity_key: &str,
) -> Option<String> {
    events
        .iter()
        .filter(|e| looks_like(record, e))
        .find_map(|e| e.tag(identity_key))
        .map(str::to_string)
}

/// Look for a donor on the record's first day only, else synthesize.
pub fn recover_identity(
    record: &EventRecord,
    calendar: &dyn CalendarService,
    tz: &Tz,
    identity_key: &str,
    id_prefix: &str,
) -> SyncResult<Identity> {
    let window = DateRange::day(record.first_date, tz)?;
    let events = calendar.events_between(&window)?;

    let identity = match find_identity(record, &events, identity_key) {
        Some(id) => Identity {
            id,
            source: IdentitySource::Recovered,
        },
        None => Identity {
            id: synthesize_id(id_prefix),
            source: IdentitySource::Synthesized,
        },
    };
    tracing::debug!(
        row = record.sheet_row + 1,
        row_id = %identity.id,
        source = ?identity.source,
        "assigned identity"
    );
    Ok(identity)
}
