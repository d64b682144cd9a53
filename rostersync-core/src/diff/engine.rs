//! Reconciliation of normalized rows against calendar state.
//!
//! Pure: takes what was read, returns proposals, writes nothing.

use std::collections::HashMap;

use crate::calendar::CalendarEvent;
use crate::config::TagKeys;
use crate::diff::{DiffField, FieldDiff, MatchedEvent, Payload, SyncProposal, SyncStatus};
use crate::guests::merge_guests;
use crate::identity::signature;
use crate::normalize::EventRecord;
use crate::staff::StaffDirectory;

/// Earliest event in `events` carrying each identity.
pub fn index_by_identity<'a>(
    events: &'a [CalendarEvent],
    identity_key: &str,
) -> HashMap<&'a str, &'a CalendarEvent> {
    let mut index: HashMap<&str, &CalendarEvent> = HashMap::new();
    for event in events {
        let Some(id) = event.tag(identity_key) else {
            continue;
        };
        index
            .entry(id)
            .and_modify(|current| {
                if event.start < current.start {
                    *current = event;
                }
            })
            .or_insert(event);
    }
    index
}

/// One proposal per identified record, in record order.
pub fn reconcile(
    records: &[EventRecord],
    events: &[CalendarEvent],
    directory: &StaffDirectory,
    tags: &TagKeys,
) -> Vec<SyncProposal> {
    let index = index_by_identity(events, &tags.identity);

    records
        .iter()
        .filter_map(|record| {
            let Some(row_id) = record.row_id.as_deref() else {
                let row = record.sheet_row + 1;
                tracing::warn!(row, "record has no identity; not reconciled");
                return None;
            };
            Some(propose(row_id, record, index.get(row_id).copied(), directory, tags))
        })
        .collect()
}

fn propose(
    row_id: &str,
    record: &EventRecord,
    matched: Option<&CalendarEvent>,
    directory: &StaffDirectory,
    tags: &TagKeys,
) -> SyncProposal {
    let signature = signature(record);
    let mut proposal = SyncProposal {
        row_id: row_id.to_string(),
        sheet_row: record.sheet_row,
        status: SyncStatus::New,
        diffs: Vec::new(),
        matched: None,
        signature,
        stored_signature: None,
        payload: Payload::from_record(record),
    };

    let Some(event) = matched else {
        tracing::debug!(row_id, "no calendar match");
        return proposal;
    };

    proposal.status = SyncStatus::Synced;
    proposal.stored_signature = event.tag(&tags.signature).map(str::to_string);
    proposal.matched = Some(MatchedEvent {
        event_id: event.id.clone(),
        target: event.target(),
        recurring: event.is_recurring(),
        title: event.title.clone(),
        location: event.location.clone(),
        description: event.description.clone(),
        guests: event.guests.clone(),
    });

    let schedule_changed =
        proposal.stored_signature.as_deref() != Some(proposal.signature.as_str());

    let mut change = |field: DiffField, description: String, forces_update: bool| {
        if forces_update {
            proposal.status = SyncStatus::Update;
        }
        proposal.diffs.push(FieldDiff { field, description });
    };

    if event.title != record.title {
        change(
            DiffField::Title,
            format!("title: '{}' -> '{}'", event.title, record.title),
            true,
        );
    }
    if event.location != record.location {
        change(
            DiffField::Location,
            format!("location: '{}' -> '{}'", event.location, record.location),
            true,
        );
    }
    if event.description != record.description {
        change(DiffField::Description, "description changed".to_string(), true);
    }
    if schedule_changed {
        change(DiffField::Schedule, "schedule changed".to_string(), true);
    }

    let merge = merge_guests(&record.guests, &event.guests, directory);
    for address in &merge.to_add {
        change(DiffField::AddGuest, format!("add guest: {address}"), true);
    }
    for address in &merge.to_remove {
        change(DiffField::RemoveGuest, format!("remove guest: {address}"), false);
    }

    tracing::debug!(
        row_id,
        status = ?proposal.status,
        diffs = proposal.diffs.len(),
        "reconciled row"
    );
    proposal
}
