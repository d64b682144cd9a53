use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::calendar::{NewEvent, Target};
use crate::diff::SyncStatus;
use crate::error::SyncError;
use crate::normalize::{EventRecord, WeeklyRule};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffField {
    Title,
    Location,
    Description,
    Schedule,
    AddGuest,
    RemoveGuest,
}

impl fmt::Display for DiffField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DiffField::Title => "title",
            DiffField::Location => "location",
            DiffField::Description => "description",
            DiffField::Schedule => "schedule",
            DiffField::AddGuest => "add_guest",
            DiffField::RemoveGuest => "remove_guest",
        };
        f.write_str(name)
    }
}

impl FromStr for DiffField {
    type Err = SyncError;

    /// Accepts field names, plus `guests` for both guest directions.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "title" => Ok(DiffField::Title),
            "location" => Ok(DiffField::Location),
            "description" => Ok(DiffField::Description),
            "schedule" | "time" => Ok(DiffField::Schedule),
            "guests" | "add_guest" => Ok(DiffField::AddGuest),
            "remove_guest" => Ok(DiffField::RemoveGuest),
            other => Err(SyncError::Config(format!("Unknown field '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDiff {
    pub field: DiffField,
    pub description: String,
}

impl fmt::Display for FieldDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description)
    }
}

/// A payload value, or the sentinel telling commit to leave that field alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum FieldValue<T> {
    Set(T),
    Skip,
}

impl<T> FieldValue<T> {
    pub fn value(&self) -> Option<&T> {
        match self {
            FieldValue::Set(v) => Some(v),
            FieldValue::Skip => None,
        }
    }

    pub fn is_skip(&self) -> bool {
        matches!(self, FieldValue::Skip)
    }
}

/// When the row happens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Local date of the first occurrence.
    pub first_date: NaiveDate,
    pub recurrence: Option<WeeklyRule>,
}

/// Target state for a row, field by field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    pub title: FieldValue<String>,
    pub location: FieldValue<String>,
    pub description: FieldValue<String>,
    pub schedule: FieldValue<Schedule>,
    pub guests: FieldValue<BTreeSet<String>>,
}

impl Payload {
    pub fn from_record(record: &EventRecord) -> Self {
        Payload {
            title: FieldValue::Set(record.title.clone()),
            location: FieldValue::Set(record.location.clone()),
            description: FieldValue::Set(record.description.clone()),
            schedule: FieldValue::Set(Schedule {
                start: record.start,
                end: record.end,
                first_date: record.first_date,
                recurrence: record.recurrence.clone(),
            }),
            guests: FieldValue::Set(record.guests.clone()),
        }
    }

    /// Exclude `field` from mutation. Either guest direction skips guest changes.
    pub fn skip(&mut self, field: DiffField) {
        match field {
            DiffField::Title => self.title = FieldValue::Skip,
            DiffField::Location => self.location = FieldValue::Skip,
            DiffField::Description => self.description = FieldValue::Skip,
            DiffField::Schedule => self.schedule = FieldValue::Skip,
            DiffField::AddGuest | DiffField::RemoveGuest => self.guests = FieldValue::Skip,
        }
    }

    /// What to create. A schedule and title are required; other skipped fields
    /// are left blank.
    pub fn new_event(&self) -> Option<NewEvent> {
        let schedule = self.schedule.value()?;
        Some(NewEvent {
            title: self.title.value()?.clone(),
            location: self.location.value().cloned().unwrap_or_default(),
            description: self.description.value().cloned().unwrap_or_default(),
            start: schedule.start,
            end: schedule.end,
            guests: self.guests.value().cloned().unwrap_or_default(),
        })
    }
}

/// The calendar object a row was matched to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchedEvent {
    /// The matched event or series instance.
    pub event_id: String,
    /// Where whole-row edits go: the series for recurring rows.
    pub target: Target,
    pub recurring: bool,
    pub title: String,
    pub location: String,
    pub description: String,
    pub guests: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncProposal {
    pub row_id: String,
    /// Zero-based row index in the source tab.
    pub sheet_row: usize,
    pub status: SyncStatus,
    pub diffs: Vec<FieldDiff>,
    pub matched: Option<MatchedEvent>,
    pub signature: String,
    pub stored_signature: Option<String>,
    pub payload: Payload,
}

impl SyncProposal {
    pub fn title(&self) -> &str {
        self.payload.title.value().map(String::as_str).unwrap_or(&self.row_id)
    }

    pub fn has_diff(&self, field: DiffField) -> bool {
        self.diffs.iter().any(|d| d.field == field)
    }

    /// Schedule drifted and the schedule is not skipped.
    pub fn needs_rebuild(&self) -> bool {
        self.status == SyncStatus::Update
            && self.has_diff(DiffField::Schedule)
            && !self.payload.schedule.is_skip()
    }

    pub fn skip(&mut self, field: DiffField) {
        self.payload.skip(field);
    }
}
