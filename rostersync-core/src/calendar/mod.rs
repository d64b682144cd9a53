//! Calendar query adapter.
//!
//! The engine only ever talks to a calendar through [`CalendarService`]. Events carry
//! two custom string tags (identity and schedule signature), stored on the event
//! itself or, for recurring rows, on the parent series.

mod date_range;
mod ics;
mod ics_dir;
mod memory;

pub use date_range::DateRange;
pub use ics_dir::IcsDirCalendar;
pub use memory::{CalendarWrite, MemoryCalendar};

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SyncResult;
use crate::normalize::WeeklyRule;

/// Which object a write goes to: a single event (or one instance of a series), or a
/// whole series.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Target {
    Event(String),
    Series(String),
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Target::Event(id) => write!(f, "event {id}"),
            Target::Series(id) => write!(f, "series {id}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesInfo {
    pub id: String,
    pub tags: BTreeMap<String, String>,
}

/// An event (or series instance) as the calendar reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: String,
    pub series: Option<SeriesInfo>,
    pub title: String,
    pub location: String,
    pub description: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Lowercased addresses.
    pub guests: BTreeSet<String>,
    pub tags: BTreeMap<String, String>,
}

impl CalendarEvent {
    /// Tag on the event, falling back to its series.
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags
            .get(key)
            .or_else(|| self.series.as_ref().and_then(|s| s.tags.get(key)))
            .map(String::as_str)
    }

    pub fn is_recurring(&self) -> bool {
        self.series.is_some()
    }

    /// Where content edits belong: the series for recurring events, else the event.
    pub fn target(&self) -> Target {
        match &self.series {
            Some(series) => Target::Series(series.id.clone()),
            None => Target::Event(self.id.clone()),
        }
    }
}

/// What to create.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NewEvent {
    pub title: String,
    pub location: String,
    pub description: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub guests: BTreeSet<String>,
}

/// In-place edits. `None` leaves a field alone.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EventPatch {
    pub title: Option<String>,
    pub location: Option<String>,
    pub description: Option<String>,
    pub time: Option<(DateTime<Utc>, DateTime<Utc>)>,
}

impl EventPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.location.is_none()
            && self.description.is_none()
            && self.time.is_none()
    }
}

/// Blocking calendar backend.
pub trait CalendarService {
    fn calendar_id(&self) -> &str;

    /// Events and expanded series instances overlapping `range`, sorted by start.
    fn events_between(&self, range: &DateRange) -> SyncResult<Vec<CalendarEvent>>;

    fn create_event(&mut self, event: &NewEvent) -> SyncResult<Target>;

    /// Weekly series whose first occurrence is `event.start`.
    fn create_series(&mut self, event: &NewEvent, rule: &WeeklyRule) -> SyncResult<Target>;

    fn set_tag(&mut self, target: &Target, key: &str, value: &str) -> SyncResult<()>;

    fn update(&mut self, target: &Target, patch: &EventPatch) -> SyncResult<()>;

    fn add_guest(&mut self, target: &Target, address: &str) -> SyncResult<()>;

    fn remove_guest(&mut self, target: &Target, address: &str) -> SyncResult<()>;

    /// Deleting a series removes every instance; deleting an instance removes only it.
    fn delete(&mut self, target: &Target) -> SyncResult<()>;
}
