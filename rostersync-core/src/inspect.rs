//! Read-only calendar scan.
//!
//! Lists every event in a window across one or more calendars, merged and sorted by
//! start, each labeled with the first event type whose keywords appear in its title.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::calendar::{CalendarService, DateRange};
use crate::error::{SyncError, SyncResult};
use crate::sheet::{CellValue, SheetStore};

pub const UNCATEGORIZED: &str = "Uncategorized";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventType {
    pub name: String,
    /// Lowercased, never empty.
    pub keywords: Vec<String>,
}

impl EventType {
    /// `keywords` is comma-separated.
    pub fn new(name: &str, keywords: &str) -> Self {
        EventType {
            name: name.trim().to_string(),
            keywords: keywords
                .split(',')
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }

    pub fn matches(&self, title: &str) -> bool {
        let title = title.to_lowercase();
        self.keywords.iter().any(|k| title.contains(k.as_str()))
    }
}

/// Type names in the first column and keywords in the second, under a header row.
/// A workbook without the tab has no types.
pub fn read_event_types(sheet: &dyn SheetStore, tab: &str) -> SyncResult<Vec<EventType>> {
    if !sheet.has_tab(tab) {
        return Ok(Vec::new());
    }
    let rows = sheet.read_rows(tab)?;
    Ok(rows
        .iter()
        .skip(1)
        .filter_map(|row| {
            let name = row.first().map(CellValue::as_text).unwrap_or_default();
            if name.is_empty() {
                return None;
            }
            let keywords = row.get(1).map(CellValue::as_text).unwrap_or_default();
            Some(EventType::new(&name, &keywords))
        })
        .collect())
}

pub fn categorize<'a>(title: &str, types: &'a [EventType]) -> &'a str {
    types
        .iter()
        .find(|t| t.matches(title))
        .map_or(UNCATEGORIZED, |t| t.name.as_str())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InspectedEvent {
    pub calendar: String,
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Start and end in the scan's timezone, e.g. "Mon 2024-09-02 11:00-12:30".
    pub local_time: String,
    pub duration_minutes: i64,
    pub location: String,
    pub guests: Vec<String>,
    pub category: String,
    pub recurring: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanFailure {
    pub calendar: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CalendarScan {
    pub window: DateRange,
    pub events: Vec<InspectedEvent>,
    /// Calendars that couldn't be read. The rest of the scan still stands.
    pub failed: Vec<ScanFailure>,
}

impl CalendarScan {
    pub fn minutes_by_category(&self) -> BTreeMap<&str, i64> {
        let mut totals = BTreeMap::new();
        for event in &self.events {
            *totals.entry(event.category.as_str()).or_insert(0) += event.duration_minutes;
        }
        totals
    }
}

fn local_span(start: DateTime<Utc>, end: DateTime<Utc>, tz: &Tz) -> String {
    let (start, end) = (start.with_timezone(tz), end.with_timezone(tz));
    format!("{}-{}", start.format("%a %Y-%m-%d %H:%M"), end.format("%H:%M"))
}

/// Whole local days `from..=to`. Dates may be written any way a sheet cell may.
pub fn scan_window(from: &str, to: &str, tz: &Tz) -> SyncResult<DateRange> {
    let parse = |text: &str| {
        CellValue::text(text)
            .as_date()
            .ok_or_else(|| SyncError::Config(format!("Unreadable date '{text}'")))
    };
    let (first, last) = (parse(from)?, parse(to)?);
    if last < first {
        return Err(SyncError::Config(format!("Scan ends ({to}) before it starts ({from})")));
    }
    DateRange::days(first, last, tz)
}

pub fn scan_calendars(
    calendars: &[&dyn CalendarService],
    window: &DateRange,
    types: &[EventType],
    tz: &Tz,
) -> SyncResult<CalendarScan> {
    if calendars.is_empty() {
        return Err(SyncError::Config("No calendars selected to scan".into()));
    }

    let mut events = Vec::new();
    let mut failed = Vec::new();
    for calendar in calendars {
        let id = calendar.calendar_id();
        match calendar.events_between(window) {
            Ok(found) => {
                tracing::debug!(calendar = id, events = found.len(), "scanned calendar");
                events.extend(found.into_iter().map(|event| InspectedEvent {
                    calendar: id.to_string(),
                    category: categorize(&event.title, types).to_string(),
                    local_time: local_span(event.start, event.end, tz),
                    duration_minutes: (event.end - event.start).num_minutes(),
                    recurring: event.is_recurring(),
                    guests: event.guests.into_iter().collect(),
                    title: event.title,
                    start: event.start,
                    end: event.end,
                    location: event.location,
                }));
            }
            Err(e) => {
                tracing::warn!(calendar = id, error = %e, "could not scan calendar");
                failed.push(ScanFailure {
                    calendar: id.to_string(),
                    message: e.to_string(),
                });
            }
        }
    }

    events.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.calendar.cmp(&b.calendar)));
    tracing::info!(events = events.len(), failed = failed.len(), "calendar scan finished");
    Ok(CalendarScan {
        window: *window,
        events,
        failed,
    })
}
