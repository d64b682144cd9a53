//! Nursing exam proctoring calendar.
//!
//! Each exam tab names its course in cell A1 and holds an exam table somewhere in
//! its first rows. Exams are matched to calendar events by exact title near their
//! start time, so re-running never duplicates.

use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use chrono_tz::Tz;
use regex::Regex;
use serde::Serialize;

use crate::calendar::{CalendarService, DateRange, EventPatch, NewEvent};
use crate::config::ExamConfig;
use crate::error::{SyncError, SyncResult};
use crate::normalize::local_instant;
use crate::normalize::time::{TimeCell, parse_time_cell};
use crate::sheet::{CellValue, SheetStore};

const HEADER_SEARCH_ROWS: usize = 20;
const DEFAULT_DURATION_MINUTES: i64 = 120;
const MAX_DURATION_MINUTES: i64 = 24 * 60;

static COURSE_HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([^:-]+)[:\s-](.+)").expect("valid heading pattern"));
static FIRST_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+").expect("valid number pattern"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExamCourse {
    pub code: String,
    pub name: String,
}

/// `CODE: Name`, `CODE - Name`, or else the first two words as the code.
pub fn parse_course_heading(heading: &str) -> ExamCourse {
    let heading = heading.trim();
    if let Some(caps) = COURSE_HEADING.captures(heading) {
        return ExamCourse {
            code: caps[1].trim().to_string(),
            name: caps[2].trim().trim_start_matches(['-', ':']).trim().to_string(),
        };
    }
    let words: Vec<&str> = heading.split(' ').collect();
    if words.len() > 1 {
        ExamCourse {
            code: words[..2].join(" "),
            name: words[2..].join(" "),
        }
    } else {
        ExamCourse {
            code: "Unknown".to_string(),
            name: heading.to_string(),
        }
    }
}

/// First integer in the text, in hours when the text says so; 120 minutes otherwise.
pub fn parse_duration_minutes(text: &str) -> i64 {
    let Some(digits) = FIRST_NUMBER.find(text) else {
        return DEFAULT_DURATION_MINUTES;
    };
    let n = digits.as_str().parse::<i64>().unwrap_or(i64::MAX);
    if text.to_lowercase().contains("hour") {
        n.saturating_mul(60)
    } else {
        n
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExamEntry {
    pub name: String,
    pub date: Option<NaiveDate>,
    pub site_time: CellValue,
    pub zoom_time: String,
    pub duration: String,
    pub room: String,
    pub password: String,
    pub notes: String,
}

fn or_na(s: &str) -> &str {
    if s.is_empty() { "N/A" } else { s }
}

impl ExamEntry {
    pub fn title(&self, course: &ExamCourse) -> String {
        format!("{}: {}", course.code, self.name)
    }

    pub fn description(&self, course: &ExamCourse) -> String {
        let mut text = format!(
            "Course: {}\nPassword: {}\nZoom Time: {}",
            course.name,
            or_na(&self.password),
            or_na(&self.zoom_time)
        );
        if !self.notes.is_empty() {
            text.push_str("\n\nAccommodations/Notes:\n");
            text.push_str(&self.notes);
        }
        text
    }

    pub fn location(&self, config: &ExamConfig) -> String {
        if self.room.is_empty() {
            config.default_location.clone()
        } else {
            self.room.clone()
        }
    }

    /// Start and end, or `None` without a date, a readable on-site time, or a
    /// duration between one minute and a day.
    pub fn span(&self, tz: &Tz) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let date = self.date?;
        let time = match parse_time_cell(&self.site_time)? {
            TimeCell::At(reading) | TimeCell::Range(reading, _) => reading.resolve(None)?,
        };
        let start = local_instant(tz, date, time)?;
        let minutes = parse_duration_minutes(&self.duration);
        if !(1..=MAX_DURATION_MINUTES).contains(&minutes) {
            return None;
        }
        let end = start.checked_add_signed(TimeDelta::try_minutes(minutes)?)?;
        Some((start, end))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExamSheet {
    pub tab: String,
    pub course: ExamCourse,
    pub exams: Vec<ExamEntry>,
}

struct ExamColumns {
    name: usize,
    date: usize,
    site_time: Option<usize>,
    zoom_time: Option<usize>,
    duration: Option<usize>,
    room: Option<usize>,
    password: Option<usize>,
    notes: Option<usize>,
}

fn position(names: &[String], pred: impl Fn(&str) -> bool) -> Option<usize> {
    names.iter().position(|h| pred(h.as_str()))
}

impl ExamColumns {
    fn find(header: &[CellValue]) -> Option<Self> {
        let names: Vec<String> = header.iter().map(|c| c.as_text().to_lowercase()).collect();

        Some(ExamColumns {
            name: position(&names, |h| h.contains("exam"))?,
            date: position(&names, |h| h == "date")?,
            site_time: position(&names, |h| h.contains("time") && !h.contains("zoom")),
            zoom_time: position(&names, |h| h.contains("time") && h.contains("zoom")),
            duration: position(&names, |h| h.contains("duration")),
            room: position(&names, |h| h.contains("room") || h.contains("location")),
            password: position(&names, |h| h.contains("password")),
            notes: position(&names, |h| h.contains("accommodations")),
        })
    }
}

/// Read one exam tab. `Ok(None)` when the tab has no recognizable exam table.
pub fn read_exam_sheet(sheet: &dyn SheetStore, tab: &str) -> SyncResult<Option<ExamSheet>> {
    let rows = sheet.read_rows(tab)?;
    let heading = rows
        .first()
        .and_then(|r| r.first())
        .map(CellValue::as_text)
        .unwrap_or_default();

    let Some(header_row) = rows.iter().take(HEADER_SEARCH_ROWS).position(|row| {
        let joined = row
            .iter()
            .map(CellValue::as_text)
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();
        joined.contains("exam") && joined.contains("date")
    }) else {
        tracing::warn!(tab, "no exam table found");
        return Ok(None);
    };
    let Some(cols) = ExamColumns::find(&rows[header_row]) else {
        tracing::warn!(tab, "exam table lacks an exam or date column");
        return Ok(None);
    };

    let exams = rows[header_row + 1..]
        .iter()
        .filter_map(|row| {
            let cell = |i: Option<usize>| i.and_then(|i| row.get(i)).cloned().unwrap_or_default();
            let text = |i: Option<usize>| cell(i).as_text();
            let name = text(Some(cols.name));
            if name.is_empty() {
                return None;
            }
            Some(ExamEntry {
                name,
                date: cell(Some(cols.date)).as_date(),
                site_time: cell(cols.site_time),
                zoom_time: text(cols.zoom_time),
                duration: text(cols.duration),
                room: text(cols.room),
                password: text(cols.password),
                notes: text(cols.notes),
            })
        })
        .collect();

    Ok(Some(ExamSheet {
        tab: tab.to_string(),
        course: parse_course_heading(&heading),
        exams,
    }))
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExamStats {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub errors: usize,
}

impl ExamStats {
    pub fn synced(&self) -> usize {
        self.created + self.updated
    }
}

/// Read-only: is this exam already on the calendar?
pub fn check_exam_on_calendar(
    calendar: &dyn CalendarService,
    course: &ExamCourse,
    exam: &ExamEntry,
    tz: &Tz,
) -> SyncResult<bool> {
    let Some((start, end)) = exam.span(tz) else {
        return Ok(false);
    };
    let title = exam.title(course);
    let events = calendar.events_between(&DateRange::around(start, end, TimeDelta::hours(1)))?;
    Ok(events.iter().any(|e| e.title == title))
}

enum ExamOutcome {
    Created,
    Updated,
    Skipped(&'static str),
}

fn sync_exam(
    calendar: &mut dyn CalendarService,
    course: &ExamCourse,
    exam: &ExamEntry,
    config: &ExamConfig,
    tz: &Tz,
) -> SyncResult<ExamOutcome> {
    let Some((start, end)) = exam.span(tz) else {
        return Ok(ExamOutcome::Skipped("no usable date, site time or duration"));
    };
    let title = exam.title(course);
    let description = exam.description(course);
    let location = exam.location(config);

    let window = DateRange::around(start, end, TimeDelta::hours(1));
    let existing = calendar.events_between(&window)?;
    match existing.iter().find(|e| e.title == title) {
        // series instances are never moved on their own
        Some(event) if event.is_recurring() => {
            Ok(ExamOutcome::Skipped("title matches a recurring event"))
        }
        Some(event) => {
            let patch = EventPatch {
                title: None,
                location: Some(location),
                description: Some(description),
                time: Some((start, end)),
            };
            calendar.update(&event.target(), &patch)?;
            Ok(ExamOutcome::Updated)
        }
        None => {
            calendar.create_event(&NewEvent {
                title,
                location,
                description,
                start,
                end,
                guests: Default::default(),
            })?;
            Ok(ExamOutcome::Created)
        }
    }
}

/// Create or update every exam. Per-exam failures are counted.
pub fn sync_exams(
    sheets: &[ExamSheet],
    calendar: &mut dyn CalendarService,
    config: &ExamConfig,
    tz: &Tz,
) -> SyncResult<ExamStats> {
    let expected = config
        .calendar_id
        .as_deref()
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| SyncError::Config("exams.calendar_id is not set".into()))?;
    if calendar.calendar_id() != expected {
        return Err(SyncError::CalendarNotFound(expected.to_string()));
    }

    let delay = std::time::Duration::from_millis(config.write_delay_ms);
    let mut stats = ExamStats::default();

    for sheet in sheets {
        for exam in &sheet.exams {
            match sync_exam(calendar, &sheet.course, exam, config, tz) {
                Ok(ExamOutcome::Created) => stats.created += 1,
                Ok(ExamOutcome::Updated) => stats.updated += 1,
                Ok(ExamOutcome::Skipped(reason)) => {
                    tracing::debug!(tab = %sheet.tab, exam = %exam.name, reason, "exam skipped");
                    stats.skipped += 1;
                    continue;
                }
                Err(e) => {
                    tracing::warn!(
                        tab = %sheet.tab,
                        exam = %exam.name,
                        error = %e,
                        "exam sync failed"
                    );
                    stats.errors += 1;
                }
            }
            if !delay.is_zero() {
                std::thread::sleep(delay);
            }
        }
    }

    tracing::info!(
        created = stats.created,
        updated = stats.updated,
        skipped = stats.skipped,
        errors = stats.errors,
        "exam sync finished"
    );
    Ok(stats)
}
