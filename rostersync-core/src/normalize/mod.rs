//! Row normalizer: raw source rows to canonical event records.

pub mod time;
pub mod weekday;

use std::collections::BTreeSet;

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, TimeDelta, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::config::{Profile, SyncConfig};
use crate::error::{SyncError, SyncResult};
use crate::schema::SourceRow;
use crate::staff::StaffDirectory;
use time::{Meridiem, TimeCell, parse_time_cell, resolve_range};
use weekday::{days_label, parse_weekdays, weekday_name};

const SHIFT_DESK: &str = "Tech Hub Desk";
const SHIFT_ZOOM: &str = "Zoom";

/// Longest single occurrence a row may describe.
const MAX_DURATION_MINUTES: i64 = 24 * 60;

/// Weekly repetition on one or more weekdays, through `until` inclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklyRule {
    pub weekdays: Vec<Weekday>,
    pub until: NaiveDate,
}

/// Fully resolved target state for one source row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub sheet_row: usize,
    pub row_id: Option<String>,
    pub name: String,
    pub title: String,
    /// First occurrence.
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Start date as written in the row.
    pub start_date: NaiveDate,
    /// Local date of the first occurrence.
    pub first_date: NaiveDate,
    /// Local date of the last occurrence (series end, or the single event's end).
    pub last_date: NaiveDate,
    pub recurrence: Option<WeeklyRule>,
    pub days_label: String,
    pub location: String,
    pub description: String,
    pub guests: BTreeSet<String>,
}

impl EventRecord {
    pub fn is_recurring(&self) -> bool {
        self.recurrence.is_some()
    }
}

/// Wall-clock time on `date` in `tz`. Times inside a DST gap or overlap have no
/// single answer and yield `None`.
pub fn local_instant(tz: &Tz, date: NaiveDate, time: NaiveTime) -> Option<DateTime<Utc>> {
    tz.from_local_datetime(&date.and_time(time))
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

/// First date on or after `from` that falls on one of `days`.
fn first_matching(from: NaiveDate, days: &[Weekday]) -> NaiveDate {
    from.iter_days()
        .take(7)
        .find(|d| days.contains(&d.weekday()))
        .unwrap_or(from)
}

pub struct Normalizer<'a> {
    config: &'a SyncConfig,
    tz: Tz,
    staff: &'a StaffDirectory,
}

impl<'a> Normalizer<'a> {
    pub fn new(config: &'a SyncConfig, tz: Tz, staff: &'a StaffDirectory) -> Self {
        Normalizer { config, tz, staff }
    }

    /// `Ok(None)` for rows without a name (blank or placeholder rows); `Err` for rows
    /// whose dates or times can't be interpreted.
    pub fn normalize(&self, row: &SourceRow) -> SyncResult<Option<EventRecord>> {
        if row.name.is_empty() {
            return Ok(None);
        }
        let fail = |message: &str| SyncError::row(row.sheet_row, message);

        let start_date = row
            .start_date
            .as_date()
            .ok_or_else(|| fail("missing or unreadable start date"))?;

        let weekdays = parse_weekdays(&row.days);
        let first_date = first_matching(start_date, &weekdays);

        let (start_time, minutes) = self
            .resolve_times(row)
            .ok_or_else(|| fail("missing or unreadable time"))?;

        let start = local_instant(&self.tz, first_date, start_time).ok_or_else(|| {
            fail("start time does not exist or is ambiguous in the configured timezone")
        })?;
        let end = TimeDelta::try_minutes(minutes)
            .filter(|d| *d > TimeDelta::zero())
            .filter(|d| *d <= TimeDelta::minutes(MAX_DURATION_MINUTES))
            .and_then(|d| start.checked_add_signed(d))
            .ok_or_else(|| fail("duration is out of range"))?;

        let until = row.end_date.as_date();
        let recurrence = match until {
            Some(until) if !weekdays.is_empty() => {
                if until < first_date {
                    return Err(fail("series ends before its first occurrence"));
                }
                Some(WeeklyRule {
                    weekdays: weekdays.clone(),
                    until,
                })
            }
            _ => None,
        };

        let last_date = match &recurrence {
            Some(rule) => rule.until,
            None => end.with_timezone(&self.tz).date_naive(),
        };

        let days_label = if weekdays.is_empty() {
            weekday_name(first_date.weekday()).to_string()
        } else {
            days_label(&weekdays)
        };

        let guests = self
            .staff
            .resolve_principal(row.row_id.as_deref(), row.principal.as_deref())
            .into_iter()
            .collect();

        Ok(Some(EventRecord {
            sheet_row: row.sheet_row,
            row_id: row.row_id.clone(),
            name: row.name.clone(),
            title: self.title(row),
            start,
            end,
            start_date,
            first_date,
            last_date,
            recurrence,
            days_label,
            location: self.location(row),
            description: row.extras.join("\n"),
            guests,
        }))
    }

    /// Start time plus duration: range end, then end-time column, then hours column,
    /// then the configured default. The duration is not range-checked here.
    fn resolve_times(&self, row: &SourceRow) -> Option<(NaiveTime, i64)> {
        let indicator = Meridiem::parse(&row.meridiem);

        let start = match parse_time_cell(&row.time)? {
            TimeCell::Range(start, end) => return resolve_range(&start, &end, indicator),
            TimeCell::At(start) => start,
        };

        if let Some(TimeCell::At(end)) = parse_time_cell(&row.end_time) {
            return resolve_range(&start, &end, indicator);
        }

        let start_time = start.resolve(indicator)?;
        let minutes = row
            .duration_hours
            .as_number()
            .filter(|h| h.is_finite() && *h > 0.0)
            .map(|h| (h * 60.0).round() as i64)
            .unwrap_or(self.config.default_duration_minutes);

        Some((start_time, minutes))
    }

    fn title(&self, row: &SourceRow) -> String {
        match self.config.profile {
            Profile::Course if !row.faculty.is_empty() => format!("{} - {}", row.name, row.faculty),
            Profile::Course => row.name.clone(),
            Profile::Shift if !row.days.is_empty() => format!("{} ({})", row.name, row.days),
            Profile::Shift => row.name.clone(),
        }
    }

    fn location(&self, row: &SourceRow) -> String {
        match self.config.profile {
            Profile::Course => row.location.clone(),
            Profile::Shift if row.is_virtual => SHIFT_ZOOM.to_string(),
            Profile::Shift if !row.location.is_empty() => row.location.clone(),
            Profile::Shift => SHIFT_DESK.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sheet::CellValue;
    use chrono_tz::America::New_York;

    fn row(days: &str, time: &str) -> SourceRow {
        SourceRow {
            sheet_row: 2,
            row_id: Some("C1".into()),
            name: "Bio 101".into(),
            faculty: "Smith".into(),
            days: days.into(),
            start_date: CellValue::text("2024-09-02"),
            end_date: CellValue::text("2024-12-13"),
            time: CellValue::text(time),
            end_time: CellValue::Empty,
            meridiem: String::new(),
            duration_hours: CellValue::Empty,
            location: "Hall 2".into(),
            is_virtual: false,
            extras: vec!["https://zoom.example/j/1".into()],
            principal: None,
        }
    }

    fn normalize_with(config: &SyncConfig, source: &SourceRow) -> SyncResult<Option<EventRecord>> {
        let staff = StaffDirectory::default();
        Normalizer::new(config, New_York, &staff).normalize(source)
    }

    fn normalize(source: &SourceRow) -> SyncResult<Option<EventRecord>> {
        normalize_with(&SyncConfig::default(), source)
    }

    fn utc(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[test]
    fn test_weekly_course_row() {
        let record = normalize(&row("Monday", "9:00 - 11:00")).unwrap().unwrap();
        assert_eq!(record.title, "Bio 101 - Smith");
        assert_eq!(record.start, utc("2024-09-02T13:00:00Z"));
        assert_eq!(record.end, utc("2024-09-02T15:00:00Z"));
        assert_eq!(
            record.recurrence,
            Some(WeeklyRule {
                weekdays: vec![Weekday::Mon],
                until: NaiveDate::from_ymd_opt(2024, 12, 13).unwrap(),
            })
        );
        assert_eq!(record.days_label, "Monday");
        assert_eq!(record.description, "https://zoom.example/j/1");
        assert_eq!(record.location, "Hall 2");
    }

    #[test]
    fn test_first_occurrence_is_next_matching_weekday() {
        // 2024-09-02 is a Monday
        let record = normalize(&row("Wed/Fri", "10")).unwrap().unwrap();
        assert_eq!(record.first_date, NaiveDate::from_ymd_opt(2024, 9, 4).unwrap());
        assert_eq!(record.start_date, NaiveDate::from_ymd_opt(2024, 9, 2).unwrap());
        assert_eq!(record.days_label, "Wednesday,Friday");
        assert_eq!(record.end - record.start, TimeDelta::minutes(60));
    }

    #[test]
    fn test_unmatched_days_make_a_one_off() {
        let record = normalize(&row("online", "9")).unwrap().unwrap();
        assert!(record.recurrence.is_none());
        assert_eq!(record.first_date, record.start_date);
        assert_eq!(record.days_label, "Monday");
        assert_eq!(record.last_date, record.start_date);
    }

    #[test]
    fn test_no_series_end_makes_a_one_off() {
        let mut source = row("Tuesday", "2 - 4");
        source.end_date = CellValue::Empty;
        let record = normalize(&source).unwrap().unwrap();
        assert!(record.recurrence.is_none());
        assert_eq!(record.start, utc("2024-09-03T18:00:00Z"));
    }

    #[test]
    fn test_duration_fallbacks() {
        let mut source = row("Monday", "9");
        source.duration_hours = CellValue::Number(1.5);
        let record = normalize(&source).unwrap().unwrap();
        assert_eq!(record.end - record.start, TimeDelta::minutes(90));

        source.end_time = CellValue::text("10:15");
        let record = normalize(&source).unwrap().unwrap();
        assert_eq!(record.end - record.start, TimeDelta::minutes(75));

        let config = SyncConfig {
            default_duration_minutes: 45,
            ..Default::default()
        };
        let record = normalize_with(&config, &row("Monday", "9")).unwrap().unwrap();
        assert_eq!(record.end - record.start, TimeDelta::minutes(45));
    }

    #[test]
    fn test_meridiem_indicator_column() {
        let mut source = row("Monday", "8 - 10");
        source.meridiem = "PM".into();
        let record = normalize(&source).unwrap().unwrap();
        assert_eq!(record.start, utc("2024-09-03T00:00:00Z"));
    }

    #[test]
    fn test_nameless_rows_are_skipped() {
        let mut source = row("Monday", "9");
        source.name.clear();
        assert_eq!(normalize(&source).unwrap(), None);
    }

    #[test]
    fn test_bad_rows_are_row_errors() {
        let mut source = row("Monday", "whenever");
        assert!(matches!(normalize(&source), Err(SyncError::Row { row: 3, .. })));

        source = row("Monday", "9");
        source.start_date = CellValue::text("soon");
        assert!(matches!(normalize(&source), Err(SyncError::Row { .. })));

        source = row("Monday", "9");
        source.end_date = CellValue::text("2024-08-01");
        assert!(normalize(&source).is_err());
    }

    #[test]
    fn test_absurd_durations_are_row_errors() {
        for hours in [1e10, f64::INFINITY, 25.0] {
            let mut source = row("Monday", "9");
            source.duration_hours = CellValue::Number(hours);
            let err = normalize(&source).unwrap_err();
            assert!(matches!(err, SyncError::Row { row: 3, .. }), "{hours}: {err}");
        }

        let config = SyncConfig {
            default_duration_minutes: i64::MAX,
            ..Default::default()
        };
        assert!(normalize_with(&config, &row("Monday", "9")).is_err());
    }

    #[test]
    fn test_nan_duration_falls_back_to_default() {
        let mut source = row("Monday", "9");
        source.duration_hours = CellValue::Number(f64::NAN);
        let record = normalize(&source).unwrap().unwrap();
        assert_eq!(record.end - record.start, TimeDelta::minutes(60));
    }

    #[test]
    fn test_dst_gap_is_a_row_error() {
        let mut source = row("Sunday", "2:30am");
        source.start_date = CellValue::text("2025-03-09");
        source.end_date = CellValue::Empty;
        assert!(normalize(&source).is_err());
    }

    #[test]
    fn test_shift_titles_and_locations() {
        let config = SyncConfig {
            profile: Profile::Shift,
            ..Default::default()
        };
        let mut source = row("Tuesday", "9 - 1");
        source.name = "Front desk".into();
        source.faculty.clear();
        source.location.clear();

        let record = normalize_with(&config, &source).unwrap().unwrap();
        assert_eq!(record.title, "Front desk (Tuesday)");
        assert_eq!(record.location, "Tech Hub Desk");
        assert_eq!(record.end - record.start, TimeDelta::hours(4));

        source.is_virtual = true;
        let record = normalize_with(&config, &source).unwrap().unwrap();
        assert_eq!(record.location, "Zoom");
    }

    #[test]
    fn test_principal_becomes_guest() {
        let mut staff = StaffDirectory::default();
        staff.insert(crate::staff::StaffMember::new("Ann@X.org", "Ann Lee"));
        let mut source = row("Monday", "9");
        source.principal = Some("ann@x.org".into());

        let config = SyncConfig::default();
        let record = Normalizer::new(&config, New_York, &staff)
            .normalize(&source)
            .unwrap()
            .unwrap();
        assert_eq!(record.guests.into_iter().collect::<Vec<_>>(), vec!["ann@x.org"]);
    }
}
