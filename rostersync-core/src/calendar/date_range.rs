//! Date range for calendar queries.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Serialize;

use crate::error::{SyncError, SyncResult};
use crate::normalize::EventRecord;

/// Half-open range `[from, to)` of instants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

/// Local midnight starting `date`.
fn day_start(date: NaiveDate, tz: &Tz) -> SyncResult<DateTime<Utc>> {
    tz.from_local_datetime(&date.and_time(NaiveTime::MIN))
        .earliest()
        .or_else(|| tz.from_local_datetime(&date.and_hms_opt(1, 0, 0)?).earliest())
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| SyncError::Config(format!("No local midnight on {date} in {tz}")))
}

impl DateRange {
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        DateRange { from, to }
    }

    /// Whole local days `first..=last`.
    pub fn days(first: NaiveDate, last: NaiveDate, tz: &Tz) -> SyncResult<Self> {
        let after = last
            .succ_opt()
            .ok_or_else(|| SyncError::Config(format!("{last} is past the last supported date")))?;
        Ok(DateRange {
            from: day_start(first, tz)?,
            to: day_start(after, tz)?,
        })
    }

    /// One local day.
    pub fn day(date: NaiveDate, tz: &Tz) -> SyncResult<Self> {
        Self::days(date, date, tz)
    }

    /// Smallest whole-day window holding every record: earliest start date through
    /// the latest series end (or event end) date. `None` when there are no records.
    pub fn covering(records: &[EventRecord], tz: &Tz) -> SyncResult<Option<Self>> {
        let first = records.iter().map(|r| r.start_date).min();
        let last = records.iter().map(|r| r.last_date).max();
        match (first, last) {
            (Some(first), Some(last)) => Self::days(first, last.max(first), tz).map(Some),
            _ => Ok(None),
        }
    }

    /// Padded around an instant span, e.g. +/- 1 hour for duplicate checks.
    pub fn around(start: DateTime<Utc>, end: DateTime<Utc>, pad: Duration) -> Self {
        DateRange {
            from: start.checked_sub_signed(pad).unwrap_or(DateTime::<Utc>::MIN_UTC),
            to: end.checked_add_signed(pad).unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    /// True if `[start, end)` intersects this range.
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        start < self.to && (end > self.from || (start == end && start >= self.from))
    }
}
