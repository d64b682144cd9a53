//! Clock-time parsing and AM/PM resolution.
//!
//! Staff type times loosely ("9", "930", "1:30", "9:00 - 11:00"). When no AM/PM is
//! given anywhere, the hour decides:
//!
//! | hour  | read as        |
//! |-------|----------------|
//! | 0     | 24-hour, as is |
//! | 1–6   | PM             |
//! | 7–11  | AM             |
//! | 12    | PM (noon)      |
//! | 13–23 | 24-hour, as is |

use std::sync::LazyLock;

use chrono::{NaiveTime, Timelike};
use regex::Regex;

use crate::sheet::CellValue;

static CLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(\d{1,2})(?:[:.]?(\d{2}))?\s*(a\.?m?\.?|p\.?m?\.?)?$")
        .expect("valid clock pattern")
});

static RANGE_SPLIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s*(?:-|–|—|\bto\b)\s*").expect("valid range pattern"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Meridiem {
    Am,
    Pm,
}

impl Meridiem {
    /// "AM", "a.m.", "pm", "P" ...
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim().chars().next()?.to_ascii_lowercase() {
            'a' => Some(Meridiem::Am),
            'p' => Some(Meridiem::Pm),
            _ => None,
        }
    }

    fn of(time: NaiveTime) -> Self {
        if time.hour() >= 12 {
            Meridiem::Pm
        } else {
            Meridiem::Am
        }
    }
}

/// Default meridiem for a bare hour. `None` means the hour is already 24-hour.
pub fn infer_meridiem(hour: u32) -> Option<Meridiem> {
    match hour {
        1..=6 => Some(Meridiem::Pm),
        7..=11 => Some(Meridiem::Am),
        12 => Some(Meridiem::Pm),
        _ => None,
    }
}

fn to_24h(hour: u32, meridiem: Meridiem) -> u32 {
    match (hour, meridiem) {
        (12, Meridiem::Am) => 0,
        (12, Meridiem::Pm) => 12,
        (h, Meridiem::Am) => h,
        (h, Meridiem::Pm) => h + 12,
    }
}

/// A time of day as written, before AM/PM is settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockReading {
    pub hour: u32,
    pub minute: u32,
    pub meridiem: Option<Meridiem>,
    /// Came from a typed time value; never reinterpreted.
    pub exact: bool,
}

impl ClockReading {
    fn exact(time: NaiveTime) -> Self {
        ClockReading {
            hour: time.hour(),
            minute: time.minute(),
            meridiem: None,
            exact: true,
        }
    }

    /// Settle AM/PM: inline suffix, then the indicator column, then the hour table.
    pub fn resolve(&self, indicator: Option<Meridiem>) -> Option<NaiveTime> {
        if self.exact {
            return NaiveTime::from_hms_opt(self.hour, self.minute, 0);
        }
        let meridiem = self
            .meridiem
            .or(indicator)
            .or_else(|| infer_meridiem(self.hour));
        let hour = match meridiem {
            Some(m) if (1..=12).contains(&self.hour) => to_24h(self.hour, m),
            _ => self.hour,
        };
        NaiveTime::from_hms_opt(hour, self.minute, 0)
    }
}

pub fn parse_clock(text: &str) -> Option<ClockReading> {
    let caps = CLOCK.captures(text.trim())?;
    let hour: u32 = caps.get(1)?.as_str().parse().ok()?;
    let minute: u32 = caps.get(2).map_or(Ok(0), |m| m.as_str().parse()).ok()?;
    if hour > 23 || minute > 59 {
        return None;
    }
    Some(ClockReading {
        hour,
        minute,
        meridiem: caps.get(3).and_then(|m| Meridiem::parse(m.as_str())),
        exact: false,
    })
}

/// Numeric time cells: a fraction of a day (0.375 = 09:00) or HHMM (930, 1330).
pub fn clock_from_number(n: f64) -> Option<ClockReading> {
    if (0.0..1.0).contains(&n) {
        let minutes = (n * 1440.0).round() as u32;
        return NaiveTime::from_hms_opt(minutes / 60 % 24, minutes % 60, 0).map(ClockReading::exact);
    }
    if n.fract() != 0.0 || !(0.0..2400.0).contains(&n) {
        return None;
    }
    let n = n as u32;
    let (hour, minute) = if n < 100 { (n, 0) } else { (n / 100, n % 100) };
    if hour > 23 || minute > 59 {
        return None;
    }
    Some(ClockReading {
        hour,
        minute,
        meridiem: None,
        exact: false,
    })
}

/// What a time cell says.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeCell {
    At(ClockReading),
    Range(ClockReading, ClockReading),
}

pub fn parse_time_cell(cell: &CellValue) -> Option<TimeCell> {
    match cell {
        CellValue::DateTime(dt) => Some(TimeCell::At(ClockReading::exact(dt.time()))),
        CellValue::Number(n) => clock_from_number(*n).map(TimeCell::At),
        CellValue::Text(_) => {
            let text = cell.as_text();
            let parts: Vec<&str> = RANGE_SPLIT.splitn(&text, 2).collect();
            match parts.as_slice() {
                [start, end] => Some(TimeCell::Range(parse_clock(start)?, parse_clock(end)?)),
                _ => parse_clock(&text).map(TimeCell::At),
            }
        }
        _ => None,
    }
}

/// Start time and duration in minutes for a start/end pair.
///
/// An end without its own AM/PM takes the start's; if that lands at or before the
/// start it moves forward 12 hours, and past midnight if still not after the start.
pub fn resolve_range(
    start: &ClockReading,
    end: &ClockReading,
    indicator: Option<Meridiem>,
) -> Option<(NaiveTime, i64)> {
    let start_time = start.resolve(indicator)?;

    let end_time = if end.exact || end.meridiem.is_some() || !(1..=12).contains(&end.hour) {
        end.resolve(None)?
    } else {
        let hour = to_24h(end.hour, Meridiem::of(start_time));
        let inherited = NaiveTime::from_hms_opt(hour, end.minute, 0)?;
        if inherited > start_time {
            inherited
        } else {
            let rolled = NaiveTime::from_hms_opt((inherited.hour() + 12) % 24, end.minute, 0)?;
            if rolled > start_time {
                rolled
            } else {
                inherited
            }
        }
    };

    let mut minutes = (end_time - start_time).num_minutes();
    if minutes <= 0 {
        minutes += 24 * 60;
    }
    Some((start_time, minutes))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn bare(hour: u32) -> ClockReading {
        ClockReading {
            hour,
            minute: 0,
            meridiem: None,
            exact: false,
        }
    }

    #[test]
    fn test_hour_12_defaults_to_noon() {
        assert_eq!(infer_meridiem(12), Some(Meridiem::Pm));
        assert_eq!(bare(12).resolve(None), Some(t(12, 0)));
    }

    #[test]
    fn test_hour_1_defaults_to_pm() {
        assert_eq!(infer_meridiem(1), Some(Meridiem::Pm));
        assert_eq!(bare(1).resolve(None), Some(t(13, 0)));
    }

    #[test]
    fn test_hour_6_defaults_to_pm() {
        assert_eq!(infer_meridiem(6), Some(Meridiem::Pm));
        assert_eq!(bare(6).resolve(None), Some(t(18, 0)));
    }

    #[test]
    fn test_hour_7_defaults_to_am() {
        assert_eq!(infer_meridiem(7), Some(Meridiem::Am));
        assert_eq!(bare(7).resolve(None), Some(t(7, 0)));
    }

    #[test]
    fn test_hour_11_defaults_to_am() {
        assert_eq!(infer_meridiem(11), Some(Meridiem::Am));
        assert_eq!(bare(11).resolve(None), Some(t(11, 0)));
    }

    #[test]
    fn test_24_hour_values_are_untouched() {
        assert_eq!(infer_meridiem(0), None);
        assert_eq!(infer_meridiem(13), None);
        assert_eq!(infer_meridiem(23), None);
        assert_eq!(bare(0).resolve(None), Some(t(0, 0)));
        assert_eq!(bare(15).resolve(Some(Meridiem::Am)), Some(t(15, 0)));
    }

    #[test]
    fn test_indicator_overrides_table_and_suffix_overrides_indicator() {
        assert_eq!(bare(8).resolve(Some(Meridiem::Pm)), Some(t(20, 0)));
        assert_eq!(bare(3).resolve(Some(Meridiem::Am)), Some(t(3, 0)));
        assert_eq!(bare(12).resolve(Some(Meridiem::Am)), Some(t(0, 0)));

        let suffixed = parse_clock("8am").unwrap();
        assert_eq!(suffixed.resolve(Some(Meridiem::Pm)), Some(t(8, 0)));
    }

    #[test]
    fn test_parse_clock_forms() {
        let reading = |s| parse_clock(s).map(|c| (c.hour, c.minute, c.meridiem));
        assert_eq!(reading("9"), Some((9, 0, None)));
        assert_eq!(reading("9:30"), Some((9, 30, None)));
        assert_eq!(reading("9.30"), Some((9, 30, None)));
        assert_eq!(reading("930"), Some((9, 30, None)));
        assert_eq!(reading("1330"), Some((13, 30, None)));
        assert_eq!(reading("1:15 PM"), Some((1, 15, Some(Meridiem::Pm))));
        assert_eq!(reading("10a.m."), Some((10, 0, Some(Meridiem::Am))));
        assert_eq!(reading("noonish"), None);
        assert_eq!(reading("25:00"), None);
    }

    #[test]
    fn test_numeric_cells() {
        let frac = clock_from_number(0.375).unwrap();
        assert!(frac.exact);
        assert_eq!(frac.resolve(None), Some(t(9, 0)));

        // fractions are 24-hour: 0.25 is 06:00, not 18:00
        assert_eq!(clock_from_number(0.25).unwrap().resolve(None), Some(t(6, 0)));

        assert_eq!(clock_from_number(900.0).unwrap().resolve(None), Some(t(9, 0)));
        assert_eq!(clock_from_number(1330.0).unwrap().resolve(None), Some(t(13, 30)));
        assert_eq!(clock_from_number(2.0).unwrap().resolve(None), Some(t(14, 0)));
        assert!(clock_from_number(975.0).is_none());
    }

    #[test]
    fn test_range_cells() {
        let cell = CellValue::text("9:00 - 11:00");
        let Some(TimeCell::Range(start, end)) = parse_time_cell(&cell) else {
            panic!("expected a range");
        };
        assert_eq!(resolve_range(&start, &end, None), Some((t(9, 0), 120)));

        let en_dash = CellValue::text("1–3");
        assert!(matches!(parse_time_cell(&en_dash), Some(TimeCell::Range(..))));

        assert_eq!(parse_time_cell(&CellValue::text("10")), Some(TimeCell::At(bare(10))));
        assert_eq!(parse_time_cell(&CellValue::Empty), None);
    }

    #[test]
    fn test_range_end_inherits_and_rolls_forward() {
        let range = |s: &str, ind| match parse_time_cell(&CellValue::text(s)) {
            Some(TimeCell::Range(a, b)) => resolve_range(&a, &b, ind),
            _ => None,
        };
        assert_eq!(range("11:00 - 1:00", None), Some((t(11, 0), 120)));
        assert_eq!(range("11:30 - 12:45", None), Some((t(11, 30), 75)));
        assert_eq!(range("1 - 3", None), Some((t(13, 0), 120)));
        assert_eq!(range("6 - 8", None), Some((t(18, 0), 120)));
        assert_eq!(range("9:00am - 5:00pm", None), Some((t(9, 0), 480)));
        assert_eq!(range("8 - 11", Some(Meridiem::Pm)), Some((t(20, 0), 180)));
        assert_eq!(range("10pm - 1am", None), Some((t(22, 0), 180)));
    }
}
