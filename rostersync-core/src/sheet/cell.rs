//! Typed cell values as they come out of a workbook.

use std::sync::LazyLock;

use chrono::{Datelike, NaiveDate, NaiveDateTime, TimeDelta};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Spreadsheet serial day zero (serial 1 is 1899-12-31).
fn serial_epoch() -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(1899, 12, 30)
}

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%m/%d/%Y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%A, %B %d, %Y",
];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    #[default]
    Empty,
    Bool(bool),
    Number(f64),
    DateTime(NaiveDateTime),
    Date(NaiveDate),
    Text(String),
}

impl CellValue {
    pub fn text(s: impl Into<String>) -> Self {
        CellValue::Text(s.into())
    }

    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => clean_text(s).is_empty(),
            _ => false,
        }
    }

    /// Display form with non-breaking spaces folded and surrounding whitespace trimmed.
    pub fn as_text(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Bool(true) => "TRUE".into(),
            CellValue::Bool(false) => "FALSE".into(),
            CellValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{}", *n as i64),
            CellValue::Number(n) => n.to_string(),
            CellValue::DateTime(dt) => dt.format("%Y-%m-%d %H:%M").to_string(),
            CellValue::Date(d) => d.format("%Y-%m-%d").to_string(),
            CellValue::Text(s) => clean_text(s),
        }
    }

    pub fn as_bool(&self) -> bool {
        match self {
            CellValue::Bool(b) => *b,
            CellValue::Number(n) => *n != 0.0,
            CellValue::Text(s) => matches!(
                clean_text(s).to_lowercase().as_str(),
                "true" | "yes" | "y" | "1" | "x"
            ),
            _ => false,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) => Some(*n),
            CellValue::Text(s) => clean_text(s).parse().ok(),
            _ => None,
        }
    }

    /// Calendar date of a cell: native dates, date-times, serial numbers, or text in
    /// one of the common written forms. Ordinal suffixes ("Sept 3rd") are tolerated.
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            CellValue::Date(d) => Some(*d),
            CellValue::DateTime(dt) => Some(dt.date()),
            CellValue::Number(n) if n.is_finite() && *n >= 1.0 => {
                let days = TimeDelta::try_days(n.trunc() as i64)?;
                serial_epoch()?.checked_add_signed(days)
            }
            CellValue::Text(s) => parse_date_text(&clean_text(s)),
            _ => None,
        }
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        if s.is_empty() {
            CellValue::Empty
        } else {
            CellValue::Text(s.to_string())
        }
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::from(s.as_str())
    }
}

impl From<NaiveDate> for CellValue {
    fn from(d: NaiveDate) -> Self {
        CellValue::Date(d)
    }
}

fn clean_text(s: &str) -> String {
    s.replace('\u{a0}', " ").trim().to_string()
}

fn parse_date_text(s: &str) -> Option<NaiveDate> {
    if s.is_empty() {
        return None;
    }
    let stripped = strip_ordinals(s);
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(&stripped, fmt).ok())
        .or_else(|| {
            NaiveDateTime::parse_from_str(&stripped, "%Y-%m-%dT%H:%M:%S")
                .ok()
                .map(|dt| dt.date())
        })
        .filter(|d| d.year() > 1900)
}

static ORDINAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d+)(st|nd|rd|th)\b").expect("valid ordinal pattern"));

/// "March 3rd, 2025" -> "March 3, 2025"
fn strip_ordinals(s: &str) -> String {
    ORDINAL.replace_all(s, "$1").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_is_cleaned() {
        assert_eq!(CellValue::text("\u{a0} Bio 101 ").as_text(), "Bio 101");
        assert!(CellValue::text(" \u{a0}").is_empty());
        assert_eq!(CellValue::Number(42.0).as_text(), "42");
    }

    #[test]
    fn test_dates_from_every_cell_shape() {
        let sept_2 = NaiveDate::from_ymd_opt(2024, 9, 2).unwrap();
        assert_eq!(CellValue::Date(sept_2).as_date(), Some(sept_2));
        assert_eq!(CellValue::text("2024-09-02").as_date(), Some(sept_2));
        assert_eq!(CellValue::text("9/2/2024").as_date(), Some(sept_2));
        assert_eq!(CellValue::text("September 2nd, 2024").as_date(), Some(sept_2));
        assert_eq!(CellValue::Number(45537.0).as_date(), Some(sept_2));
        assert_eq!(CellValue::text("TBD").as_date(), None);
    }

    #[test]
    fn test_out_of_range_serials_are_not_dates() {
        assert_eq!(CellValue::Number(1e12).as_date(), None);
        assert_eq!(CellValue::Number(1e300).as_date(), None);
        assert_eq!(CellValue::Number(f64::INFINITY).as_date(), None);
        assert_eq!(CellValue::Number(f64::NAN).as_date(), None);
    }

    #[test]
    fn test_bool_forms() {
        assert!(CellValue::Bool(true).as_bool());
        assert!(CellValue::text("Yes").as_bool());
        assert!(!CellValue::text("no").as_bool());
        assert!(!CellValue::Empty.as_bool());
    }

    #[test]
    fn test_untagged_json_shapes() {
        let json = r#"[null, true, 0.375, "2024-09-02", "2024-09-02T09:00:00", "Bio"]"#;
        let cells: Vec<CellValue> = serde_json::from_str(json).unwrap();
        assert_eq!(cells[0], CellValue::Empty);
        assert_eq!(cells[1], CellValue::Bool(true));
        assert_eq!(cells[2], CellValue::Number(0.375));
        assert!(matches!(cells[3], CellValue::Date(_)));
        assert!(matches!(cells[4], CellValue::DateTime(_)));
        assert_eq!(cells[5], CellValue::text("Bio"));
    }
}
