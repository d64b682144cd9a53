//! Typed mapping from a header row to logical row fields.
//!
//! Resolved once per read; afterwards rows are pulled apart by index only.

use std::sync::LazyLock;

use regex::Regex;

use crate::config::{ColumnNames, Profile};
use crate::error::{SyncError, SyncResult};
use crate::sheet::{CellValue, ColumnMap};

static ID_JUNK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9\-_.@+]").expect("valid identity pattern"));

/// Strip everything but identity-safe characters from an ID cell.
pub fn clean_identity(raw: &str) -> String {
    ID_JUNK.replace_all(raw, "").into_owned()
}

/// One schedulable unit pulled out of a source row, still un-interpreted.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRow {
    pub sheet_row: usize,
    pub row_id: Option<String>,
    pub name: String,
    pub faculty: String,
    pub days: String,
    pub start_date: CellValue,
    pub end_date: CellValue,
    pub time: CellValue,
    pub end_time: CellValue,
    pub meridiem: String,
    pub duration_hours: CellValue,
    pub location: String,
    pub is_virtual: bool,
    pub extras: Vec<String>,
    pub principal: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowSchema {
    pub profile: Profile,
    id: usize,
    name: usize,
    start_date: usize,
    faculty: Option<usize>,
    days: Option<usize>,
    end_date: Option<usize>,
    time: Option<usize>,
    end_time: Option<usize>,
    meridiem: Option<usize>,
    duration_hours: Option<usize>,
    location: Option<usize>,
    virtual_flag: Option<usize>,
    extras: Vec<usize>,
    principal: Option<usize>,
    signature: Option<usize>,
}

impl RowSchema {
    /// Identity, name and start-date columns are required; everything else is optional.
    pub fn resolve(
        tab: &str,
        profile: Profile,
        names: &ColumnNames,
        map: &ColumnMap,
    ) -> SyncResult<Self> {
        let required = |column: &str| {
            map.index_of(column).ok_or_else(|| SyncError::MissingColumn {
                tab: tab.to_string(),
                column: column.to_string(),
            })
        };
        let optional = |column: &Option<String>| column.as_deref().and_then(|c| map.index_of(c));

        let schema = RowSchema {
            profile,
            id: required(&names.id)?,
            name: required(&names.name)?,
            start_date: required(&names.start_date)?,
            faculty: optional(&names.faculty),
            days: optional(&names.days),
            end_date: optional(&names.end_date),
            time: optional(&names.time),
            end_time: optional(&names.end_time),
            meridiem: optional(&names.meridiem),
            duration_hours: optional(&names.duration_hours),
            location: optional(&names.location),
            virtual_flag: optional(&names.virtual_flag),
            extras: names.extras.iter().filter_map(|c| map.index_of(c)).collect(),
            principal: optional(&names.principal),
            signature: optional(&names.signature),
        };
        tracing::debug!(tab, ?schema, "resolved row schema");
        Ok(schema)
    }

    pub fn id_column(&self) -> usize {
        self.id
    }

    pub fn signature_column(&self) -> Option<usize> {
        self.signature
    }

    pub fn extract(&self, sheet_row: usize, cells: &[CellValue]) -> SourceRow {
        let cell = |i: Option<usize>| i.and_then(|i| cells.get(i)).cloned().unwrap_or_default();
        let text = |i: Option<usize>| cell(i).as_text();

        let row_id = Some(clean_identity(&text(Some(self.id)))).filter(|id| !id.is_empty());
        let principal = Some(text(self.principal)).filter(|p| !p.is_empty());

        SourceRow {
            sheet_row,
            row_id,
            name: text(Some(self.name)),
            faculty: text(self.faculty),
            days: text(self.days),
            start_date: cell(Some(self.start_date)),
            end_date: cell(self.end_date),
            time: cell(self.time),
            end_time: cell(self.end_time),
            meridiem: text(self.meridiem),
            duration_hours: cell(self.duration_hours),
            location: text(self.location),
            is_virtual: cell(self.virtual_flag).as_bool(),
            extras: self
                .extras
                .iter()
                .map(|i| text(Some(*i)))
                .filter(|s| !s.is_empty())
                .collect(),
            principal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(names: &[&str]) -> ColumnMap {
        let row: Vec<CellValue> = names.iter().map(|n| CellValue::from(*n)).collect();
        ColumnMap::from_header(&row)
    }

    #[test]
    fn test_missing_identity_column_is_config_error() {
        let map = header(&["Course", "Start Date"]);
        let names = ColumnNames::for_profile(Profile::Course);
        let err = RowSchema::resolve("Courses", Profile::Course, &names, &map).unwrap_err();
        assert!(matches!(err, SyncError::MissingColumn { ref column, .. } if column == "eventid"));
    }

    #[test]
    fn test_missing_start_date_is_config_error() {
        let map = header(&["Event ID", "Course"]);
        let names = ColumnNames::for_profile(Profile::Course);
        assert!(RowSchema::resolve("Courses", Profile::Course, &names, &map).is_err());
    }

    #[test]
    fn test_extract_course_row() {
        let map = header(&[
            "Event ID",
            "Course",
            "Faculty",
            "Day",
            "Start Date",
            "End Date",
            "Run Time",
            "Zoom Link",
        ]);
        let names = ColumnNames::for_profile(Profile::Course);
        let schema = RowSchema::resolve("Courses", Profile::Course, &names, &map).unwrap();

        let row = vec![
            CellValue::text(" C1\u{a0}"),
            CellValue::text("Bio 101"),
            CellValue::text("Smith"),
            CellValue::text("Monday"),
            CellValue::text("2024-09-02"),
            CellValue::text("2024-12-13"),
            CellValue::text("9:00 - 11:00"),
            CellValue::Empty,
        ];
        let source = schema.extract(5, &row);
        assert_eq!(source.row_id.as_deref(), Some("C1"));
        assert_eq!(source.name, "Bio 101");
        assert_eq!(source.faculty, "Smith");
        assert_eq!(source.sheet_row, 5);
        assert!(source.extras.is_empty());
        assert!(source.principal.is_none());
        assert_eq!(source.meridiem, "");
    }

    #[test]
    fn test_blank_identity_is_none() {
        let map = header(&["Event ID", "Course", "Start Date"]);
        let names = ColumnNames::for_profile(Profile::Course);
        let schema = RowSchema::resolve("Courses", Profile::Course, &names, &map).unwrap();
        let source = schema.extract(1, &[CellValue::text("  "), CellValue::text("Chem")]);
        assert!(source.row_id.is_none());
        assert!(source.start_date.is_empty());
    }

    #[test]
    fn test_clean_identity() {
        assert_eq!(clean_identity(" evt-1a2b\n"), "evt-1a2b");
        assert_eq!(clean_identity("C#1 (dup)"), "C1dup");
        assert_eq!(clean_identity("ann@x.org"), "ann@x.org");
    }
}
