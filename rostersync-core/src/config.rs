//! Sync configuration.
//!
//! A `SyncConfig` is built once at startup (from a config file or the workbook's
//! settings store) and handed by reference to every subsystem.

use std::time::Duration;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::{SyncError, SyncResult};
use crate::lock::LockConfig;

/// Which kind of schedule the source tab holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Profile {
    /// Course meetings: "Course - Faculty" titles, building locations, meeting links.
    #[default]
    Course,
    /// Staffed shifts: "Description (Day)" titles, desk or Zoom location.
    Shift,
}

/// Header names for every logical field of a source row.
///
/// Names are matched after `normalize_header`, so "Start Date" and "startdate" are
/// the same column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnNames {
    pub id: String,
    pub name: String,
    pub faculty: Option<String>,
    pub days: Option<String>,
    pub start_date: String,
    pub end_date: Option<String>,
    pub time: Option<String>,
    pub end_time: Option<String>,
    pub meridiem: Option<String>,
    pub duration_hours: Option<String>,
    pub location: Option<String>,
    pub virtual_flag: Option<String>,
    pub extras: Vec<String>,
    pub principal: Option<String>,
    pub signature: Option<String>,
}

impl ColumnNames {
    pub fn for_profile(profile: Profile) -> Self {
        match profile {
            Profile::Course => ColumnNames {
                id: "eventid".into(),
                name: "course".into(),
                faculty: Some("faculty".into()),
                days: Some("day".into()),
                start_date: "startdate".into(),
                end_date: Some("enddate".into()),
                time: Some("runtime".into()),
                end_time: Some("endtime".into()),
                meridiem: Some("timeofday".into()),
                duration_hours: Some("durationhours".into()),
                location: Some("bxlocation".into()),
                virtual_flag: None,
                extras: vec!["zoomlink".into()],
                principal: Some("assignedstaff".into()),
                signature: None,
            },
            Profile::Shift => ColumnNames {
                id: "shiftid".into(),
                name: "description".into(),
                faculty: None,
                days: Some("dayofweek".into()),
                start_date: "startdate".into(),
                end_date: Some("enddate".into()),
                time: Some("starttime".into()),
                end_time: Some("endtime".into()),
                meridiem: None,
                duration_hours: None,
                location: Some("location".into()),
                virtual_flag: Some("iszoom".into()),
                extras: Vec::new(),
                principal: Some("assignedstaff".into()),
                signature: None,
            },
        }
    }
}

/// Per-field overrides on top of the profile's default column names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub faculty: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub days: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meridiem: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_hours: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub virtual_flag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extras: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub principal: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl ColumnOverrides {
    fn apply(&self, mut base: ColumnNames) -> ColumnNames {
        if let Some(v) = &self.id {
            base.id = v.clone();
        }
        if let Some(v) = &self.name {
            base.name = v.clone();
        }
        if let Some(v) = &self.start_date {
            base.start_date = v.clone();
        }
        if let Some(v) = &self.extras {
            base.extras = v.clone();
        }

        let optional = [
            (&self.faculty, &mut base.faculty),
            (&self.days, &mut base.days),
            (&self.end_date, &mut base.end_date),
            (&self.time, &mut base.time),
            (&self.end_time, &mut base.end_time),
            (&self.meridiem, &mut base.meridiem),
            (&self.duration_hours, &mut base.duration_hours),
            (&self.location, &mut base.location),
            (&self.virtual_flag, &mut base.virtual_flag),
            (&self.principal, &mut base.principal),
            (&self.signature, &mut base.signature),
        ];
        for (over, slot) in optional {
            if let Some(v) = over {
                *slot = Some(v.clone());
            }
        }

        base
    }
}

/// Keys of the two custom tags stored on calendar events and series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TagKeys {
    pub identity: String,
    pub signature: String,
}

impl Default for TagKeys {
    fn default() -> Self {
        TagKeys {
            identity: "EventIdentityTag".into(),
            signature: "TimeSignatureTag".into(),
        }
    }
}

/// Rate limiting between calendar writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Pacing {
    pub write_delay_ms: u64,
}

impl Default for Pacing {
    fn default() -> Self {
        Pacing { write_delay_ms: 500 }
    }
}

/// Exam proctoring calendar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExamConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calendar_id: Option<String>,
    pub tabs: Vec<String>,
    pub default_location: String,
    pub write_delay_ms: u64,
}

impl Default for ExamConfig {
    fn default() -> Self {
        ExamConfig {
            calendar_id: None,
            tabs: Vec::new(),
            default_location: "Nursing Dept".into(),
            write_delay_ms: 1500,
        }
    }
}

/// Read-only calendar scans.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InspectConfig {
    /// Calendars scanned when none are named; empty means the sync calendar.
    pub calendars: Vec<String>,
    pub event_types_tab: String,
}

impl Default for InspectConfig {
    fn default() -> Self {
        InspectConfig {
            calendars: Vec::new(),
            event_types_tab: "Event_Types".into(),
        }
    }
}

fn default_timezone() -> String {
    "UTC".into()
}

fn default_source_tab() -> String {
    "Courses".into()
}

fn default_staff_tab() -> String {
    "Staff".into()
}

fn default_assignments_tab() -> String {
    "Assignments".into()
}

fn default_id_prefix() -> String {
    "evt-".into()
}

fn default_duration_minutes() -> i64 {
    60
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub calendar_id: String,

    #[serde(default = "default_timezone")]
    pub timezone: String,

    #[serde(default)]
    pub profile: Profile,

    #[serde(default = "default_source_tab")]
    pub source_tab: String,

    #[serde(default = "default_staff_tab")]
    pub staff_tab: String,

    #[serde(default = "default_assignments_tab")]
    pub assignments_tab: String,

    #[serde(default)]
    pub columns: ColumnOverrides,

    #[serde(default)]
    pub tags: TagKeys,

    #[serde(default = "default_id_prefix")]
    pub id_prefix: String,

    #[serde(default = "default_duration_minutes")]
    pub default_duration_minutes: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub staff_domain: Option<String>,

    #[serde(default)]
    pub pacing: Pacing,

    #[serde(default)]
    pub lock: LockConfig,

    #[serde(default)]
    pub exams: ExamConfig,

    #[serde(default)]
    pub inspect: InspectConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            calendar_id: String::new(),
            timezone: default_timezone(),
            profile: Profile::default(),
            source_tab: default_source_tab(),
            staff_tab: default_staff_tab(),
            assignments_tab: default_assignments_tab(),
            columns: ColumnOverrides::default(),
            tags: TagKeys::default(),
            id_prefix: default_id_prefix(),
            default_duration_minutes: default_duration_minutes(),
            staff_domain: None,
            pacing: Pacing::default(),
            lock: LockConfig::default(),
            exams: ExamConfig::default(),
            inspect: InspectConfig::default(),
        }
    }
}

impl SyncConfig {
    /// Check everything a sync run needs before it touches either store.
    pub fn validate(&self) -> SyncResult<Tz> {
        if self.calendar_id.trim().is_empty() {
            return Err(SyncError::Config("calendar_id is not set".into()));
        }
        if self.default_duration_minutes <= 0 {
            return Err(SyncError::Config(format!(
                "default_duration_minutes must be positive, got {}",
                self.default_duration_minutes
            )));
        }
        self.tz()
    }

    pub fn tz(&self) -> SyncResult<Tz> {
        self.timezone
            .trim()
            .parse::<Tz>()
            .map_err(|_| SyncError::Config(format!("Unknown timezone '{}'", self.timezone)))
    }

    /// Column names for the configured profile with overrides applied.
    pub fn columns(&self) -> ColumnNames {
        self.columns.apply(ColumnNames::for_profile(self.profile))
    }

    pub fn write_delay(&self) -> Duration {
        Duration::from_millis(self.pacing.write_delay_ms)
    }
}
