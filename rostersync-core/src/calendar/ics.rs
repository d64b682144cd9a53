//! .ics generation and parsing for the calendar directory backend.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use icalendar::{
    Calendar, CalendarDateTime, Component, DatePerhapsTime, Property,
    parser::{read_calendar, unfold},
};

use crate::error::{SyncError, SyncResult};
use crate::normalize::WeeklyRule;
use crate::normalize::local_instant;
use crate::normalize::weekday::weekday_code;

const TAG_PROPERTY: &str = "X-ROSTERSYNC-TAG";
const UTC_FORMAT: &str = "%Y%m%dT%H%M%SZ";
const LOCAL_FORMAT: &str = "%Y%m%dT%H%M%S";

/// One stored VEVENT: a single event or the master of a weekly series.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct IcsEntry {
    pub uid: String,
    pub title: String,
    pub location: String,
    pub description: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub guests: BTreeSet<String>,
    pub tags: BTreeMap<String, String>,
    pub rrule: Option<String>,
    pub exdates: BTreeSet<DateTime<Utc>>,
}

/// `FREQ=WEEKLY;BYDAY=MO,WE;UNTIL=...Z`, with UNTIL at the end of the last local day.
pub(super) fn weekly_rrule(rule: &WeeklyRule, tz: &Tz) -> String {
    let days: Vec<&str> = rule.weekdays.iter().map(|d| weekday_code(*d)).collect();
    let last_second = NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN);
    let until = local_instant(tz, rule.until, last_second)
        .unwrap_or_else(|| rule.until.and_time(last_second).and_utc());
    format!(
        "FREQ=WEEKLY;BYDAY={};UNTIL={}",
        days.join(","),
        until.format(UTC_FORMAT)
    )
}

/// RFC 5545 TEXT escaping.
fn escape_text(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace(';', "\\;")
        .replace(',', "\\,")
        .replace("\r\n", "\\n")
        .replace('\n', "\\n")
}

fn unescape_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') | Some('N') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

pub(super) fn generate_ics(entry: &IcsEntry, tz: &Tz) -> SyncResult<String> {
    let mut cal = Calendar::new();

    let mut ics_event = icalendar::Event::new();
    ics_event.uid(&entry.uid);
    ics_event.append_property(Property::new("SUMMARY", escape_text(&entry.title)));
    ics_event.add_property("DTSTAMP", Utc::now().format(UTC_FORMAT).to_string());

    add_local_datetime(&mut ics_event, "DTSTART", entry.start, tz);
    add_local_datetime(&mut ics_event, "DTEND", entry.end, tz);

    if !entry.description.is_empty() {
        ics_event.append_property(Property::new("DESCRIPTION", escape_text(&entry.description)));
    }
    if !entry.location.is_empty() {
        ics_event.append_property(Property::new("LOCATION", escape_text(&entry.location)));
    }

    if let Some(rrule) = &entry.rrule {
        ics_event.add_property("RRULE", rrule);
        for exdate in &entry.exdates {
            let prop = Property::new("EXDATE", exdate.format(UTC_FORMAT).to_string());
            ics_event.append_multi_property(prop);
        }
    }

    for guest in &entry.guests {
        let prop = Property::new("ATTENDEE", format!("mailto:{guest}"));
        ics_event.append_multi_property(prop);
    }

    for (key, value) in &entry.tags {
        let mut prop = Property::new(TAG_PROPERTY, escape_text(value));
        prop.add_parameter("KEY", key);
        ics_event.append_multi_property(prop);
    }

    cal.push(ics_event.done());
    let cal = cal.done();

    let output = strip_ics_bloat(&cal.to_string());
    if !output.contains("BEGIN:VEVENT") {
        return Err(SyncError::IcsGenerate(format!("no VEVENT written for {}", entry.uid)));
    }
    Ok(output)
}

/// Fixed PRODID, no CALSCALE (GREGORIAN is the default).
fn strip_ics_bloat(ics: &str) -> String {
    let mut result = String::with_capacity(ics.len());
    for line in ics.lines() {
        if line.starts_with("PRODID:") {
            result.push_str("PRODID:ROSTERSYNC\r\n");
            continue;
        }
        if line == "CALSCALE:GREGORIAN" {
            continue;
        }
        result.push_str(line);
        result.push_str("\r\n");
    }
    result
}

fn add_local_datetime(ics_event: &mut icalendar::Event, name: &str, at: DateTime<Utc>, tz: &Tz) {
    let local = at.with_timezone(tz).naive_local();
    let mut prop = Property::new(name, local.format(LOCAL_FORMAT).to_string());
    prop.add_parameter("TZID", tz.name());
    ics_event.append_property(prop);
}

pub(super) fn parse_ics(content: &str, default_tz: &Tz) -> Option<IcsEntry> {
    let unfolded = unfold(content);
    let calendar = read_calendar(&unfolded).ok()?;
    let vevent = calendar.components.iter().find(|c| c.name == "VEVENT")?;

    let uid = vevent.find_prop("UID")?.val.to_string();
    let text = |name: &str| {
        vevent
            .find_prop(name)
            .map(|p| unescape_text(p.val.as_ref()))
            .unwrap_or_default()
    };
    let start = to_utc(DatePerhapsTime::try_from(vevent.find_prop("DTSTART")?).ok()?, default_tz)?;
    let end = to_utc(DatePerhapsTime::try_from(vevent.find_prop("DTEND")?).ok()?, default_tz)?;

    let rrule = vevent.find_prop("RRULE").map(|p| p.val.to_string());
    let exdates = vevent
        .properties
        .iter()
        .filter(|p| p.name == "EXDATE")
        .flat_map(|p| {
            p.val
                .as_ref()
                .split(',')
                .filter_map(|s| NaiveDateTime::parse_from_str(s.trim(), UTC_FORMAT).ok())
                .map(|dt| dt.and_utc())
                .collect::<Vec<_>>()
        })
        .collect();

    let guests = vevent
        .properties
        .iter()
        .filter(|p| p.name == "ATTENDEE")
        .map(|p| {
            let val = p.val.as_ref();
            val.strip_prefix("mailto:")
                .or_else(|| val.strip_prefix("MAILTO:"))
                .unwrap_or(val)
                .to_lowercase()
        })
        .collect();

    let tags = vevent
        .properties
        .iter()
        .filter(|p| p.name == TAG_PROPERTY)
        .filter_map(|p| {
            let key = p
                .params
                .iter()
                .find(|param| param.key == "KEY")
                .and_then(|param| param.val.as_ref().map(|v| v.to_string()))?;
            Some((key, unescape_text(p.val.as_ref())))
        })
        .collect();

    Some(IcsEntry {
        uid,
        title: text("SUMMARY"),
        location: text("LOCATION"),
        description: text("DESCRIPTION"),
        start,
        end,
        guests,
        tags,
        rrule,
        exdates,
    })
}

fn to_utc(dpt: DatePerhapsTime, default_tz: &Tz) -> Option<DateTime<Utc>> {
    let in_zone = |tz: &Tz, naive: NaiveDateTime| {
        tz.from_local_datetime(&naive)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
    };
    match dpt {
        DatePerhapsTime::Date(d) => in_zone(default_tz, d.and_time(NaiveTime::MIN)),
        DatePerhapsTime::DateTime(CalendarDateTime::Utc(dt)) => Some(dt),
        DatePerhapsTime::DateTime(CalendarDateTime::Floating(naive)) => in_zone(default_tz, naive),
        DatePerhapsTime::DateTime(CalendarDateTime::WithTimezone { date_time, tzid }) => {
            let tz = tzid.parse::<Tz>().unwrap_or(*default_tz);
            in_zone(&tz, date_time)
        }
    }
}
