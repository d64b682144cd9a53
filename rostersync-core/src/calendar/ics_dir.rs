//! Calendar backed by a directory of .ics files.
//!
//! One file per single event or per series master. Series are expanded with the
//! `rrule` crate; deleting one instance of a series records an EXDATE.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use chrono_tz::Tz;
use rrule::RRuleSet;
use slug::slugify;

use super::ics::{IcsEntry, generate_ics, parse_ics, weekly_rrule};
use super::{CalendarEvent, CalendarService, DateRange, EventPatch, NewEvent, SeriesInfo, Target};
use crate::error::{SyncError, SyncResult};
use crate::normalize::WeeklyRule;

const INSTANCE_SEPARATOR: char = '/';
const MAX_INSTANCES: u16 = 2000;

pub struct IcsDirCalendar {
    id: String,
    dir: PathBuf,
    tz: Tz,
}

impl IcsDirCalendar {
    /// Open `<root>/<calendar_id>`; the directory must exist.
    pub fn open(root: &Path, calendar_id: &str, tz: Tz) -> SyncResult<Self> {
        let dir = root.join(calendar_id);
        if !dir.is_dir() {
            return Err(SyncError::CalendarNotFound(format!(
                "{calendar_id} (no directory at {})",
                dir.display()
            )));
        }
        Ok(IcsDirCalendar {
            id: calendar_id.to_string(),
            dir,
            tz,
        })
    }

    /// Create `<root>/<calendar_id>` if needed and open it.
    pub fn create(root: &Path, calendar_id: &str, tz: Tz) -> SyncResult<Self> {
        std::fs::create_dir_all(root.join(calendar_id))?;
        Self::open(root, calendar_id, tz)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entries(&self) -> SyncResult<Vec<(PathBuf, IcsEntry)>> {
        let mut entries = Vec::new();
        for dir_entry in std::fs::read_dir(&self.dir)? {
            let path = dir_entry?.path();
            if path.extension().is_none_or(|ext| ext != "ics") {
                continue;
            }
            let content = std::fs::read_to_string(&path)?;
            match parse_ics(&content, &self.tz) {
                Some(entry) => entries.push((path, entry)),
                None => tracing::warn!(path = %path.display(), "skipping unreadable .ics file"),
            }
        }
        Ok(entries)
    }

    fn find(&self, uid: &str) -> SyncResult<(PathBuf, IcsEntry)> {
        self.entries()?
            .into_iter()
            .find(|(_, e)| e.uid == uid)
            .ok_or_else(|| SyncError::Calendar(format!("no event with uid {uid}")))
    }

    fn write(&self, path: &Path, entry: &IcsEntry) -> SyncResult<()> {
        let content = generate_ics(entry, &self.tz)?;
        let temp = path.with_extension("ics.tmp");
        std::fs::write(&temp, content)?;
        std::fs::rename(&temp, path)?;
        Ok(())
    }

    /// `2024-09-02T0900__bio-101.ics` for single events,
    /// `_recurring__bio-101.ics` for series; `-2`, `-3`, ... on collision.
    fn path_for(&self, entry: &IcsEntry) -> PathBuf {
        let slug = slugify(&entry.title);
        let base = if entry.rrule.is_some() {
            format!("_recurring__{slug}")
        } else {
            let local = entry.start.with_timezone(&self.tz);
            format!("{}__{}", local.format("%Y-%m-%dT%H%M"), slug)
        };

        let candidate = self.dir.join(format!("{base}.ics"));
        if !candidate.exists() {
            return candidate;
        }
        (2..)
            .map(|n| self.dir.join(format!("{base}-{n}.ics")))
            .find(|p| !p.exists())
            .unwrap_or(candidate)
    }

    fn insert(&mut self, event: &NewEvent, rrule: Option<String>) -> SyncResult<String> {
        let entry = IcsEntry {
            uid: uuid::Uuid::new_v4().to_string(),
            title: event.title.clone(),
            location: event.location.clone(),
            description: event.description.clone(),
            start: event.start,
            end: event.end,
            guests: event.guests.iter().map(|g| g.to_lowercase()).collect(),
            tags: Default::default(),
            rrule,
            exdates: Default::default(),
        };
        let path = self.path_for(&entry);
        self.write(&path, &entry)?;
        tracing::debug!(uid = %entry.uid, path = %path.display(), "created calendar entry");
        Ok(entry.uid)
    }

    /// Apply `edit` to the whole event or series named by `target`.
    fn edit(&mut self, target: &Target, edit: impl FnOnce(&mut IcsEntry)) -> SyncResult<()> {
        let uid = match target {
            Target::Series(uid) => uid.as_str(),
            Target::Event(id) if id.contains(INSTANCE_SEPARATOR) => {
                return Err(SyncError::Calendar(format!("cannot edit single instance {target}")));
            }
            Target::Event(uid) => uid.as_str(),
        };
        let (path, mut entry) = self.find(uid)?;
        if matches!(target, Target::Series(_)) && entry.rrule.is_none() {
            return Err(SyncError::Calendar(format!("{target} is not a series")));
        }
        edit(&mut entry);
        self.write(&path, &entry)
    }

    /// Occurrence starts of a series master inside `range`.
    fn expand(
        &self,
        entry: &IcsEntry,
        rrule: &str,
        range: &DateRange,
    ) -> SyncResult<Vec<DateTime<Utc>>> {
        let local_start = entry.start.with_timezone(&self.tz).naive_local();
        let mut lines = vec![
            format!(
                "DTSTART;TZID={}:{}",
                self.tz.name(),
                local_start.format("%Y%m%dT%H%M%S")
            ),
            format!("RRULE:{rrule}"),
        ];
        for exdate in &entry.exdates {
            lines.push(format!("EXDATE:{}", exdate.format("%Y%m%dT%H%M%SZ")));
        }

        let rrule_set: RRuleSet = lines.join("\n").parse().map_err(|e| {
            SyncError::IcsParse(format!("Failed to parse RRULE for event '{}': {}", entry.uid, e))
        })?;

        // after/before are exclusive; widen by the event length so overlapping
        // instances that start before the window are included
        let tz: rrule::Tz = Utc.into();
        let duration = entry.end - entry.start;
        let after = range
            .from
            .checked_sub_signed(duration + Duration::seconds(1))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
            .with_timezone(&tz);
        let before = range
            .to
            .checked_add_signed(Duration::seconds(1))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
            .with_timezone(&tz);

        let result = rrule_set.after(after).before(before).all(MAX_INSTANCES);
        Ok(result
            .dates
            .iter()
            .map(|dt| dt.with_timezone(&Utc))
            .filter(|start| !entry.exdates.contains(start))
            .collect())
    }
}

fn instance_id(uid: &str, start: DateTime<Utc>) -> String {
    format!("{uid}{INSTANCE_SEPARATOR}{}", start.format("%Y%m%dT%H%M%SZ"))
}

impl CalendarService for IcsDirCalendar {
    fn calendar_id(&self) -> &str {
        &self.id
    }

    fn events_between(&self, range: &DateRange) -> SyncResult<Vec<CalendarEvent>> {
        let mut events = Vec::new();

        for (_, entry) in self.entries()? {
            let to_event = |id: String, start: DateTime<Utc>, series: Option<SeriesInfo>| {
                let tags = if series.is_some() {
                    Default::default()
                } else {
                    entry.tags.clone()
                };
                CalendarEvent {
                    id,
                    series,
                    title: entry.title.clone(),
                    location: entry.location.clone(),
                    description: entry.description.clone(),
                    start,
                    end: start + (entry.end - entry.start),
                    guests: entry.guests.clone(),
                    tags,
                }
            };

            match &entry.rrule {
                None => {
                    if range.overlaps(entry.start, entry.end) {
                        events.push(to_event(entry.uid.clone(), entry.start, None));
                    }
                }
                Some(rrule) => {
                    let series = SeriesInfo {
                        id: entry.uid.clone(),
                        tags: entry.tags.clone(),
                    };
                    for start in self.expand(&entry, rrule, range)? {
                        let id = instance_id(&entry.uid, start);
                        let event = to_event(id, start, Some(series.clone()));
                        if range.overlaps(event.start, event.end) {
                            events.push(event);
                        }
                    }
                }
            }
        }

        events.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.id.cmp(&b.id)));
        Ok(events)
    }

    fn create_event(&mut self, event: &NewEvent) -> SyncResult<Target> {
        self.insert(event, None).map(Target::Event)
    }

    fn create_series(&mut self, event: &NewEvent, rule: &WeeklyRule) -> SyncResult<Target> {
        let rrule = weekly_rrule(rule, &self.tz);
        self.insert(event, Some(rrule)).map(Target::Series)
    }

    fn set_tag(&mut self, target: &Target, key: &str, value: &str) -> SyncResult<()> {
        self.edit(target, |entry| {
            entry.tags.insert(key.to_string(), value.to_string());
        })
    }

    fn update(&mut self, target: &Target, patch: &EventPatch) -> SyncResult<()> {
        self.edit(target, |entry| {
            if let Some(title) = &patch.title {
                entry.title = title.clone();
            }
            if let Some(location) = &patch.location {
                entry.location = location.clone();
            }
            if let Some(description) = &patch.description {
                entry.description = description.clone();
            }
            if let Some((start, end)) = patch.time {
                entry.start = start;
                entry.end = end;
            }
        })
    }

    fn add_guest(&mut self, target: &Target, address: &str) -> SyncResult<()> {
        self.edit(target, |entry| {
            entry.guests.insert(address.to_lowercase());
        })
    }

    fn remove_guest(&mut self, target: &Target, address: &str) -> SyncResult<()> {
        self.edit(target, |entry| {
            entry.guests.remove(&address.to_lowercase());
        })
    }

    fn delete(&mut self, target: &Target) -> SyncResult<()> {
        match target {
            Target::Event(id) if id.contains(INSTANCE_SEPARATOR) => {
                let (uid, stamp) = id
                    .split_once(INSTANCE_SEPARATOR)
                    .ok_or_else(|| SyncError::Calendar(format!("bad instance id {id}")))?;
                let start = NaiveDateTime::parse_from_str(stamp, "%Y%m%dT%H%M%SZ")
                    .map_err(|_| SyncError::Calendar(format!("bad instance id {id}")))?
                    .and_utc();
                let (path, mut entry) = self.find(uid)?;
                entry.exdates.insert(start);
                self.write(&path, &entry)
            }
            Target::Event(uid) | Target::Series(uid) => {
                let (path, entry) = self.find(uid)?;
                if matches!(target, Target::Series(_)) && entry.rrule.is_none() {
                    return Err(SyncError::Calendar(format!("{target} is not a series")));
                }
                std::fs::remove_file(&path)?;
                Ok(())
            }
        }
    }
}
