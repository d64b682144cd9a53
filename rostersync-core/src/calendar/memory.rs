//! In-memory calendar double with a write journal and injectable failures.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Datelike, Utc};
use chrono_tz::Tz;

use super::{CalendarEvent, CalendarService, DateRange, EventPatch, NewEvent, SeriesInfo, Target};
use crate::error::{SyncError, SyncResult};
use crate::normalize::{WeeklyRule, local_instant};

/// One mutating call, in the order it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CalendarWrite {
    Created { id: String, title: String, recurring: bool },
    Tagged { target: Target, key: String, value: String },
    Updated { target: Target },
    GuestAdded { target: Target, address: String },
    GuestRemoved { target: Target, address: String },
    Deleted { target: Target },
}

#[derive(Debug, Clone)]
struct Item {
    title: String,
    location: String,
    description: String,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    guests: BTreeSet<String>,
    tags: BTreeMap<String, String>,
    rule: Option<WeeklyRule>,
    exdates: BTreeSet<DateTime<Utc>>,
}

impl Item {
    fn new(event: &NewEvent, rule: Option<WeeklyRule>) -> Self {
        Item {
            title: event.title.clone(),
            location: event.location.clone(),
            description: event.description.clone(),
            start: event.start,
            end: event.end,
            guests: event.guests.iter().map(|g| g.to_lowercase()).collect(),
            tags: BTreeMap::new(),
            rule,
            exdates: BTreeSet::new(),
        }
    }
}

#[derive(Debug)]
pub struct MemoryCalendar {
    id: String,
    tz: Tz,
    items: BTreeMap<String, Item>,
    next_id: u64,
    writes: Vec<CalendarWrite>,
    queries: RefCell<Vec<DateRange>>,
    failing_titles: Vec<String>,
    fail_series_deletes: bool,
    fail_tags: bool,
}

fn instance_id(series_id: &str, start: DateTime<Utc>) -> String {
    format!("{series_id}_{}", start.format("%Y%m%dT%H%M%SZ"))
}

impl MemoryCalendar {
    pub fn new(id: &str, tz: Tz) -> Self {
        MemoryCalendar {
            id: id.to_string(),
            tz,
            items: BTreeMap::new(),
            next_id: 1,
            writes: Vec::new(),
            queries: RefCell::new(Vec::new()),
            failing_titles: Vec::new(),
            fail_series_deletes: false,
            fail_tags: false,
        }
    }

    /// Seed a single event without journaling it.
    pub fn insert_event(&mut self, event: &NewEvent, tags: &[(&str, &str)]) -> String {
        self.insert(Item::new(event, None), tags)
    }

    /// Seed a weekly series without journaling it.
    pub fn insert_series(
        &mut self,
        event: &NewEvent,
        rule: &WeeklyRule,
        tags: &[(&str, &str)],
    ) -> String {
        self.insert(Item::new(event, Some(rule.clone())), tags)
    }

    fn insert(&mut self, mut item: Item, tags: &[(&str, &str)]) -> String {
        item.tags = tags
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let id = format!("m{}", self.next_id);
        self.next_id += 1;
        self.items.insert(id.clone(), item);
        id
    }

    /// Every write touching an event whose title contains `fragment` fails.
    pub fn fail_writes_for(&mut self, fragment: &str) {
        self.failing_titles.push(fragment.to_string());
    }

    /// Series deletes fail, forcing the per-instance fallback.
    pub fn fail_series_deletes(&mut self) {
        self.fail_series_deletes = true;
    }

    /// While on, every `set_tag` fails.
    pub fn fail_tagging(&mut self, on: bool) {
        self.fail_tags = on;
    }

    pub fn writes(&self) -> &[CalendarWrite] {
        &self.writes
    }

    pub fn clear_writes(&mut self) {
        self.writes.clear();
    }

    /// Every window passed to `events_between`, in order.
    pub fn queries(&self) -> Vec<DateRange> {
        self.queries.borrow().clone()
    }

    /// Stored single events plus series (not expanded).
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn check_title(&self, title: &str) -> SyncResult<()> {
        match self.failing_titles.iter().find(|f| title.contains(f.as_str())) {
            Some(f) => Err(SyncError::Calendar(format!("injected failure for '{f}'"))),
            None => Ok(()),
        }
    }

    /// Master id plus, for a series instance, the instance start.
    fn locate(&self, target: &Target) -> SyncResult<(String, Option<DateTime<Utc>>)> {
        let not_found = || SyncError::Calendar(format!("{target} not found"));
        match target {
            Target::Series(id) => match self.items.get(id) {
                Some(item) if item.rule.is_some() => Ok((id.clone(), None)),
                _ => Err(not_found()),
            },
            Target::Event(id) if self.items.contains_key(id) => Ok((id.clone(), None)),
            Target::Event(id) => {
                let (series, stamp) = id.rsplit_once('_').ok_or_else(not_found)?;
                let start = chrono::NaiveDateTime::parse_from_str(stamp, "%Y%m%dT%H%M%SZ")
                    .map_err(|_| not_found())?
                    .and_utc();
                let item = self.items.get(series).ok_or_else(not_found)?;
                if self.occurrences(item).iter().any(|(s, _)| *s == start) {
                    Ok((series.to_string(), Some(start)))
                } else {
                    Err(not_found())
                }
            }
        }
    }

    /// Whole-object target for edits; instance edits are not supported.
    fn master_mut(&mut self, target: &Target) -> SyncResult<&mut Item> {
        let (id, instance) = self.locate(target)?;
        if instance.is_some() {
            return Err(SyncError::Calendar(format!("cannot edit single instance {target}")));
        }
        let title = self.items[&id].title.clone();
        self.check_title(&title)?;
        self.items
            .get_mut(&id)
            .ok_or_else(|| SyncError::Calendar(format!("{target} not found")))
    }

    fn occurrences(&self, item: &Item) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
        let Some(rule) = &item.rule else {
            return vec![(item.start, item.end)];
        };
        let duration = item.end - item.start;
        let local = item.start.with_timezone(&self.tz);
        let time = local.time();

        local
            .date_naive()
            .iter_days()
            .take_while(|d| *d <= rule.until)
            .filter(|d| rule.weekdays.contains(&d.weekday()))
            .filter_map(|d| local_instant(&self.tz, d, time))
            .filter(|s| !item.exdates.contains(s))
            .map(|s| (s, s + duration))
            .collect()
    }
}

impl CalendarService for MemoryCalendar {
    fn calendar_id(&self) -> &str {
        &self.id
    }

    fn events_between(&self, range: &DateRange) -> SyncResult<Vec<CalendarEvent>> {
        self.queries.borrow_mut().push(*range);

        let mut events = Vec::new();
        for (id, item) in &self.items {
            let series = item.rule.as_ref().map(|_| SeriesInfo {
                id: id.clone(),
                tags: item.tags.clone(),
            });
            for (start, end) in self.occurrences(item) {
                if !range.overlaps(start, end) {
                    continue;
                }
                let (event_id, tags) = match &series {
                    Some(_) => (instance_id(id, start), BTreeMap::new()),
                    None => (id.clone(), item.tags.clone()),
                };
                events.push(CalendarEvent {
                    id: event_id,
                    series: series.clone(),
                    title: item.title.clone(),
                    location: item.location.clone(),
                    description: item.description.clone(),
                    start,
                    end,
                    guests: item.guests.clone(),
                    tags,
                });
            }
        }
        events.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.id.cmp(&b.id)));
        Ok(events)
    }

    fn create_event(&mut self, event: &NewEvent) -> SyncResult<Target> {
        self.check_title(&event.title)?;
        let id = self.insert(Item::new(event, None), &[]);
        self.writes.push(CalendarWrite::Created {
            id: id.clone(),
            title: event.title.clone(),
            recurring: false,
        });
        Ok(Target::Event(id))
    }

    fn create_series(&mut self, event: &NewEvent, rule: &WeeklyRule) -> SyncResult<Target> {
        self.check_title(&event.title)?;
        let id = self.insert(Item::new(event, Some(rule.clone())), &[]);
        self.writes.push(CalendarWrite::Created {
            id: id.clone(),
            title: event.title.clone(),
            recurring: true,
        });
        Ok(Target::Series(id))
    }

    fn set_tag(&mut self, target: &Target, key: &str, value: &str) -> SyncResult<()> {
        if self.fail_tags {
            return Err(SyncError::Calendar(format!("injected failure tagging {target}")));
        }
        let item = self.master_mut(target)?;
        item.tags.insert(key.to_string(), value.to_string());
        self.writes.push(CalendarWrite::Tagged {
            target: target.clone(),
            key: key.to_string(),
            value: value.to_string(),
        });
        Ok(())
    }

    fn update(&mut self, target: &Target, patch: &EventPatch) -> SyncResult<()> {
        let item = self.master_mut(target)?;
        if let Some(title) = &patch.title {
            item.title = title.clone();
        }
        if let Some(location) = &patch.location {
            item.location = location.clone();
        }
        if let Some(description) = &patch.description {
            item.description = description.clone();
        }
        if let Some((start, end)) = patch.time {
            item.start = start;
            item.end = end;
        }
        self.writes.push(CalendarWrite::Updated {
            target: target.clone(),
        });
        Ok(())
    }

    fn add_guest(&mut self, target: &Target, address: &str) -> SyncResult<()> {
        let item = self.master_mut(target)?;
        item.guests.insert(address.to_lowercase());
        self.writes.push(CalendarWrite::GuestAdded {
            target: target.clone(),
            address: address.to_lowercase(),
        });
        Ok(())
    }

    fn remove_guest(&mut self, target: &Target, address: &str) -> SyncResult<()> {
        let item = self.master_mut(target)?;
        item.guests.remove(&address.to_lowercase());
        self.writes.push(CalendarWrite::GuestRemoved {
            target: target.clone(),
            address: address.to_lowercase(),
        });
        Ok(())
    }

    fn delete(&mut self, target: &Target) -> SyncResult<()> {
        if self.fail_series_deletes && matches!(target, Target::Series(_)) {
            return Err(SyncError::Calendar(format!("injected failure deleting {target}")));
        }
        let (id, instance) = self.locate(target)?;
        self.check_title(&self.items[&id].title)?;
        match instance {
            Some(start) => {
                if let Some(item) = self.items.get_mut(&id) {
                    item.exdates.insert(start);
                }
            }
            None => {
                self.items.remove(&id);
            }
        }
        self.writes.push(CalendarWrite::Deleted {
            target: target.clone(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Weekday};
    use chrono_tz::America::New_York;

    fn utc(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    fn class() -> NewEvent {
        NewEvent {
            title: "Bio 101 - Smith".into(),
            start: utc("2024-09-02T13:00:00Z"),
            end: utc("2024-09-02T15:00:00Z"),
            ..Default::default()
        }
    }

    fn mondays_through_sept() -> WeeklyRule {
        WeeklyRule {
            weekdays: vec![Weekday::Mon],
            until: NaiveDate::from_ymd_opt(2024, 9, 30).unwrap(),
        }
    }

    fn september() -> DateRange {
        DateRange::new(utc("2024-09-01T00:00:00Z"), utc("2024-10-01T00:00:00Z"))
    }

    #[test]
    fn test_series_expands_with_series_tags() {
        let mut cal = MemoryCalendar::new("staff", New_York);
        let tags = [("EventIdentityTag", "C1")];
        let id = cal.insert_series(&class(), &mondays_through_sept(), &tags);

        let events = cal.events_between(&september()).unwrap();
        assert_eq!(events.len(), 5);
        assert!(events.iter().all(|e| e.tag("EventIdentityTag") == Some("C1")));
        assert_eq!(events[0].target(), Target::Series(id));
        assert_eq!(cal.queries(), vec![september()]);
    }

    #[test]
    fn test_deleting_an_instance_leaves_the_rest() {
        let mut cal = MemoryCalendar::new("staff", New_York);
        cal.insert_series(&class(), &mondays_through_sept(), &[]);
        let events = cal.events_between(&september()).unwrap();

        cal.delete(&Target::Event(events[1].id.clone())).unwrap();
        assert_eq!(cal.events_between(&september()).unwrap().len(), 4);
        assert_eq!(cal.len(), 1);
    }

    #[test]
    fn test_instance_edits_are_rejected() {
        let mut cal = MemoryCalendar::new("staff", New_York);
        cal.insert_series(&class(), &mondays_through_sept(), &[]);
        let events = cal.events_between(&september()).unwrap();
        let instance = Target::Event(events[0].id.clone());
        assert!(cal.set_tag(&instance, "k", "v").is_err());
    }

    #[test]
    fn test_injected_failures() {
        let mut cal = MemoryCalendar::new("staff", New_York);
        cal.fail_writes_for("Bio");
        assert!(cal.create_event(&class()).is_err());
        assert!(cal.writes().is_empty());

        let mut cal = MemoryCalendar::new("staff", New_York);
        let id = cal.insert_series(&class(), &mondays_through_sept(), &[]);
        cal.fail_series_deletes();
        assert!(cal.delete(&Target::Series(id)).is_err());
    }

    #[test]
    fn test_journal_records_writes() {
        let mut cal = MemoryCalendar::new("staff", New_York);
        let target = cal.create_event(&class()).unwrap();
        cal.set_tag(&target, "EventIdentityTag", "C1").unwrap();
        cal.add_guest(&target, "Alice@X.org").unwrap();

        assert_eq!(cal.writes().len(), 3);
        let event = &cal.events_between(&september()).unwrap()[0];
        assert!(event.guests.contains("alice@x.org"));
        assert_eq!(event.tag("EventIdentityTag"), Some("C1"));
    }
}
