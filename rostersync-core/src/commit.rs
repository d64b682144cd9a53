//! Commit engine: applies approved proposals to the calendar.
//!
//! Rows are written one at a time with a pause after each write. A failing row is
//! counted and logged and the batch moves on.

use std::collections::BTreeSet;
use std::time::Duration;

use chrono_tz::Tz;
use serde::Serialize;

use crate::calendar::{CalendarService, DateRange, EventPatch, NewEvent, Target};
use crate::config::{SyncConfig, TagKeys};
use crate::diff::{DiffField, MatchedEvent, SyncProposal, SyncStatus};
use crate::error::{SyncError, SyncResult};
use crate::guests::merge_guests;
use crate::staff::StaffDirectory;

/// Which proposals to commit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Selection {
    #[default]
    All,
    Rows(BTreeSet<String>),
}

impl Selection {
    pub fn rows<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Selection::Rows(ids.into_iter().map(Into::into).collect())
    }

    pub fn includes(&self, row_id: &str) -> bool {
        match self {
            Selection::All => true,
            Selection::Rows(ids) => ids.contains(row_id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowFailure {
    pub row_id: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CommitStats {
    pub created: usize,
    pub updated: usize,
    /// Series or events deleted and recreated for a schedule change.
    pub rebuilt: usize,
    pub unchanged: usize,
    pub errors: usize,
    pub failures: Vec<RowFailure>,
}

impl CommitStats {
    pub fn written(&self) -> usize {
        self.created + self.updated + self.rebuilt
    }
}

/// What happened to one committed row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowOutcome {
    Created(Target),
    Rebuilt(Target),
    Updated,
    /// Nothing to write.
    Unchanged,
    /// A NEW row whose identity was already on the calendar.
    AlreadyExists,
}

impl RowOutcome {
    fn wrote(&self) -> bool {
        matches!(self, RowOutcome::Created(_) | RowOutcome::Rebuilt(_) | RowOutcome::Updated)
    }

    /// Whether the calendar now carries the proposal's signature.
    pub fn signature_current(&self, proposal: &SyncProposal) -> bool {
        match self {
            RowOutcome::Created(_) | RowOutcome::Rebuilt(_) => true,
            RowOutcome::Updated => !proposal.has_diff(DiffField::Schedule),
            RowOutcome::Unchanged => proposal.status == SyncStatus::Synced,
            RowOutcome::AlreadyExists => false,
        }
    }
}

pub struct CommitEngine<'a> {
    calendar: &'a mut dyn CalendarService,
    directory: &'a StaffDirectory,
    tags: &'a TagKeys,
    tz: Tz,
    write_delay: Duration,
}

impl<'a> CommitEngine<'a> {
    pub fn new(
        calendar: &'a mut dyn CalendarService,
        directory: &'a StaffDirectory,
        config: &'a SyncConfig,
        tz: Tz,
    ) -> Self {
        CommitEngine {
            calendar,
            directory,
            tags: &config.tags,
            tz,
            write_delay: config.write_delay(),
        }
    }

    /// Commit every selected proposal. `on_committed` sees each row that didn't fail.
    pub fn commit_all(
        &mut self,
        proposals: &[SyncProposal],
        selection: &Selection,
        mut on_committed: impl FnMut(&SyncProposal, &RowOutcome),
    ) -> CommitStats {
        let mut stats = CommitStats::default();

        for proposal in proposals.iter().filter(|p| selection.includes(&p.row_id)) {
            match self.commit_one(proposal) {
                Ok(outcome) => {
                    match &outcome {
                        RowOutcome::Created(target) => {
                            tracing::info!(row_id = %proposal.row_id, %target, "created");
                            stats.created += 1;
                        }
                        RowOutcome::Rebuilt(target) => {
                            tracing::info!(
                                row_id = %proposal.row_id,
                                %target,
                                "rebuilt for schedule change"
                            );
                            stats.rebuilt += 1;
                        }
                        RowOutcome::Updated => {
                            tracing::info!(row_id = %proposal.row_id, "updated in place");
                            stats.updated += 1;
                        }
                        RowOutcome::Unchanged | RowOutcome::AlreadyExists => stats.unchanged += 1,
                    }
                    on_committed(proposal, &outcome);
                    if outcome.wrote() {
                        self.pause();
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        row_id = %proposal.row_id,
                        error = %e,
                        "commit failed; continuing"
                    );
                    stats.errors += 1;
                    stats.failures.push(RowFailure {
                        row_id: proposal.row_id.clone(),
                        message: e.to_string(),
                    });
                    self.pause();
                }
            }
        }

        tracing::info!(
            created = stats.created,
            updated = stats.updated,
            rebuilt = stats.rebuilt,
            unchanged = stats.unchanged,
            errors = stats.errors,
            "commit finished"
        );
        stats
    }

    fn pause(&self) {
        if !self.write_delay.is_zero() {
            std::thread::sleep(self.write_delay);
        }
    }

    pub fn commit_one(&mut self, proposal: &SyncProposal) -> SyncResult<RowOutcome> {
        match (&proposal.status, &proposal.matched) {
            (SyncStatus::Synced, Some(_)) => Ok(RowOutcome::Unchanged),
            (SyncStatus::New, _) | (_, None) => self.create(proposal),
            (_, Some(matched)) if proposal.needs_rebuild() => self.rebuild(proposal, matched),
            (_, Some(matched)) => self.patch(proposal, matched),
        }
    }

    fn tag(&mut self, target: &Target, proposal: &SyncProposal) -> SyncResult<()> {
        self.calendar.set_tag(target, &self.tags.identity, &proposal.row_id)?;
        self.calendar.set_tag(target, &self.tags.signature, &proposal.signature)
    }

    /// Create and tag. An object that can't be tagged is deleted again, so the
    /// calendar never holds an untagged copy of a row.
    fn insert(&mut self, event: &NewEvent, proposal: &SyncProposal) -> SyncResult<Target> {
        let recurrence = proposal.payload.schedule.value().and_then(|s| s.recurrence.as_ref());
        let target = match recurrence {
            Some(rule) => self.calendar.create_series(event, rule)?,
            None => self.calendar.create_event(event)?,
        };
        if let Err(e) = self.tag(&target, proposal) {
            if let Err(cleanup) = self.calendar.delete(&target) {
                tracing::error!(
                    row_id = %proposal.row_id,
                    %target,
                    error = %cleanup,
                    "could not remove untagged event"
                );
            }
            return Err(e);
        }
        Ok(target)
    }

    fn create(&mut self, proposal: &SyncProposal) -> SyncResult<RowOutcome> {
        let event = proposal.payload.new_event().ok_or_else(|| {
            SyncError::row(proposal.sheet_row, "cannot create without a title and schedule")
        })?;
        let first_date = proposal
            .payload
            .schedule
            .value()
            .map(|s| s.first_date)
            .ok_or_else(|| SyncError::row(proposal.sheet_row, "cannot create without a schedule"))?;

        // a stale preview may be committed twice
        let window = DateRange::day(first_date, &self.tz)?;
        let existing = self.calendar.events_between(&window)?;
        if existing
            .iter()
            .any(|e| e.tag(&self.tags.identity) == Some(proposal.row_id.as_str()))
        {
            tracing::info!(row_id = %proposal.row_id, "already on calendar; skipping create");
            return Ok(RowOutcome::AlreadyExists);
        }

        self.insert(&event, proposal).map(RowOutcome::Created)
    }

    fn rebuild(
        &mut self,
        proposal: &SyncProposal,
        matched: &MatchedEvent,
    ) -> SyncResult<RowOutcome> {
        let payload = &proposal.payload;
        let schedule = payload
            .schedule
            .value()
            .ok_or_else(|| SyncError::row(proposal.sheet_row, "rebuild without a schedule"))?;

        let guests = match payload.guests.value() {
            Some(desired) => {
                merge_guests(desired, &matched.guests, self.directory).apply(&matched.guests)
            }
            None => matched.guests.clone(),
        };
        let event = NewEvent {
            title: payload.title.value().unwrap_or(&matched.title).clone(),
            location: payload.location.value().unwrap_or(&matched.location).clone(),
            description: payload.description.value().unwrap_or(&matched.description).clone(),
            start: schedule.start,
            end: schedule.end,
            guests,
        };

        if let Err(e) = self.calendar.delete(&matched.target) {
            let instance = Target::Event(matched.event_id.clone());
            if matched.target == instance {
                return Err(e);
            }
            tracing::warn!(
                row_id = %proposal.row_id,
                error = %e,
                "series delete failed; deleting the matched instance"
            );
            self.calendar.delete(&instance)?;
        }

        self.insert(&event, proposal).map(RowOutcome::Rebuilt)
    }

    fn patch(&mut self, proposal: &SyncProposal, matched: &MatchedEvent) -> SyncResult<RowOutcome> {
        let payload = &proposal.payload;
        let changed = |field: DiffField| proposal.has_diff(field);

        let patch = EventPatch {
            title: payload.title.value().filter(|_| changed(DiffField::Title)).cloned(),
            location: payload.location.value().filter(|_| changed(DiffField::Location)).cloned(),
            description: payload
                .description
                .value()
                .filter(|_| changed(DiffField::Description))
                .cloned(),
            time: None,
        };

        let mut wrote = false;
        if !patch.is_empty() {
            self.calendar.update(&matched.target, &patch)?;
            wrote = true;
        }

        if let Some(desired) = payload.guests.value() {
            let merge = merge_guests(desired, &matched.guests, self.directory);
            for address in &merge.to_add {
                self.calendar.add_guest(&matched.target, address)?;
                wrote = true;
            }
            for address in &merge.to_remove {
                self.calendar.remove_guest(&matched.target, address)?;
                wrote = true;
            }
        }

        Ok(if wrote { RowOutcome::Updated } else { RowOutcome::Unchanged })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::{CalendarWrite, MemoryCalendar};
    use crate::diff::reconcile;
    use crate::normalize::{EventRecord, WeeklyRule};
    use chrono::{DateTime, NaiveDate, Utc, Weekday};
    use chrono_tz::America::New_York;

    fn utc(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    fn config() -> SyncConfig {
        let mut config = SyncConfig {
            calendar_id: "staff".into(),
            timezone: "America/New_York".into(),
            ..Default::default()
        };
        config.pacing.write_delay_ms = 0;
        config
    }

    fn record(id: &str, name: &str, end: &str) -> EventRecord {
        let date = NaiveDate::from_ymd_opt(2024, 9, 2).unwrap();
        let until = NaiveDate::from_ymd_opt(2024, 9, 30).unwrap();
        EventRecord {
            sheet_row: 1,
            row_id: Some(id.into()),
            name: name.into(),
            title: format!("{name} - Smith"),
            start: utc("2024-09-02T13:00:00Z"),
            end: utc(end),
            start_date: date,
            first_date: date,
            last_date: until,
            recurrence: Some(WeeklyRule {
                weekdays: vec![Weekday::Mon],
                until,
            }),
            days_label: "Monday".into(),
            location: "Hall 2".into(),
            description: String::new(),
            guests: BTreeSet::new(),
        }
    }

    fn september() -> DateRange {
        DateRange::days(
            NaiveDate::from_ymd_opt(2024, 9, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 9, 30).unwrap(),
            &New_York,
        )
        .unwrap()
    }

    fn preview_with(
        cal: &MemoryCalendar,
        records: &[EventRecord],
        directory: &StaffDirectory,
    ) -> Vec<SyncProposal> {
        let events = cal.events_between(&september()).unwrap();
        reconcile(records, &events, directory, &TagKeys::default())
    }

    fn preview(cal: &MemoryCalendar, records: &[EventRecord]) -> Vec<SyncProposal> {
        preview_with(cal, records, &StaffDirectory::new(Some("x.org")))
    }

    fn commit(
        cal: &mut MemoryCalendar,
        proposals: &[SyncProposal],
        selection: &Selection,
    ) -> CommitStats {
        let config = config();
        let directory = StaffDirectory::new(Some("x.org"));
        let mut engine = CommitEngine::new(cal, &directory, &config, New_York);
        engine.commit_all(proposals, selection, |_, _| {})
    }

    #[test]
    fn test_new_series_is_created_and_tagged() {
        let mut cal = MemoryCalendar::new("staff", New_York);
        let proposals = preview(&cal, &[record("C1", "Bio 101", "2024-09-02T15:00:00Z")]);

        let stats = commit(&mut cal, &proposals, &Selection::All);
        assert_eq!(stats.created, 1);
        assert_eq!(
            cal.writes()[0],
            CalendarWrite::Created {
                id: "m1".into(),
                title: "Bio 101 - Smith".into(),
                recurring: true
            }
        );
        let events = cal.events_between(&september()).unwrap();
        assert_eq!(events.len(), 5);
        assert!(events.iter().all(|e| e.tag("EventIdentityTag") == Some("C1")));
        assert_eq!(events[0].tag("TimeSignatureTag"), Some(proposals[0].signature.as_str()));
    }

    #[test]
    fn test_stale_new_proposal_does_not_duplicate() {
        let mut cal = MemoryCalendar::new("staff", New_York);
        let proposals = preview(&cal, &[record("C1", "Bio 101", "2024-09-02T15:00:00Z")]);
        commit(&mut cal, &proposals, &Selection::All);
        cal.clear_writes();

        let again = commit(&mut cal, &proposals, &Selection::All);
        assert_eq!(again.created, 0);
        assert_eq!(again.unchanged, 1);
        assert!(cal.writes().is_empty());
        assert_eq!(cal.len(), 1);
    }

    #[test]
    fn test_schedule_change_rebuilds_series() {
        let mut cal = MemoryCalendar::new("staff", New_York);
        let original = record("C1", "Bio 101", "2024-09-02T15:00:00Z");
        let initial = preview(&cal, &[original]);
        commit(&mut cal, &initial, &Selection::All);
        cal.clear_writes();

        let longer = record("C1", "Bio 101", "2024-09-02T15:30:00Z");
        let proposals = preview(&cal, &[longer]);
        assert!(proposals[0].needs_rebuild());

        let stats = commit(&mut cal, &proposals, &Selection::All);
        assert_eq!((stats.rebuilt, stats.updated, stats.created), (1, 0, 0));
        assert_eq!(
            cal.writes()[0],
            CalendarWrite::Deleted {
                target: Target::Series("m1".into())
            }
        );
        let events = cal.events_between(&september()).unwrap();
        assert_eq!(events[0].end, utc("2024-09-02T15:30:00Z"));
        assert_eq!(events[0].tag("TimeSignatureTag"), Some(proposals[0].signature.as_str()));
    }

    #[test]
    fn test_weekday_change_rebuilds_series() {
        let mut cal = MemoryCalendar::new("staff", New_York);
        let initial = preview(&cal, &[record("C1", "Bio 101", "2024-09-02T15:00:00Z")]);
        commit(&mut cal, &initial, &Selection::All);

        let mut twice_weekly = record("C1", "Bio 101", "2024-09-02T15:00:00Z");
        if let Some(rule) = twice_weekly.recurrence.as_mut() {
            rule.weekdays = vec![Weekday::Mon, Weekday::Wed];
        }
        twice_weekly.days_label = "Monday,Wednesday".into();
        let proposals = preview(&cal, &[twice_weekly]);
        assert_ne!(proposals[0].signature, initial[0].signature);
        assert!(proposals[0].needs_rebuild());

        let stats = commit(&mut cal, &proposals, &Selection::All);
        assert_eq!(stats.rebuilt, 1);
        // five Mondays and four Wednesdays in September 2024
        assert_eq!(cal.events_between(&september()).unwrap().len(), 9);
        assert_eq!(cal.len(), 1);
    }

    #[test]
    fn test_rebuild_keeps_outside_invitees() {
        let mut cal = MemoryCalendar::new("staff", New_York);
        let mut original = record("C1", "Bio 101", "2024-09-02T15:00:00Z");
        original.guests.insert("old@x.org".into());
        let initial = preview(&cal, &[original]);
        commit(&mut cal, &initial, &Selection::All);
        cal.add_guest(&Target::Series("m1".into()), "visitor@elsewhere.com").unwrap();

        let mut changed = record("C1", "Bio 101", "2024-09-02T15:30:00Z");
        changed.guests.insert("new@x.org".into());
        let proposals = preview(&cal, &[changed]);
        let stats = commit(&mut cal, &proposals, &Selection::All);
        assert_eq!(stats.rebuilt, 1);

        let events = cal.events_between(&september()).unwrap();
        let guests: Vec<&str> = events[0].guests.iter().map(String::as_str).collect();
        assert_eq!(guests, vec!["new@x.org", "visitor@elsewhere.com"]);
    }

    #[test]
    fn test_untaggable_event_is_removed_and_retried_once() {
        let mut cal = MemoryCalendar::new("staff", New_York);
        cal.fail_tagging(true);
        let proposals = preview(&cal, &[record("C1", "Bio 101", "2024-09-02T15:00:00Z")]);

        let stats = commit(&mut cal, &proposals, &Selection::All);
        assert_eq!((stats.created, stats.errors), (0, 1));
        assert!(cal.is_empty());
        assert_eq!(
            cal.writes().last(),
            Some(&CalendarWrite::Deleted {
                target: Target::Series("m1".into())
            })
        );

        cal.fail_tagging(false);
        let retry = preview(&cal, &[record("C1", "Bio 101", "2024-09-02T15:00:00Z")]);
        assert_eq!(retry[0].status, SyncStatus::New);
        let stats = commit(&mut cal, &retry, &Selection::All);
        assert_eq!(stats.created, 1);
        assert_eq!(cal.len(), 1);
    }

    #[test]
    fn test_failed_series_delete_falls_back_to_instance() {
        let mut cal = MemoryCalendar::new("staff", New_York);
        let initial = preview(&cal, &[record("C1", "Bio 101", "2024-09-02T15:00:00Z")]);
        commit(&mut cal, &initial, &Selection::All);
        cal.fail_series_deletes();
        cal.clear_writes();

        let proposals = preview(&cal, &[record("C1", "Bio 101", "2024-09-02T15:30:00Z")]);
        let stats = commit(&mut cal, &proposals, &Selection::All);
        assert_eq!(stats.rebuilt, 1);
        assert!(cal.writes().contains(&CalendarWrite::Deleted {
            target: Target::Event(proposals[0].matched.as_ref().unwrap().event_id.clone())
        }));
    }

    #[test]
    fn test_content_change_patches_in_place() {
        let mut cal = MemoryCalendar::new("staff", New_York);
        let initial = preview(&cal, &[record("C1", "Bio 101", "2024-09-02T15:00:00Z")]);
        commit(&mut cal, &initial, &Selection::All);
        cal.clear_writes();

        let mut moved = record("C1", "Bio 101", "2024-09-02T15:00:00Z");
        moved.location = "Hall 3".into();
        moved.guests.insert("alice@x.org".into());
        let proposals = preview(&cal, &[moved]);
        assert!(!proposals[0].needs_rebuild());

        let stats = commit(&mut cal, &proposals, &Selection::All);
        assert_eq!(stats.updated, 1);
        let series = Target::Series("m1".into());
        assert_eq!(
            cal.writes(),
            &[
                CalendarWrite::Updated { target: series.clone() },
                CalendarWrite::GuestAdded {
                    target: series,
                    address: "alice@x.org".into()
                },
            ]
        );
    }

    #[test]
    fn test_skipped_fields_are_not_written() {
        let mut cal = MemoryCalendar::new("staff", New_York);
        let initial = preview(&cal, &[record("C1", "Bio 101", "2024-09-02T15:00:00Z")]);
        commit(&mut cal, &initial, &Selection::All);
        cal.clear_writes();

        let mut changed = record("C1", "Bio 101", "2024-09-02T15:30:00Z");
        changed.location = "Hall 3".into();
        let mut proposals = preview(&cal, &[changed]);
        proposals[0].skip(DiffField::Schedule);
        proposals[0].skip(DiffField::Location);

        let stats = commit(&mut cal, &proposals, &Selection::All);
        assert_eq!(stats.unchanged, 1);
        assert!(cal.writes().is_empty());
    }

    #[test]
    fn test_row_failures_do_not_stop_the_batch() {
        let mut cal = MemoryCalendar::new("staff", New_York);
        cal.fail_writes_for("Chem");
        let records = [
            record("C1", "Bio 101", "2024-09-02T15:00:00Z"),
            record("C2", "Chem 200", "2024-09-02T15:00:00Z"),
            record("C3", "Phys 300", "2024-09-02T15:00:00Z"),
        ];
        let proposals = preview(&cal, &records);

        let stats = commit(&mut cal, &proposals, &Selection::All);
        assert_eq!(stats.created, 2);
        assert_eq!(stats.errors, 1);
        assert_eq!(stats.failures[0].row_id, "C2");
    }

    #[test]
    fn test_selection_limits_rows() {
        let mut cal = MemoryCalendar::new("staff", New_York);
        let records = [
            record("C1", "Bio 101", "2024-09-02T15:00:00Z"),
            record("C2", "Chem 200", "2024-09-02T15:00:00Z"),
        ];
        let proposals = preview(&cal, &records);

        let stats = commit(&mut cal, &proposals, &Selection::rows(["C2"]));
        assert_eq!(stats.created, 1);
        assert_eq!(cal.len(), 1);
    }
}
