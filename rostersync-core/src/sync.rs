//! Sync orchestration: preview and commit under the single-writer lock.

use std::collections::{HashMap, HashSet};

use chrono_tz::Tz;
use serde::Serialize;

use crate::calendar::{CalendarService, DateRange};
use crate::commit::{CommitEngine, CommitStats, Selection};
use crate::config::SyncConfig;
use crate::diff::{DiffField, SyncProposal, SyncStatus, reconcile};
use crate::error::{SyncError, SyncResult};
use crate::identity::recover_identity;
use crate::lock::SyncLock;
use crate::normalize::{EventRecord, Normalizer};
use crate::schema::RowSchema;
use crate::sheet::{CellValue, SheetStore, Table};
use crate::staff::StaffDirectory;

/// A source row left out of the proposals, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedRow {
    /// Zero-based row index in the source tab.
    pub sheet_row: usize,
    pub row_id: Option<String>,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Preview {
    pub proposals: Vec<SyncProposal>,
    pub skipped: Vec<SkippedRow>,
    /// The window the calendar was queried with; `None` when no row produced a record.
    pub window: Option<DateRange>,
}

impl Preview {
    pub fn count(&self, status: SyncStatus) -> usize {
        self.proposals.iter().filter(|p| p.status == status).count()
    }

    pub fn is_synced(&self) -> bool {
        self.proposals.iter().all(|p| p.status == SyncStatus::Synced)
    }
}

pub struct Syncer {
    config: SyncConfig,
    tz: Tz,
    staff: StaffDirectory,
}

impl Syncer {
    /// Validates the configuration up front; nothing is read or written on failure.
    pub fn new(config: SyncConfig, staff: StaffDirectory) -> SyncResult<Self> {
        let tz = config.validate()?;
        Ok(Syncer { config, tz, staff })
    }

    /// Validate, then load the staff directory from the workbook.
    pub fn load(config: SyncConfig, sheet: &dyn SheetStore) -> SyncResult<Self> {
        config.validate()?;
        let staff = StaffDirectory::load(sheet, &config)?;
        Self::new(config, staff)
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn staff(&self) -> &StaffDirectory {
        &self.staff
    }

    fn lock(&self, sheet: &dyn SheetStore) -> SyncResult<SyncLock> {
        let rows = sheet.read_rows(&self.config.source_tab)?.len();
        let path = self.config.lock.lock_path()?;
        SyncLock::acquire(&path, self.config.lock.timeout_for(rows))
    }

    fn check_calendar(&self, calendar: &dyn CalendarService) -> SyncResult<()> {
        if calendar.calendar_id() != self.config.calendar_id {
            return Err(SyncError::CalendarNotFound(format!(
                "configured calendar '{}' but connected to '{}'",
                self.config.calendar_id,
                calendar.calendar_id()
            )));
        }
        Ok(())
    }

    fn read_schema(&self, sheet: &dyn SheetStore) -> SyncResult<(Table, RowSchema)> {
        let columns = self.config.columns();
        let table = Table::read(sheet, &self.config.source_tab, &columns.id)?;
        let schema = RowSchema::resolve(
            &self.config.source_tab,
            self.config.profile,
            &columns,
            &table.columns,
        )?;
        Ok((table, schema))
    }

    /// Reconcile every row against the calendar. Writes only backfilled identities
    /// to the sheet; never writes to the calendar.
    pub fn preview(
        &self,
        sheet: &mut dyn SheetStore,
        calendar: &dyn CalendarService,
    ) -> SyncResult<Preview> {
        self.check_calendar(calendar)?;
        let _lock = self.lock(sheet)?;
        self.preview_locked(sheet, calendar)
    }

    /// Apply the selected proposals and write signatures back.
    pub fn commit(
        &self,
        sheet: &mut dyn SheetStore,
        calendar: &mut dyn CalendarService,
        proposals: &[SyncProposal],
        selection: &Selection,
    ) -> SyncResult<CommitStats> {
        self.check_calendar(calendar)?;
        let _lock = self.lock(sheet)?;
        self.commit_locked(sheet, calendar, proposals, selection)
    }

    /// Preview then commit `selection`, holding the lock across both.
    pub fn sync(
        &self,
        sheet: &mut dyn SheetStore,
        calendar: &mut dyn CalendarService,
        selection: &Selection,
    ) -> SyncResult<(Preview, CommitStats)> {
        self.sync_skipping(sheet, calendar, selection, &[])
    }

    /// [`Syncer::sync`], leaving `skip` fields as they are on the calendar. The
    /// returned preview is the unedited one. Selected row ids missing from the
    /// preview fail the run before anything is committed.
    pub fn sync_skipping(
        &self,
        sheet: &mut dyn SheetStore,
        calendar: &mut dyn CalendarService,
        selection: &Selection,
        skip: &[DiffField],
    ) -> SyncResult<(Preview, CommitStats)> {
        self.check_calendar(calendar)?;
        let _lock = self.lock(sheet)?;
        let preview = self.preview_locked(sheet, calendar)?;

        if let Selection::Rows(ids) = selection {
            let unknown: Vec<&str> = ids
                .iter()
                .filter(|id| !preview.proposals.iter().any(|p| &p.row_id == *id))
                .map(String::as_str)
                .collect();
            if !unknown.is_empty() {
                return Err(SyncError::UnknownRow(unknown.join(", ")));
            }
        }

        let mut approved = preview.proposals.clone();
        for proposal in &mut approved {
            for field in skip {
                proposal.skip(*field);
            }
        }
        let stats = self.commit_locked(sheet, calendar, &approved, selection)?;
        Ok((preview, stats))
    }

    fn preview_locked(
        &self,
        sheet: &mut dyn SheetStore,
        calendar: &dyn CalendarService,
    ) -> SyncResult<Preview> {
        let (table, schema) = self.read_schema(sheet)?;
        let normalizer = Normalizer::new(&self.config, self.tz, &self.staff);

        let mut records = Vec::new();
        let mut skipped = Vec::new();
        for (sheet_row, cells) in &table.rows {
            let source = schema.extract(*sheet_row, cells);
            match normalizer.normalize(&source) {
                Ok(Some(record)) => records.push(record),
                Ok(None) => tracing::debug!(row = sheet_row + 1, "row has no name; ignored"),
                Err(e) => {
                    tracing::warn!(
                        row = sheet_row + 1,
                        row_id = ?source.row_id,
                        error = %e,
                        "skipping row"
                    );
                    skipped.push(SkippedRow {
                        sheet_row: *sheet_row,
                        row_id: source.row_id,
                        reason: e.to_string(),
                    });
                }
            }
        }

        let records =
            self.assign_identities(records, sheet, calendar, schema.id_column(), &mut skipped);

        let window = DateRange::covering(&records, &self.tz)?;
        let events = match &window {
            Some(window) => {
                tracing::info!(from = %window.from, to = %window.to, "querying calendar window");
                calendar.events_between(window)?
            }
            None => Vec::new(),
        };

        let proposals = reconcile(&records, &events, &self.staff, &self.config.tags);
        let preview = Preview {
            proposals,
            skipped,
            window,
        };
        tracing::info!(
            new = preview.count(SyncStatus::New),
            update = preview.count(SyncStatus::Update),
            synced = preview.count(SyncStatus::Synced),
            skipped = preview.skipped.len(),
            "preview ready"
        );
        Ok(preview)
    }

    /// Backfill missing identities (persisting them to the sheet) and drop rows
    /// whose identity repeats an earlier row's.
    fn assign_identities(
        &self,
        records: Vec<EventRecord>,
        sheet: &mut dyn SheetStore,
        calendar: &dyn CalendarService,
        id_column: usize,
        skipped: &mut Vec<SkippedRow>,
    ) -> Vec<EventRecord> {
        let tab = &self.config.source_tab;
        let mut seen = HashSet::new();
        let mut kept = Vec::with_capacity(records.len());

        for mut record in records {
            if record.row_id.is_none() {
                let assigned = recover_identity(
                    &record,
                    calendar,
                    &self.tz,
                    &self.config.tags.identity,
                    &self.config.id_prefix,
                )
                .and_then(|identity| {
                    let cell = CellValue::text(&identity.id);
                    sheet.write_cell(tab, record.sheet_row, id_column, cell)?;
                    Ok(identity)
                });
                match assigned {
                    Ok(identity) => {
                        tracing::info!(
                            row = record.sheet_row + 1,
                            row_id = %identity.id,
                            source = ?identity.source,
                            "backfilled row id"
                        );
                        record.row_id = Some(identity.id);
                    }
                    Err(e) => {
                        tracing::warn!(
                            row = record.sheet_row + 1,
                            error = %e,
                            "could not assign row id; skipping row"
                        );
                        skipped.push(SkippedRow {
                            sheet_row: record.sheet_row,
                            row_id: None,
                            reason: format!("could not assign row id: {e}"),
                        });
                        continue;
                    }
                }
            }

            let Some(row_id) = record.row_id.clone() else {
                continue;
            };
            if !seen.insert(row_id.clone()) {
                tracing::warn!(
                    row = record.sheet_row + 1,
                    %row_id,
                    "duplicate row id; skipping row"
                );
                skipped.push(SkippedRow {
                    sheet_row: record.sheet_row,
                    row_id: Some(row_id),
                    reason: "duplicate row id".to_string(),
                });
                continue;
            }
            kept.push(record);
        }
        kept
    }

    fn commit_locked(
        &self,
        sheet: &mut dyn SheetStore,
        calendar: &mut dyn CalendarService,
        proposals: &[SyncProposal],
        selection: &Selection,
    ) -> SyncResult<CommitStats> {
        let (table, schema) = self.read_schema(sheet)?;
        let signature_column = schema.signature_column();
        let tab = &self.config.source_tab;
        let row_ids: HashMap<usize, Option<String>> = table
            .rows
            .iter()
            .map(|(row, cells)| (*row, schema.extract(*row, cells).row_id))
            .collect();

        let mut engine = CommitEngine::new(calendar, &self.staff, &self.config, self.tz);
        let stats = engine.commit_all(proposals, selection, |proposal, outcome| {
            let Some(column) = signature_column else {
                return;
            };
            if !outcome.signature_current(proposal) {
                return;
            }
            let current = row_ids.get(&proposal.sheet_row).cloned().flatten();
            if current.as_deref() != Some(proposal.row_id.as_str()) {
                tracing::warn!(
                    row = proposal.sheet_row + 1,
                    row_id = %proposal.row_id,
                    found = ?current,
                    "row moved since preview; signature not written"
                );
                return;
            }
            let value = CellValue::text(&proposal.signature);
            if let Err(e) = sheet.write_cell(tab, proposal.sheet_row, column, value) {
                tracing::warn!(
                    row_id = %proposal.row_id,
                    error = %e,
                    "could not write signature back"
                );
            }
        });
        Ok(stats)
    }
}
