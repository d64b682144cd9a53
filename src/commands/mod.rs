pub mod commit;
pub mod exams;
pub mod init;
pub mod inspect;
pub mod preview;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rostersync_core::app_config::AppConfig;
use rostersync_core::calendar::IcsDirCalendar;
use rostersync_core::sheet::WorkbookFile;
use rostersync_core::sync::Syncer;

/// Workbook, sync settings and calendar location for one command run.
pub struct Session {
    pub workbook: WorkbookFile,
    pub syncer: Syncer,
    calendar_root: PathBuf,
}

impl Session {
    pub fn open(config_path: Option<&Path>) -> Result<Self> {
        let app = AppConfig::load(config_path)?;

        let workbook_path = app.workbook_path();
        tracing::debug!(workbook = %workbook_path.display(), "opening workbook");
        let workbook = WorkbookFile::open(&workbook_path).with_context(|| {
            format!(
                "Could not open workbook {}. Set `workbook` in your config.",
                workbook_path.display()
            )
        })?;

        let sync_config = app.sync_config(&workbook)?;
        let syncer = Syncer::load(sync_config, &workbook)?;

        Ok(Session {
            workbook,
            syncer,
            calendar_root: app.calendar_root(),
        })
    }

    /// The ICS directory `<calendar_dir>/<calendar_id>`.
    pub fn calendar(&self, calendar_id: &str) -> Result<IcsDirCalendar> {
        let tz = self.syncer.config().tz()?;
        IcsDirCalendar::open(&self.calendar_root, calendar_id, tz).with_context(|| {
            format!(
                "Expected a calendar directory at {}",
                self.calendar_root.join(calendar_id).display()
            )
        })
    }

    pub fn sync_calendar(&self) -> Result<IcsDirCalendar> {
        self.calendar(&self.syncer.config().calendar_id)
    }
}
