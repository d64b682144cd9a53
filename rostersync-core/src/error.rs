//! Error types for rostersync.

use thiserror::Error;

/// Errors that can occur while reading schedules or talking to a calendar.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Tab '{tab}' has no '{column}' column")]
    MissingColumn { tab: String, column: String },

    #[error("Calendar not found: {0}")]
    CalendarNotFound(String),

    #[error("Unknown row id: {0}")]
    UnknownRow(String),

    #[error("Another sync is running: gave up on {path} after {waited}")]
    LockTimeout { path: String, waited: String },

    #[error("Calendar error: {0}")]
    Calendar(String),

    #[error("Sheet error: {0}")]
    Sheet(String),

    #[error("Row {row}: {message}")]
    Row { row: usize, message: String },

    #[error("ICS parse error: {0}")]
    IcsParse(String),

    #[error("ICS generation error: {0}")]
    IcsGenerate(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl SyncError {
    /// Setup failures abort a whole run before anything is written.
    /// Everything else is scoped to a single row.
    pub fn is_setup_failure(&self) -> bool {
        matches!(
            self,
            SyncError::Config(_)
                | SyncError::MissingColumn { .. }
                | SyncError::CalendarNotFound(_)
                | SyncError::UnknownRow(_)
                | SyncError::LockTimeout { .. }
        )
    }

    pub(crate) fn row(row: usize, message: impl Into<String>) -> Self {
        SyncError::Row {
            row: row + 1,
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(e: serde_json::Error) -> Self {
        SyncError::Serialization(e.to_string())
    }
}

/// Result type alias for rostersync operations.
pub type SyncResult<T> = Result<T, SyncError>;
