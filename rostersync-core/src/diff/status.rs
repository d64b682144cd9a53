use std::fmt;

use serde::{Deserialize, Serialize};

/// Classification of one source row against the calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SyncStatus {
    /// No calendar object carries the row's identity.
    New,
    /// Matched, with at least one change that needs writing.
    Update,
    /// Matched and already in step.
    Synced,
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncStatus::New => write!(f, "+"),
            SyncStatus::Update => write!(f, "~"),
            SyncStatus::Synced => write!(f, "="),
        }
    }
}
