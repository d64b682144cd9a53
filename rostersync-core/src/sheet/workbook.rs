//! Workbook stored as a single JSON file.
//!
//! ```json
//! { "tabs": { "Courses": [["Event ID", "Course"], ["C1", "Bio 101"]] },
//!   "properties": { "syncConfig": "{\"calendar_id\":\"staff\"}" } }
//! ```
//!
//! Every cell write is persisted immediately (write to a temp file, then rename)
//! so identities backfilled during a preview survive a crash later in the run.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::memory::put_cell;
use super::{CellValue, SheetStore, missing_tab};
use crate::error::{SyncError, SyncResult};
use crate::settings::SettingsStore;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct WorkbookData {
    #[serde(default)]
    tabs: BTreeMap<String, Vec<Vec<CellValue>>>,
    #[serde(default)]
    properties: BTreeMap<String, String>,
}

#[derive(Debug)]
pub struct WorkbookFile {
    path: PathBuf,
    data: WorkbookData,
}

impl WorkbookFile {
    pub fn open(path: &Path) -> SyncResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            SyncError::Sheet(format!("Could not read workbook {}: {e}", path.display()))
        })?;
        let data: WorkbookData = serde_json::from_str(&content)?;

        Ok(WorkbookFile {
            path: path.to_path_buf(),
            data,
        })
    }

    /// Create an empty workbook with the given tabs, each holding a header row.
    pub fn create(path: &Path, tabs: &[(&str, Vec<&str>)]) -> SyncResult<Self> {
        let mut data = WorkbookData::default();
        for (tab, headers) in tabs {
            let header = headers.iter().map(|h| CellValue::from(*h)).collect();
            data.tabs.insert(tab.to_string(), vec![header]);
        }
        let workbook = WorkbookFile {
            path: path.to_path_buf(),
            data,
        };
        workbook.save()?;
        Ok(workbook)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn save(&self) -> SyncResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let temp = self.path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(&self.data)?;
        std::fs::write(&temp, content)?;
        std::fs::rename(&temp, &self.path)?;
        Ok(())
    }
}

impl SheetStore for WorkbookFile {
    fn has_tab(&self, tab: &str) -> bool {
        self.data.tabs.contains_key(tab)
    }

    fn read_rows(&self, tab: &str) -> SyncResult<Vec<Vec<CellValue>>> {
        self.data.tabs.get(tab).cloned().ok_or_else(|| missing_tab(tab))
    }

    fn write_cell(
        &mut self,
        tab: &str,
        row: usize,
        column: usize,
        value: CellValue,
    ) -> SyncResult<()> {
        let rows = self.data.tabs.get_mut(tab).ok_or_else(|| missing_tab(tab))?;
        put_cell(rows, row, column, value);
        self.save()
    }
}

impl SettingsStore for WorkbookFile {
    fn get(&self, key: &str) -> SyncResult<Option<String>> {
        Ok(self.data.properties.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> SyncResult<()> {
        self.data.properties.insert(key.to_string(), value.to_string());
        self.save()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writes_are_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roster.json");
        let mut workbook =
            WorkbookFile::create(&path, &[("Courses", vec!["Event ID", "Course"])]).unwrap();
        workbook.write_cell("Courses", 1, 0, "C1".into()).unwrap();
        workbook.set("theme", "dark").unwrap();

        let reopened = WorkbookFile::open(&path).unwrap();
        let rows = reopened.read_rows("Courses").unwrap();
        assert_eq!(rows[1][0], CellValue::text("C1"));
        assert_eq!(reopened.get("theme").unwrap().as_deref(), Some("dark"));
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_missing_workbook() {
        let dir = tempfile::tempdir().unwrap();
        let err = WorkbookFile::open(&dir.path().join("none.json")).unwrap_err();
        assert!(matches!(err, SyncError::Sheet(_)));
    }
}
