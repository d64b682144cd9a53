//! Tabular source store: the workbook the schedule lives in.

mod cell;
mod header;
mod memory;
mod workbook;

pub use cell::CellValue;
pub use header::{ColumnMap, locate_header, normalize_header};
pub use memory::MemorySheet;
pub use workbook::WorkbookFile;

use crate::error::{SyncError, SyncResult};

/// Read rows from, and write single cells back to, named tabs.
///
/// Row and column indices are zero-based positions within the tab.
pub trait SheetStore {
    fn has_tab(&self, tab: &str) -> bool;

    fn read_rows(&self, tab: &str) -> SyncResult<Vec<Vec<CellValue>>>;

    fn write_cell(
        &mut self,
        tab: &str,
        row: usize,
        column: usize,
        value: CellValue,
    ) -> SyncResult<()>;
}

/// A tab's data rows under a located header row.
#[derive(Debug, Clone)]
pub struct Table {
    pub tab: String,
    pub header_row: usize,
    pub columns: ColumnMap,
    /// (absolute row index, cells)
    pub rows: Vec<(usize, Vec<CellValue>)>,
}

impl Table {
    /// Read `tab` and treat the first row containing `marker` as its header.
    pub fn read(store: &dyn SheetStore, tab: &str, marker: &str) -> SyncResult<Self> {
        let all = store.read_rows(tab)?;
        let header_row = locate_header(&all, marker).ok_or_else(|| SyncError::MissingColumn {
            tab: tab.to_string(),
            column: normalize_header(marker),
        })?;
        let columns = ColumnMap::from_header(&all[header_row]);
        let rows = all
            .into_iter()
            .enumerate()
            .skip(header_row + 1)
            .filter(|(_, cells)| cells.iter().any(|c| !c.is_empty()))
            .collect();

        Ok(Table {
            tab: tab.to_string(),
            header_row,
            columns,
            rows,
        })
    }
}

pub(crate) fn missing_tab(tab: &str) -> SyncError {
    SyncError::Sheet(format!("Tab '{tab}' not found"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_skips_blank_rows() {
        let sheet = MemorySheet::new().with_tab(
            "Staff",
            vec![
                vec!["Staff directory".into()],
                vec!["Staff ID".into(), "Full Name".into()],
                vec!["ann@x.org".into(), "Ann".into()],
                vec![CellValue::Empty, "".into()],
                vec!["bo@x.org".into(), "Bo".into()],
            ],
        );
        let table = Table::read(&sheet, "Staff", "staffid").unwrap();
        assert_eq!(table.header_row, 1);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[1].0, 4);
        assert_eq!(table.columns.index_of("fullname"), Some(1));
    }

    #[test]
    fn test_table_without_marker_is_a_config_error() {
        let sheet = MemorySheet::new().with_tab("Courses", vec![vec!["Course".into()]]);
        let err = Table::read(&sheet, "Courses", "eventid").unwrap_err();
        assert!(err.is_setup_failure());
    }
}
