use std::collections::BTreeMap;

use super::{CellValue, SheetStore, missing_tab};
use crate::error::SyncResult;

/// In-memory workbook, used by tests and as a scratch store.
#[derive(Debug, Clone, Default)]
pub struct MemorySheet {
    tabs: BTreeMap<String, Vec<Vec<CellValue>>>,
    writes: Vec<(String, usize, usize)>,
}

impl MemorySheet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tab(mut self, tab: &str, rows: Vec<Vec<CellValue>>) -> Self {
        self.tabs.insert(tab.to_string(), rows);
        self
    }

    pub fn cell(&self, tab: &str, row: usize, column: usize) -> CellValue {
        self.tabs
            .get(tab)
            .and_then(|rows| rows.get(row))
            .and_then(|cells| cells.get(column))
            .cloned()
            .unwrap_or_default()
    }

    /// Every (tab, row, column) written so far, in order.
    pub fn writes(&self) -> &[(String, usize, usize)] {
        &self.writes
    }
}

impl SheetStore for MemorySheet {
    fn has_tab(&self, tab: &str) -> bool {
        self.tabs.contains_key(tab)
    }

    fn read_rows(&self, tab: &str) -> SyncResult<Vec<Vec<CellValue>>> {
        self.tabs.get(tab).cloned().ok_or_else(|| missing_tab(tab))
    }

    fn write_cell(
        &mut self,
        tab: &str,
        row: usize,
        column: usize,
        value: CellValue,
    ) -> SyncResult<()> {
        let rows = self.tabs.get_mut(tab).ok_or_else(|| missing_tab(tab))?;
        put_cell(rows, row, column, value);
        self.writes.push((tab.to_string(), row, column));
        Ok(())
    }
}

/// Set a cell, growing the grid as needed.
pub(super) fn put_cell(
    rows: &mut Vec<Vec<CellValue>>,
    row: usize,
    column: usize,
    value: CellValue,
) {
    if rows.len() <= row {
        rows.resize_with(row + 1, Vec::new);
    }
    let cells = &mut rows[row];
    if cells.len() <= column {
        cells.resize(column + 1, CellValue::Empty);
    }
    cells[column] = value;
}
