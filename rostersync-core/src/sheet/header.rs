//! Header normalization and header-name lookup.

use std::collections::HashMap;

use super::CellValue;

/// Lowercase and keep only ASCII letters and digits: "Start Date " -> "startdate".
pub fn normalize_header(header: &str) -> String {
    header
        .chars()
        .flat_map(char::to_lowercase)
        .filter(char::is_ascii_alphanumeric)
        .collect()
}

/// Normalized header name -> column index. The leftmost column wins on duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnMap {
    indices: HashMap<String, usize>,
}

impl ColumnMap {
    pub fn from_header(row: &[CellValue]) -> Self {
        let mut indices = HashMap::new();
        for (i, cell) in row.iter().enumerate() {
            let key = normalize_header(&cell.as_text());
            if !key.is_empty() {
                indices.entry(key).or_insert(i);
            }
        }
        ColumnMap { indices }
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.indices.get(&normalize_header(name)).copied()
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Index of the first row that has a cell whose normalized text equals `marker`.
pub fn locate_header(rows: &[Vec<CellValue>], marker: &str) -> Option<usize> {
    let marker = normalize_header(marker);
    rows.iter().position(|row| {
        row.iter()
            .any(|cell| normalize_header(&cell.as_text()) == marker)
    })
}
