//! Job source: turn spreadsheet cells into an ordered list of work items.
//!
//! ## Data Flow
//!
//! ```text
//! JobSource ──▶ enumerate(column, groups) ──▶ Vec<WorkItem>
//! (sheets)       (row 2..=max_row, http*)      (group, row, url)
//! ```
//!
//! The source is read-only for the engine. [`MemorySource`] holds a grid in
//! memory (tests, embedders); [`WorkbookSource`] reads an Excel/ODS file.
//!
//! The order of the returned items is a contract: groups in the order the
//! caller selected them, rows ascending within a group. Output files are
//! named after the originating row (`row_<n>.pdf`), so a rerun of the same
//! request always produces the same names.

mod workbook;

pub use workbook::WorkbookSource;

use crate::error::SheetprintError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// The first data row. Row 1 is the header.
pub const FIRST_DATA_ROW: u32 = 2;

/// Read-only tabular data keyed by group (sheet) name.
///
/// Rows are 1-indexed, columns 0-indexed (`A` = 0).
pub trait JobSource: Send + Sync {
    /// Human-readable name used in errors and logs (usually the file path).
    fn origin(&self) -> String;

    /// All group names, in workbook order.
    fn group_names(&self) -> Vec<String>;

    /// The last row that may hold data in `group` (0 if the group is empty).
    fn max_row(&self, group: &str) -> Result<u32, SheetprintError>;

    /// The stringified value at `(column, row)`, or None for an empty cell.
    fn cell(&self, group: &str, column: u32, row: u32) -> Result<Option<String>, SheetprintError>;
}

/// One URL scheduled for rendering.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkItem {
    /// Sheet name; also the output subfolder.
    pub group: String,
    /// 1-based row within the sheet; names the output file.
    pub sequence: u32,
    pub url: String,
}

impl WorkItem {
    /// File name of the PDF produced for this item.
    pub fn file_name(&self) -> String {
        format!("row_{}.pdf", self.sequence)
    }
}

/// Convert a column token (`"B"`, `"aa"`) to a 0-based index.
///
/// Letters only, case-insensitive. `A` → 0, `Z` → 25, `AA` → 26.
pub fn column_index(token: &str) -> Result<u32, SheetprintError> {
    let token = token.trim();
    if token.is_empty() || !token.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(SheetprintError::InvalidRequest(format!(
            "column must be letters only (e.g. A, B, AA), got '{token}'"
        )));
    }
    // XFD is the last column in Excel; anything longer is a typo.
    if token.len() > 3 {
        return Err(SheetprintError::InvalidRequest(format!(
            "column '{token}' is out of range"
        )));
    }
    let mut index: u32 = 0;
    for c in token.chars() {
        let digit = (c.to_ascii_uppercase() as u8 - b'A') as u32 + 1;
        index = index * 26 + digit;
    }
    Ok(index - 1)
}

/// True when a cell value is treated as a URL to print.
pub fn is_url_cell(value: &str) -> bool {
    value.starts_with("http")
}

/// Enumerate work items for `column` across `groups`.
///
/// `groups` must be non-empty and every name must exist in the source.
/// Duplicate group names are visited once, at their first position.
pub fn enumerate(
    source: &dyn JobSource,
    column: &str,
    groups: &[String],
) -> Result<Vec<WorkItem>, SheetprintError> {
    let col = column_index(column)?;
    if groups.is_empty() {
        return Err(SheetprintError::InvalidRequest(
            "select at least one sheet".into(),
        ));
    }

    let known = source.group_names();
    let mut seen: Vec<&str> = Vec::with_capacity(groups.len());
    for group in groups {
        if !known.iter().any(|k| k == group) {
            return Err(SheetprintError::SourceUnavailable {
                origin: source.origin(),
                reason: format!("sheet '{group}' does not exist"),
            });
        }
        if !seen.contains(&group.as_str()) {
            seen.push(group);
        }
    }

    let mut items = Vec::new();
    for group in seen {
        let max_row = source.max_row(group)?;
        let before = items.len();
        for row in FIRST_DATA_ROW..=max_row {
            if let Some(value) = source.cell(group, col, row)? {
                if is_url_cell(&value) {
                    items.push(WorkItem {
                        group: group.to_string(),
                        sequence: row,
                        url: value,
                    });
                }
            }
        }
        debug!(
            "Sheet '{}': {} URLs in rows {}..={}",
            group,
            items.len() - before,
            FIRST_DATA_ROW,
            max_row
        );
    }

    Ok(items)
}

/// An in-memory job source.
///
/// Each group is a list of rows; each row a list of optional cell values.
/// `rows[0]` is spreadsheet row 1 (the header).
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    name: String,
    order: Vec<String>,
    groups: HashMap<String, Vec<Vec<Option<String>>>>,
}

impl MemorySource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Add (or replace) a group with the given rows.
    pub fn with_group(mut self, group: impl Into<String>, rows: Vec<Vec<Option<String>>>) -> Self {
        let group = group.into();
        if !self.groups.contains_key(&group) {
            self.order.push(group.clone());
        }
        self.groups.insert(group, rows);
        self
    }

    /// Add a group whose `column` holds `values`, starting at row 2.
    ///
    /// Row 1 gets a header; empty strings become empty cells.
    pub fn with_column(self, group: impl Into<String>, column: u32, values: &[&str]) -> Self {
        let width = column as usize + 1;
        let mut header = vec![None; width];
        header[column as usize] = Some("url".to_string());
        let mut rows = vec![header];
        for value in values {
            let mut row = vec![None; width];
            if !value.is_empty() {
                row[column as usize] = Some((*value).to_string());
            }
            rows.push(row);
        }
        self.with_group(group, rows)
    }

    fn rows(&self, group: &str) -> Result<&Vec<Vec<Option<String>>>, SheetprintError> {
        self.groups
            .get(group)
            .ok_or_else(|| SheetprintError::SourceUnavailable {
                origin: self.name.clone(),
                reason: format!("sheet '{group}' does not exist"),
            })
    }
}

impl JobSource for MemorySource {
    fn origin(&self) -> String {
        self.name.clone()
    }

    fn group_names(&self) -> Vec<String> {
        self.order.clone()
    }

    fn max_row(&self, group: &str) -> Result<u32, SheetprintError> {
        Ok(self.rows(group)?.len() as u32)
    }

    fn cell(&self, group: &str, column: u32, row: u32) -> Result<Option<String>, SheetprintError> {
        let rows = self.rows(group)?;
        if row == 0 {
            return Ok(None);
        }
        Ok(rows
            .get(row as usize - 1)
            .and_then(|r| r.get(column as usize))
            .cloned()
            .flatten())
    }
}
