//! Spreadsheet-backed job source via calamine.
//!
//! The whole workbook is read when the source is opened. Every later call is
//! a lookup into memory, so once [`WorkbookSource::open`] succeeds the engine
//! can never hit an I/O error halfway through a sheet.

use super::JobSource;
use crate::error::SheetprintError;
use calamine::{open_workbook_auto, Data, Range, Reader};
use std::path::{Path, PathBuf};
use tracing::info;

/// A workbook (`.xlsx`, `.xlsm`, `.xls`, `.ods`) loaded into memory.
pub struct WorkbookSource {
    path: PathBuf,
    sheets: Vec<(String, Range<Data>)>,
}

impl WorkbookSource {
    /// Load every sheet of the workbook at `path`.
    ///
    /// This is blocking file I/O and XML parsing; call it from
    /// `spawn_blocking` (see [`WorkbookSource::open_async`]) inside async code.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SheetprintError> {
        let path = path.as_ref().to_path_buf();
        let unavailable = |reason: String| SheetprintError::SourceUnavailable {
            origin: path.display().to_string(),
            reason,
        };

        if !path.exists() {
            return Err(unavailable("file not found".into()));
        }

        let mut workbook = open_workbook_auto(&path).map_err(|e| unavailable(e.to_string()))?;
        let names = workbook.sheet_names().to_vec();
        let mut sheets = Vec::with_capacity(names.len());
        for name in names {
            let range = workbook
                .worksheet_range(&name)
                .map_err(|e| unavailable(format!("sheet '{name}': {e}")))?;
            sheets.push((name, range));
        }

        info!(
            "Workbook loaded: {} ({} sheets)",
            path.display(),
            sheets.len()
        );
        Ok(Self { path, sheets })
    }

    /// [`WorkbookSource::open`] on the blocking thread pool.
    pub async fn open_async(path: impl AsRef<Path>) -> Result<Self, SheetprintError> {
        let path = path.as_ref().to_path_buf();
        let origin = path.display().to_string();
        tokio::task::spawn_blocking(move || Self::open(&path))
            .await
            .map_err(|e| SheetprintError::SourceUnavailable {
                origin,
                reason: format!("workbook loader panicked: {e}"),
            })?
    }

    /// Path the workbook was loaded from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn range(&self, group: &str) -> Result<&Range<Data>, SheetprintError> {
        self.sheets
            .iter()
            .find(|(name, _)| name == group)
            .map(|(_, range)| range)
            .ok_or_else(|| SheetprintError::SourceUnavailable {
                origin: self.origin(),
                reason: format!("sheet '{group}' does not exist"),
            })
    }
}

/// Stringify a cell the way a spreadsheet user would read it.
fn cell_text(data: &Data) -> Option<String> {
    match data {
        Data::Empty => None,
        Data::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

impl JobSource for WorkbookSource {
    fn origin(&self) -> String {
        self.path.display().to_string()
    }

    fn group_names(&self) -> Vec<String> {
        self.sheets.iter().map(|(name, _)| name.clone()).collect()
    }

    fn max_row(&self, group: &str) -> Result<u32, SheetprintError> {
        // `end()` is 0-based and absolute; None for an empty sheet.
        Ok(self.range(group)?.end().map(|(row, _)| row + 1).unwrap_or(0))
    }

    fn cell(&self, group: &str, column: u32, row: u32) -> Result<Option<String>, SheetprintError> {
        if row == 0 {
            return Ok(None);
        }
        Ok(self
            .range(group)?
            .get_value((row - 1, column))
            .and_then(cell_text))
    }
}
