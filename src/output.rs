//! Destination folder layout.
//!
//! ```text
//! <destination>/
//!   ├─ <sheet>/row_<n>.pdf     one file per rendered URL
//!   └─ failed_items.txt         only when at least one item failed
//! ```

use crate::engine::FailureRecord;
use crate::error::{ItemError, SheetprintError};
use crate::source::WorkItem;
use chrono::Local;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

const RULE_WIDTH: usize = 50;

/// Folder name for a sheet.
///
/// Sheet names are user text. Path separators would escape the destination
/// root and `: < > " | ? *` are rejected by Windows, so they become `_`.
pub fn group_dir_name(group: &str) -> String {
    let name: String = group
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '<' | '>' | '"' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    match name.as_str() {
        "" | "." | ".." => "_".to_string(),
        _ => name,
    }
}

/// Write a rendered PDF for `item` into `dir`.
///
/// Uses atomic write (temp file + rename) so an interrupted job never leaves
/// a truncated `row_<n>.pdf` behind. An existing file is replaced.
pub async fn write_pdf(dir: &Path, item: &WorkItem, bytes: &[u8]) -> Result<PathBuf, ItemError> {
    let path = dir.join(item.file_name());
    let failed = |e: std::io::Error| ItemError::WriteFailed {
        path: path.clone(),
        detail: e.to_string(),
    };

    let tmp_path = path.with_extension("pdf.tmp");
    tokio::fs::write(&tmp_path, bytes).await.map_err(failed)?;
    if let Err(e) = tokio::fs::rename(&tmp_path, &path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(failed(e));
    }
    Ok(path)
}

/// Human-readable failure report, one block per failed item.
pub fn render_report(failures: &[FailureRecord]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Failed items");
    let _ = writeln!(out, "{}", "=".repeat(RULE_WIDTH));
    let _ = writeln!(
        out,
        "Generated: {}  ({} item{})",
        Local::now().format("%Y-%m-%d %H:%M:%S"),
        failures.len(),
        if failures.len() == 1 { "" } else { "s" }
    );
    out.push('\n');
    for f in failures {
        let _ = writeln!(out, "Sheet: {}", f.group);
        let _ = writeln!(out, "Row: {}", f.sequence);
        let _ = writeln!(out, "URL: {}", f.url);
        let _ = writeln!(out, "Cause: {}", f.cause);
        let _ = writeln!(out, "{}", "-".repeat(RULE_WIDTH));
    }
    out
}

/// Write the failure report to `<destination>/<file_name>`.
pub async fn write_failure_report(
    destination: &Path,
    file_name: &str,
    failures: &[FailureRecord],
) -> Result<PathBuf, SheetprintError> {
    let path = destination.join(file_name);
    let failed = |source: std::io::Error| SheetprintError::ReportWriteFailed {
        path: path.clone(),
        source,
    };
    tokio::fs::create_dir_all(destination).await.map_err(failed)?;
    tokio::fs::write(&path, render_report(failures))
        .await
        .map_err(failed)?;
    Ok(path)
}
