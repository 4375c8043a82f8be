//! Error types for the sheetprint library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`SheetprintError`] — **Fatal**: the job cannot start, a control call
//!   was made in the wrong state, or the job aborted unexpectedly. Returned as
//!   `Err(SheetprintError)` from the engine's public operations.
//!
//! * [`ItemError`] — **Non-fatal**: a single URL could not be rendered or its
//!   PDF could not be written. Recorded in the failure ledger and counted in
//!   the job statistics; the loop moves on to the next item.

use crate::engine::EngineState;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the sheetprint library.
///
/// Per-item failures use [`ItemError`] and never surface here.
#[derive(Debug, Error)]
pub enum SheetprintError {
    // ── Start-up errors ───────────────────────────────────────────────────
    /// The job source (workbook) could not be read.
    #[error("Job source '{origin}' is unavailable: {reason}")]
    SourceUnavailable { origin: String, reason: String },

    /// The rendering session could not be opened for this identity.
    #[error(
        "Browser session for '{identity}' could not be started: {reason}\n\
Check that Chrome or Chromium is installed, or set SHEETPRINT_CHROME=/path/to/chrome."
    )]
    BackendUnavailable { identity: String, reason: String },

    /// The request failed validation before anything was opened.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // ── Control errors ────────────────────────────────────────────────────
    /// `start` was called while a job is still running or paused.
    #[error("A conversion job is already in progress")]
    AlreadyRunning,

    /// A control call is not valid in the engine's current state.
    #[error("Cannot {action} while the job is {state}")]
    InvalidTransition {
        action: &'static str,
        state: EngineState,
    },

    /// `wait` was called but no job has been started.
    #[error("No conversion job has been started")]
    NoJob,

    // ── Job-level failure ─────────────────────────────────────────────────
    /// An error escaped per-item handling and aborted the job.
    ///
    /// Finalisation (browser teardown, failure report) has already run when
    /// this is returned.
    #[error("Conversion aborted: {0}")]
    UnexpectedEngineFailure(String),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// The failure report could not be written.
    #[error("Failed to write failure report '{path}': {source}")]
    ReportWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Accounts / profiles ───────────────────────────────────────────────
    /// The account registry file exists but could not be read or written.
    #[error("Account registry '{path}': {reason}")]
    AccountStore { path: PathBuf, reason: String },

    /// The account is already registered.
    #[error("Account '{0}' is already registered")]
    DuplicateAccount(String),

    /// The account is not registered.
    #[error("Account '{0}' is not registered")]
    UnknownAccount(String),

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// A non-fatal error for a single work item.
///
/// Stored (as its display text) in the failure ledger. The job continues
/// with the next item.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum ItemError {
    /// Navigation, timeout or print-to-PDF failed in the browser.
    #[error("Rendering '{url}' failed: {cause}")]
    RenderFailed { url: String, cause: String },

    /// The PDF bytes were produced but could not be written to disk.
    #[error("Writing '{path}' failed: {detail}")]
    WriteFailed { path: PathBuf, detail: String },
}

impl ItemError {
    /// Short cause string for the failure ledger.
    pub fn cause(&self) -> &str {
        match self {
            ItemError::RenderFailed { cause, .. } => cause,
            ItemError::WriteFailed { detail, .. } => detail,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_transition_display() {
        let e = SheetprintError::InvalidTransition {
            action: "resume",
            state: EngineState::Running,
        };
        let msg = e.to_string();
        assert!(msg.contains("resume"), "got: {msg}");
        assert!(msg.contains("running"), "got: {msg}");
    }

    #[test]
    fn backend_unavailable_mentions_override() {
        let e = SheetprintError::BackendUnavailable {
            identity: "ops@example.com".into(),
            reason: "executable not found".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("ops@example.com"));
        assert!(msg.contains("SHEETPRINT_CHROME"));
    }

    #[test]
    fn item_error_cause() {
        let e = ItemError::RenderFailed {
            url: "https://example.com".into(),
            cause: "net::ERR_NAME_NOT_RESOLVED".into(),
        };
        assert_eq!(e.cause(), "net::ERR_NAME_NOT_RESOLVED");
        assert!(e.to_string().contains("https://example.com"));
    }

    #[test]
    fn source_unavailable_display() {
        let e = SheetprintError::SourceUnavailable {
            origin: "links.xlsx".into(),
            reason: "no such file".into(),
        };
        assert!(e.to_string().contains("links.xlsx"));
    }
}
