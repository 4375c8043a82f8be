//! Engine state, statistics, failure ledger and the snapshot/outcome types
//! handed to observers.

use crate::source::WorkItem;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Lifecycle of one job.
///
/// ```text
/// Idle ─▶ Running ⇄ Paused
///            │        │
///            ▼        ▼
///   Completed | Stopped | Failed
/// ```
///
/// `Completed`, `Stopped` and `Failed` are terminal for a job; a new
/// `start()` begins a fresh job from any of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    #[default]
    Idle,
    Running,
    Paused,
    Stopped,
    Completed,
    /// The job aborted on an unexpected error (see
    /// [`crate::SheetprintError::UnexpectedEngineFailure`]).
    Failed,
}

impl EngineState {
    /// True while the job's loop still owns the backend session.
    pub fn is_active(self) -> bool {
        matches!(self, EngineState::Running | EngineState::Paused)
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            EngineState::Stopped | EngineState::Completed | EngineState::Failed
        )
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EngineState::Idle => "idle",
            EngineState::Running => "running",
            EngineState::Paused => "paused",
            EngineState::Stopped => "stopped",
            EngineState::Completed => "completed",
            EngineState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Counters for one job.
///
/// `processed == succeeded + failed` whenever no item is mid-update; the
/// engine updates all three under one lock.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStats {
    /// Number of work items enumerated for the job.
    pub total: usize,
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Wall-clock start of the job.
    pub started_at: Option<DateTime<Utc>>,
}

impl JobStats {
    /// Items not yet attempted.
    pub fn remaining(&self) -> usize {
        self.total.saturating_sub(self.processed)
    }
}

/// One failed item, as written to the failure report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub group: String,
    pub sequence: u32,
    pub url: String,
    pub cause: String,
}

impl FailureRecord {
    pub fn new(item: &WorkItem, cause: impl Into<String>) -> Self {
        Self {
            group: item.group.clone(),
            sequence: item.sequence,
            url: item.url.clone(),
            cause: cause.into(),
        }
    }
}

/// Point-in-time view of the engine, safe to take from any task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub state: EngineState,
    pub stats: JobStats,
    /// Time since the job started (frozen once it ends).
    pub elapsed: Duration,
    /// The item being rendered right now, if any.
    pub current: Option<WorkItem>,
    /// A stop was requested and will take effect at the next checkpoint.
    pub stop_requested: bool,
}

/// Final result of a job that ended `Completed` or `Stopped`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobOutcome {
    pub state: EngineState,
    pub stats: JobStats,
    pub elapsed: Duration,
    pub failures: Vec<FailureRecord>,
    /// Where the failure report was written (only when `failures` is non-empty).
    pub report_path: Option<PathBuf>,
    /// Set when the report should have been written but could not be.
    pub report_error: Option<String>,
}
