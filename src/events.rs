//! Job events for observers.
//!
//! Inject an [`Arc<dyn JobEventSink>`] via
//! [`crate::ConversionEngine::with_event_sink`] to receive an event at every
//! step of a job: each item started, saved or failed, each control action,
//! and the end of the job.
//!
//! Sinks are called synchronously from the engine task (and from whichever
//! task issued a control call) and must not block. Forward to a channel if
//! the consumer is slow.
//!
//! # Example
//!
//! ```rust
//! use sheetprint::{JobEvent, JobEventSink};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! #[derive(Default)]
//! struct SavedCounter(AtomicUsize);
//!
//! impl JobEventSink for SavedCounter {
//!     fn on_event(&self, event: &JobEvent) {
//!         if let JobEvent::ItemSucceeded { .. } = event {
//!             self.0.fetch_add(1, Ordering::SeqCst);
//!         }
//!     }
//! }
//! ```

use crate::engine::{EngineState, JobStats};
use crate::source::WorkItem;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Something that happened during a job.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JobEvent {
    /// The session is open and the loop is about to run.
    JobStarted {
        identity: String,
        groups: Vec<String>,
        total: usize,
    },
    /// First item of a sheet; its output folder now exists.
    GroupStarted { group: String, folder: PathBuf },
    /// `index` is 1-based.
    ItemStarted {
        item: WorkItem,
        index: usize,
        total: usize,
    },
    ItemSucceeded {
        item: WorkItem,
        path: PathBuf,
        bytes: usize,
    },
    ItemFailed { item: WorkItem, error: String },
    /// The in-flight render was abandoned by an abort; counted neither way.
    ItemCancelled { item: WorkItem },
    Paused,
    Resumed,
    StopRequested,
    /// The job ended `Completed` or `Stopped`.
    JobFinished {
        state: EngineState,
        stats: JobStats,
        elapsed: Duration,
        report_path: Option<PathBuf>,
    },
    /// The job ended `Failed`.
    JobAborted { error: String },
}

impl JobEvent {
    /// Stable snake_case name of the event.
    pub fn kind(&self) -> &'static str {
        match self {
            JobEvent::JobStarted { .. } => "job_started",
            JobEvent::GroupStarted { .. } => "group_started",
            JobEvent::ItemStarted { .. } => "item_started",
            JobEvent::ItemSucceeded { .. } => "item_succeeded",
            JobEvent::ItemFailed { .. } => "item_failed",
            JobEvent::ItemCancelled { .. } => "item_cancelled",
            JobEvent::Paused => "paused",
            JobEvent::Resumed => "resumed",
            JobEvent::StopRequested => "stop_requested",
            JobEvent::JobFinished { .. } => "job_finished",
            JobEvent::JobAborted { .. } => "job_aborted",
        }
    }
}

/// Receives [`JobEvent`]s. Must be `Send + Sync`.
pub trait JobEventSink: Send + Sync {
    fn on_event(&self, event: &JobEvent);
}

/// Discards every event. The engine's default sink.
pub struct NoopEventSink;

impl JobEventSink for NoopEventSink {
    fn on_event(&self, _event: &JobEvent) {}
}

/// Emits every event as a structured `tracing` record under the
/// `sheetprint::job` target.
///
/// Pair with a file layer to get a per-run conversion log.
pub struct TracingEventSink;

impl JobEventSink for TracingEventSink {
    fn on_event(&self, event: &JobEvent) {
        let kind = event.kind();
        match event {
            JobEvent::JobStarted {
                identity,
                groups,
                total,
            } => info!(
                target: "sheetprint::job",
                event = kind, account = %identity, sheets = ?groups, total,
                "Conversion started"
            ),
            JobEvent::GroupStarted { group, folder } => info!(
                target: "sheetprint::job",
                event = kind, sheet = %group, folder = %folder.display(),
                "Processing sheet"
            ),
            JobEvent::ItemStarted { item, index, total } => info!(
                target: "sheetprint::job",
                event = kind, sheet = %item.group, row = item.sequence, url = %item.url,
                "[{}/{}] Rendering", index, total
            ),
            JobEvent::ItemSucceeded { item, path, bytes } => info!(
                target: "sheetprint::job",
                event = kind, sheet = %item.group, row = item.sequence, bytes,
                "Saved {}", path.display()
            ),
            JobEvent::ItemFailed { item, error } => warn!(
                target: "sheetprint::job",
                event = kind, sheet = %item.group, row = item.sequence, url = %item.url,
                "Failed: {}", error
            ),
            JobEvent::ItemCancelled { item } => warn!(
                target: "sheetprint::job",
                event = kind, sheet = %item.group, row = item.sequence, url = %item.url,
                "Cancelled"
            ),
            JobEvent::Paused | JobEvent::Resumed | JobEvent::StopRequested => {
                info!(target: "sheetprint::job", event = kind, "Control: {}", kind)
            }
            JobEvent::JobFinished {
                state,
                stats,
                elapsed,
                report_path,
            } => info!(
                target: "sheetprint::job",
                event = kind, state = %state, total = stats.total,
                succeeded = stats.succeeded, failed = stats.failed,
                elapsed_ms = elapsed.as_millis() as u64,
                report = ?report_path,
                "Conversion {}", state
            ),
            JobEvent::JobAborted { error } => error!(
                target: "sheetprint::job",
                event = kind, "Conversion aborted: {}", error
            ),
        }
    }
}

/// Sends every event to each of the inner sinks, in order.
pub struct FanoutEventSink {
    sinks: Vec<Arc<dyn JobEventSink>>,
}

impl FanoutEventSink {
    pub fn new(sinks: Vec<Arc<dyn JobEventSink>>) -> Self {
        Self { sinks }
    }
}

impl JobEventSink for FanoutEventSink {
    fn on_event(&self, event: &JobEvent) {
        for sink in &self.sinks {
            sink.on_event(event);
        }
    }
}
