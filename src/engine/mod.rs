//! The conversion job engine and its control surface.
//!
//! ## Threads of control
//!
//! ```text
//!  caller (CLI / UI)                      engine task (tokio::spawn)
//!  ─────────────────                      ──────────────────────────
//!  start(request) ──validate, enumerate,
//!                   open session──────────▶ for item in items:
//!  pause()  ─┐                                checkpoint ◀── flags
//!  resume() ─┼──▶ Mutex<Inner> + Notify ──▶   render → write PDF
//!  stop()   ─┘                                record stats / failure
//!  snapshot() ◀── Mutex<Inner> ◀───────────   settle delay
//!  wait() ◀──────── JoinHandle ◀─────────── finish: close, report
//! ```
//!
//! All state shared between the two sides lives in one `Mutex`, which is
//! never held across an `.await`. Control calls only flip flags and wake the
//! loop; the loop alone updates statistics and the failure ledger. A snapshot
//! therefore always sees `processed == succeeded + failed`.

mod runner;
mod state;

pub use state::{EngineState, FailureRecord, JobOutcome, JobSnapshot, JobStats};

use crate::backend::{RenderBackend, RenderSession};
use crate::config::EngineConfig;
use crate::error::SheetprintError;
use crate::events::{JobEvent, JobEventSink, NoopEventSink};
use crate::source::{enumerate, JobSource, WorkItem};
use chrono::Utc;
use runner::JobRun;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::info;

/// Everything a job needs to know about *what* to convert.
#[derive(Clone)]
pub struct ConversionRequest {
    /// Account key; selects the browser profile.
    pub identity: String,
    pub source: Arc<dyn JobSource>,
    /// Column letter(s) holding the URLs, e.g. `"B"`.
    pub column: String,
    /// Sheets to process, in order.
    pub groups: Vec<String>,
    /// Output root; one subfolder per sheet is created below it.
    pub destination: PathBuf,
}

impl ConversionRequest {
    pub fn new(
        identity: impl Into<String>,
        source: Arc<dyn JobSource>,
        column: impl Into<String>,
        groups: Vec<String>,
        destination: impl Into<PathBuf>,
    ) -> Self {
        Self {
            identity: identity.into(),
            source,
            column: column.into(),
            groups,
            destination: destination.into(),
        }
    }

    /// Identity as used for the session and reported in events.
    fn account(&self) -> &str {
        self.identity.trim()
    }

    fn validate(&self) -> Result<(), SheetprintError> {
        if self.account().is_empty() {
            return Err(SheetprintError::InvalidRequest(
                "select an account".into(),
            ));
        }
        if self.destination.as_os_str().is_empty() {
            return Err(SheetprintError::InvalidRequest(
                "select an output folder".into(),
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for ConversionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionRequest")
            .field("identity", &self.identity)
            .field("source", &self.source.origin())
            .field("column", &self.column)
            .field("groups", &self.groups)
            .field("destination", &self.destination)
            .finish()
    }
}

// ── Shared state ─────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub(crate) struct Inner {
    pub(crate) state: EngineState,
    /// A `start` call is between validation and spawning the loop.
    pub(crate) starting: bool,
    pub(crate) stop_requested: bool,
    /// The in-flight render is abandoned as well.
    pub(crate) abort_requested: bool,
    pub(crate) stats: JobStats,
    pub(crate) failures: Vec<FailureRecord>,
    pub(crate) current: Option<WorkItem>,
    pub(crate) started: Option<Instant>,
    pub(crate) finished: Option<Instant>,
}

impl Inner {
    fn snapshot(&self) -> JobSnapshot {
        let elapsed = match (self.started, self.finished) {
            (Some(start), Some(end)) => end.duration_since(start),
            (Some(start), None) => start.elapsed(),
            _ => Default::default(),
        };
        JobSnapshot {
            state: self.state,
            stats: self.stats.clone(),
            elapsed,
            current: self.current.clone(),
            stop_requested: self.stop_requested,
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct Shared {
    inner: Mutex<Inner>,
    /// Wakes a paused or settling loop after resume/stop.
    pub(crate) wake: Notify,
}

impl Shared {
    pub(crate) fn lock(&self) -> MutexGuard<'_, Inner> {
        // Inner is plain data; a panic elsewhere cannot leave it half-written
        // in a way that matters more than losing the job's progress view.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn stop_requested(&self) -> bool {
        self.lock().stop_requested
    }

    /// Resolves once `abort` has been called for the running job.
    pub(crate) async fn aborted(&self) {
        loop {
            let notified = self.wake.notified();
            let aborted = self.lock().abort_requested;
            if aborted {
                return;
            }
            notified.await;
        }
    }
}

type JobTask = JoinHandle<Result<JobOutcome, SheetprintError>>;

// ── Engine ───────────────────────────────────────────────────────────────

/// Runs one conversion job at a time and exposes its control surface.
///
/// All methods take `&self`; share the engine between the caller's tasks
/// with an `Arc`.
///
/// # Example
/// ```rust,no_run
/// use sheetprint::{ChromeBackend, ConversionEngine, ConversionRequest, EngineConfig,
///     WorkbookSource, AppDirs};
/// use std::sync::Arc;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = EngineConfig::default();
/// let backend = ChromeBackend::new(&config, AppDirs::from_env().profile_store());
/// let engine = ConversionEngine::new(config, Arc::new(backend));
///
/// let source = Arc::new(WorkbookSource::open_async("links.xlsx").await?);
/// let request = ConversionRequest::new(
///     "me@example.com", source, "B", vec!["Sheet1".into()], "./pdfs");
/// engine.start(request).await?;
/// let outcome = engine.wait().await?;
/// println!("{} of {} saved", outcome.stats.succeeded, outcome.stats.total);
/// # Ok(())
/// # }
/// ```
pub struct ConversionEngine {
    config: EngineConfig,
    backend: Arc<dyn RenderBackend>,
    events: Arc<dyn JobEventSink>,
    shared: Arc<Shared>,
    task: Mutex<Option<JobTask>>,
}

impl ConversionEngine {
    pub fn new(config: EngineConfig, backend: Arc<dyn RenderBackend>) -> Self {
        Self {
            config,
            backend,
            events: Arc::new(NoopEventSink),
            shared: Arc::new(Shared::default()),
            task: Mutex::new(None),
        }
    }

    /// Route job events to `sink` instead of discarding them.
    pub fn with_event_sink(mut self, sink: Arc<dyn JobEventSink>) -> Self {
        self.events = sink;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Validate the request, enumerate work items, open the browser session
    /// and start the job on its own task.
    ///
    /// Returns once the loop is running. Start-up failures
    /// (`InvalidRequest`, `SourceUnavailable`, `BackendUnavailable`) leave
    /// the previous state and statistics untouched.
    pub async fn start(&self, request: ConversionRequest) -> Result<(), SheetprintError> {
        {
            let mut inner = self.shared.lock();
            if inner.state.is_active() || inner.starting {
                return Err(SheetprintError::AlreadyRunning);
            }
            inner.starting = true;
        }

        let (session, items) = match self.prepare(&request).await {
            Ok(prepared) => prepared,
            Err(e) => {
                self.shared.lock().starting = false;
                return Err(e);
            }
        };

        let total = items.len();
        info!(
            "Starting job: account={}, column={}, sheets={:?}, {} URLs",
            request.account(), request.column, request.groups, total
        );

        // Hold the task slot while swapping in the new job so `wait` can
        // never pick up the previous job's handle.
        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        {
            let mut inner = self.shared.lock();
            *inner = Inner {
                state: EngineState::Running,
                stats: JobStats {
                    total,
                    started_at: Some(Utc::now()),
                    ..Default::default()
                },
                started: Some(Instant::now()),
                ..Default::default()
            };
        }

        self.events.on_event(&JobEvent::JobStarted {
            identity: request.account().to_string(),
            groups: request.groups.clone(),
            total,
        });

        let run = JobRun::new(
            Arc::clone(&self.shared),
            self.config.clone(),
            Arc::clone(&self.events),
            session,
            items,
            request.destination,
        );
        *task = Some(tokio::spawn(run.run()));
        Ok(())
    }

    async fn prepare(
        &self,
        request: &ConversionRequest,
    ) -> Result<(Box<dyn RenderSession>, Vec<WorkItem>), SheetprintError> {
        request.validate()?;
        let items = enumerate(request.source.as_ref(), &request.column, &request.groups)?;
        let session = self.backend.open(request.account()).await?;
        Ok((session, items))
    }

    /// Suspend the job before its next item. Valid only while running.
    pub fn pause(&self) -> Result<(), SheetprintError> {
        {
            let mut inner = self.shared.lock();
            if inner.state != EngineState::Running {
                return Err(SheetprintError::InvalidTransition {
                    action: "pause",
                    state: inner.state,
                });
            }
            inner.state = EngineState::Paused;
        }
        self.events.on_event(&JobEvent::Paused);
        Ok(())
    }

    /// Continue a paused job with its next unprocessed item.
    pub fn resume(&self) -> Result<(), SheetprintError> {
        {
            let mut inner = self.shared.lock();
            if inner.state != EngineState::Paused {
                return Err(SheetprintError::InvalidTransition {
                    action: "resume",
                    state: inner.state,
                });
            }
            inner.state = EngineState::Running;
        }
        self.shared.wake.notify_waiters();
        self.events.on_event(&JobEvent::Resumed);
        Ok(())
    }

    /// Ask the job to stop at its next checkpoint.
    ///
    /// The item being rendered (if any) is finished first; nothing after it
    /// is attempted. Files already written stay on disk. Repeated calls
    /// while the stop is pending are no-ops.
    pub fn stop(&self) -> Result<(), SheetprintError> {
        {
            let mut inner = self.shared.lock();
            if !inner.state.is_active() {
                return Err(SheetprintError::InvalidTransition {
                    action: "stop",
                    state: inner.state,
                });
            }
            if inner.stop_requested {
                return Ok(());
            }
            inner.stop_requested = true;
        }
        self.shared.wake.notify_waiters();
        self.events.on_event(&JobEvent::StopRequested);
        Ok(())
    }

    /// Stop now: abandon the item being rendered instead of waiting for it.
    ///
    /// The job still finalises as after [`stop`](Self::stop): the session is
    /// closed, the failure report written and the job ends `Stopped`. The
    /// abandoned item is counted neither as succeeded nor as failed.
    pub fn abort(&self) -> Result<(), SheetprintError> {
        let first_stop = {
            let mut inner = self.shared.lock();
            if !inner.state.is_active() {
                return Err(SheetprintError::InvalidTransition {
                    action: "abort",
                    state: inner.state,
                });
            }
            if inner.abort_requested {
                return Ok(());
            }
            inner.abort_requested = true;
            !std::mem::replace(&mut inner.stop_requested, true)
        };
        self.shared.wake.notify_waiters();
        if first_stop {
            self.events.on_event(&JobEvent::StopRequested);
        }
        Ok(())
    }

    /// Consistent point-in-time view of state, statistics and elapsed time.
    pub fn snapshot(&self) -> JobSnapshot {
        self.shared.lock().snapshot()
    }

    pub fn state(&self) -> EngineState {
        self.shared.lock().state
    }

    /// Wait for the current job to end and take its outcome.
    ///
    /// Returns `UnexpectedEngineFailure` if the job aborted, and `NoJob` if
    /// no job was started since the last `wait`.
    pub async fn wait(&self) -> Result<JobOutcome, SheetprintError> {
        let handle = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(SheetprintError::NoJob)?;
        match handle.await {
            Ok(result) => result,
            Err(e) => Err(SheetprintError::UnexpectedEngineFailure(format!(
                "job task ended abnormally: {e}"
            ))),
        }
    }
}

impl fmt::Debug for ConversionEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionEngine")
            .field("config", &self.config)
            .field("state", &self.state())
            .finish()
    }
}
