//! The job loop: checkpoint, render, write, record, settle.

use super::{EngineState, FailureRecord, JobOutcome, Shared};
use crate::backend::RenderSession;
use crate::config::EngineConfig;
use crate::error::SheetprintError;
use crate::events::{JobEvent, JobEventSink};
use crate::output;
use crate::source::WorkItem;
use futures::FutureExt;
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Checkpoint {
    Proceed,
    Stop,
}

/// One job, owned by the spawned engine task.
pub(crate) struct JobRun {
    shared: Arc<Shared>,
    config: EngineConfig,
    events: Arc<dyn JobEventSink>,
    session: Box<dyn RenderSession>,
    items: Vec<WorkItem>,
    destination: PathBuf,
    group_dirs: HashMap<String, PathBuf>,
}

impl JobRun {
    pub(crate) fn new(
        shared: Arc<Shared>,
        config: EngineConfig,
        events: Arc<dyn JobEventSink>,
        session: Box<dyn RenderSession>,
        items: Vec<WorkItem>,
        destination: PathBuf,
    ) -> Self {
        Self {
            shared,
            config,
            events,
            session,
            items,
            destination,
            group_dirs: HashMap::new(),
        }
    }

    /// Run the loop, then finalise whatever way the loop ended.
    pub(crate) async fn run(mut self) -> Result<JobOutcome, SheetprintError> {
        let result = match AssertUnwindSafe(self.process_all()).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => Err(SheetprintError::UnexpectedEngineFailure(format!(
                "job loop panicked: {}",
                panic_message(panic.as_ref())
            ))),
        };
        self.finish(result).await
    }

    async fn process_all(&mut self) -> Result<(), SheetprintError> {
        let items = std::mem::take(&mut self.items);
        let total = items.len();

        for (index, item) in items.iter().enumerate() {
            if self.checkpoint().await == Checkpoint::Stop {
                info!(
                    "Stop requested; {} of {} URLs not attempted",
                    total - index,
                    total
                );
                return Ok(());
            }

            let dir = self.group_dir(&item.group).await?;
            if self.process_item(item, index + 1, total, dir).await == Checkpoint::Stop {
                info!(
                    "Aborted; {} of {} URLs not completed",
                    total - index,
                    total
                );
                return Ok(());
            }

            if index + 1 < total {
                self.settle().await;
            }
        }
        Ok(())
    }

    /// Block while paused. Returns `Stop` once a stop has been requested.
    ///
    /// The `Notified` future is created before the flags are read, so a
    /// resume/stop between the read and the wait still wakes us. The poll
    /// interval bounds the wait regardless.
    async fn checkpoint(&self) -> Checkpoint {
        let mut waited = false;
        loop {
            let notified = self.shared.wake.notified();
            {
                let inner = self.shared.lock();
                if inner.stop_requested {
                    return Checkpoint::Stop;
                }
                if inner.state != EngineState::Paused {
                    if waited {
                        debug!("Resuming with next URL");
                    }
                    return Checkpoint::Proceed;
                }
            }
            if !waited {
                info!("Paused");
                waited = true;
            }
            let _ = tokio::time::timeout(self.config.pause_poll_interval, notified).await;
        }
    }

    /// Sleep for the settle delay, cut short by a stop request.
    async fn settle(&self) {
        let deadline = tokio::time::Instant::now() + self.config.settle_delay;
        loop {
            let notified = self.shared.wake.notified();
            if self.shared.stop_requested() {
                return;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return;
            }
        }
    }

    /// Output folder for `group`, created on first use.
    ///
    /// A folder that cannot be created aborts the job: every later item of
    /// the sheet would fail the same way.
    async fn group_dir(&mut self, group: &str) -> Result<PathBuf, SheetprintError> {
        if let Some(dir) = self.group_dirs.get(group) {
            return Ok(dir.clone());
        }
        let dir = self.destination.join(output::group_dir_name(group));
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            SheetprintError::UnexpectedEngineFailure(format!(
                "cannot create output folder {}: {e}",
                dir.display()
            ))
        })?;
        info!("Sheet '{}' → {}", group, dir.display());
        self.events.on_event(&JobEvent::GroupStarted {
            group: group.to_string(),
            folder: dir.clone(),
        });
        self.group_dirs.insert(group.to_string(), dir.clone());
        Ok(dir)
    }

    /// Render and save one item. Returns `Stop` if an abort cancelled it.
    async fn process_item(
        &mut self,
        item: &WorkItem,
        index: usize,
        total: usize,
        dir: PathBuf,
    ) -> Checkpoint {
        self.shared.lock().current = Some(item.clone());
        self.events.on_event(&JobEvent::ItemStarted {
            item: item.clone(),
            index,
            total,
        });
        debug!("[{}/{}] {} row {}: {}", index, total, item.group, item.sequence, item.url);

        let shared = Arc::clone(&self.shared);
        let rendered = tokio::select! {
            rendered = self.session.render(&item.url) => rendered,
            _ = shared.aborted() => {
                shared.lock().current = None;
                warn!("Cancelled {} row {}: {}", item.group, item.sequence, item.url);
                self.events.on_event(&JobEvent::ItemCancelled { item: item.clone() });
                return Checkpoint::Stop;
            }
        };

        let result = match rendered {
            Ok(pdf) => output::write_pdf(&dir, item, &pdf)
                .await
                .map(|path| (path, pdf.len())),
            Err(e) => Err(e),
        };

        match result {
            Ok((path, bytes)) => {
                {
                    let mut inner = self.shared.lock();
                    inner.stats.processed += 1;
                    inner.stats.succeeded += 1;
                    inner.current = None;
                }
                info!("✓ {} → {}", item.url, path.display());
                self.events.on_event(&JobEvent::ItemSucceeded {
                    item: item.clone(),
                    path,
                    bytes,
                });
            }
            Err(e) => {
                {
                    let mut inner = self.shared.lock();
                    inner.stats.processed += 1;
                    inner.stats.failed += 1;
                    inner.failures.push(FailureRecord::new(item, e.cause()));
                    inner.current = None;
                }
                warn!("✗ {} row {}: {}", item.group, item.sequence, e);
                self.events.on_event(&JobEvent::ItemFailed {
                    item: item.clone(),
                    error: e.to_string(),
                });
            }
        }
        Checkpoint::Proceed
    }

    /// Close the session, write the failure report, publish the end state.
    async fn finish(
        mut self,
        result: Result<(), SheetprintError>,
    ) -> Result<JobOutcome, SheetprintError> {
        self.session.close().await;

        let (failures, stop_requested) = {
            let inner = self.shared.lock();
            (inner.failures.clone(), inner.stop_requested)
        };

        let (report_path, report_error) = if failures.is_empty() {
            (None, None)
        } else {
            match output::write_failure_report(
                &self.destination,
                &self.config.failure_report_name,
                &failures,
            )
            .await
            {
                Ok(path) => {
                    info!("Failure report written: {}", path.display());
                    (Some(path), None)
                }
                Err(e) => {
                    error!("{}", e);
                    (None, Some(e.to_string()))
                }
            }
        };

        let state = match &result {
            Ok(()) if stop_requested => EngineState::Stopped,
            Ok(()) => EngineState::Completed,
            Err(_) => EngineState::Failed,
        };
        let (stats, elapsed) = {
            let mut inner = self.shared.lock();
            let now = Instant::now();
            inner.state = state;
            inner.current = None;
            inner.finished = Some(now);
            let elapsed = inner
                .started
                .map(|start| now.duration_since(start))
                .unwrap_or_default();
            (inner.stats.clone(), elapsed)
        };

        match result {
            Ok(()) => {
                info!(
                    "Job {}: {} processed, {} succeeded, {} failed in {:.1}s",
                    state,
                    stats.processed,
                    stats.succeeded,
                    stats.failed,
                    elapsed.as_secs_f64()
                );
                self.events.on_event(&JobEvent::JobFinished {
                    state,
                    stats: stats.clone(),
                    elapsed,
                    report_path: report_path.clone(),
                });
                Ok(JobOutcome {
                    state,
                    stats,
                    elapsed,
                    failures,
                    report_path,
                    report_error,
                })
            }
            Err(e) => {
                let e = match e {
                    e @ SheetprintError::UnexpectedEngineFailure(_) => e,
                    other => SheetprintError::UnexpectedEngineFailure(other.to_string()),
                };
                error!("{}", e);
                self.events.on_event(&JobEvent::JobAborted {
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
