//! Integration tests for the conversion engine.
//!
//! No browser is involved: jobs run against an in-memory source and a
//! scripted backend that can fail, panic or block on chosen URLs.
//!
//! Run with:
//!   cargo test --test engine

use async_trait::async_trait;
use sheetprint::{
    ConversionEngine, ConversionRequest, EngineConfig, EngineState, ItemError, JobEvent,
    JobEventSink, MemorySource, RenderBackend, RenderSession, SheetprintError,
};
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

const FAKE_PDF: &[u8] = b"%PDF-1.4\n% fake\n";
const PATIENCE: Duration = Duration::from_secs(5);

// ── Scripted backend ─────────────────────────────────────────────────────────

/// Blocks `render` for one URL until the test releases it.
struct Gate {
    url: String,
    entered: Semaphore,
    release: Semaphore,
}

impl Gate {
    fn new(url: &str) -> Arc<Self> {
        Arc::new(Self {
            url: url.to_string(),
            entered: Semaphore::new(0),
            release: Semaphore::new(0),
        })
    }

    /// Wait until the engine is inside `render` for the gated URL.
    async fn reached(&self) {
        tokio::time::timeout(PATIENCE, self.entered.acquire())
            .await
            .expect("gated URL was never rendered")
            .unwrap()
            .forget();
    }

    fn open(&self) {
        self.release.add_permits(1);
    }
}

#[derive(Default)]
struct Probe {
    opened: AtomicUsize,
    closed: AtomicUsize,
    rendered: Mutex<Vec<String>>,
    identities: Mutex<Vec<String>>,
}

impl Probe {
    fn rendered(&self) -> Vec<String> {
        self.rendered.lock().unwrap().clone()
    }
}

#[derive(Default, Clone)]
struct Script {
    fail: HashSet<String>,
    panic_on: Option<String>,
    gate: Option<Arc<Gate>>,
    refuse_open: bool,
}

struct FakeBackend {
    probe: Arc<Probe>,
    script: Script,
}

#[async_trait]
impl RenderBackend for FakeBackend {
    async fn open(&self, identity: &str) -> Result<Box<dyn RenderSession>, SheetprintError> {
        if self.script.refuse_open {
            return Err(SheetprintError::BackendUnavailable {
                identity: identity.to_string(),
                reason: "no browser in tests".into(),
            });
        }
        self.probe.opened.fetch_add(1, Ordering::SeqCst);
        self.probe.identities.lock().unwrap().push(identity.to_string());
        Ok(Box::new(FakeSession {
            probe: Arc::clone(&self.probe),
            script: self.script.clone(),
            closed: false,
        }))
    }
}

struct FakeSession {
    probe: Arc<Probe>,
    script: Script,
    closed: bool,
}

#[async_trait]
impl RenderSession for FakeSession {
    async fn render(&mut self, url: &str) -> Result<Vec<u8>, ItemError> {
        assert!(!self.closed, "render after close");
        self.probe.rendered.lock().unwrap().push(url.to_string());

        if let Some(gate) = self.script.gate.as_ref().filter(|g| g.url == url) {
            gate.entered.add_permits(1);
            gate.release.acquire().await.unwrap().forget();
        }
        if self.script.panic_on.as_deref() == Some(url) {
            panic!("renderer crashed on {url}");
        }
        if self.script.fail.contains(url) {
            return Err(ItemError::RenderFailed {
                url: url.to_string(),
                cause: "net::ERR_CONNECTION_REFUSED".into(),
            });
        }
        Ok(FAKE_PDF.to_vec())
    }

    async fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.probe.closed.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[derive(Default)]
struct RecordingSink {
    kinds: Mutex<Vec<&'static str>>,
    started_for: Mutex<Option<String>>,
}

impl JobEventSink for RecordingSink {
    fn on_event(&self, event: &JobEvent) {
        self.kinds.lock().unwrap().push(event.kind());
        if let JobEvent::JobStarted { identity, .. } = event {
            *self.started_for.lock().unwrap() = Some(identity.clone());
        }
    }
}

// ── Test helpers ─────────────────────────────────────────────────────────────

const A1: &str = "https://a.example/1";
const A3: &str = "https://a.example/3";
const B1: &str = "https://b.example/1";

/// Sheet1: URLs at rows 2 and 4 (row 3 empty). Sheet2: URL at row 2.
fn two_sheets() -> Arc<MemorySource> {
    Arc::new(
        MemorySource::new("links.xlsx")
            .with_column("Sheet1", 1, &[A1, "", A3])
            .with_column("Sheet2", 1, &[B1]),
    )
}

fn fast_config() -> EngineConfig {
    EngineConfig::builder()
        .settle_delay(Duration::ZERO)
        .pause_poll_interval(Duration::from_millis(10))
        .build()
        .unwrap()
}

fn engine_with(script: Script) -> (ConversionEngine, Arc<Probe>) {
    let probe = Arc::new(Probe::default());
    let backend = FakeBackend {
        probe: Arc::clone(&probe),
        script,
    };
    (ConversionEngine::new(fast_config(), Arc::new(backend)), probe)
}

fn request(dest: &Path) -> ConversionRequest {
    ConversionRequest::new(
        "ops@example.com",
        two_sheets(),
        "B",
        vec!["Sheet1".into(), "Sheet2".into()],
        dest,
    )
}

fn failing(urls: &[&str]) -> Script {
    Script {
        fail: urls.iter().map(|u| u.to_string()).collect(),
        ..Default::default()
    }
}

fn gated(gate: &Arc<Gate>) -> Script {
    Script {
        gate: Some(Arc::clone(gate)),
        ..Default::default()
    }
}

async fn settle_briefly() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}

// ── End-to-end scenarios ─────────────────────────────────────────────────────

#[tokio::test]
async fn every_url_becomes_a_pdf_named_by_row() {
    let tmp = tempfile::tempdir().unwrap();
    let (engine, probe) = engine_with(Script::default());

    engine.start(request(tmp.path())).await.unwrap();
    let outcome = engine.wait().await.unwrap();

    assert_eq!(outcome.state, EngineState::Completed);
    assert_eq!(outcome.stats.total, 3);
    assert_eq!(outcome.stats.processed, 3);
    assert_eq!(outcome.stats.succeeded, 3);
    assert_eq!(outcome.stats.failed, 0);
    for file in ["Sheet1/row_2.pdf", "Sheet1/row_4.pdf", "Sheet2/row_2.pdf"] {
        let bytes = std::fs::read(tmp.path().join(file)).unwrap();
        assert_eq!(bytes, FAKE_PDF, "{file}");
    }
    assert!(!tmp.path().join("Sheet1/row_3.pdf").exists());
    assert!(!tmp.path().join("failed_items.txt").exists());
    assert!(outcome.report_path.is_none());

    assert_eq!(probe.rendered(), vec![A1, A3, B1]);
    assert_eq!(probe.opened.load(Ordering::SeqCst), 1);
    assert_eq!(probe.closed.load(Ordering::SeqCst), 1);
    assert_eq!(engine.state(), EngineState::Completed);
}

#[tokio::test]
async fn failed_render_lands_in_report() {
    let tmp = tempfile::tempdir().unwrap();
    let (engine, probe) = engine_with(failing(&[B1]));

    engine.start(request(tmp.path())).await.unwrap();
    let outcome = engine.wait().await.unwrap();

    assert_eq!(outcome.state, EngineState::Completed);
    assert_eq!(outcome.stats.processed, 3);
    assert_eq!(outcome.stats.succeeded, 2);
    assert_eq!(outcome.stats.failed, 1);
    assert_eq!(outcome.failures.len(), 1);
    let failure = &outcome.failures[0];
    assert_eq!(failure.group, "Sheet2");
    assert_eq!(failure.sequence, 2);
    assert_eq!(failure.url, B1);
    assert!(!tmp.path().join("Sheet2/row_2.pdf").exists());

    let report_path = tmp.path().join("failed_items.txt");
    assert_eq!(outcome.report_path.as_deref(), Some(report_path.as_path()));
    let report = std::fs::read_to_string(report_path).unwrap();
    assert_eq!(report.matches("Sheet: ").count(), 1);
    assert!(report.contains("Sheet: Sheet2\nRow: 2\nURL: https://b.example/1\n"));
    assert!(report.contains("net::ERR_CONNECTION_REFUSED"));
    assert_eq!(probe.closed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unwritable_pdf_counts_as_item_failure() {
    let tmp = tempfile::tempdir().unwrap();
    // A directory where the PDF should go makes the final rename fail.
    std::fs::create_dir_all(tmp.path().join("Sheet1/row_2.pdf")).unwrap();
    let (engine, _probe) = engine_with(Script::default());

    engine.start(request(tmp.path())).await.unwrap();
    let outcome = engine.wait().await.unwrap();

    assert_eq!(outcome.state, EngineState::Completed);
    assert_eq!(outcome.stats.succeeded, 2);
    assert_eq!(outcome.stats.failed, 1);
    assert_eq!(outcome.failures[0].sequence, 2);
    assert!(!tmp.path().join("Sheet1/row_2.pdf.tmp").exists());
    assert!(tmp.path().join("failed_items.txt").exists());
}

#[tokio::test]
async fn events_follow_the_job() {
    let tmp = tempfile::tempdir().unwrap();
    let probe = Arc::new(Probe::default());
    let sink = Arc::new(RecordingSink::default());
    let engine = ConversionEngine::new(
        fast_config(),
        Arc::new(FakeBackend {
            probe,
            script: failing(&[A3]),
        }),
    )
    .with_event_sink(sink.clone());

    engine.start(request(tmp.path())).await.unwrap();
    engine.wait().await.unwrap();

    assert_eq!(
        *sink.kinds.lock().unwrap(),
        vec![
            "job_started",
            "group_started",
            "item_started",
            "item_succeeded",
            "item_started",
            "item_failed",
            "group_started",
            "item_started",
            "item_succeeded",
            "job_finished",
        ]
    );
}

#[tokio::test]
async fn padded_identity_is_trimmed_for_session_and_events() {
    let tmp = tempfile::tempdir().unwrap();
    let probe = Arc::new(Probe::default());
    let sink = Arc::new(RecordingSink::default());
    let engine = ConversionEngine::new(
        fast_config(),
        Arc::new(FakeBackend {
            probe: Arc::clone(&probe),
            script: Script::default(),
        }),
    )
    .with_event_sink(sink.clone());

    let mut req = request(tmp.path());
    req.identity = "  ops@example.com\t".into();
    engine.start(req).await.unwrap();
    engine.wait().await.unwrap();

    assert_eq!(*probe.identities.lock().unwrap(), vec!["ops@example.com"]);
    assert_eq!(
        sink.started_for.lock().unwrap().as_deref(),
        Some("ops@example.com")
    );
}

// ── Pause / resume / stop ────────────────────────────────────────────────────

#[tokio::test]
async fn stop_finishes_current_item_and_skips_the_rest() {
    let tmp = tempfile::tempdir().unwrap();
    let gate = Gate::new(A3);
    let (engine, probe) = engine_with(gated(&gate));

    engine.start(request(tmp.path())).await.unwrap();
    gate.reached().await;

    engine.stop().unwrap();
    let snap = engine.snapshot();
    assert_eq!(snap.state, EngineState::Running);
    assert!(snap.stop_requested);
    assert_eq!(snap.current.as_ref().map(|i| i.sequence), Some(4));
    // A second stop while pending is accepted.
    engine.stop().unwrap();

    gate.open();
    let outcome = engine.wait().await.unwrap();

    assert_eq!(outcome.state, EngineState::Stopped);
    assert_eq!(outcome.stats.processed, 2);
    assert_eq!(outcome.stats.succeeded, 2);
    assert_eq!(outcome.stats.remaining(), 1);
    assert_eq!(probe.rendered(), vec![A1, A3]);
    assert!(tmp.path().join("Sheet1/row_4.pdf").exists());
    assert!(!tmp.path().join("Sheet2").exists());
    assert_eq!(probe.closed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn pause_holds_before_next_item_and_resume_continues() {
    let tmp = tempfile::tempdir().unwrap();
    let gate = Gate::new(A1);
    let (engine, probe) = engine_with(gated(&gate));

    engine.start(request(tmp.path())).await.unwrap();
    gate.reached().await;

    engine.pause().unwrap();
    assert_eq!(engine.state(), EngineState::Paused);
    gate.open();
    settle_briefly().await;

    // The in-flight item completed; nothing new was started.
    let snap = engine.snapshot();
    assert_eq!(snap.state, EngineState::Paused);
    assert_eq!(snap.stats.processed, 1);
    assert_eq!(snap.stats.succeeded, 1);
    assert!(snap.current.is_none());
    assert_eq!(probe.rendered(), vec![A1]);

    // Pausing twice is a wrong-state call.
    assert!(matches!(
        engine.pause(),
        Err(SheetprintError::InvalidTransition { action: "pause", .. })
    ));

    engine.resume().unwrap();
    let outcome = engine.wait().await.unwrap();

    assert_eq!(outcome.state, EngineState::Completed);
    assert_eq!(outcome.stats.processed, 3);
    // No item skipped, none repeated.
    assert_eq!(probe.rendered(), vec![A1, A3, B1]);
}

#[tokio::test]
async fn stop_while_paused_ends_stopped() {
    let tmp = tempfile::tempdir().unwrap();
    let gate = Gate::new(A1);
    let (engine, probe) = engine_with(gated(&gate));

    engine.start(request(tmp.path())).await.unwrap();
    gate.reached().await;
    engine.pause().unwrap();
    gate.open();
    settle_briefly().await;

    engine.stop().unwrap();
    let outcome = tokio::time::timeout(PATIENCE, engine.wait())
        .await
        .expect("paused job did not react to stop")
        .unwrap();

    assert_eq!(outcome.state, EngineState::Stopped);
    assert_eq!(outcome.stats.processed, 1);
    assert_eq!(probe.rendered(), vec![A1]);
    assert_eq!(probe.closed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn stop_cuts_the_settle_delay_short() {
    let tmp = tempfile::tempdir().unwrap();
    let gate = Gate::new(A1);
    let probe = Arc::new(Probe::default());
    let config = EngineConfig::builder()
        .settle_delay(Duration::from_secs(600))
        .build()
        .unwrap();
    let engine = ConversionEngine::new(
        config,
        Arc::new(FakeBackend {
            probe: Arc::clone(&probe),
            script: gated(&gate),
        }),
    );

    engine.start(request(tmp.path())).await.unwrap();
    gate.reached().await;
    gate.open();
    settle_briefly().await;
    engine.stop().unwrap();

    let outcome = tokio::time::timeout(PATIENCE, engine.wait())
        .await
        .expect("settle delay ignored the stop request")
        .unwrap();
    assert_eq!(outcome.state, EngineState::Stopped);
    assert_eq!(outcome.stats.processed, 1);
}

#[tokio::test]
async fn abort_abandons_hung_render_and_closes_session() {
    let tmp = tempfile::tempdir().unwrap();
    let gate = Gate::new(A3);
    let sink = Arc::new(RecordingSink::default());
    let probe = Arc::new(Probe::default());
    let engine = ConversionEngine::new(
        fast_config(),
        Arc::new(FakeBackend {
            probe: Arc::clone(&probe),
            script: gated(&gate),
        }),
    )
    .with_event_sink(sink.clone());

    engine.start(request(tmp.path())).await.unwrap();
    gate.reached().await;

    // A plain stop waits for the render, which never returns here.
    engine.stop().unwrap();
    engine.abort().unwrap();
    engine.abort().unwrap();

    let outcome = tokio::time::timeout(PATIENCE, engine.wait())
        .await
        .expect("abort must not wait for the render")
        .unwrap();

    assert_eq!(outcome.state, EngineState::Stopped);
    assert_eq!(outcome.stats.processed, 1);
    assert_eq!(outcome.stats.succeeded, 1);
    assert_eq!(outcome.stats.failed, 0);
    assert!(outcome.failures.is_empty());
    assert!(tmp.path().join("Sheet1/row_2.pdf").exists());
    assert!(!tmp.path().join("Sheet1/row_4.pdf").exists());
    assert!(!tmp.path().join("Sheet2").exists());
    assert_eq!(probe.closed.load(Ordering::SeqCst), 1);
    assert!(engine.snapshot().current.is_none());

    let kinds = sink.kinds.lock().unwrap().clone();
    assert_eq!(kinds.iter().filter(|k| **k == "stop_requested").count(), 1);
    assert_eq!(
        &kinds[kinds.len() - 3..],
        &["stop_requested", "item_cancelled", "job_finished"]
    );
}

#[tokio::test]
async fn abort_while_paused_ends_stopped() {
    let tmp = tempfile::tempdir().unwrap();
    let gate = Gate::new(A3);
    let (engine, probe) = engine_with(gated(&gate));

    engine.start(request(tmp.path())).await.unwrap();
    gate.reached().await;
    engine.pause().unwrap();
    gate.open();
    settle_briefly().await;

    engine.abort().unwrap();
    let outcome = tokio::time::timeout(PATIENCE, engine.wait())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(outcome.state, EngineState::Stopped);
    assert_eq!(outcome.stats.processed, 2);
    assert_eq!(probe.rendered(), vec![A1, A3]);
    assert_eq!(probe.closed.load(Ordering::SeqCst), 1);
}

// ── Control surface errors ───────────────────────────────────────────────────

#[tokio::test]
async fn control_calls_without_a_job_are_rejected() {
    let (engine, _probe) = engine_with(Script::default());

    assert_eq!(engine.state(), EngineState::Idle);
    for result in [engine.pause(), engine.resume(), engine.stop(), engine.abort()] {
        assert!(matches!(
            result,
            Err(SheetprintError::InvalidTransition {
                state: EngineState::Idle,
                ..
            })
        ));
    }
    assert!(matches!(engine.wait().await, Err(SheetprintError::NoJob)));
}

#[tokio::test]
async fn second_start_while_running_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let gate = Gate::new(A1);
    let (engine, probe) = engine_with(gated(&gate));

    engine.start(request(tmp.path())).await.unwrap();
    gate.reached().await;

    let err = engine.start(request(tmp.path())).await.unwrap_err();
    assert!(matches!(err, SheetprintError::AlreadyRunning));
    assert!(matches!(
        engine.resume(),
        Err(SheetprintError::InvalidTransition { action: "resume", .. })
    ));

    gate.open();
    let outcome = engine.wait().await.unwrap();
    assert_eq!(outcome.stats.processed, 3);
    assert_eq!(probe.opened.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unknown_sheet_fails_before_opening_browser() {
    let tmp = tempfile::tempdir().unwrap();
    let (engine, probe) = engine_with(Script::default());

    let mut req = request(tmp.path());
    req.groups = vec!["Sheet1".into(), "Missing".into()];
    let err = engine.start(req).await.unwrap_err();

    assert!(matches!(err, SheetprintError::SourceUnavailable { .. }));
    assert_eq!(engine.state(), EngineState::Idle);
    assert_eq!(probe.opened.load(Ordering::SeqCst), 0);
    assert!(std::fs::read_dir(tmp.path()).unwrap().next().is_none());
}

#[tokio::test]
async fn browser_failure_leaves_engine_idle() {
    let tmp = tempfile::tempdir().unwrap();
    let (engine, _probe) = engine_with(Script {
        refuse_open: true,
        ..Default::default()
    });

    let err = engine.start(request(tmp.path())).await.unwrap_err();
    assert!(matches!(err, SheetprintError::BackendUnavailable { .. }));
    assert_eq!(engine.state(), EngineState::Idle);
    assert_eq!(engine.snapshot().stats.processed, 0);

    // The engine is still usable afterwards.
    assert!(matches!(
        engine.start(request(tmp.path())).await,
        Err(SheetprintError::BackendUnavailable { .. })
    ));
}

#[tokio::test]
async fn invalid_requests_are_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let (engine, probe) = engine_with(Script::default());

    let mut no_account = request(tmp.path());
    no_account.identity = "  ".into();
    let mut bad_column = request(tmp.path());
    bad_column.column = "2".into();
    let mut no_sheets = request(tmp.path());
    no_sheets.groups.clear();

    for req in [no_account, bad_column, no_sheets] {
        assert!(matches!(
            engine.start(req).await,
            Err(SheetprintError::InvalidRequest(_))
        ));
    }
    assert_eq!(probe.opened.load(Ordering::SeqCst), 0);
}

// ── Lifecycle ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn restart_begins_with_fresh_statistics() {
    let tmp = tempfile::tempdir().unwrap();
    let (engine, probe) = engine_with(failing(&[A1]));

    engine.start(request(&tmp.path().join("first"))).await.unwrap();
    let first = engine.wait().await.unwrap();
    assert_eq!(first.stats.failed, 1);

    let mut req = request(&tmp.path().join("second"));
    req.groups = vec!["Sheet2".into()];
    engine.start(req).await.unwrap();
    let second = engine.wait().await.unwrap();

    assert_eq!(second.stats.total, 1);
    assert_eq!(second.stats.processed, 1);
    assert_eq!(second.stats.failed, 0);
    assert!(second.failures.is_empty());
    assert!(!tmp.path().join("second/failed_items.txt").exists());
    assert_eq!(probe.opened.load(Ordering::SeqCst), 2);
    assert_eq!(probe.closed.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn sheet_without_urls_completes_empty() {
    let tmp = tempfile::tempdir().unwrap();
    let (engine, probe) = engine_with(Script::default());
    let source = Arc::new(MemorySource::new("mem").with_column("Notes", 1, &["no links", ""]));

    engine
        .start(ConversionRequest::new(
            "ops@example.com",
            source,
            "B",
            vec!["Notes".into()],
            tmp.path(),
        ))
        .await
        .unwrap();
    let outcome = engine.wait().await.unwrap();

    assert_eq!(outcome.state, EngineState::Completed);
    assert_eq!(outcome.stats.total, 0);
    assert!(probe.rendered().is_empty());
    assert_eq!(probe.closed.load(Ordering::SeqCst), 1);
    assert!(!tmp.path().join("Notes").exists());
}

#[tokio::test]
async fn panicking_backend_aborts_job_but_still_cleans_up() {
    let tmp = tempfile::tempdir().unwrap();
    let (engine, probe) = engine_with(Script {
        fail: [A1.to_string()].into_iter().collect(),
        panic_on: Some(A3.to_string()),
        ..Default::default()
    });

    engine.start(request(tmp.path())).await.unwrap();
    let err = engine.wait().await.unwrap_err();

    assert!(matches!(err, SheetprintError::UnexpectedEngineFailure(_)));
    assert!(err.to_string().contains("renderer crashed"));
    assert_eq!(engine.state(), EngineState::Failed);
    assert_eq!(probe.closed.load(Ordering::SeqCst), 1);
    // The failure collected before the abort is still reported.
    assert!(tmp.path().join("failed_items.txt").exists());
    assert_eq!(probe.rendered(), vec![A1, A3]);
}

#[tokio::test]
async fn unusable_destination_aborts_job() {
    let tmp = tempfile::tempdir().unwrap();
    let dest = tmp.path().join("not-a-folder");
    std::fs::write(&dest, b"occupied").unwrap();
    let (engine, probe) = engine_with(Script::default());

    engine.start(request(&dest)).await.unwrap();
    let err = engine.wait().await.unwrap_err();

    assert!(matches!(err, SheetprintError::UnexpectedEngineFailure(_)));
    assert_eq!(engine.state(), EngineState::Failed);
    assert!(probe.rendered().is_empty());
    assert_eq!(probe.closed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn snapshot_counts_always_add_up() {
    let tmp = tempfile::tempdir().unwrap();
    let (engine, _probe) = engine_with(failing(&[A3]));

    engine.start(request(tmp.path())).await.unwrap();
    loop {
        let snap = engine.snapshot();
        assert_eq!(
            snap.stats.processed,
            snap.stats.succeeded + snap.stats.failed
        );
        assert!(snap.stats.processed <= snap.stats.total);
        if snap.state.is_terminal() {
            break;
        }
        tokio::task::yield_now().await;
    }
    let outcome = engine.wait().await.unwrap();
    assert_eq!(outcome.stats.processed, 3);
}
