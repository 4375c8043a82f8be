//! # sheetprint
//!
//! Print every URL in a spreadsheet column to PDF through a real browser.
//!
//! ## Why this crate?
//!
//! Saving a few hundred intranet or SaaS pages as PDFs by hand is slow and
//! error-prone, and many of those pages sit behind a login. This crate reads
//! the URLs from an Excel/ODS workbook, drives Chrome with a persistent
//! per-account profile (so the operator signs in once), and writes one PDF per
//! row into a folder per sheet. Long jobs can be paused, resumed and stopped
//! from another task; failures are collected into a report instead of
//! aborting the run.
//!
//! ## Pipeline Overview
//!
//! ```text
//! workbook
//!  │
//!  ├─ 1. Source    enumerate (sheet, row, url) for one column, rows 2..
//!  ├─ 2. Backend   one Chrome per account, profile dir kept between runs
//!  ├─ 3. Engine    item loop with pause/stop checkpoints + settle delay
//!  ├─ 4. Output    <dest>/<sheet>/row_<n>.pdf (atomic write)
//!  └─ 5. Report    <dest>/failed_items.txt when anything failed
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sheetprint::{AppDirs, ChromeBackend, ConversionEngine, ConversionRequest,
//!     EngineConfig, TracingEventSink, WorkbookSource};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = EngineConfig::default();
//!     let backend = ChromeBackend::new(&config, AppDirs::from_env().profile_store());
//!     let engine = ConversionEngine::new(config, Arc::new(backend))
//!         .with_event_sink(Arc::new(TracingEventSink));
//!
//!     let source = Arc::new(WorkbookSource::open_async("links.xlsx").await?);
//!     engine
//!         .start(ConversionRequest::new(
//!             "me@example.com",
//!             source,
//!             "B",
//!             vec!["Sheet1".into(), "Sheet2".into()],
//!             "./pdfs",
//!         ))
//!         .await?;
//!
//!     let outcome = engine.wait().await?;
//!     eprintln!("{} saved, {} failed", outcome.stats.succeeded, outcome.stats.failed);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `sheetprint` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! sheetprint = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod accounts;
pub mod backend;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod output;
pub mod profile;
pub mod source;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use accounts::AccountRegistry;
pub use backend::{ChromeBackend, ChromeSession, RenderBackend, RenderSession};
pub use config::{EngineConfig, EngineConfigBuilder};
pub use engine::{
    ConversionEngine, ConversionRequest, EngineState, FailureRecord, JobOutcome, JobSnapshot,
    JobStats,
};
pub use error::{ItemError, SheetprintError};
pub use events::{FanoutEventSink, JobEvent, JobEventSink, NoopEventSink, TracingEventSink};
pub use profile::{AppDirs, ProfileStore};
pub use source::{enumerate, JobSource, MemorySource, WorkItem, WorkbookSource};
