//! Render backend: turns a URL into PDF bytes.
//!
//! A [`RenderBackend`] opens one [`RenderSession`] per job, bound to an
//! account identity. The engine owns the session exclusively for the job's
//! duration and always calls [`RenderSession::close`] before the job ends,
//! whichever way it ends.
//!
//! [`ChromeBackend`] drives a real Chrome/Chromium over the DevTools
//! protocol. Tests and embedders can plug in their own implementation.

mod chrome;

pub use chrome::{ChromeBackend, ChromeSession};

use crate::error::{ItemError, SheetprintError};
use async_trait::async_trait;

/// Factory for per-identity rendering sessions.
#[async_trait]
pub trait RenderBackend: Send + Sync {
    /// Open a session for `identity`.
    ///
    /// Fails with [`SheetprintError::BackendUnavailable`] when the browser
    /// cannot be found or started.
    async fn open(&self, identity: &str) -> Result<Box<dyn RenderSession>, SheetprintError>;
}

/// An open rendering session (one browser process, one profile).
#[async_trait]
pub trait RenderSession: Send + Sync {
    /// Load `url` and print it to PDF.
    ///
    /// Errors are per item; the session stays usable for the next URL.
    async fn render(&mut self, url: &str) -> Result<Vec<u8>, ItemError>;

    /// Release the session. Must be idempotent and must not fail.
    async fn close(&mut self);
}
