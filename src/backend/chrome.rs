//! Chrome/Chromium backend over the DevTools protocol (chromiumoxide).
//!
//! One browser process per session, started with the identity's persistent
//! `--user-data-dir` so sign-ins survive between runs. Each URL gets a fresh
//! tab which is closed after printing.

use super::{RenderBackend, RenderSession};
use crate::config::EngineConfig;
use crate::error::{ItemError, SheetprintError};
use crate::profile::ProfileStore;
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::PrintToPdfParams;
use chromiumoxide::Page;
use futures::StreamExt;
use std::path::PathBuf;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Flags every launch gets, in addition to chromiumoxide's defaults.
const BASE_ARGS: &[&str] = &["--disable-gpu", "--disable-dev-shm-usage"];

/// How long a graceful `Browser.close` may take before the process is killed.
const CLOSE_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
struct ChromeOptions {
    executable: Option<PathBuf>,
    headless: bool,
    extra_args: Vec<String>,
    page_load_delay: Duration,
    navigation_timeout: Duration,
    print_background: bool,
    landscape: bool,
}

impl ChromeOptions {
    fn from_config(config: &EngineConfig) -> Self {
        Self {
            executable: config.chrome_executable.clone(),
            headless: config.headless,
            extra_args: config.extra_browser_args.clone(),
            page_load_delay: config.page_load_delay,
            navigation_timeout: config.navigation_timeout,
            print_background: config.print_background,
            landscape: config.landscape,
        }
    }

    fn print_params(&self) -> PrintToPdfParams {
        PrintToPdfParams {
            print_background: Some(self.print_background),
            landscape: Some(self.landscape),
            ..Default::default()
        }
    }
}

/// Launches Chrome with a per-identity profile.
#[derive(Debug, Clone)]
pub struct ChromeBackend {
    profiles: ProfileStore,
    options: ChromeOptions,
}

impl ChromeBackend {
    pub fn new(config: &EngineConfig, profiles: ProfileStore) -> Self {
        Self {
            profiles,
            options: ChromeOptions::from_config(config),
        }
    }

    fn browser_config(&self, identity: &str) -> Result<BrowserConfig, SheetprintError> {
        let unavailable = |reason: String| SheetprintError::BackendUnavailable {
            identity: identity.to_string(),
            reason,
        };

        let executable = match &self.options.executable {
            Some(path) => path.clone(),
            None => chrome_locate::find_browser().map_err(|e| unavailable(e.to_string()))?,
        };
        let profile_dir = self.profiles.ensure_profile_dir(identity)?;
        info!(
            "Launching {} for '{}' (profile {})",
            executable.display(),
            identity,
            profile_dir.display()
        );

        let mut builder = BrowserConfig::builder()
            .chrome_executable(executable)
            .user_data_dir(profile_dir)
            .request_timeout(self.options.navigation_timeout)
            .no_sandbox()
            .args(BASE_ARGS.iter().copied())
            .args(self.options.extra_args.iter().cloned());
        if !self.options.headless {
            builder = builder.with_head();
        }
        builder.build().map_err(unavailable)
    }
}

#[async_trait]
impl RenderBackend for ChromeBackend {
    async fn open(&self, identity: &str) -> Result<Box<dyn RenderSession>, SheetprintError> {
        let config = self.browser_config(identity)?;
        let (browser, mut handler) =
            Browser::launch(config)
                .await
                .map_err(|e| SheetprintError::BackendUnavailable {
                    identity: identity.to_string(),
                    reason: e.to_string(),
                })?;

        // The CDP connection only makes progress while its handler is polled.
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("CDP handler: {}", e);
                }
            }
        });

        Ok(Box::new(ChromeSession {
            identity: identity.to_string(),
            browser: Some(browser),
            handler: Some(handler),
            options: self.options.clone(),
        }))
    }
}

/// A running browser bound to one identity.
pub struct ChromeSession {
    identity: String,
    browser: Option<Browser>,
    handler: Option<JoinHandle<()>>,
    options: ChromeOptions,
}

impl ChromeSession {
    async fn print(&self, page: &Page, url: &str) -> Result<Vec<u8>, String> {
        match tokio::time::timeout(self.options.navigation_timeout, page.goto(url)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return Err(format!("navigation failed: {e}")),
            Err(_) => {
                return Err(format!(
                    "navigation timed out after {}s",
                    self.options.navigation_timeout.as_secs()
                ))
            }
        }

        tokio::time::sleep(self.options.page_load_delay).await;

        page.pdf(self.options.print_params())
            .await
            .map_err(|e| format!("print to PDF failed: {e}"))
    }
}

#[async_trait]
impl RenderSession for ChromeSession {
    async fn render(&mut self, url: &str) -> Result<Vec<u8>, ItemError> {
        let failed = |cause: String| ItemError::RenderFailed {
            url: url.to_string(),
            cause,
        };
        let browser = self
            .browser
            .as_ref()
            .ok_or_else(|| failed("browser session is closed".into()))?;
        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| failed(format!("cannot open tab: {e}")))?;

        let result = self.print(&page, url).await;
        if let Err(e) = page.close().await {
            debug!("Closing tab for {} failed: {}", url, e);
        }
        result.map_err(failed)
    }

    async fn close(&mut self) {
        let Some(mut browser) = self.browser.take() else {
            return;
        };

        if let Err(e) = browser.close().await {
            debug!("Browser.close for '{}' failed: {}", self.identity, e);
        }
        let exited = matches!(
            tokio::time::timeout(CLOSE_GRACE, browser.wait()).await,
            Ok(Ok(_))
        );
        if !exited {
            warn!(
                "Browser for '{}' did not exit within {}s; killing it",
                self.identity,
                CLOSE_GRACE.as_secs()
            );
            if let Some(Err(e)) = browser.kill().await {
                warn!("Killing browser for '{}' failed: {}", self.identity, e);
            }
            let _ = browser.wait().await;
        }

        if let Some(handler) = self.handler.take() {
            handler.abort();
        }
        info!("Browser session for '{}' closed", self.identity);
    }
}

impl Drop for ChromeSession {
    fn drop(&mut self) {
        if let Some(handler) = self.handler.take() {
            handler.abort();
        }
        let Some(mut browser) = self.browser.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    let _ = browser.kill().await;
                    let _ = browser.wait().await;
                });
            }
            Err(_) => warn!(
                "Browser for '{}' dropped outside a runtime; it may outlive this process",
                self.identity
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_follow_engine_config() {
        let config = EngineConfig::builder()
            .landscape(true)
            .print_background(false)
            .headless(false)
            .extra_browser_arg("--lang=ko-KR")
            .build()
            .unwrap();
        let options = ChromeOptions::from_config(&config);
        assert!(!options.headless);
        assert_eq!(options.extra_args, vec!["--lang=ko-KR"]);

        let params = options.print_params();
        assert_eq!(params.landscape, Some(true));
        assert_eq!(params.print_background, Some(false));
    }

    #[test]
    fn missing_executable_is_backend_unavailable() {
        let tmp = tempfile::tempdir().unwrap();
        let config = EngineConfig::builder()
            .chrome_executable(tmp.path().join("no-such-chrome"))
            .build()
            .unwrap();
        let backend = ChromeBackend::new(&config, ProfileStore::new(tmp.path().join("profiles")));

        let rt = tokio::runtime::Runtime::new().unwrap();
        let err = rt.block_on(backend.open("me@example.com")).err().unwrap();
        assert!(matches!(err, SheetprintError::BackendUnavailable { .. }));
    }
}
