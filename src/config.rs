//! Configuration for a conversion job.
//!
//! Every timing and printing knob lives in [`EngineConfig`], built via its
//! [`EngineConfigBuilder`]. The request (which workbook, which sheets, which
//! account) is separate and lives in [`crate::engine::ConversionRequest`];
//! the config describes *how* every job on an engine behaves.

use crate::error::SheetprintError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default name of the failure report written under the destination root.
pub const DEFAULT_FAILURE_REPORT: &str = "failed_items.txt";

/// Configuration for the conversion engine and its browser backend.
///
/// Built via [`EngineConfig::builder()`] or using [`EngineConfig::default()`].
///
/// # Example
/// ```rust
/// use sheetprint::EngineConfig;
/// use std::time::Duration;
///
/// let config = EngineConfig::builder()
///     .settle_delay(Duration::from_secs(1))
///     .headless(false)
///     .build()
///     .unwrap();
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Pause applied after every item before the next checkpoint. Default: 2 s.
    ///
    /// Some sites throttle or block clients that open pages back-to-back.
    /// The value is a fixed policy, not tuned to backend latency.
    pub settle_delay: Duration,

    /// Wait after navigation before printing the page. Default: 3 s.
    pub page_load_delay: Duration,

    /// Upper bound on how long a paused job sleeps between state checks.
    /// Default: 500 ms. Range: 1 ms – 5 s.
    pub pause_poll_interval: Duration,

    /// Upper bound for a single CDP request (navigation, print). Default: 60 s.
    pub navigation_timeout: Duration,

    /// Print CSS backgrounds. Default: true.
    pub print_background: bool,

    /// Landscape orientation. Default: false (portrait).
    pub landscape: bool,

    /// Run the browser without a window. Default: true.
    ///
    /// Turn this off to sign in to an account interactively; the session is
    /// kept in the identity's profile directory for later headless runs.
    pub headless: bool,

    /// Explicit browser executable. If None, located via `chrome-locate`.
    pub chrome_executable: Option<PathBuf>,

    /// Extra command-line flags appended to the browser launch.
    pub extra_browser_args: Vec<String>,

    /// File name of the failure report. Default: `failed_items.txt`.
    pub failure_report_name: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_secs(2),
            page_load_delay: Duration::from_secs(3),
            pause_poll_interval: Duration::from_millis(500),
            navigation_timeout: Duration::from_secs(60),
            print_background: true,
            landscape: false,
            headless: true,
            chrome_executable: None,
            extra_browser_args: Vec::new(),
            failure_report_name: DEFAULT_FAILURE_REPORT.to_string(),
        }
    }
}

impl EngineConfig {
    /// Create a new builder for `EngineConfig`.
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`EngineConfig`].
#[derive(Debug)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    pub fn settle_delay(mut self, delay: Duration) -> Self {
        self.config.settle_delay = delay;
        self
    }

    pub fn page_load_delay(mut self, delay: Duration) -> Self {
        self.config.page_load_delay = delay;
        self
    }

    pub fn pause_poll_interval(mut self, interval: Duration) -> Self {
        self.config.pause_poll_interval = interval;
        self
    }

    pub fn navigation_timeout(mut self, timeout: Duration) -> Self {
        self.config.navigation_timeout = timeout.max(Duration::from_secs(1));
        self
    }

    pub fn print_background(mut self, v: bool) -> Self {
        self.config.print_background = v;
        self
    }

    pub fn landscape(mut self, v: bool) -> Self {
        self.config.landscape = v;
        self
    }

    pub fn headless(mut self, v: bool) -> Self {
        self.config.headless = v;
        self
    }

    pub fn chrome_executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.chrome_executable = Some(path.into());
        self
    }

    pub fn extra_browser_arg(mut self, arg: impl Into<String>) -> Self {
        self.config.extra_browser_args.push(arg.into());
        self
    }

    pub fn failure_report_name(mut self, name: impl Into<String>) -> Self {
        self.config.failure_report_name = name.into();
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<EngineConfig, SheetprintError> {
        let c = &self.config;
        if c.pause_poll_interval.is_zero() || c.pause_poll_interval > Duration::from_secs(5) {
            return Err(SheetprintError::InvalidConfig(format!(
                "pause poll interval must be 1ms–5s, got {:?}",
                c.pause_poll_interval
            )));
        }
        let name = c.failure_report_name.trim();
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(SheetprintError::InvalidConfig(format!(
                "failure report name must be a plain file name, got '{}'",
                c.failure_report_name
            )));
        }
        Ok(self.config)
    }
}
