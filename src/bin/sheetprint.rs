//! CLI binary for sheetprint.
//!
//! A thin shim over the library crate: maps flags to `EngineConfig` and a
//! `ConversionRequest`, relays keyboard/Ctrl-C control to the engine, and
//! prints results.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use sheetprint::{
    enumerate, AccountRegistry, AppDirs, ChromeBackend, ConversionEngine, ConversionRequest,
    EngineConfig, EngineState, FanoutEventSink, JobEvent, JobEventSink, JobOutcome, JobSource,
    TracingEventSink, WorkbookSource,
};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn, Level};
use tracing_subscriber::filter::Targets;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI event sink using indicatif ───────────────────────────────────────────

/// Prints one line per finished item above a live progress bar.
struct CliEventSink {
    bar: ProgressBar,
}

impl CliEventSink {
    fn new(total: usize) -> Arc<Self> {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>4}/{len} URLs  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        let bar = ProgressBar::new(total as u64);
        bar.set_style(style);
        bar.set_prefix("Printing");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl JobEventSink for CliEventSink {
    fn on_event(&self, event: &JobEvent) {
        match event {
            JobEvent::GroupStarted { group, folder } => {
                self.bar.println(format!(
                    "{} {}  {}",
                    cyan("◆"),
                    bold(group),
                    dim(&folder.display().to_string())
                ));
            }
            JobEvent::ItemStarted { item, .. } => {
                self.bar.set_message(format!("row {}", item.sequence));
            }
            JobEvent::ItemSucceeded { item, bytes, .. } => {
                self.bar.println(format!(
                    "  {} row {:<5} {}  {}",
                    green("✓"),
                    item.sequence,
                    item.url,
                    dim(&format!("{} KB", bytes / 1024)),
                ));
                self.bar.inc(1);
            }
            JobEvent::ItemFailed { item, error } => {
                // Truncate very long error messages to keep output tidy.
                let msg: String = if error.chars().count() > 80 {
                    let mut s: String = error.chars().take(79).collect();
                    s.push('\u{2026}');
                    s
                } else {
                    error.clone()
                };
                self.bar.println(format!(
                    "  {} row {:<5} {}  {}",
                    red("✗"),
                    item.sequence,
                    item.url,
                    red(&msg),
                ));
                self.bar.inc(1);
            }
            JobEvent::ItemCancelled { item } => {
                self.bar.println(format!(
                    "  {} row {:<5} {}  {}",
                    dim("–"),
                    item.sequence,
                    item.url,
                    dim("cancelled"),
                ));
            }
            JobEvent::Paused => {
                self.bar.set_prefix("Paused");
                self.bar
                    .println(format!("{} paused, press r to resume", cyan("⏸")));
            }
            JobEvent::Resumed => self.bar.set_prefix("Printing"),
            JobEvent::StopRequested => {
                self.bar.set_prefix("Stopping");
                self.bar
                    .println(format!("{} stopping after the current URL", cyan("■")));
            }
            JobEvent::JobFinished { .. } | JobEvent::JobAborted { .. } => {
                self.bar.finish_and_clear();
            }
            JobEvent::JobStarted { total, .. } => {
                self.bar.set_length(*total as u64);
                self.bar.reset_eta();
            }
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Register the account once, then sign in inside the browser window
  sheetprint accounts add me@example.com
  sheetprint convert links.xlsx --column B --sheet Sheet1 --output ./pdfs \
      --account me@example.com --headed

  # Which sheets are there, and how many URLs does column B hold?
  sheetprint sheets links.xlsx --column B

  # Every sheet, headless, JSON summary
  sheetprint convert links.xlsx -c B --all-sheets -o ./pdfs -a me@example.com --json

KEYBOARD CONTROL (while converting):
  p + Enter    pause before the next URL
  r + Enter    resume
  s + Enter    stop after the current URL (Ctrl-C does the same)
  a + Enter    abandon the current URL and stop (or Ctrl-C twice)

OUTPUT LAYOUT:
  <output>/<sheet>/row_<n>.pdf     one PDF per URL, n = spreadsheet row
  <output>/failed_items.txt         written only when something failed

ENVIRONMENT VARIABLES:
  SHEETPRINT_HOME      Root for profiles/, config/ and logs/
                       (default: ~/Documents/Sheetprint)
  SHEETPRINT_CHROME    Browser executable; skips auto-detection
  RUST_LOG             Override the stderr log filter
"#;

/// Print every URL in a spreadsheet column to PDF through Chrome.
#[derive(Parser, Debug)]
#[command(
    name = "sheetprint",
    version,
    about = "Print every URL in a spreadsheet column to PDF through Chrome",
    long_about = "Read URLs from one column of an Excel/ODS workbook and print each page to \
PDF with a real Chrome/Chromium, using a persistent browser profile per account so pages \
behind a login work after signing in once.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Root directory for profiles, config and logs.
    #[arg(long, global = true, env = "SHEETPRINT_HOME")]
    home: Option<PathBuf>,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "SHEETPRINT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "SHEETPRINT_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the sheets of a workbook (and URL counts for a column).
    Sheets(SheetsArgs),

    /// Manage registered accounts.
    Accounts {
        #[command(subcommand)]
        action: AccountsCommand,
    },

    /// Print the URLs of the selected sheets to PDF.
    Convert(ConvertArgs),
}

#[derive(Args, Debug)]
struct SheetsArgs {
    /// Workbook file (.xlsx, .xlsm, .xls, .ods).
    workbook: PathBuf,

    /// Count URLs in this column (letters, e.g. B).
    #[arg(short, long, env = "SHEETPRINT_COLUMN")]
    column: Option<String>,
}

#[derive(Subcommand, Debug)]
enum AccountsCommand {
    /// Show registered accounts.
    List,
    /// Register an account identity (usually an e-mail address).
    Add { identity: String },
    /// Forget an account. Its browser profile stays on disk.
    Remove { identity: String },
}

#[derive(Args, Debug)]
struct ConvertArgs {
    /// Workbook file (.xlsx, .xlsm, .xls, .ods).
    workbook: PathBuf,

    /// Column holding the URLs (letters, e.g. B).
    #[arg(short, long, env = "SHEETPRINT_COLUMN")]
    column: String,

    /// Sheet to convert; repeat for several, in the order given.
    #[arg(short, long = "sheet", value_name = "SHEET", required_unless_present = "all_sheets")]
    sheets: Vec<String>,

    /// Convert every sheet in workbook order.
    #[arg(long, conflicts_with = "sheets")]
    all_sheets: bool,

    /// Output folder; one subfolder per sheet is created inside.
    #[arg(short, long, env = "SHEETPRINT_OUTPUT")]
    output: PathBuf,

    /// Account whose browser profile is used.
    #[arg(short, long, env = "SHEETPRINT_ACCOUNT")]
    account: String,

    /// Show the browser window (needed to sign in the first time).
    #[arg(long, env = "SHEETPRINT_HEADED")]
    headed: bool,

    /// Seconds to wait between URLs.
    #[arg(long, env = "SHEETPRINT_SETTLE_DELAY", default_value_t = 2.0)]
    settle_delay: f64,

    /// Seconds to let a page finish loading before printing.
    #[arg(long, env = "SHEETPRINT_PAGE_LOAD_DELAY", default_value_t = 3.0)]
    page_load_delay: f64,

    /// Per-page navigation timeout in seconds.
    #[arg(long, env = "SHEETPRINT_NAVIGATION_TIMEOUT", default_value_t = 60)]
    navigation_timeout: u64,

    /// Print in landscape orientation.
    #[arg(long, env = "SHEETPRINT_LANDSCAPE")]
    landscape: bool,

    /// Do not print CSS backgrounds.
    #[arg(long, env = "SHEETPRINT_NO_BACKGROUND")]
    no_background: bool,

    /// Browser executable (default: auto-detect).
    #[arg(long, env = "SHEETPRINT_CHROME")]
    chrome: Option<PathBuf>,

    /// Extra flag passed to the browser; repeatable.
    #[arg(long = "browser-arg", value_name = "FLAG", allow_hyphen_values = true)]
    browser_args: Vec<String>,

    /// Print the final outcome as JSON on stdout.
    #[arg(long, env = "SHEETPRINT_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "SHEETPRINT_NO_PROGRESS")]
    no_progress: bool,

    /// Ignore keyboard control on stdin.
    #[arg(long)]
    no_keys: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let dirs = match &cli.home {
        Some(root) => AppDirs::new(root),
        None => AppDirs::from_env(),
    };

    // ── Logging setup ────────────────────────────────────────────────────
    // Keep stderr quiet while the progress bar is drawn; the per-run log
    // file always gets the full INFO record of a conversion.
    let show_progress = match &cli.command {
        Command::Convert(args) => !cli.quiet && !args.no_progress && !args.json,
        _ => false,
    };
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else if show_progress {
        "warn"
    } else {
        "info"
    };
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)));

    let log_path = match &cli.command {
        Command::Convert(_) => Some(conversion_log_path(&dirs.logs_dir())),
        _ => None,
    };
    let file_layer = match &log_path {
        Some(path) => Some(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(open_log_file(path)?))
                .with_filter(
                    Targets::new()
                        .with_target("sheetprint", Level::INFO)
                        .with_default(Level::WARN),
                ),
        ),
        None => None,
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .init();

    match cli.command {
        Command::Sheets(args) => list_sheets(args).await,
        Command::Accounts { action } => manage_accounts(&dirs, action),
        Command::Convert(args) => {
            let result = run_conversion(&dirs, args, show_progress, cli.quiet, log_path).await;
            // The stdin relay sits in a blocking read that cannot be
            // cancelled; exit without waiting for the runtime to drain it.
            if let Err(e) = result {
                eprintln!("Error: {e:?}");
                std::process::exit(1);
            }
            std::process::exit(0);
        }
    }
}

fn conversion_log_path(logs_dir: &Path) -> PathBuf {
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    logs_dir.join(format!("conversion_{stamp}.log"))
}

fn open_log_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create log folder {}", parent.display()))?;
    }
    File::create(path).with_context(|| format!("Failed to create log file {}", path.display()))
}

// ── sheets ───────────────────────────────────────────────────────────────────

async fn list_sheets(args: SheetsArgs) -> Result<()> {
    let source = WorkbookSource::open_async(&args.workbook)
        .await
        .context("Failed to open workbook")?;

    for name in source.group_names() {
        match &args.column {
            Some(column) => {
                let count = enumerate(&source, column, std::slice::from_ref(&name))
                    .context("Failed to read sheet")?
                    .len();
                println!("{name}\t{count}");
            }
            None => println!("{name}"),
        }
    }
    Ok(())
}

// ── accounts ─────────────────────────────────────────────────────────────────

fn manage_accounts(dirs: &AppDirs, action: AccountsCommand) -> Result<()> {
    let mut registry = AccountRegistry::load(dirs.config_dir());
    match action {
        AccountsCommand::List => {
            if registry.accounts().is_empty() {
                eprintln!("{}", dim("No accounts registered."));
            }
            let store = dirs.profile_store();
            for account in registry.accounts() {
                let profile = store
                    .profile_dir(account)
                    .map(|p| p.display().to_string())
                    .unwrap_or_default();
                println!("{account}\t{profile}");
            }
        }
        AccountsCommand::Add { identity } => {
            registry.add(&identity)?;
            registry.save()?;
            eprintln!("{} account {} added", green("✔"), bold(identity.trim()));
            eprintln!(
                "{}",
                dim("Run `convert --headed` once to sign in inside the browser window.")
            );
        }
        AccountsCommand::Remove { identity } => {
            registry.remove(&identity)?;
            registry.save()?;
            eprintln!("{} account {} removed", green("✔"), bold(identity.trim()));
        }
    }
    Ok(())
}

// ── convert ──────────────────────────────────────────────────────────────────

fn build_config(args: &ConvertArgs) -> Result<EngineConfig> {
    let secs = |name: &str, v: f64| -> Result<Duration> {
        if !v.is_finite() || v < 0.0 {
            bail!("--{name} must be a non-negative number of seconds (got {v})");
        }
        Ok(Duration::from_secs_f64(v))
    };

    let mut builder = EngineConfig::builder()
        .settle_delay(secs("settle-delay", args.settle_delay)?)
        .page_load_delay(secs("page-load-delay", args.page_load_delay)?)
        .navigation_timeout(Duration::from_secs(args.navigation_timeout))
        .headless(!args.headed)
        .landscape(args.landscape)
        .print_background(!args.no_background);
    if let Some(chrome) = &args.chrome {
        builder = builder.chrome_executable(chrome);
    }
    for arg in &args.browser_args {
        builder = builder.extra_browser_arg(arg);
    }
    builder.build().context("Invalid configuration")
}

async fn run_conversion(
    dirs: &AppDirs,
    args: ConvertArgs,
    show_progress: bool,
    quiet: bool,
    log_path: Option<PathBuf>,
) -> Result<()> {
    let registry = AccountRegistry::load(dirs.config_dir());
    if !registry.contains(&args.account) {
        warn!(
            "Account '{}' is not registered; using its profile anyway (see `sheetprint accounts add`)",
            args.account
        );
    }

    let config = build_config(&args)?;
    let source = Arc::new(
        WorkbookSource::open_async(&args.workbook)
            .await
            .context("Failed to open workbook")?,
    );
    let groups = if args.all_sheets {
        source.group_names()
    } else {
        args.sheets.clone()
    };
    if groups.is_empty() {
        bail!("The workbook has no sheets");
    }

    let backend = ChromeBackend::new(&config, dirs.profile_store());

    // The item count is only known once `start` has enumerated the sheets;
    // the sink resizes the bar on `JobStarted`.
    let cli_sink = show_progress.then(|| CliEventSink::new(0));
    let mut sinks: Vec<Arc<dyn JobEventSink>> = vec![Arc::new(TracingEventSink)];
    if let Some(sink) = &cli_sink {
        sinks.push(sink.clone());
    }
    let engine = Arc::new(
        ConversionEngine::new(config, Arc::new(backend))
            .with_event_sink(Arc::new(FanoutEventSink::new(sinks))),
    );

    let request = ConversionRequest::new(
        args.account.clone(),
        source,
        args.column.clone(),
        groups,
        args.output.clone(),
    );
    engine
        .start(request)
        .await
        .context("Could not start the conversion")?;

    info!(
        "Converting {} URLs into {}",
        engine.snapshot().stats.total,
        args.output.display()
    );
    if !quiet && !args.no_keys && !args.json {
        eprintln!(
            "{}",
            dim("Controls: p = pause, r = resume, s = stop, a = abort (then Enter). Ctrl-C stops.")
        );
    }

    // ── Control relays ───────────────────────────────────────────────────
    let keys = (!args.no_keys).then(|| tokio::spawn(relay_keys(Arc::clone(&engine))));
    let ctrl_c = tokio::spawn(relay_ctrl_c(Arc::clone(&engine)));

    let outcome = engine.wait().await;

    if let Some(keys) = keys {
        keys.abort();
    }
    ctrl_c.abort();
    if let Some(sink) = &cli_sink {
        sink.bar.finish_and_clear();
    }

    let outcome = outcome.context("Conversion aborted")?;
    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&outcome).context("Failed to serialise outcome")?
        );
    } else if !quiet {
        print_summary(&outcome, &args.output, log_path.as_deref());
    }
    Ok(())
}

/// Relay `p` / `r` / `s` lines from stdin to the engine.
async fn relay_keys(engine: Arc<ConversionEngine>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let result = match line.trim().to_ascii_lowercase().as_str() {
            "p" | "pause" => engine.pause(),
            "r" | "resume" => engine.resume(),
            "s" | "stop" => engine.stop(),
            "a" | "abort" => engine.abort(),
            "" => continue,
            other => {
                eprintln!("{}", dim(&format!("unknown command '{other}' (p/r/s/a)")));
                continue;
            }
        };
        if let Err(e) = result {
            eprintln!("{}", dim(&e.to_string()));
        }
        if engine.state().is_terminal() {
            break;
        }
    }
}

/// First Ctrl-C stops after the current URL; a second one abandons it.
///
/// Either way the engine closes the browser before `wait` returns, so the
/// profile is never left locked by an orphaned process.
async fn relay_ctrl_c(engine: Arc<ConversionEngine>) {
    if tokio::signal::ctrl_c().await.is_err() {
        return;
    }
    if let Err(e) = engine.stop() {
        warn!("{}", e);
    }
    if tokio::signal::ctrl_c().await.is_err() {
        return;
    }
    eprintln!("{}", red("Interrupted; closing the browser"));
    if let Err(e) = engine.abort() {
        warn!("{}", e);
    }
    while tokio::signal::ctrl_c().await.is_ok() {
        eprintln!("{}", dim("Still closing the browser…"));
    }
}

fn print_summary(outcome: &JobOutcome, output: &Path, log_path: Option<&Path>) {
    let stats = &outcome.stats;
    let elapsed = outcome.elapsed.as_secs();
    let mark = match (outcome.state, stats.failed) {
        (EngineState::Completed, 0) => green("✔"),
        (EngineState::Stopped, _) => cyan("■"),
        _ => cyan("⚠"),
    };

    eprintln!(
        "{} Conversion {}  {}/{} URLs  {}m {}s",
        mark,
        bold(&outcome.state.to_string()),
        stats.processed,
        stats.total,
        elapsed / 60,
        elapsed % 60,
    );
    eprintln!(
        "   {} succeeded  /  {} failed",
        green(&stats.succeeded.to_string()),
        if stats.failed == 0 {
            dim("0")
        } else {
            red(&stats.failed.to_string())
        },
    );
    if stats.remaining() > 0 {
        eprintln!("   {} not attempted", dim(&stats.remaining().to_string()));
    }
    eprintln!("   saved to {}", bold(&output.display().to_string()));
    if let Some(report) = &outcome.report_path {
        eprintln!("   failures listed in {}", bold(&report.display().to_string()));
    }
    if let Some(error) = &outcome.report_error {
        eprintln!("   {} {}", red("failure report not written:"), error);
    }
    if let Some(log) = log_path {
        eprintln!("   log: {}", dim(&log.display().to_string()));
    }
}
