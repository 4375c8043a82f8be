//! # chrome-locate
//!
//! Find an installed Chrome, Chromium or Edge executable, so that callers
//! driving a browser over the DevTools protocol never have to ask the user
//! for a path.
//!
//! ## How it works
//!
//! On first call to [`find_browser`]:
//!
//! 1. `SHEETPRINT_CHROME`, if set, must name an existing file and wins.
//! 2. Otherwise the platform's usual install locations are probed
//!    (see [`candidate_paths`]).
//! 3. Otherwise every directory on `PATH` is searched for the usual
//!    executable names (`google-chrome`, `chromium`, `chrome.exe`, ...).
//!
//! The result is cached for the lifetime of the process.
//!
//! ## Usage
//!
//! ```rust,no_run
//! let chrome = chrome_locate::find_browser().expect("no browser installed");
//! println!("using {}", chrome.display());
//! ```
//!
//! ## Platform support
//!
//! | OS      | Probed locations                                         |
//! |---------|----------------------------------------------------------|
//! | macOS   | `/Applications/*.app/Contents/MacOS/*`, same under `~`   |
//! | Linux   | `/usr/bin`, `/usr/local/bin`, `/snap/bin`, `/opt/google` |
//! | Windows | `Program Files`, `Program Files (x86)`, `%LOCALAPPDATA%` |

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use thiserror::Error;

// ── Public constants ─────────────────────────────────────────────────────────

/// Environment variable naming an explicit browser executable.
pub const CHROME_ENV: &str = "SHEETPRINT_CHROME";

// ── Error type ───────────────────────────────────────────────────────────────

/// Errors returned by chrome-locate operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LocateError {
    /// `SHEETPRINT_CHROME` is set but does not name a file.
    #[error("SHEETPRINT_CHROME points to '{path}', which does not exist")]
    OverrideMissing { path: PathBuf },

    /// Nothing found in the install locations nor on `PATH`.
    #[error(
        "No Chrome/Chromium executable found ({} locations searched plus PATH); \
install Chrome or set SHEETPRINT_CHROME",
        .searched.len()
    )]
    NotFound { searched: Vec<PathBuf> },
}

// ── Platform metadata ────────────────────────────────────────────────────────

/// Executable names looked up on `PATH`, most preferred first.
pub fn executable_names() -> &'static [&'static str] {
    if cfg!(windows) {
        &["chrome.exe", "msedge.exe", "chromium.exe"]
    } else if cfg!(target_os = "macos") {
        &["Google Chrome", "Chromium", "chromium", "google-chrome"]
    } else {
        &[
            "google-chrome",
            "google-chrome-stable",
            "chromium",
            "chromium-browser",
            "microsoft-edge",
        ]
    }
}

/// Well-known install locations for this platform, most preferred first.
///
/// The list is not filtered; entries may not exist.
pub fn candidate_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    if cfg!(windows) {
        let roots = [
            std::env::var_os("ProgramFiles").map(PathBuf::from),
            std::env::var_os("ProgramFiles(x86)").map(PathBuf::from),
            dirs::data_local_dir(),
        ];
        for root in roots.into_iter().flatten() {
            paths.push(root.join(r"Google\Chrome\Application\chrome.exe"));
            paths.push(root.join(r"Chromium\Application\chrome.exe"));
            paths.push(root.join(r"Microsoft\Edge\Application\msedge.exe"));
        }
    } else if cfg!(target_os = "macos") {
        let bundles = [
            "Google Chrome.app/Contents/MacOS/Google Chrome",
            "Chromium.app/Contents/MacOS/Chromium",
            "Microsoft Edge.app/Contents/MacOS/Microsoft Edge",
        ];
        let mut roots = vec![PathBuf::from("/Applications")];
        if let Some(home) = dirs::home_dir() {
            roots.push(home.join("Applications"));
        }
        for root in &roots {
            for bundle in bundles {
                paths.push(root.join(bundle));
            }
        }
    } else {
        for dir in ["/usr/bin", "/usr/local/bin", "/snap/bin"] {
            for name in executable_names() {
                paths.push(Path::new(dir).join(name));
            }
        }
        paths.push(PathBuf::from("/opt/google/chrome/chrome"));
    }

    paths
}

// ── Thread-safe singleton path cache ─────────────────────────────────────────

static RESOLVED_PATH: OnceLock<PathBuf> = OnceLock::new();

// ── Public API ───────────────────────────────────────────────────────────────

/// Returns the browser executable to launch.
///
/// # Thread safety
///
/// Safe to call from multiple threads; the search runs at most once per
/// successful resolution.
pub fn find_browser() -> Result<PathBuf, LocateError> {
    if let Some(path) = RESOLVED_PATH.get() {
        return Ok(path.clone());
    }
    let path = resolve(
        std::env::var_os(CHROME_ENV),
        &candidate_paths(),
        std::env::var_os("PATH"),
    )?;
    let _ = RESOLVED_PATH.set(path.clone());
    Ok(path)
}

/// Returns `true` if [`find_browser`] would succeed.
pub fn is_browser_available() -> bool {
    find_browser().is_ok()
}

/// Search `path_var` (a `PATH`-style list) for the first executable named
/// in `names`.
pub fn find_on_path(names: &[&str], path_var: &OsString) -> Option<PathBuf> {
    std::env::split_paths(path_var).find_map(|dir| {
        names
            .iter()
            .map(|name| dir.join(name))
            .find(|candidate| candidate.is_file())
    })
}

// ── Internal helpers ─────────────────────────────────────────────────────────

fn resolve(
    override_path: Option<OsString>,
    candidates: &[PathBuf],
    path_var: Option<OsString>,
) -> Result<PathBuf, LocateError> {
    // 1. Environment variable override. A set-but-missing path is an error:
    //    silently falling back would launch a different browser than asked.
    if let Some(raw) = override_path.filter(|v| !v.is_empty()) {
        let path = PathBuf::from(raw);
        return if path.is_file() {
            Ok(path)
        } else {
            Err(LocateError::OverrideMissing { path })
        };
    }

    // 2. Install locations.
    if let Some(found) = candidates.iter().find(|p| p.is_file()) {
        return Ok(found.clone());
    }

    // 3. PATH.
    if let Some(found) = path_var
        .as_ref()
        .and_then(|var| find_on_path(executable_names(), var))
    {
        return Ok(found);
    }

    Err(LocateError::NotFound {
        searched: candidates.to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, b"").unwrap();
        path
    }

    #[test]
    fn candidate_paths_nonempty() {
        let paths = candidate_paths();
        assert!(!paths.is_empty());
        assert!(paths.iter().all(|p| p.is_absolute() || cfg!(windows)));
    }

    #[test]
    fn override_wins_over_candidates() {
        let tmp = tempfile::tempdir().unwrap();
        let explicit = touch(tmp.path(), "my-chrome");
        let candidate = touch(tmp.path(), "other-chrome");
        let found = resolve(Some(explicit.clone().into()), &[candidate], None).unwrap();
        assert_eq!(found, explicit);
    }

    #[test]
    fn missing_override_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let candidate = touch(tmp.path(), "chrome");
        let err = resolve(
            Some(tmp.path().join("nope").into()),
            &[candidate],
            None,
        )
        .unwrap_err();
        assert!(matches!(err, LocateError::OverrideMissing { .. }));
    }

    #[test]
    fn first_existing_candidate_is_used() {
        let tmp = tempfile::tempdir().unwrap();
        let present = touch(tmp.path(), "chromium");
        let found = resolve(None, &[tmp.path().join("absent"), present.clone()], None).unwrap();
        assert_eq!(found, present);
    }

    #[test]
    fn path_search_finds_known_names() {
        let tmp = tempfile::tempdir().unwrap();
        let name = executable_names()[0];
        let exe = touch(tmp.path(), name);
        let path_var = std::env::join_paths([tmp.path()]).unwrap();
        let found = resolve(None, &[], Some(path_var)).unwrap();
        assert_eq!(found, exe);
    }

    #[test]
    fn nothing_found_reports_searched_locations() {
        let tmp = tempfile::tempdir().unwrap();
        let candidates = vec![tmp.path().join("a"), tmp.path().join("b")];
        let err = resolve(None, &candidates, Some(OsString::new())).unwrap_err();
        match &err {
            LocateError::NotFound { searched } => assert_eq!(searched.len(), 2),
            other => panic!("unexpected: {other}"),
        }
        assert!(err.to_string().contains(CHROME_ENV));
    }
}
