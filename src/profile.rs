//! Per-identity browser profile directories.
//!
//! Each account gets its own browser user-data directory, so cookies and
//! sign-ins persist between runs and never leak from one account to another.
//!
//! Default layout (override the root with `SHEETPRINT_HOME`):
//!
//! ```text
//! ~/Documents/Sheetprint/
//!   ├─ profiles/<identity>/   browser user-data dirs
//!   ├─ config/accounts.json   registered accounts
//!   └─ logs/                  per-run log files
//! ```

use crate::error::SheetprintError;
use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable overriding the application root directory.
pub const HOME_ENV: &str = "SHEETPRINT_HOME";

static RE_UNSAFE_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\p{L}\p{N}._-]").expect("static regex"));

static RE_HASH_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"-[0-9a-f]{16}$").expect("static regex"));

/// Hex characters of the identity digest appended to rewritten names.
const HASH_SUFFIX_LEN: usize = 16;

/// Root directories used by the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppDirs {
    root: PathBuf,
}

impl AppDirs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `$SHEETPRINT_HOME`, else `<documents>/Sheetprint`, else `~/Sheetprint`.
    pub fn from_env() -> Self {
        if let Ok(dir) = std::env::var(HOME_ENV) {
            if !dir.is_empty() {
                return Self::new(dir);
            }
        }
        let base = dirs::document_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(std::env::temp_dir);
        Self::new(base.join("Sheetprint"))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn profiles_dir(&self) -> PathBuf {
        self.root.join("profiles")
    }

    pub fn config_dir(&self) -> PathBuf {
        self.root.join("config")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    pub fn profile_store(&self) -> ProfileStore {
        ProfileStore::new(self.profiles_dir())
    }
}

/// Maps an identity to its persisted browser profile directory.
#[derive(Debug, Clone)]
pub struct ProfileStore {
    root: PathBuf,
}

impl ProfileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory name for an identity.
    ///
    /// Letters, digits, `.`, `_` and `-` are kept (any script), `@` becomes
    /// `_at_` and everything else `_`. Whenever that rewrites the text, a
    /// digest of the raw identity is appended as `-<16 hex>`, so two distinct
    /// identities never share a profile.
    pub fn directory_name(identity: &str) -> Result<String, SheetprintError> {
        let identity = identity.trim();
        let readable = RE_UNSAFE_CHARS
            .replace_all(&identity.replace('@', "_at_"), "_")
            .into_owned();
        if readable.is_empty() || readable.chars().all(|c| c == '.') {
            return Err(SheetprintError::InvalidRequest(format!(
                "'{identity}' cannot be used as an account identity"
            )));
        }
        // A name that already ends like a digest is suffixed too, so it can
        // never equal the rewritten name of another identity.
        if readable == identity && !RE_HASH_SUFFIX.is_match(identity) {
            return Ok(readable);
        }
        Ok(format!("{readable}-{}", identity_digest(identity)))
    }

    /// Path of the profile directory for `identity` (not created).
    pub fn profile_dir(&self, identity: &str) -> Result<PathBuf, SheetprintError> {
        Ok(self.root.join(Self::directory_name(identity)?))
    }

    /// Path of the profile directory, created if absent.
    pub fn ensure_profile_dir(&self, identity: &str) -> Result<PathBuf, SheetprintError> {
        let dir = self.profile_dir(identity)?;
        std::fs::create_dir_all(&dir).map_err(|e| SheetprintError::BackendUnavailable {
            identity: identity.to_string(),
            reason: format!("cannot create profile directory {}: {e}", dir.display()),
        })?;
        debug!("Profile directory for '{}': {}", identity, dir.display());
        Ok(dir)
    }
}

fn identity_digest(identity: &str) -> String {
    let digest = Sha256::digest(identity.as_bytes());
    let mut hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    hex.truncate(HASH_SUFFIX_LEN);
    hex
}
