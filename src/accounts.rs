//! Registry of account identities, persisted as a JSON list.
//!
//! An identity is usually the e-mail address the operator signs in with
//! inside the browser profile. The registry only stores the names; the
//! browser keeps credentials in the profile directory.

use crate::error::SheetprintError;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// File name of the registry inside the config directory.
pub const ACCOUNTS_FILE: &str = "accounts.json";

/// Ordered list of registered identities backed by a JSON file.
#[derive(Debug, Clone)]
pub struct AccountRegistry {
    path: PathBuf,
    accounts: Vec<String>,
}

impl AccountRegistry {
    /// Load the registry in `config_dir`.
    ///
    /// A missing or unreadable file yields an empty registry; the next
    /// [`save`](Self::save) rewrites it.
    pub fn load(config_dir: impl AsRef<Path>) -> Self {
        let path = config_dir.as_ref().join(ACCOUNTS_FILE);
        let accounts = match std::fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str::<Vec<String>>(&text).unwrap_or_else(|e| {
                warn!("Ignoring unreadable account registry {}: {}", path.display(), e);
                Vec::new()
            }),
            Err(_) => Vec::new(),
        };
        Self { path, accounts }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn accounts(&self) -> &[String] {
        &self.accounts
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.accounts.iter().any(|a| a == identity.trim())
    }

    /// Register a new identity.
    pub fn add(&mut self, identity: &str) -> Result<(), SheetprintError> {
        let identity = identity.trim();
        if identity.is_empty() {
            return Err(SheetprintError::InvalidRequest(
                "account identity must not be empty".into(),
            ));
        }
        if self.contains(identity) {
            return Err(SheetprintError::DuplicateAccount(identity.to_string()));
        }
        self.accounts.push(identity.to_string());
        info!("Account added: {}", identity);
        Ok(())
    }

    /// Remove a registered identity. The profile directory is left on disk.
    pub fn remove(&mut self, identity: &str) -> Result<(), SheetprintError> {
        let identity = identity.trim();
        let before = self.accounts.len();
        self.accounts.retain(|a| a != identity);
        if self.accounts.len() == before {
            return Err(SheetprintError::UnknownAccount(identity.to_string()));
        }
        info!("Account removed: {}", identity);
        Ok(())
    }

    /// Write the registry back to disk (pretty JSON, UTF-8).
    pub fn save(&self) -> Result<(), SheetprintError> {
        let store_err = |reason: String| SheetprintError::AccountStore {
            path: self.path.clone(),
            reason,
        };
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| store_err(e.to_string()))?;
        }
        let json =
            serde_json::to_string_pretty(&self.accounts).map_err(|e| store_err(e.to_string()))?;
        std::fs::write(&self.path, json).map_err(|e| store_err(e.to_string()))
    }
}
