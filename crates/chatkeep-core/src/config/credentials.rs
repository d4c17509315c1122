//! API key handling.
//!
//! The key lives in a small TOML file next to the settings and is shared at
//! runtime through [`Credentials`], a cloneable handle read by the client on
//! every request.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use super::Settings;
use crate::constants::defaults;
use crate::error::ChatError;

/// Shared, updatable API key.
#[derive(Clone, Default)]
pub struct Credentials {
    api_key: Arc<RwLock<Option<String>>>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = if self.is_configured() { "[REDACTED]" } else { "<unset>" };
        f.debug_struct("Credentials").field("api_key", &state).finish()
    }
}

impl Credentials {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            api_key: Arc::new(RwLock::new(api_key)),
        }
    }

    pub fn api_key(&self) -> Option<String> {
        self.api_key
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn set(&self, api_key: impl Into<String>) {
        *self.api_key.write().unwrap_or_else(|e| e.into_inner()) = Some(api_key.into());
    }

    pub fn is_configured(&self) -> bool {
        self.api_key
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CredentialFile {
    api_key: Option<String>,
}

/// On-disk home of the API key.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::at(Settings::config_dir().join(defaults::CREDENTIALS_FILE))
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the stored key; a missing file means no key.
    pub fn load(&self) -> Result<Option<String>, ChatError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.path)?;
        let file: CredentialFile =
            toml::from_str(&content).map_err(|e| ChatError::Config(e.to_string()))?;
        Ok(file.api_key.filter(|key| !key.trim().is_empty()))
    }

    pub fn save(&self, api_key: &str) -> Result<(), ChatError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = CredentialFile {
            api_key: Some(api_key.to_string()),
        };
        let content = toml::to_string(&file).map_err(|e| ChatError::Config(e.to_string()))?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }

    /// Startup resolution: the configured environment variable wins over the
    /// stored key.
    pub fn resolve(&self, settings: &Settings) -> Result<Credentials, ChatError> {
        if let Some(key) = settings.api_key_from_env() {
            return Ok(Credentials::new(Some(key)));
        }
        Ok(Credentials::new(self.load()?))
    }
}

impl Default for CredentialStore {
    fn default() -> Self {
        Self::new()
    }
}
