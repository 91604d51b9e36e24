//! Persistence of the last used listener list.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use livechat_stream::ListenerSpec;
use serde::{Deserialize, Serialize};

const APP_DIR: &str = "livechat";
const SESSION_FILE: &str = "last_session.json";

/// On-disk form of a session: listeners in the order they were given.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedSession {
    pub listeners: Vec<ListenerSpec>,
}

/// Reads and writes [`SavedSession`] at a fixed path.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store under the user config directory, e.g. `~/.config/livechat/last_session.json`.
    pub fn in_config_dir() -> Option<Self> {
        dirs::config_dir().map(|dir| Self::new(dir.join(APP_DIR).join(SESSION_FILE)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the saved session. A missing file is an empty session.
    pub fn load(&self) -> Result<SavedSession> {
        if !self.path.exists() {
            return Ok(SavedSession::default());
        }

        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse {}", self.path.display()))
    }

    pub fn save(&self, session: &SavedSession) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let json = serde_json::to_string_pretty(session).context("Failed to serialize session")?;
        fs::write(&self.path, json)
            .with_context(|| format!("Failed to write {}", self.path.display()))?;

        tracing::debug!("Saved {} listener(s) to {}", session.listeners.len(), self.path.display());
        Ok(())
    }
}
