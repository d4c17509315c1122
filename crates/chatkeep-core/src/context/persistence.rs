use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::RenamePolicy;
use crate::constants::defaults;
use crate::context::ConversationLog;
use crate::error::ChatError;

/// Longest title accepted as a storage key, in bytes. Leaves room for the
/// extension and temp suffix under common 255-byte file name limits.
pub const MAX_TITLE_BYTES: usize = 200;

/// Characters that may not appear in a title because titles become file names.
pub const RESERVED_TITLE_CHARS: &[char] = &['/', '\\', '<', '>', ':', '"', '|', '?', '*'];

pub fn is_reserved_title_char(c: char) -> bool {
    c.is_control() || RESERVED_TITLE_CHARS.contains(&c)
}

/// Check that a title is usable verbatim as a file name inside the store.
pub fn validate_title(title: &str) -> Result<(), ChatError> {
    if title.trim().is_empty() {
        return Err(ChatError::invalid_title(title, "title is empty"));
    }
    if title != title.trim() {
        return Err(ChatError::invalid_title(title, "leading or trailing whitespace"));
    }
    if title.starts_with('.') {
        return Err(ChatError::invalid_title(title, "title may not start with '.'"));
    }
    if let Some(c) = title.chars().find(|c| is_reserved_title_char(*c)) {
        return Err(ChatError::invalid_title(
            title,
            format!("reserved character {:?}", c),
        ));
    }
    if title.len() > MAX_TITLE_BYTES {
        return Err(ChatError::invalid_title(
            title,
            format!("longer than {} bytes", MAX_TITLE_BYTES),
        ));
    }
    Ok(())
}

/// A stored conversation as shown in the navigation list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationSummary {
    pub title: String,
    pub modified: DateTime<Utc>,
}

/// Manages persistence of conversations to disk, one JSON file per title.
pub struct ConversationStore {
    base_dir: PathBuf,
    rename_policy: RenamePolicy,
}

impl ConversationStore {
    /// Open a store in `base_dir`, creating the directory if needed.
    pub fn with_dir(base_dir: impl Into<PathBuf>) -> Result<Self, ChatError> {
        let base_dir = base_dir.into();
        fs::create_dir_all(&base_dir).map_err(|e| {
            ChatError::persistence("Failed to create conversations directory", e)
        })?;

        Ok(Self {
            base_dir,
            rename_policy: RenamePolicy::default(),
        })
    }

    pub fn with_rename_policy(mut self, policy: RenamePolicy) -> Self {
        self.rename_policy = policy;
        self
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn rename_policy(&self) -> RenamePolicy {
        self.rename_policy
    }

    /// Get path to a conversation file
    fn conversation_path(&self, title: &str) -> PathBuf {
        self.base_dir
            .join(format!("{}.{}", title, defaults::RECORD_EXTENSION))
    }

    fn record_path(&self, title: &str) -> Result<PathBuf, ChatError> {
        validate_title(title)?;
        Ok(self.conversation_path(title))
    }

    fn title_of(path: &Path) -> Option<String> {
        if path.extension().and_then(|e| e.to_str()) != Some(defaults::RECORD_EXTENSION) {
            return None;
        }
        let title = path.file_stem()?.to_str()?;
        validate_title(title).ok()?;
        Some(title.to_string())
    }

    pub fn exists(&self, title: &str) -> bool {
        validate_title(title).is_ok() && self.conversation_path(title).is_file()
    }

    /// Titles of every stored conversation.
    pub fn list(&self) -> Result<BTreeSet<String>, ChatError> {
        Ok(self
            .list_summaries()?
            .into_iter()
            .map(|summary| summary.title)
            .collect())
    }

    /// Stored conversations, most recently modified first.
    pub fn list_summaries(&self) -> Result<Vec<ConversationSummary>, ChatError> {
        let entries = fs::read_dir(&self.base_dir).map_err(|e| {
            ChatError::persistence("Failed to read conversations directory", e)
        })?;

        let mut summaries = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| {
                ChatError::persistence("Failed to read conversations directory", e)
            })?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(title) = Self::title_of(&path) else {
                continue;
            };
            let modified = entry
                .metadata()
                .and_then(|m| m.modified())
                .map(DateTime::<Utc>::from)
                .unwrap_or_default();
            summaries.push(ConversationSummary { title, modified });
        }

        summaries.sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| a.title.cmp(&b.title)));
        Ok(summaries)
    }

    /// Load a conversation from disk
    pub fn load(&self, title: &str) -> Result<ConversationLog, ChatError> {
        let path = self.record_path(title)?;

        if !path.is_file() {
            return Err(ChatError::NotFound(title.to_string()));
        }

        let contents = fs::read_to_string(&path).map_err(|e| {
            ChatError::persistence("Failed to read conversation file", e)
        })?;

        serde_json::from_str(&contents).map_err(|e| {
            ChatError::persistence("Failed to parse conversation file", e)
        })
    }

    /// Create or overwrite the record for `title`.
    pub fn save(&self, title: &str, log: &ConversationLog) -> Result<(), ChatError> {
        let path = self.record_path(title)?;
        let contents = serde_json::to_string_pretty(log).map_err(|e| {
            ChatError::persistence("Failed to serialize conversation", e)
        })?;

        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, contents).map_err(|e| {
            ChatError::persistence("Failed to write temporary conversation file", e)
        })?;

        fs::rename(&tmp_path, &path).map_err(|e| {
            ChatError::persistence("Failed to rename conversation file", e)
        })?;

        debug!(title, messages = log.len(), "Saved conversation");
        Ok(())
    }

    /// Delete a conversation
    pub fn delete(&self, title: &str) -> Result<(), ChatError> {
        let path = self.record_path(title)?;
        if !path.is_file() {
            return Err(ChatError::NotFound(title.to_string()));
        }

        fs::remove_file(&path).map_err(|e| {
            ChatError::persistence("Failed to delete conversation file", e)
        })?;

        info!(title, "Deleted conversation");
        Ok(())
    }

    /// Move the record at `old_title` to `new_title`. An existing record at
    /// `new_title` is replaced or refused depending on the rename policy.
    pub fn rename(&self, old_title: &str, new_title: &str) -> Result<(), ChatError> {
        let old_path = self.record_path(old_title)?;
        let new_path = self.record_path(new_title)?;

        if !old_path.is_file() {
            return Err(ChatError::NotFound(old_title.to_string()));
        }
        if old_title == new_title {
            return Ok(());
        }
        if new_path.is_file() && self.rename_policy == RenamePolicy::Reject {
            return Err(ChatError::AlreadyExists(new_title.to_string()));
        }

        fs::rename(&old_path, &new_path).map_err(|e| {
            ChatError::persistence("Failed to rename conversation file", e)
        })?;

        info!(from = old_title, to = new_title, "Renamed conversation");
        Ok(())
    }
}
