//! Bounded per-target answer history.
//!
//! An append-only window of (option label, outcome) records per target,
//! used only to bias answer selection when no keyword match exists.
//! Persisted as a single JSON document keyed by target identifier.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use thiserror::Error;

/// Errors produced by history persistence.
#[derive(Debug, Error)]
pub enum HistoryError {
    /// The history file could not be read or written.
    #[error("history file error: {0}")]
    Io(#[from] std::io::Error),
    /// The history file is not valid JSON.
    #[error("history format error: {0}")]
    Format(#[from] serde_json::Error),
}

/// One recorded answer and its outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// The option label that was clicked.
    pub label: String,
    /// Whether the session ended in success.
    pub success: bool,
    /// When the outcome was recorded.
    pub at: DateTime<Utc>,
}

/// Bounded answer history of one target.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnswerHistory {
    entries: VecDeque<HistoryEntry>,
}

impl AnswerHistory {
    /// Append a record, evicting the oldest entries beyond `window`.
    pub fn record(&mut self, label: &str, success: bool, window: usize) {
        self.entries.push_back(HistoryEntry {
            label: label.to_string(),
            success,
            at: Utc::now(),
        });
        while self.entries.len() > window {
            self.entries.pop_front();
        }
    }

    /// Labels of successful answers, most recent first.
    pub fn recent_successes(&self) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .rev()
            .filter(|e| e.success)
            .map(|e| e.label.as_str())
    }

    /// Number of recorded entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the history holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// All targets' answer histories, keyed by target identifier.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct HistoryStore {
    #[serde(default)]
    targets: HashMap<String, AnswerHistory>,
}

impl HistoryStore {
    /// Load the store from `path`.
    ///
    /// A missing file yields an empty store.
    ///
    /// # Errors
    ///
    /// Returns a [`HistoryError`] for unreadable or malformed files.
    pub fn load(path: &Path) -> Result<Self, HistoryError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Persist the store to `path`.
    ///
    /// # Errors
    ///
    /// Returns a [`HistoryError`] when serialization or the write fails.
    pub fn save(&self, path: &Path) -> Result<(), HistoryError> {
        let raw = serde_json::to_string_pretty(self)?;
        std::fs::write(path, raw)?;
        Ok(())
    }

    /// The history of one target, if any was recorded.
    #[must_use]
    pub fn target(&self, id: &str) -> Option<&AnswerHistory> {
        self.targets.get(id)
    }

    /// Record an answer outcome for a target.
    pub fn record(&mut self, target_id: &str, label: &str, success: bool, window: usize) {
        self.targets
            .entry(target_id.to_string())
            .or_default()
            .record(label, success, window);
    }
}
