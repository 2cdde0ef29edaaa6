//! Interview history persistence.
//!
//! Completed (or abandoned) sessions leave exactly one record behind. The
//! store is a flat JSON array in a single file — records are append-only and
//! never mutated after creation, and the file has no schema version; it
//! lives until the user deletes it.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{InterviewError, Result};

/// One finished interview session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    /// Unique record id.
    pub id: String,
    /// Job track the session used.
    pub role: String,
    /// Difficulty level the session used.
    pub level: String,
    /// Extracted score, e.g. "7/10", or "N/A" when the session ended before
    /// the final report.
    pub score: String,
    /// RFC 3339 creation date.
    pub date: String,
    /// Full conversation transcript.
    pub transcript: String,
    /// The interviewer's final feedback text.
    pub feedback: String,
}

/// Flat-file history store.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    path: PathBuf,
}

impl HistoryStore {
    /// Create a store at the given file path.
    ///
    /// The parent directory is created if needed; the file itself is created
    /// lazily on first append.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                InterviewError::History(format!(
                    "failed to create history directory {}: {e}",
                    parent.display()
                ))
            })?;
        }
        Ok(Self { path })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load all records, oldest first. A missing file is an empty history.
    pub fn load(&self) -> Result<Vec<HistoryRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let raw = std::fs::read_to_string(&self.path).map_err(|e| {
            InterviewError::History(format!("failed to read {}: {e}", self.path.display()))
        })?;
        serde_json::from_str(&raw).map_err(|e| {
            InterviewError::History(format!("corrupt history file {}: {e}", self.path.display()))
        })
    }

    /// Append one record.
    ///
    /// The whole array is rewritten atomically (temp file + rename) so a
    /// crash mid-write cannot corrupt existing records.
    pub fn append(&self, record: HistoryRecord) -> Result<()> {
        let mut records = self.load()?;
        records.push(record);

        let json = serde_json::to_string_pretty(&records)
            .map_err(|e| InterviewError::History(format!("failed to serialize history: {e}")))?;

        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, json.as_bytes()).map_err(|e| {
            InterviewError::History(format!(
                "failed to write temp file {}: {e}",
                tmp_path.display()
            ))
        })?;
        std::fs::rename(&tmp_path, &self.path).map_err(|e| {
            InterviewError::History(format!(
                "failed to rename temp file to {}: {e}",
                self.path.display()
            ))
        })?;

        Ok(())
    }
}
