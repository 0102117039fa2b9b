//! Commit data model shared by selection, summarization and aggregation

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Commit-level change totals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CommitStats {
    pub insertions: u64,
    pub deletions: u64,
    pub files: usize,
}

/// Per-file line counts for one commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FileStat {
    pub path: String,
    pub insertions: u64,
    pub deletions: u64,
}

/// A commit read from history
///
/// Immutable once read: the summarizer produces a new value rather than
/// editing a selected one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Commit {
    /// Full commit SHA
    pub hash: String,
    pub author_name: String,
    pub author_email: String,
    /// Commit time, UTC
    pub timestamp: DateTime<Utc>,
    pub message: String,
    /// Changed paths in diff order
    pub files_changed: Vec<String>,
    /// Per-file stats; empty when the diff could not be computed
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub file_stats: Vec<FileStat>,
    /// `None` when the diff could not be computed (e.g. shallow boundary)
    pub stats: Option<CommitStats>,
    /// Bounded diff text: the scan budget as read, the excerpt once summarized
    #[serde(default)]
    pub diff: String,
    /// Most relevant files for display, filled by the summarizer
    #[serde(default)]
    pub key_files: Vec<String>,
}

impl Commit {
    /// First 8 characters of the hash
    pub fn short_hash(&self) -> &str {
        &self.hash[..8.min(self.hash.len())]
    }

    /// First line of the commit message
    pub fn subject(&self) -> &str {
        self.message.lines().next().unwrap_or("")
    }

    /// Insertions + deletions, or the number of changed files when line
    /// counts are unavailable
    pub fn lines_changed(&self) -> u64 {
        match self.stats {
            Some(stats) => stats.insertions + stats.deletions,
            None => self.files_changed.len() as u64,
        }
    }

    /// Whether [`Commit::lines_changed`] is the file-count approximation
    pub fn lines_estimated(&self) -> bool {
        self.stats.is_none()
    }

    /// Number of files touched, preferring the diff stats
    pub fn file_count(&self) -> usize {
        self.stats
            .map(|s| s.files)
            .unwrap_or(self.files_changed.len())
    }
}
