use crate::aggregate::{ComplexityBucket, HotspotRecord, OwnershipRecord};
use crate::error::ValidationError;
use crate::git::Commit;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Characters of the commit subject kept in a timeline entry
const TIMELINE_MESSAGE_CHARS: usize = 100;

/// Request to analyze one topic of a repository
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeRequest {
    /// Remote repository URL (or a local path git can clone from)
    pub repository_url: String,
    /// Topic name, e.g. "auth" (default: auth)
    #[serde(default = "default_topic")]
    pub topic: String,
    /// Optional follow-up question answered from the selected commits
    #[serde(default)]
    pub question: Option<String>,
}

fn default_topic() -> String {
    "auth".to_string()
}

impl AnalyzeRequest {
    pub fn new(repository_url: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            repository_url: repository_url.into(),
            topic: topic.into(),
            question: None,
        }
    }

    pub fn with_question(mut self, question: impl Into<String>) -> Self {
        self.question = Some(question.into());
        self
    }

    /// Reject requests that cannot be analyzed
    pub fn validate(&self) -> Result<(), ValidationError> {
        let url = self.repository_url.trim();
        if url.is_empty() {
            return Err(ValidationError::Empty("repository URL".to_string()));
        }
        if url.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(ValidationError::InvalidUrl(format!(
                "'{}' contains whitespace",
                url
            )));
        }
        if url.starts_with('-') {
            return Err(ValidationError::InvalidUrl(format!(
                "'{}' looks like an option",
                url
            )));
        }
        Ok(())
    }

    /// The question, if it has any content
    pub fn question(&self) -> Option<&str> {
        self.question
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
    }
}

/// One row of the evolution timeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TimelineEntry {
    pub date: DateTime<Utc>,
    /// Short commit hash
    pub hash: String,
    /// Commit subject, truncated for display
    pub message: String,
    pub author: String,
    /// Number of files changed
    pub changes: usize,
}

impl From<&Commit> for TimelineEntry {
    fn from(commit: &Commit) -> Self {
        let subject = commit.subject();
        let message = if subject.chars().count() > TIMELINE_MESSAGE_CHARS {
            let cut: String = subject.chars().take(TIMELINE_MESSAGE_CHARS).collect();
            format!("{}...", cut)
        } else {
            subject.to_string()
        };

        Self {
            date: commit.timestamp,
            hash: commit.short_hash().to_string(),
            message,
            author: commit.author_name.clone(),
            changes: commit.file_count(),
        }
    }
}

/// A commit cited in support of an answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Evidence {
    pub hash: String,
    pub description: String,
}

/// Answer to the follow-up question
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct QaResult {
    pub question: String,
    pub answer: String,
    pub evidence: Vec<Evidence>,
}

/// Where the narrative text came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum NarrativeStatus {
    /// Written by the narrative service
    Generated,
    /// Derived locally because the service failed or is not configured
    Fallback { reason: String },
    /// No commits were selected; the service was not called
    InsufficientEvidence,
}

impl NarrativeStatus {
    pub fn is_generated(&self) -> bool {
        matches!(self, NarrativeStatus::Generated)
    }
}

/// How the commit set was selected
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SelectionInfo {
    /// Lookback window that produced the commits
    pub months_back_used: u32,
    /// Whether the fallback window was needed
    pub widened: bool,
    /// Commits inspected
    pub scanned: usize,
    /// Commits selected
    pub matched: usize,
}

/// Full analysis result
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub repository_url: String,
    pub topic: String,
    pub summary_text: String,
    pub narrative: NarrativeStatus,
    /// Selected commits, oldest first
    pub commits: Vec<Commit>,
    /// Timeline view of `commits`, oldest first
    pub timeline: Vec<TimelineEntry>,
    pub ownership: Vec<OwnershipRecord>,
    /// Top hotspots, ranked
    pub hotspots: Vec<HotspotRecord>,
    pub complexity_trend: Vec<ComplexityBucket>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qa: Option<QaResult>,
    pub selection: SelectionInfo,
    /// Time taken in milliseconds
    pub duration_ms: u64,
}

/// Snapshot cache occupancy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CacheStatus {
    /// Live (unexpired) entries
    pub entry_count: usize,
    /// Age of the oldest live entry; absent when the cache is empty
    pub oldest_age_seconds: Option<u64>,
}

/// Health report for an operational collaborator
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub narrative_configured: bool,
    pub cache: CacheStatus,
}
