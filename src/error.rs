/// Centralized error types for codebase-time-machine using thiserror
///
/// All failures originate at the I/O boundary (snapshot acquisition, history
/// reads, the narrative service). Selection and aggregation are total on
/// well-formed input and have no error variants of their own.
use thiserror::Error;

/// Main error type for an analysis run
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("Git error: {0}")]
    Git(#[from] GitError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Errors raised while obtaining a local snapshot of a remote repository
///
/// Cloneable so a single clone outcome can be handed to every request that
/// waited on the same cache key.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SnapshotError {
    #[error("Repository not found or not accessible: {url}")]
    NotFound { url: String },

    #[error("Failed to clone '{url}': {reason}")]
    CloneFailed { url: String, reason: String },

    #[error("Clone of '{url}' timed out after {secs} seconds")]
    Timeout { url: String, secs: u64 },

    #[error("Snapshot size exceeds budget: {size} > {max} bytes")]
    SizeExceeded { size: u64, max: u64 },

    #[error("Snapshot acquisition was interrupted before completing")]
    Interrupted,

    #[error("Snapshot I/O failed: {0}")]
    Io(String),
}

/// Errors related to reading history out of a snapshot
#[derive(Error, Debug)]
pub enum GitError {
    #[error("Git error: {0}")]
    Git2(#[from] git2::Error),

    #[error("Failed to open git repository at {path}: {reason}")]
    OpenFailed { path: String, reason: String },

    #[error("Failed to iterate commits: {0}")]
    IterFailed(String),
}

/// Errors from the external narrative (language model) service
///
/// These never fail a run; the pipeline logs them and degrades to a fallback.
#[derive(Error, Debug)]
pub enum NarrativeError {
    #[error("Narrative service is not configured: {0}")]
    NotConfigured(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Server error: HTTP {status} - {body}")]
    Server { status: u16, body: String },

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("Empty response")]
    EmptyResponse,

    #[error("Narrative call timed out after {0} seconds")]
    Timeout(u64),
}

/// Errors related to configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration file: {0}")]
    LoadFailed(String),

    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),

    #[error("Invalid configuration value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("Failed to render configuration: {0}")]
    RenderFailed(String),

    #[error("Configuration file not found: {0}")]
    FileNotFound(String),
}

/// Errors related to input validation
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Invalid repository URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),

    #[error("{field} must be {constraint}, got {actual}")]
    ConstraintViolation {
        field: String,
        constraint: String,
        actual: String,
    },

    #[error("Empty {0}")]
    Empty(String),
}

/// Coarse classification used for the single user-visible failure message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Repository missing, private, or unreachable
    NotFound,
    /// Fetch exceeded its time budget
    TimedOut,
    /// The request itself was malformed
    InvalidRequest,
    /// Anything else
    Internal,
}

// Conversion from anyhow::Error to AnalysisError
impl From<anyhow::Error> for AnalysisError {
    fn from(err: anyhow::Error) -> Self {
        AnalysisError::Other(format!("{:#}", err))
    }
}

impl AnalysisError {
    /// Create a new error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        AnalysisError::Other(msg.into())
    }

    /// Classify this error for user-facing reporting
    pub fn kind(&self) -> FailureKind {
        match self {
            AnalysisError::Snapshot(SnapshotError::NotFound { .. }) => FailureKind::NotFound,
            AnalysisError::Snapshot(SnapshotError::CloneFailed { .. }) => FailureKind::NotFound,
            AnalysisError::Snapshot(SnapshotError::Timeout { .. }) => FailureKind::TimedOut,
            AnalysisError::Validation(_) => FailureKind::InvalidRequest,
            _ => FailureKind::Internal,
        }
    }

    /// Convert to a single human-readable message distinguishing the failure class
    pub fn to_user_string(&self) -> String {
        match self.kind() {
            FailureKind::NotFound => {
                format!("Repository not found or unreachable ({})", self)
            }
            FailureKind::TimedOut => format!("Analysis timed out ({})", self),
            FailureKind::InvalidRequest => format!("Invalid request ({})", self),
            FailureKind::Internal => format!("Internal failure ({})", self),
        }
    }

    /// Check if this is a user error (validation, not found) vs system error
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            AnalysisError::Validation(_) | AnalysisError::Snapshot(SnapshotError::NotFound { .. })
        )
    }

    /// Check if the caller may reasonably retry
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AnalysisError::Snapshot(
                SnapshotError::CloneFailed { .. }
                    | SnapshotError::Timeout { .. }
                    | SnapshotError::Interrupted
            ) | AnalysisError::Io(_)
        )
    }
}

impl From<std::io::Error> for SnapshotError {
    fn from(err: std::io::Error) -> Self {
        SnapshotError::Io(err.to_string())
    }
}
