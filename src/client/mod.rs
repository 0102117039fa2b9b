//! Core library client for codebase-time-machine
//!
//! This module provides the main client interface for running topic analyses
//! as a library in your own Rust applications.

mod analysis;

use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::error::AnalysisError;
use crate::narrative::{self, NarrativeClient};
use crate::snapshot::{Fetcher, GitCliFetcher, SnapshotProvider};
use crate::topic::TopicRegistry;
use crate::types::*;
use std::sync::Arc;

/// Main client for analyzing how a topic evolved in a repository
///
/// The client owns the snapshot cache, so clones of it share cached
/// snapshots and the per-key clone lock.
///
/// # Example
///
/// ```no_run
/// use codebase_time_machine::{AnalysisClient, AnalyzeRequest};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let client = AnalysisClient::new()?;
///
///     let request = AnalyzeRequest::new("https://github.com/owner/repo", "auth")
///         .with_question("Why was JWT introduced?");
///     let result = client.analyze(request).await?;
///
///     println!("{}", result.summary_text);
///     for entry in &result.timeline {
///         println!("{} {} {}", entry.date.format("%Y-%m-%d"), entry.hash, entry.message);
///     }
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct AnalysisClient {
    pub(crate) config: Arc<Config>,
    pub(crate) topics: Arc<TopicRegistry>,
    pub(crate) provider: Arc<SnapshotProvider>,
    pub(crate) narrator: Arc<dyn NarrativeClient>,
    pub(crate) clock: Arc<dyn Clock>,
}

impl AnalysisClient {
    /// Create a new client from the default configuration file and environment
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be loaded or is invalid.
    pub fn new() -> Result<Self, AnalysisError> {
        let config = Config::new()?;
        Self::with_config(config)
    }

    /// Create a client with a custom configuration
    ///
    /// Snapshots are fetched with the `git` command line client and narratives
    /// come from the configured chat completions endpoint, if an API key is set.
    pub fn with_config(config: Config) -> Result<Self, AnalysisError> {
        let narrator = narrative::from_config(&config.narrative);
        Self::with_components(
            config,
            Arc::new(GitCliFetcher::default()),
            narrator,
            Arc::new(SystemClock),
        )
    }

    /// Create a client from explicit collaborators
    pub fn with_components(
        config: Config,
        fetcher: Arc<dyn Fetcher>,
        narrator: Arc<dyn NarrativeClient>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, AnalysisError> {
        config.validate()?;

        tracing::info!("Initializing analysis client");
        tracing::debug!("Snapshot root: {}", config.snapshot.root_dir.display());
        tracing::debug!(
            "Selection window: {} months (fallback {})",
            config.selection.months_back,
            config.selection.fallback_months_back
        );
        tracing::debug!("Narrative configured: {}", narrator.is_configured());

        let topics = Arc::new(TopicRegistry::with_overrides(&config.topics));
        let provider = Arc::new(SnapshotProvider::new(
            config.snapshot.clone(),
            fetcher,
            clock.clone(),
        ));

        Ok(Self {
            config: Arc::new(config),
            topics,
            provider,
            narrator,
            clock,
        })
    }

    /// Analyze how a topic evolved in a repository
    ///
    /// Zero matching commits is a valid result: the arrays are empty and the
    /// summary states that there is insufficient evidence. A failing narrative
    /// service degrades to a locally derived summary and never fails the run.
    ///
    /// # Errors
    ///
    /// Returns an error if the request is invalid, the snapshot cannot be
    /// acquired (not found, unreachable, timed out, too large), or the history
    /// cannot be read.
    pub async fn analyze(&self, request: AnalyzeRequest) -> Result<AnalysisResult, AnalysisError> {
        analysis::do_analyze(self, request).await
    }

    /// Names of the known topics
    pub fn topics(&self) -> Vec<String> {
        self.topics.names()
    }

    /// The topic registry used to resolve request topics
    pub fn topic_registry(&self) -> &TopicRegistry {
        &self.topics
    }

    /// Snapshot cache occupancy, without side effects
    pub fn cache_status(&self) -> CacheStatus {
        self.provider.cache().status()
    }

    /// Drop every cached snapshot, returning how many entries were removed
    ///
    /// Directories still in use by a running analysis are removed once that
    /// analysis finishes.
    pub fn clear_cache(&self) -> usize {
        let removed = self.provider.cache().clear();
        tracing::info!("Cleared {} cached snapshots", removed);
        removed
    }

    /// Health report for an operational collaborator
    pub fn health(&self) -> HealthResponse {
        HealthResponse {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            narrative_configured: self.narrator.is_configured(),
            cache: self.cache_status(),
        }
    }

    /// Get the configuration in use
    pub fn config(&self) -> &Config {
        &self.config
    }
}
