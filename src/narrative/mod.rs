//! Natural-language narration of a selected commit set
//!
//! The narrative service is an external, possibly slow or failing dependency.
//! Its output never feeds back into the deterministic aggregates; when it
//! fails, [`fallback`] derives plain text from the selected data instead.

/// OpenAI-compatible chat completions client
pub mod chat;
/// Locally derived summaries and answers
pub mod fallback;
/// Prompt construction and response parsing
pub mod prompt;

pub use chat::ChatNarrator;

use crate::aggregate::Aggregates;
use crate::config::NarrativeConfig;
use crate::error::NarrativeError;
use crate::git::Commit;
use crate::types::Evidence;
use async_trait::async_trait;
use std::sync::Arc;

/// Input to the narrative service
#[derive(Debug, Clone)]
pub struct NarrativeRequest {
    pub topic: String,
    /// Summarized commits, oldest first
    pub commits: Vec<Commit>,
    pub aggregates: Aggregates,
    pub question: Option<String>,
}

/// Output of the narrative service
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NarrativeResponse {
    pub summary_text: String,
    /// Present when the request carried a question
    pub qa_answer: Option<String>,
    pub evidence: Vec<Evidence>,
}

/// Black-box narrative service
#[async_trait]
pub trait NarrativeClient: Send + Sync {
    async fn narrate(&self, request: &NarrativeRequest) -> Result<NarrativeResponse, NarrativeError>;

    /// Whether calls can succeed at all
    fn is_configured(&self) -> bool {
        true
    }
}

/// Narrator used when no service is available; every call fails
#[derive(Debug, Clone)]
pub struct UnconfiguredNarrator {
    reason: String,
}

impl UnconfiguredNarrator {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl NarrativeClient for UnconfiguredNarrator {
    async fn narrate(&self, _request: &NarrativeRequest) -> Result<NarrativeResponse, NarrativeError> {
        Err(NarrativeError::NotConfigured(self.reason.clone()))
    }

    fn is_configured(&self) -> bool {
        false
    }
}

/// Build the narrator described by `config`
pub fn from_config(config: &NarrativeConfig) -> Arc<dyn NarrativeClient> {
    if !config.enabled {
        return Arc::new(UnconfiguredNarrator::new("narrative service disabled"));
    }

    let Some(api_key) = config.api_key() else {
        tracing::info!(
            "{} is not set, narrative summaries will use the fallback",
            config.api_key_env
        );
        return Arc::new(UnconfiguredNarrator::new(format!(
            "{} is not set",
            config.api_key_env
        )));
    };

    match ChatNarrator::new(config, api_key) {
        Ok(narrator) => Arc::new(narrator),
        Err(e) => {
            tracing::warn!("Failed to build narrative client: {}", e);
            Arc::new(UnconfiguredNarrator::new(e.to_string()))
        }
    }
}

/// Keep only evidence citing one of the selected commits
///
/// A cited hash must be a prefix (at least 4 characters) of a selected
/// commit's full hash; the entry is rewritten to that commit's short hash.
pub fn retain_known_evidence(evidence: Vec<Evidence>, commits: &[Commit]) -> Vec<Evidence> {
    evidence
        .into_iter()
        .filter_map(|item| {
            let cited = item.hash.trim().to_lowercase();
            if cited.len() < 4 {
                tracing::warn!("Discarding evidence with short hash '{}'", item.hash);
                return None;
            }
            match commits.iter().find(|c| c.hash.to_lowercase().starts_with(&cited)) {
                Some(commit) => Some(Evidence {
                    hash: commit.short_hash().to_string(),
                    description: item.description,
                }),
                None => {
                    tracing::warn!("Discarding evidence citing unknown commit '{}'", item.hash);
                    None
                }
            }
        })
        .collect()
}
