/// Configuration system for codebase-time-machine
///
/// Supports loading from multiple sources with priority:
/// CLI args > Environment variables > Config file > Defaults
use crate::error::{AnalysisError, ConfigError};
use crate::glob_utils::compile_patterns;
use crate::selector::SelectionWindow;
use crate::topic::TopicSpec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Snapshot acquisition and cache configuration
    pub snapshot: SnapshotConfig,

    /// Commit selection configuration
    pub selection: SelectionConfig,

    /// Per-commit summary and presentation limits
    pub summary: SummaryConfig,

    /// Narrative (language model) service configuration
    pub narrative: NarrativeConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Additional or replacement topics, keyed by name
    pub topics: BTreeMap<String, TopicSpec>,
}

/// Snapshot acquisition and cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotConfig {
    /// Directory holding temporary clones
    #[serde(default = "default_snapshot_dir")]
    pub root_dir: PathBuf,

    /// Time-to-live of a cached snapshot in seconds
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,

    /// Commits fetched at the protocol level (`git clone --depth`)
    #[serde(default = "default_clone_depth")]
    pub clone_depth: u32,

    /// Overall time budget for one fetch in seconds
    #[serde(default = "default_clone_timeout_secs")]
    pub clone_timeout_secs: u64,

    /// Largest snapshot accepted, in bytes (including `.git`)
    #[serde(default = "default_max_snapshot_bytes")]
    pub max_snapshot_bytes: u64,

    /// Restrict the checkout to the topic's paths
    #[serde(default = "default_true")]
    pub sparse_checkout: bool,

    /// A sparse tree with fewer files than this is replaced by a full checkout
    #[serde(default = "default_min_sparse_files")]
    pub min_sparse_files: usize,
}

/// Commit selection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionConfig {
    /// Initial lookback window in calendar months
    #[serde(default = "default_months_back")]
    pub months_back: u32,

    /// Wider window used once when too few commits match
    #[serde(default = "default_fallback_months_back")]
    pub fallback_months_back: u32,

    /// Cap on selected commits
    #[serde(default = "default_max_commits")]
    pub max_commits: usize,

    /// Fewer matches than this triggers the fallback window
    #[serde(default = "default_min_commits_threshold")]
    pub min_commits_threshold: usize,

    /// Changed paths inspected per commit for path matching
    #[serde(default = "default_max_paths_per_commit")]
    pub max_paths_per_commit: usize,

    /// Diff characters read per commit for keyword scanning
    #[serde(default = "default_diff_scan_chars")]
    pub diff_scan_chars: usize,
}

/// Per-commit summary and presentation limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryConfig {
    /// Diff excerpt budget in characters
    #[serde(default = "default_max_diff_chars")]
    pub max_diff_chars: usize,

    /// Files listed per commit
    #[serde(default = "default_max_display_files")]
    pub max_display_files: usize,

    /// Hotspots included in the result
    #[serde(default = "default_hotspot_limit")]
    pub hotspot_limit: usize,
}

/// Narrative service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NarrativeConfig {
    /// Call the service at all; when false every run uses the fallback
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Base URL of an OpenAI-compatible API
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_model")]
    pub model: String,

    /// Name of the environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Request timeout in seconds
    #[serde(default = "default_narrative_timeout_secs")]
    pub timeout_secs: u64,

    /// Token limit for the summary call
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Token limit for the question-answering call
    #[serde(default = "default_qa_max_tokens")]
    pub qa_max_tokens: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// One of error, warn, info, debug, trace
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default value functions
fn default_snapshot_dir() -> PathBuf {
    crate::paths::PlatformPaths::default_snapshot_dir()
}

fn default_ttl_secs() -> u64 {
    30 * 60
}

fn default_clone_depth() -> u32 {
    100
}

fn default_clone_timeout_secs() -> u64 {
    120
}

fn default_max_snapshot_bytes() -> u64 {
    512 * 1024 * 1024
}

fn default_true() -> bool {
    true
}

fn default_min_sparse_files() -> usize {
    5
}

fn default_months_back() -> u32 {
    12
}

fn default_fallback_months_back() -> u32 {
    36
}

fn default_max_commits() -> usize {
    crate::selector::DEFAULT_MAX_COMMITS
}

fn default_min_commits_threshold() -> usize {
    3
}

fn default_max_paths_per_commit() -> usize {
    crate::selector::DEFAULT_MAX_PATHS_PER_COMMIT
}

fn default_diff_scan_chars() -> usize {
    crate::git::walker::DEFAULT_DIFF_SCAN_CHARS
}

fn default_max_diff_chars() -> usize {
    crate::summarizer::DEFAULT_MAX_DIFF_CHARS
}

fn default_max_display_files() -> usize {
    crate::summarizer::DEFAULT_MAX_DISPLAY_FILES
}

fn default_hotspot_limit() -> usize {
    crate::aggregate::DEFAULT_HOTSPOT_LIMIT
}

fn default_endpoint() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_narrative_timeout_secs() -> u64 {
    60
}

fn default_max_tokens() -> u32 {
    1000
}

fn default_qa_max_tokens() -> u32 {
    800
}

fn default_temperature() -> f32 {
    0.3
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            root_dir: default_snapshot_dir(),
            ttl_secs: default_ttl_secs(),
            clone_depth: default_clone_depth(),
            clone_timeout_secs: default_clone_timeout_secs(),
            max_snapshot_bytes: default_max_snapshot_bytes(),
            sparse_checkout: true,
            min_sparse_files: default_min_sparse_files(),
        }
    }
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            months_back: default_months_back(),
            fallback_months_back: default_fallback_months_back(),
            max_commits: default_max_commits(),
            min_commits_threshold: default_min_commits_threshold(),
            max_paths_per_commit: default_max_paths_per_commit(),
            diff_scan_chars: default_diff_scan_chars(),
        }
    }
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            max_diff_chars: default_max_diff_chars(),
            max_display_files: default_max_display_files(),
            hotspot_limit: default_hotspot_limit(),
        }
    }
}

impl Default for NarrativeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: default_endpoint(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_narrative_timeout_secs(),
            max_tokens: default_max_tokens(),
            qa_max_tokens: default_qa_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl SnapshotConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn clone_timeout(&self) -> Duration {
        Duration::from_secs(self.clone_timeout_secs)
    }
}

impl SelectionConfig {
    /// The selection window described by this section
    pub fn window(&self) -> SelectionWindow {
        SelectionWindow {
            months_back: self.months_back,
            max_commits: self.max_commits,
            min_commits_threshold: self.min_commits_threshold,
            fallback_months_back: self.fallback_months_back,
            max_paths_per_commit: self.max_paths_per_commit,
        }
    }
}

impl NarrativeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// API key read from the configured environment variable, if set
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
    }
}

impl LoggingConfig {
    pub fn tracing_level(&self) -> Result<tracing::Level, ConfigError> {
        tracing::Level::from_str(self.level.trim()).map_err(|_| ConfigError::InvalidValue {
            key: "logging.level".to_string(),
            reason: format!(
                "must be one of error, warn, info, debug, trace; got '{}'",
                self.level
            ),
        })
    }
}

fn invalid(key: &str, reason: impl Into<String>) -> AnalysisError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        reason: reason.into(),
    }
    .into()
}

impl Config {
    /// Load configuration from file
    pub fn from_file(path: &Path) -> Result<Self, AnalysisError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()).into());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::LoadFailed(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| ConfigError::ParseFailed(format!("Invalid TOML: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from default location or create default
    pub fn load_or_default() -> Result<Self, AnalysisError> {
        let config_path = crate::paths::PlatformPaths::default_config_path();

        if config_path.exists() {
            tracing::info!("Loading config from: {}", config_path.display());
            Self::from_file(&config_path)
        } else {
            tracing::info!("No config file found, using defaults");
            Ok(Self::default())
        }
    }

    /// Render as pretty TOML
    pub fn to_toml(&self) -> Result<String, AnalysisError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::RenderFailed(e.to_string()).into())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), AnalysisError> {
        if self.snapshot.ttl_secs == 0 {
            return Err(invalid("snapshot.ttl_secs", "must be greater than 0"));
        }

        if self.snapshot.clone_depth == 0 {
            return Err(invalid("snapshot.clone_depth", "must be greater than 0"));
        }

        if self.snapshot.clone_timeout_secs == 0 {
            return Err(invalid("snapshot.clone_timeout_secs", "must be greater than 0"));
        }

        if self.snapshot.max_snapshot_bytes == 0 {
            return Err(invalid("snapshot.max_snapshot_bytes", "must be greater than 0"));
        }

        if self.selection.max_commits == 0 {
            return Err(invalid("selection.max_commits", "must be greater than 0"));
        }

        if self.selection.fallback_months_back <= self.selection.months_back {
            return Err(invalid(
                "selection.fallback_months_back",
                format!(
                    "must be greater than selection.months_back ({}), got {}",
                    self.selection.months_back, self.selection.fallback_months_back
                ),
            ));
        }

        if self.selection.max_paths_per_commit == 0 {
            return Err(invalid(
                "selection.max_paths_per_commit",
                "must be greater than 0",
            ));
        }

        if self.summary.max_diff_chars == 0 {
            return Err(invalid("summary.max_diff_chars", "must be greater than 0"));
        }

        if self.summary.hotspot_limit == 0 {
            return Err(invalid("summary.hotspot_limit", "must be greater than 0"));
        }

        if !(0.0..=2.0).contains(&self.narrative.temperature) {
            return Err(invalid(
                "narrative.temperature",
                format!(
                    "must be between 0.0 and 2.0, got {}",
                    self.narrative.temperature
                ),
            ));
        }

        if self.narrative.timeout_secs == 0 {
            return Err(invalid("narrative.timeout_secs", "must be greater than 0"));
        }

        self.logging.tracing_level()?;

        for (name, topic) in &self.topics {
            if let Some(paths) = &topic.paths {
                compile_patterns(paths)
                    .map_err(|e| invalid(&format!("topics.{}.paths", name), e.to_string()))?;
            }
        }

        Ok(())
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|name| std::env::var(name).ok());
    }

    /// Apply overrides from an arbitrary variable source
    ///
    /// Unparseable numeric values are ignored and leave the setting unchanged.
    pub fn apply_overrides_from(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(dir) = var("CTM_SNAPSHOT_DIR")
            && !dir.is_empty()
        {
            self.snapshot.root_dir = PathBuf::from(dir);
        }

        if let Some(ttl) = var("CTM_CACHE_TTL_SECS")
            && let Ok(ttl) = ttl.parse()
        {
            self.snapshot.ttl_secs = ttl;
        }

        if let Some(depth) = var("CTM_CLONE_DEPTH")
            && let Ok(depth) = depth.parse()
        {
            self.snapshot.clone_depth = depth;
        }

        if let Some(timeout) = var("CTM_CLONE_TIMEOUT_SECS")
            && let Ok(timeout) = timeout.parse()
        {
            self.snapshot.clone_timeout_secs = timeout;
        }

        if let Some(months) = var("CTM_MONTHS_BACK")
            && let Ok(months) = months.parse()
        {
            self.selection.months_back = months;
        }

        if let Some(max) = var("CTM_MAX_COMMITS")
            && let Ok(max) = max.parse()
        {
            self.selection.max_commits = max;
        }

        if let Some(endpoint) = var("CTM_NARRATIVE_ENDPOINT")
            && !endpoint.is_empty()
        {
            self.narrative.endpoint = endpoint;
        }

        if let Some(model) = var("CTM_NARRATIVE_MODEL")
            && !model.is_empty()
        {
            self.narrative.model = model;
        }

        if let Some(level) = var("CTM_LOG_LEVEL")
            && !level.is_empty()
        {
            self.logging.level = level;
        }
    }

    /// Create a new Config with defaults and environment overrides
    pub fn new() -> Result<Self, AnalysisError> {
        let mut config = Self::load_or_default()?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }
}
