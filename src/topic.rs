//! Topic definitions and commit relevance matching
//!
//! A topic is literal pattern matching: case-insensitive keyword substrings
//! against commit message and diff text, OR'd with path globs against changed
//! file paths. There is no scoring or fuzzy matching.

use crate::error::ValidationError;
use crate::git::Commit;
use crate::glob_utils::{compile_patterns, matches_path, patterns_for_word};
use globset::GlobSet;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Keywords of the built-in topics
const BUILTIN_TOPICS: &[(&str, &[&str])] = &[
    (
        "auth",
        &[
            "auth", "login", "jwt", "token", "session", "user", "password", "oauth", "signin",
            "signup",
        ],
    ),
    ("api", &["api", "endpoint", "route", "controller", "handler"]),
    (
        "database",
        &["db", "database", "migration", "schema", "model", "sql"],
    ),
    ("ui", &["component", "view", "template", "style", "css", "html"]),
];

/// A named filter scoping analysis to one feature area
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TopicDefinition {
    pub name: String,
    /// Matched case-insensitively against commit message and diff text
    pub keywords: Vec<String>,
    /// Globs matched against changed file paths
    pub paths: Vec<String>,
}

impl TopicDefinition {
    pub fn new(name: impl Into<String>, keywords: Vec<String>, paths: Vec<String>) -> Self {
        Self {
            name: name.into(),
            keywords,
            paths,
        }
    }

    /// Topic whose path globs are derived from its keywords
    pub fn from_keywords(name: impl Into<String>, keywords: Vec<String>) -> Self {
        let paths = keywords
            .iter()
            .filter(|k| !k.trim().is_empty())
            .flat_map(|k| patterns_for_word(k.trim()))
            .collect();
        Self::new(name, keywords, paths)
    }

    /// A topic that matches nothing
    pub fn empty(name: impl Into<String>) -> Self {
        Self::new(name, Vec::new(), Vec::new())
    }

    /// True when there is nothing to match with
    pub fn is_empty(&self) -> bool {
        self.keywords.iter().all(|k| k.trim().is_empty()) && self.paths.is_empty()
    }
}

/// Topic entry as written in the config file
///
/// Omitting `paths` derives them from the keywords; `paths = []` disables
/// path matching for the topic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicSpec {
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paths: Option<Vec<String>>,
}

impl TopicSpec {
    fn into_definition(self, name: &str) -> TopicDefinition {
        match self.paths {
            Some(paths) => TopicDefinition::new(name, self.keywords, paths),
            None => TopicDefinition::from_keywords(name, self.keywords),
        }
    }
}

/// Static set of topics known at process start
#[derive(Debug, Clone)]
pub struct TopicRegistry {
    topics: BTreeMap<String, TopicDefinition>,
}

impl Default for TopicRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl TopicRegistry {
    /// Registry holding only the built-in topics
    pub fn builtin() -> Self {
        let topics = BUILTIN_TOPICS
            .iter()
            .map(|(name, keywords)| {
                let keywords = keywords.iter().map(|k| k.to_string()).collect();
                (
                    name.to_string(),
                    TopicDefinition::from_keywords(*name, keywords),
                )
            })
            .collect();
        Self { topics }
    }

    /// Built-ins plus configured topics, which replace built-ins of the same name
    pub fn with_overrides(overrides: &BTreeMap<String, TopicSpec>) -> Self {
        let mut registry = Self::builtin();
        for (name, spec) in overrides {
            let key = name.trim().to_lowercase();
            registry
                .topics
                .insert(key.clone(), spec.clone().into_definition(&key));
        }
        registry
    }

    /// Look up a known topic, case-insensitively
    pub fn get(&self, name: &str) -> Option<&TopicDefinition> {
        self.topics.get(&name.trim().to_lowercase())
    }

    /// Resolve any topic name to a definition
    ///
    /// Unknown names become an ad-hoc topic keyed on the name itself; a blank
    /// name yields the empty topic.
    pub fn resolve(&self, name: &str) -> TopicDefinition {
        let key = name.trim().to_lowercase();
        if key.is_empty() {
            return TopicDefinition::empty("");
        }
        match self.topics.get(&key) {
            Some(topic) => topic.clone(),
            None => {
                tracing::debug!("Topic '{}' is not configured, using it as a keyword", key);
                TopicDefinition::from_keywords(key.clone(), vec![key])
            }
        }
    }

    /// Names of all known topics in sorted order
    pub fn names(&self) -> Vec<String> {
        self.topics.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TopicDefinition> {
        self.topics.values()
    }
}

/// Why a commit matched a topic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    Keyword,
    Path,
}

/// Compiled form of a [`TopicDefinition`]
#[derive(Debug, Clone)]
pub struct TopicMatcher {
    keywords: Vec<String>,
    paths: GlobSet,
    max_paths: usize,
}

impl TopicMatcher {
    /// Compile `topic`, inspecting at most `max_paths` changed paths per commit
    pub fn new(topic: &TopicDefinition, max_paths: usize) -> Result<Self, ValidationError> {
        let keywords = topic
            .keywords
            .iter()
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        let paths = compile_patterns(&topic.paths)?;

        Ok(Self {
            keywords,
            paths,
            max_paths,
        })
    }

    /// True when this matcher can never match
    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty() && self.paths.is_empty()
    }

    /// Any keyword in the message or diff text
    pub fn keyword_match(&self, commit: &Commit) -> bool {
        if self.keywords.is_empty() {
            return false;
        }
        let message = commit.message.to_lowercase();
        if self.keywords.iter().any(|k| message.contains(k.as_str())) {
            return true;
        }
        let diff = commit.diff.to_lowercase();
        self.keywords.iter().any(|k| diff.contains(k.as_str()))
    }

    /// A single path against the topic globs
    pub fn path_match(&self, path: &str) -> bool {
        matches_path(&self.paths, path)
    }

    /// Relevance test used during selection
    ///
    /// Only the first `max_paths` changed paths are inspected, so a commit whose
    /// only relevant file sits beyond that position is not matched by path.
    pub fn matches(&self, commit: &Commit) -> Option<MatchKind> {
        if self.keyword_match(commit) {
            return Some(MatchKind::Keyword);
        }
        if commit
            .files_changed
            .iter()
            .take(self.max_paths)
            .any(|p| self.path_match(p))
        {
            return Some(MatchKind::Path);
        }
        None
    }
}
