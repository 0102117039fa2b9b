//! Topic-scoped commit selection over a bounded date window
//!
//! The walk is newest-first and stops as soon as `max_commits` matches are
//! collected, so older relevant commits beyond the cap are never seen. When too
//! few commits match, the walk is repeated exactly once over a wider window.

use crate::error::{GitError, ValidationError};
use crate::git::{Commit, HistorySource};
use crate::topic::TopicMatcher;
use chrono::{DateTime, Months, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Changed paths inspected per commit when testing path globs
///
/// Commits touching more files are only path-matched on their first
/// `DEFAULT_MAX_PATHS_PER_COMMIT` paths. A relevant file past that position is
/// missed unless a keyword also matches.
pub const DEFAULT_MAX_PATHS_PER_COMMIT: usize = 10;

/// Default cap on selected commits
pub const DEFAULT_MAX_COMMITS: usize = 20;

/// Date range and count cap applied during selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SelectionWindow {
    pub months_back: u32,
    pub max_commits: usize,
    pub min_commits_threshold: usize,
    pub fallback_months_back: u32,
    pub max_paths_per_commit: usize,
}

impl Default for SelectionWindow {
    fn default() -> Self {
        Self {
            months_back: 12,
            max_commits: DEFAULT_MAX_COMMITS,
            min_commits_threshold: 3,
            fallback_months_back: 36,
            max_paths_per_commit: DEFAULT_MAX_PATHS_PER_COMMIT,
        }
    }
}

impl SelectionWindow {
    /// Build a window, rejecting a fallback that does not widen or a zero cap
    pub fn new(
        months_back: u32,
        fallback_months_back: u32,
        max_commits: usize,
        min_commits_threshold: usize,
    ) -> Result<Self, ValidationError> {
        let window = Self {
            months_back,
            max_commits,
            min_commits_threshold,
            fallback_months_back,
            max_paths_per_commit: DEFAULT_MAX_PATHS_PER_COMMIT,
        };
        window.validate()?;
        Ok(window)
    }

    pub fn with_max_paths_per_commit(mut self, max_paths: usize) -> Self {
        self.max_paths_per_commit = max_paths;
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.fallback_months_back <= self.months_back {
            return Err(ValidationError::ConstraintViolation {
                field: "fallback_months_back".to_string(),
                constraint: format!("greater than months_back ({})", self.months_back),
                actual: self.fallback_months_back.to_string(),
            });
        }
        if self.max_commits == 0 {
            return Err(ValidationError::ConstraintViolation {
                field: "max_commits".to_string(),
                constraint: "at least 1".to_string(),
                actual: "0".to_string(),
            });
        }
        if self.max_paths_per_commit == 0 {
            return Err(ValidationError::ConstraintViolation {
                field: "max_paths_per_commit".to_string(),
                constraint: "at least 1".to_string(),
                actual: "0".to_string(),
            });
        }
        Ok(())
    }
}

/// Outcome of a selection run
#[derive(Debug, Clone, Default)]
pub struct Selection {
    /// Matching commits, oldest first
    pub commits: Vec<Commit>,
    /// Whether the fallback window was used
    pub widened: bool,
    /// Window actually applied to produce `commits`
    pub months_back_used: u32,
    /// Commits inspected by the pass that produced `commits`
    pub scanned: usize,
}

impl Selection {
    pub fn matched(&self) -> usize {
        self.commits.len()
    }

    /// Walks collect newest-first; callers get oldest-first
    fn finish(mut self) -> Self {
        self.commits.reverse();
        self
    }
}

/// Walks history and picks the commits relevant to a topic
pub struct CommitSelector;

impl CommitSelector {
    /// Select topic commits from `source`, returned oldest-first
    ///
    /// Fallback widening happens iff the first pass matched fewer than
    /// `min_commits_threshold` commits, and at most once.
    pub fn select(
        source: &dyn HistorySource,
        matcher: &TopicMatcher,
        window: &SelectionWindow,
        now: DateTime<Utc>,
    ) -> Result<Selection, GitError> {
        let first = Self::scan(source, matcher, window, window.months_back, now)?;
        if first.commits.len() >= window.min_commits_threshold {
            tracing::info!(
                "Selected {} of {} scanned commits within {} months",
                first.commits.len(),
                first.scanned,
                window.months_back
            );
            return Ok(first.finish());
        }

        tracing::info!(
            "Only {} matching commits within {} months, widening to {} months",
            first.commits.len(),
            window.months_back,
            window.fallback_months_back
        );

        let mut second = Self::scan(source, matcher, window, window.fallback_months_back, now)?;
        second.widened = true;
        tracing::info!(
            "Selected {} of {} scanned commits within {} months",
            second.commits.len(),
            second.scanned,
            window.fallback_months_back
        );
        Ok(second.finish())
    }

    /// One newest-first pass over `months` of history
    fn scan(
        source: &dyn HistorySource,
        matcher: &TopicMatcher,
        window: &SelectionWindow,
        months: u32,
        now: DateTime<Utc>,
    ) -> Result<Selection, GitError> {
        let mut selection = Selection {
            months_back_used: months,
            ..Default::default()
        };

        if matcher.is_empty() {
            tracing::debug!("Topic has no keywords or paths, nothing can match");
            return Ok(selection);
        }

        for commit in source.walk_since(window_start(now, months))? {
            let commit = commit?;
            selection.scanned += 1;

            if let Some(kind) = matcher.matches(&commit) {
                tracing::debug!("Commit {} matched by {:?}", commit.short_hash(), kind);
                selection.commits.push(commit);
                if selection.commits.len() >= window.max_commits {
                    break;
                }
            }
        }

        Ok(selection)
    }
}

/// Start of a window reaching `months` calendar months back from `now`
pub fn window_start(now: DateTime<Utc>, months: u32) -> DateTime<Utc> {
    now.checked_sub_months(Months::new(months))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::MemoryHistory;
    use crate::git::test_support::{commit_at, ts};
    use crate::topic::TopicDefinition;

    fn auth_matcher(max_paths: usize) -> TopicMatcher {
        let topic = TopicDefinition::new(
            "auth",
            vec!["auth".to_string()],
            vec!["**/auth/**".to_string()],
        );
        TopicMatcher::new(&topic, max_paths).unwrap()
    }

    fn commit(hash: &str, when: DateTime<Utc>, message: &str, files: &[&str]) -> Commit {
        let mut c = commit_at(hash, when);
        c.message = message.to_string();
        c.files_changed = files.iter().map(|f| f.to_string()).collect();
        c
    }

    fn window(max_commits: usize, threshold: usize) -> SelectionWindow {
        SelectionWindow::new(12, 36, max_commits, threshold).unwrap()
    }

    #[test]
    fn test_window_validation() {
        assert!(SelectionWindow::new(12, 12, 20, 3).is_err());
        assert!(SelectionWindow::new(12, 36, 0, 3).is_err());
        assert!(SelectionWindow::default().validate().is_ok());
    }

    #[test]
    fn test_keyword_or_path_match_oldest_first() {
        let now = ts(2024, 6, 1);
        let history = MemoryHistory::new(vec![
            commit("a", ts(2024, 1, 1), "Introduce auth middleware", &["auth/mw.ts"]),
            commit("b", ts(2024, 2, 1), "Unrelated docs", &["README.md"]),
            commit(
                "c",
                ts(2024, 3, 1),
                "Refactor: move checks into middleware",
                &["routes/users.ts", "auth/mw.ts"],
            ),
        ]);

        let selection =
            CommitSelector::select(&history, &auth_matcher(10), &window(20, 1), now).unwrap();

        let hashes: Vec<&str> = selection.commits.iter().map(|c| c.hash.as_str()).collect();
        assert_eq!(hashes, vec!["a", "c"]);
        assert!(!selection.widened);
        assert_eq!(selection.scanned, 3);
        assert_eq!(history.walk_count(), 1);
    }

    #[test]
    fn test_stops_at_max_commits_keeping_newest() {
        let now = ts(2024, 12, 1);
        let commits = (1..=6)
            .map(|m| commit(&format!("c{m}"), ts(2024, m, 1), "auth tweak", &[]))
            .collect();
        let history = MemoryHistory::new(commits);

        let selection =
            CommitSelector::select(&history, &auth_matcher(10), &window(4, 1), now).unwrap();

        let hashes: Vec<&str> = selection.commits.iter().map(|c| c.hash.as_str()).collect();
        assert_eq!(hashes, vec!["c3", "c4", "c5", "c6"]);
        // Early exit: the two oldest were never inspected
        assert_eq!(selection.scanned, 4);
    }

    #[test]
    fn test_fallback_widens_once() {
        let now = ts(2024, 6, 1);
        let history = MemoryHistory::new(vec![
            commit("old1", ts(2022, 1, 1), "auth v1", &[]),
            commit("old2", ts(2022, 6, 1), "auth v2", &[]),
            commit("new", ts(2024, 1, 1), "auth v3", &[]),
        ]);

        let selection =
            CommitSelector::select(&history, &auth_matcher(10), &window(20, 3), now).unwrap();

        assert!(selection.widened);
        assert_eq!(selection.months_back_used, 36);
        assert_eq!(selection.matched(), 3);
        assert_eq!(history.walk_count(), 2);
    }

    #[test]
    fn test_no_fallback_when_threshold_met() {
        let now = ts(2024, 6, 1);
        let history = MemoryHistory::new(vec![
            commit("a", ts(2024, 1, 1), "auth", &[]),
            commit("b", ts(2024, 2, 1), "auth", &[]),
            commit("c", ts(2024, 3, 1), "auth", &[]),
            commit("old", ts(2021, 1, 1), "auth", &[]),
        ]);

        let selection =
            CommitSelector::select(&history, &auth_matcher(10), &window(20, 3), now).unwrap();

        assert!(!selection.widened);
        assert_eq!(selection.matched(), 3);
        assert_eq!(history.walk_count(), 1);
    }

    #[test]
    fn test_zero_matches_after_widening_is_empty_not_error() {
        let now = ts(2024, 6, 1);
        let history = MemoryHistory::new(vec![commit("a", ts(2024, 1, 1), "docs", &["README.md"])]);

        let selection =
            CommitSelector::select(&history, &auth_matcher(10), &window(20, 3), now).unwrap();

        assert!(selection.commits.is_empty());
        assert!(selection.widened);
        assert_eq!(history.walk_count(), 2);
    }

    #[test]
    fn test_empty_history() {
        let history = MemoryHistory::new(vec![]);
        let selection =
            CommitSelector::select(&history, &auth_matcher(10), &window(20, 3), ts(2024, 1, 1))
                .unwrap();
        assert!(selection.commits.is_empty());
    }

    #[test]
    fn test_empty_topic_never_walks() {
        let history = MemoryHistory::new(vec![commit("a", ts(2024, 1, 1), "anything", &["x"])]);
        let matcher = TopicMatcher::new(&TopicDefinition::empty("none"), 10).unwrap();

        let selection =
            CommitSelector::select(&history, &matcher, &window(20, 3), ts(2024, 6, 1)).unwrap();

        assert!(selection.commits.is_empty());
        assert_eq!(history.walk_count(), 0);
    }

    #[test]
    fn test_path_beyond_k_is_missed() {
        let history = MemoryHistory::new(vec![commit(
            "bulk",
            ts(2024, 1, 1),
            "Bulk rename",
            &["a.rs", "b.rs", "c.rs", "auth/mw.ts"],
        )]);

        let narrow =
            CommitSelector::select(&history, &auth_matcher(3), &window(20, 0), ts(2024, 6, 1))
                .unwrap();
        assert!(narrow.commits.is_empty());

        let wide =
            CommitSelector::select(&history, &auth_matcher(4), &window(20, 0), ts(2024, 6, 1))
                .unwrap();
        assert_eq!(wide.matched(), 1);
    }

    #[test]
    fn test_window_start_is_calendar_months() {
        assert_eq!(window_start(ts(2024, 3, 31), 1), ts(2024, 2, 29));
        assert_eq!(window_start(ts(2024, 6, 1), 12), ts(2023, 6, 1));
    }
}
