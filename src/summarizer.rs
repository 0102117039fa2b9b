//! Bounded per-commit change summaries
//!
//! Turns a selected commit into its display form: a diff excerpt cut at a line
//! boundary and a short list of the files most relevant to the topic.

use crate::git::Commit;
use crate::topic::TopicMatcher;
use rayon::prelude::*;

/// Default diff excerpt budget in characters
pub const DEFAULT_MAX_DIFF_CHARS: usize = 200;

/// Default number of files shown per commit
pub const DEFAULT_MAX_DISPLAY_FILES: usize = 3;

/// Produces bounded display data for selected commits
#[derive(Debug, Clone, Copy)]
pub struct DiffSummarizer {
    max_diff_chars: usize,
    max_display_files: usize,
}

impl Default for DiffSummarizer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DIFF_CHARS, DEFAULT_MAX_DISPLAY_FILES)
    }
}

impl DiffSummarizer {
    pub fn new(max_diff_chars: usize, max_display_files: usize) -> Self {
        Self {
            max_diff_chars,
            max_display_files,
        }
    }

    /// Summarize one commit into a new value; the input is left untouched
    pub fn summarize(&self, commit: &Commit, matcher: &TopicMatcher) -> Commit {
        let mut summary = commit.clone();
        summary.diff = truncate_at_line_boundary(&commit.diff, self.max_diff_chars).to_string();
        summary.key_files = self.key_files(commit, matcher);
        summary
    }

    /// Summarize a selection in parallel, preserving order
    pub fn summarize_all(&self, commits: &[Commit], matcher: &TopicMatcher) -> Vec<Commit> {
        commits
            .par_iter()
            .map(|commit| self.summarize(commit, matcher))
            .collect()
    }

    /// Topic path matches first, then order of appearance
    fn key_files(&self, commit: &Commit, matcher: &TopicMatcher) -> Vec<String> {
        let (relevant, rest): (Vec<&String>, Vec<&String>) = commit
            .files_changed
            .iter()
            .partition(|path| matcher.path_match(path));

        relevant
            .into_iter()
            .chain(rest)
            .take(self.max_display_files)
            .cloned()
            .collect()
    }
}

/// Cut `text` to at most `budget` characters without splitting a line
///
/// Text within budget is returned whole. Otherwise the result ends with the
/// last newline that fits; when even the first line is too long the result is
/// empty.
pub fn truncate_at_line_boundary(text: &str, budget: usize) -> &str {
    let mut end = 0;
    for (count, (idx, ch)) in text.char_indices().enumerate() {
        if count >= budget {
            return &text[..end];
        }
        if ch == '\n' {
            end = idx + ch.len_utf8();
        }
    }
    text
}
