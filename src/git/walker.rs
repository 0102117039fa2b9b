use super::commit::{Commit, CommitStats, FileStat};
use crate::error::GitError;
use chrono::{DateTime, Utc};
use git2::{DiffFormat, DiffOptions, ErrorCode, Oid, Repository, Revwalk, Sort};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Default number of diff characters kept per commit for keyword scanning
pub const DEFAULT_DIFF_SCAN_CHARS: usize = 8_000;

/// Boxed newest-first commit stream
pub type CommitStream<'a> = Box<dyn Iterator<Item = Result<Commit, GitError>> + 'a>;

/// A source of commit history walked newest-first
pub trait HistorySource {
    /// Walk commits starting from the most recent one, ending before the first
    /// commit older than `since`
    fn walk_since(&self, since: DateTime<Utc>) -> Result<CommitStream<'_>, GitError>;
}

/// Git repository walker for extracting commit information
pub struct GitWalker {
    repo: Repository,
    repo_path: PathBuf,
    diff_scan_chars: usize,
    /// Commits whose parents were cut off by a shallow clone
    shallow_boundary: HashSet<Oid>,
}

impl GitWalker {
    /// Open the repository rooted at `path` (no upward discovery)
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, GitError> {
        let path = path.as_ref();
        let repo = Repository::open(path).map_err(|e| GitError::OpenFailed {
            path: path.display().to_string(),
            reason: e.message().to_string(),
        })?;

        let shallow_boundary = read_shallow_boundary(&repo);
        tracing::debug!(
            "Opened git repository at: {} (shallow boundary: {} commits)",
            path.display(),
            shallow_boundary.len()
        );

        Ok(Self {
            repo,
            repo_path: path.to_path_buf(),
            diff_scan_chars: DEFAULT_DIFF_SCAN_CHARS,
            shallow_boundary,
        })
    }

    /// Override how much diff text is kept per commit
    pub fn with_diff_scan_chars(mut self, chars: usize) -> Self {
        self.diff_scan_chars = chars;
        self
    }

    /// Get the repository root path
    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    /// Check if repository has any commits
    pub fn has_commits(&self) -> bool {
        self.repo.head().is_ok()
    }

    /// Extract detailed information from a commit
    fn extract_commit_info(&self, commit: &git2::Commit) -> Commit {
        let hash = commit.id().to_string();
        let message = commit.message().unwrap_or("").to_string();
        let author = commit.author();
        let author_name = author.name().unwrap_or("Unknown").to_string();
        let author_email = author.email().unwrap_or("").to_string();
        let timestamp = DateTime::from_timestamp(commit.time().seconds(), 0).unwrap_or_default();

        let (files_changed, file_stats, stats, diff) = match self.extract_diff(commit) {
            Ok(Some(extracted)) => extracted,
            Ok(None) => (Vec::new(), Vec::new(), None, String::new()),
            Err(e) => {
                tracing::debug!("Diff unavailable for commit {}: {}", hash, e);
                (Vec::new(), Vec::new(), None, String::new())
            }
        };

        Commit {
            hash,
            author_name,
            author_email,
            timestamp,
            message,
            files_changed,
            file_stats,
            stats,
            diff,
            key_files: Vec::new(),
        }
    }

    /// Extract changed files, per-file line counts and bounded diff text
    ///
    /// Returns `Ok(None)` at the boundary of a shallow clone, where the real
    /// parent is absent and libgit2 reports the commit as parentless.
    #[allow(clippy::type_complexity)]
    fn extract_diff(
        &self,
        commit: &git2::Commit,
    ) -> Result<Option<(Vec<String>, Vec<FileStat>, Option<CommitStats>, String)>, git2::Error>
    {
        if self.shallow_boundary.contains(&commit.id()) {
            tracing::debug!("Commit {} is at the shallow boundary", commit.id());
            return Ok(None);
        }

        let tree = commit.tree()?;

        let parent_tree = if commit.parent_count() > 0 {
            match commit.parent(0).and_then(|p| p.tree()) {
                Ok(tree) => Some(tree),
                Err(e) => {
                    tracing::debug!("Parent of {} not available: {}", commit.id(), e);
                    return Ok(None);
                }
            }
        } else {
            None
        };

        let mut diff_opts = DiffOptions::new();
        diff_opts
            .context_lines(3)
            .interhunk_lines(0)
            .ignore_whitespace(false);

        // First commit diffs against the empty tree
        let diff =
            self.repo
                .diff_tree_to_tree(parent_tree.as_ref(), Some(&tree), Some(&mut diff_opts))?;

        let mut files_changed = Vec::new();
        let mut file_stats = Vec::new();
        let mut index_of: HashMap<String, usize> = HashMap::new();

        for delta in diff.deltas() {
            if let Some(path) = delta.new_file().path().or(delta.old_file().path()) {
                let path = path.to_string_lossy().into_owned();
                index_of.insert(path.clone(), file_stats.len());
                file_stats.push(FileStat {
                    path: path.clone(),
                    insertions: 0,
                    deletions: 0,
                });
                files_changed.push(path);
            }
        }

        let budget = self.diff_scan_chars;
        let mut diff_content = String::new();
        let mut diff_chars = 0usize;

        diff.print(DiffFormat::Patch, |delta, _hunk, line| {
            let origin = line.origin();

            if matches!(origin, '+' | '-')
                && let Some(path) = delta.new_file().path().or(delta.old_file().path())
                && let Some(&idx) = index_of.get(&*path.to_string_lossy())
            {
                if origin == '+' {
                    file_stats[idx].insertions += 1;
                } else {
                    file_stats[idx].deletions += 1;
                }
            }

            // Keep counting after the text budget is spent, just stop collecting
            if diff_chars >= budget {
                return true;
            }

            if let Ok(content) = std::str::from_utf8(line.content()) {
                match origin {
                    '+' | '-' | ' ' => {
                        diff_content.push(origin);
                        diff_content.push_str(content);
                        diff_chars += 1 + content.chars().count();
                    }
                    'F' | 'H' => {
                        diff_content.push_str(content);
                        diff_chars += content.chars().count();
                    }
                    _ => {}
                }
            } else {
                tracing::debug!("Skipping diff line with invalid UTF-8");
            }

            true
        })?;

        let stats = CommitStats {
            insertions: file_stats.iter().map(|f| f.insertions).sum(),
            deletions: file_stats.iter().map(|f| f.deletions).sum(),
            files: file_stats.len(),
        };

        Ok(Some((files_changed, file_stats, Some(stats), diff_content)))
    }

    fn revwalk(&self) -> Result<Option<Revwalk<'_>>, GitError> {
        match self.repo.head() {
            Ok(_) => {}
            Err(e) if matches!(e.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound) => {
                tracing::info!("Repository {} has no commits", self.repo_path.display());
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        }

        let mut revwalk = self.repo.revwalk()?;
        revwalk.set_sorting(Sort::TIME | Sort::TOPOLOGICAL)?;
        revwalk.push_head()?;
        Ok(Some(revwalk))
    }
}

/// Boundary commits listed in `<gitdir>/shallow`, empty for complete clones
fn read_shallow_boundary(repo: &Repository) -> HashSet<Oid> {
    if !repo.is_shallow() {
        return HashSet::new();
    }

    let shallow_file = repo.path().join("shallow");
    match std::fs::read_to_string(&shallow_file) {
        Ok(content) => content
            .lines()
            .filter_map(|line| Oid::from_str(line.trim()).ok())
            .collect(),
        Err(e) => {
            tracing::warn!("Failed to read {}: {}", shallow_file.display(), e);
            HashSet::new()
        }
    }
}

impl HistorySource for GitWalker {
    fn walk_since(&self, since: DateTime<Utc>) -> Result<CommitStream<'_>, GitError> {
        Ok(Box::new(CommitIter {
            walker: self,
            revwalk: self.revwalk()?,
            since: since.timestamp(),
        }))
    }
}

/// Lazy newest-first iterator over a repository's history
struct CommitIter<'repo> {
    walker: &'repo GitWalker,
    revwalk: Option<Revwalk<'repo>>,
    since: i64,
}

impl Iterator for CommitIter<'_> {
    type Item = Result<Commit, GitError>;

    fn next(&mut self) -> Option<Self::Item> {
        let revwalk = self.revwalk.as_mut()?;

        let oid = match revwalk.next()? {
            Ok(oid) => oid,
            Err(e) => {
                self.revwalk = None;
                return Some(Err(GitError::IterFailed(e.message().to_string())));
            }
        };

        let commit = match self.walker.repo.find_commit(oid) {
            Ok(commit) => commit,
            Err(e) => {
                self.revwalk = None;
                return Some(Err(e.into()));
            }
        };

        // Commits are time-sorted, nothing older can follow
        if commit.time().seconds() < self.since {
            self.revwalk = None;
            return None;
        }

        Some(Ok(self.walker.extract_commit_info(&commit)))
    }
}

/// In-memory history, mainly for tests and replaying recorded commits
#[derive(Debug, Default)]
pub struct MemoryHistory {
    commits: Vec<Commit>,
    walks: AtomicUsize,
}

impl MemoryHistory {
    /// Build from commits in any order; they are walked newest-first
    pub fn new(mut commits: Vec<Commit>) -> Self {
        commits.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Self {
            commits,
            walks: AtomicUsize::new(0),
        }
    }

    /// Number of walks started so far
    pub fn walk_count(&self) -> usize {
        self.walks.load(Ordering::SeqCst)
    }
}

impl HistorySource for MemoryHistory {
    fn walk_since(&self, since: DateTime<Utc>) -> Result<CommitStream<'_>, GitError> {
        self.walks.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(
            self.commits
                .iter()
                .take_while(move |c| c.timestamp >= since)
                .cloned()
                .map(Ok),
        ))
    }
}
