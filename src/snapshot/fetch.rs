use crate::config::SnapshotConfig;
use crate::error::SnapshotError;
use crate::topic::TopicDefinition;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use walkdir::WalkDir;

/// stderr fragments that mean the repository is missing or private
const NOT_FOUND_MARKERS: &[&str] = &[
    "repository not found",
    "not found",
    "does not exist",
    "does not appear to be a git repository",
    "could not read username",
];

/// What to fetch for one snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchPlan {
    /// History depth at the protocol level
    pub depth: u32,
    /// Sparse checkout patterns; empty means a full checkout
    pub sparse_patterns: Vec<String>,
    /// A sparse tree with fewer files is widened to a full checkout
    pub min_sparse_files: usize,
}

impl FetchPlan {
    pub fn new(config: &SnapshotConfig, topic: &TopicDefinition) -> Self {
        let sparse_patterns = if config.sparse_checkout {
            topic.paths.clone()
        } else {
            Vec::new()
        };
        Self {
            depth: config.clone_depth,
            sparse_patterns,
            min_sparse_files: config.min_sparse_files,
        }
    }
}

/// Populates an empty directory with a working copy of a remote repository
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch `url` into `dest`, which exists and is empty
    async fn fetch(&self, url: &str, plan: &FetchPlan, dest: &Path) -> Result<(), SnapshotError>;
}

/// Fetcher driving the `git` command line client
#[derive(Debug, Clone)]
pub struct GitCliFetcher {
    git: PathBuf,
}

impl Default for GitCliFetcher {
    fn default() -> Self {
        Self {
            git: PathBuf::from("git"),
        }
    }
}

impl GitCliFetcher {
    /// Use a specific `git` executable
    pub fn with_executable(git: impl Into<PathBuf>) -> Self {
        Self { git: git.into() }
    }

    fn command(&self, cwd: Option<&Path>) -> Command {
        let mut cmd = Command::new(&self.git);
        cmd.env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }
        cmd
    }

    async fn run(&self, url: &str, mut cmd: Command) -> Result<(), SnapshotError> {
        let output = cmd.output().await.map_err(|e| SnapshotError::CloneFailed {
            url: url.to_string(),
            reason: format!("failed to run git: {}", e),
        })?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        tracing::debug!("git failed for {}: {}", url, stderr.trim());
        Err(classify_clone_failure(&stderr, url))
    }
}

#[async_trait]
impl Fetcher for GitCliFetcher {
    async fn fetch(&self, url: &str, plan: &FetchPlan, dest: &Path) -> Result<(), SnapshotError> {
        let sparse = !plan.sparse_patterns.is_empty();

        let mut clone = self.command(None);
        clone
            .arg("clone")
            .arg("--depth")
            .arg(plan.depth.to_string())
            .arg("--no-tags")
            .arg("--single-branch");
        if sparse {
            clone.arg("--no-checkout");
        }
        clone.arg("--").arg(url).arg(dest);
        self.run(url, clone).await?;

        if !sparse {
            return Ok(());
        }

        let mut set = self.command(Some(dest));
        set.args(["sparse-checkout", "set", "--no-cone"])
            .args(&plan.sparse_patterns);
        self.run(url, set).await?;

        let mut checkout = self.command(Some(dest));
        checkout.args(["read-tree", "-mu", "HEAD"]);
        self.run(url, checkout).await?;

        let dest_owned = dest.to_path_buf();
        let files = tokio::task::spawn_blocking(move || count_worktree_files(&dest_owned))
            .await
            .map_err(|e| SnapshotError::Io(e.to_string()))?;

        if files < plan.min_sparse_files {
            tracing::warn!(
                "Sparse checkout of {} produced {} files, falling back to full checkout",
                url,
                files
            );
            let mut disable = self.command(Some(dest));
            disable.args(["sparse-checkout", "disable"]);
            self.run(url, disable).await?;
        }

        Ok(())
    }
}

/// Map git's stderr to a not-found or a generic clone failure
pub fn classify_clone_failure(stderr: &str, url: &str) -> SnapshotError {
    let lower = stderr.to_lowercase();
    if NOT_FOUND_MARKERS.iter().any(|m| lower.contains(m)) {
        return SnapshotError::NotFound {
            url: url.to_string(),
        };
    }

    let reason = stderr
        .lines()
        .map(str::trim)
        .rfind(|l| !l.is_empty())
        .unwrap_or("git exited with an error")
        .to_string();
    SnapshotError::CloneFailed {
        url: url.to_string(),
        reason,
    }
}

/// Size of a directory tree
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirStats {
    pub bytes: u64,
    pub files: usize,
}

/// Total bytes and file count under `root`, `.git` included
pub fn directory_stats(root: &Path) -> DirStats {
    WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .fold(DirStats::default(), |mut stats, entry| {
            stats.files += 1;
            stats.bytes += entry.metadata().map(|m| m.len()).unwrap_or(0);
            stats
        })
}

/// Checked-out files, `.git` excluded
fn count_worktree_files(root: &Path) -> usize {
    WalkDir::new(root)
        .into_iter()
        .filter_entry(|e| e.file_name() != ".git")
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .count()
}
