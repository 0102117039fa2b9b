//! Local, depth-bounded working copies of remote repositories
//!
//! [`SnapshotProvider::acquire`] returns a [`SnapshotHandle`] for a
//! (repository, topic) pair, cloning at most once per key while the cached
//! copy is live. Snapshot directories are reference counted: the directory is
//! removed when the cache entry and every handle to it are gone.

/// TTL cache and per-key clone lock
pub mod cache;
/// Remote fetch implementations
pub mod fetch;

pub use cache::{CloneGuard, CloneOutcome, Lookup, SnapshotCache};
pub use fetch::{FetchPlan, Fetcher, GitCliFetcher};

use crate::clock::Clock;
use crate::config::SnapshotConfig;
use crate::error::{AnalysisError, SnapshotError, ValidationError};
use crate::topic::TopicDefinition;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tempfile::TempDir;
use tokio::sync::broadcast::error::RecvError;

/// Deterministic fingerprint of (normalized repository URL, topic)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// First 16 hex characters of SHA-256 over `url \0 lowercase(topic)`
    pub fn new(normalized_url: &str, topic: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(normalized_url.as_bytes());
        hasher.update([0u8]);
        hasher.update(topic.trim().to_lowercase().as_bytes());
        let digest = format!("{:x}", hasher.finalize());
        Self(digest[..16].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Normalize a repository URL so trivially different spellings share a key
///
/// Trims whitespace, drops trailing slashes and a `.git` suffix, and lowercases
/// the scheme and host. Paths keep their case.
///
/// # Examples
///
/// ```
/// use codebase_time_machine::snapshot::normalize_repo_url;
///
/// assert_eq!(
///     normalize_repo_url(" HTTPS://GitHub.com/Owner/Repo.git/ ").unwrap(),
///     "https://github.com/Owner/Repo"
/// );
/// ```
pub fn normalize_repo_url(url: &str) -> Result<String, ValidationError> {
    let mut url = url.trim();
    if url.is_empty() {
        return Err(ValidationError::Empty("repository URL".to_string()));
    }

    url = url.trim_end_matches('/');
    url = url.strip_suffix(".git").unwrap_or(url);
    url = url.trim_end_matches('/');
    if url.is_empty() {
        return Err(ValidationError::InvalidUrl("URL has no path".to_string()));
    }

    if let Some((scheme, rest)) = url.split_once("://") {
        let (authority, path) = match rest.find('/') {
            Some(idx) => rest.split_at(idx),
            None => (rest, ""),
        };
        return Ok(format!(
            "{}://{}{}",
            scheme.to_lowercase(),
            authority.to_lowercase(),
            path
        ));
    }

    // scp-like syntax: user@host:path
    if let Some((authority, path)) = url.split_once(':')
        && authority.contains('@')
        && !authority.contains('/')
    {
        return Ok(format!("{}:{}", authority.to_lowercase(), path));
    }

    Ok(url.to_string())
}

/// Owned snapshot directory, deleted on drop
#[derive(Debug)]
struct SnapshotDir {
    dir: TempDir,
}

impl Drop for SnapshotDir {
    fn drop(&mut self) {
        tracing::debug!("Removing snapshot directory {}", self.dir.path().display());
    }
}

/// Shared reference to a cached snapshot
///
/// Cloning is cheap. The directory stays on disk for as long as any clone of
/// the handle exists, even after the cache entry is evicted.
#[derive(Debug, Clone)]
pub struct SnapshotHandle {
    key: CacheKey,
    dir: Arc<SnapshotDir>,
    url: String,
    topic: String,
    created_at: DateTime<Utc>,
}

impl SnapshotHandle {
    pub fn new(
        key: CacheKey,
        dir: TempDir,
        url: String,
        topic: String,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            key,
            dir: Arc::new(SnapshotDir { dir }),
            url,
            topic,
            created_at,
        }
    }

    /// Working copy root
    pub fn path(&self) -> &Path {
        self.dir.dir.path()
    }

    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// Normalized repository URL
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Topic the snapshot was sparse-filtered for
    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// Obtains snapshots through the cache, cloning on a miss
pub struct SnapshotProvider {
    cache: Arc<SnapshotCache>,
    fetcher: Arc<dyn Fetcher>,
    config: SnapshotConfig,
}

impl SnapshotProvider {
    pub fn new(config: SnapshotConfig, fetcher: Arc<dyn Fetcher>, clock: Arc<dyn Clock>) -> Self {
        let cache = Arc::new(SnapshotCache::new(config.ttl(), clock));
        Self {
            cache,
            fetcher,
            config,
        }
    }

    pub fn cache(&self) -> &Arc<SnapshotCache> {
        &self.cache
    }

    /// Get a snapshot of `repo_url` for `topic`
    ///
    /// A live cached snapshot is returned without network access. Otherwise
    /// exactly one concurrent caller per key clones while the others wait for
    /// its outcome. Failures are not cached and are not retried here.
    pub async fn acquire(
        &self,
        repo_url: &str,
        topic: &TopicDefinition,
    ) -> Result<SnapshotHandle, AnalysisError> {
        let url = normalize_repo_url(repo_url)?;
        let key = CacheKey::new(&url, &topic.name);
        self.cache.purge_expired();

        loop {
            match self.cache.lookup(&key) {
                Lookup::Hit(handle) => {
                    tracing::info!("Snapshot cache hit for {} ({})", url, key);
                    return Ok(handle);
                }
                Lookup::Acquired(guard) => {
                    tracing::info!("Snapshot cache miss for {} ({})", url, key);
                    let outcome = self.populate(&key, &url, topic).await;
                    return guard.complete(outcome).map_err(AnalysisError::from);
                }
                Lookup::WaitForResult(mut rx) => {
                    tracing::debug!("Waiting for in-flight clone of {} ({})", url, key);
                    match rx.recv().await {
                        Ok(Ok(handle)) => return Ok(handle),
                        Ok(Err(SnapshotError::Interrupted)) | Err(RecvError::Closed) => {
                            tracing::debug!("Clone of {} was interrupted, retrying", key);
                        }
                        Ok(Err(e)) => return Err(e.into()),
                        Err(RecvError::Lagged(_)) => {}
                    }
                }
            }
        }
    }

    /// Clone into a fresh directory under the time and size budgets
    async fn populate(
        &self,
        key: &CacheKey,
        url: &str,
        topic: &TopicDefinition,
    ) -> Result<SnapshotHandle, SnapshotError> {
        tokio::fs::create_dir_all(&self.config.root_dir).await?;
        let dir = tempfile::Builder::new()
            .prefix("snapshot-")
            .tempdir_in(&self.config.root_dir)?;

        let plan = FetchPlan::new(&self.config, topic);
        let started = Instant::now();
        tracing::info!(
            "Cloning {} (depth {}, {} sparse patterns) into {}",
            url,
            plan.depth,
            plan.sparse_patterns.len(),
            dir.path().display()
        );

        let timeout = self.config.clone_timeout();
        match tokio::time::timeout(timeout, self.fetcher.fetch(url, &plan, dir.path())).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!("Clone of {} failed: {}", url, e);
                return Err(e);
            }
            Err(_) => {
                tracing::warn!("Clone of {} timed out after {:?}", url, timeout);
                return Err(SnapshotError::Timeout {
                    url: url.to_string(),
                    secs: timeout.as_secs(),
                });
            }
        }

        let root: PathBuf = dir.path().to_path_buf();
        let size = tokio::task::spawn_blocking(move || fetch::directory_stats(&root))
            .await
            .map_err(|e| SnapshotError::Io(format!("size check failed: {}", e)))?;

        if size.bytes > self.config.max_snapshot_bytes {
            return Err(SnapshotError::SizeExceeded {
                size: size.bytes,
                max: self.config.max_snapshot_bytes,
            });
        }

        tracing::info!(
            "Cloned {} in {:?} ({} files, {} bytes)",
            url,
            started.elapsed(),
            size.files,
            size.bytes
        );

        Ok(SnapshotHandle::new(
            key.clone(),
            dir,
            url.to_string(),
            topic.name.clone(),
            self.cache.now(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_suffixes_and_lowercases_host() {
        assert_eq!(
            normalize_repo_url("https://GITHUB.com/Owner/Repo.git").unwrap(),
            "https://github.com/Owner/Repo"
        );
        assert_eq!(
            normalize_repo_url("https://github.com/owner/repo/").unwrap(),
            "https://github.com/owner/repo"
        );
        assert_eq!(
            normalize_repo_url("git@GitHub.com:Owner/Repo.git").unwrap(),
            "git@github.com:Owner/Repo"
        );
        assert_eq!(
            normalize_repo_url("/srv/git/project.git").unwrap(),
            "/srv/git/project"
        );
    }

    #[test]
    fn test_normalize_rejects_empty() {
        assert!(matches!(
            normalize_repo_url("  "),
            Err(ValidationError::Empty(_))
        ));
        assert!(normalize_repo_url("/").is_err());
    }

    #[test]
    fn test_cache_key_is_stable_and_topic_case_insensitive() {
        let a = CacheKey::new("https://github.com/a/b", "auth");
        let b = CacheKey::new("https://github.com/a/b", " AUTH ");
        let c = CacheKey::new("https://github.com/a/b", "api");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.as_str().len(), 16);
        assert!(a.as_str().chars().all(|ch| ch.is_ascii_hexdigit()));
    }

    #[test]
    fn test_spellings_share_a_key() {
        let one = normalize_repo_url("https://github.com/a/b.git").unwrap();
        let two = normalize_repo_url("HTTPS://github.com/a/b/").unwrap();
        assert_eq!(CacheKey::new(&one, "auth"), CacheKey::new(&two, "auth"));
    }
}
