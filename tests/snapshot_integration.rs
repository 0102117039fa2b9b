/// Snapshot provider tests: clone lock, budgets and expiry
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use codebase_time_machine::clock::ManualClock;
use codebase_time_machine::config::SnapshotConfig;
use codebase_time_machine::error::{AnalysisError, SnapshotError};
use codebase_time_machine::snapshot::{FetchPlan, Fetcher, SnapshotProvider};
use codebase_time_machine::topic::TopicRegistry;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;

/// Writes a fixed payload after a delay, counting fetches
struct CountingFetcher {
    fetches: AtomicUsize,
    delay: Duration,
    payload: usize,
    fail: bool,
}

impl CountingFetcher {
    fn new(delay: Duration) -> Self {
        Self {
            fetches: AtomicUsize::new(0),
            delay,
            payload: 16,
            fail: false,
        }
    }

    fn count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for CountingFetcher {
    async fn fetch(&self, url: &str, _plan: &FetchPlan, dest: &Path) -> Result<(), SnapshotError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        if self.fail {
            return Err(SnapshotError::NotFound {
                url: url.to_string(),
            });
        }
        tokio::fs::write(dest.join("payload.bin"), vec![7u8; self.payload]).await?;
        Ok(())
    }
}

fn provider(
    fetcher: Arc<CountingFetcher>,
    root: &TempDir,
    adjust: impl FnOnce(&mut SnapshotConfig),
) -> (SnapshotProvider, Arc<ManualClock>) {
    let mut config = SnapshotConfig {
        root_dir: root.path().to_path_buf(),
        ..Default::default()
    };
    adjust(&mut config);
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()));
    (SnapshotProvider::new(config, fetcher, clock.clone()), clock)
}

#[tokio::test]
async fn test_concurrent_acquires_clone_once() {
    let root = TempDir::new().unwrap();
    let fetcher = Arc::new(CountingFetcher::new(Duration::from_millis(100)));
    let (provider, _clock) = provider(fetcher.clone(), &root, |_| {});
    let topic = TopicRegistry::builtin().resolve("auth");

    let (a, b, c) = tokio::join!(
        provider.acquire("https://github.com/owner/repo", &topic),
        provider.acquire("https://github.com/owner/repo.git", &topic),
        provider.acquire("https://GITHUB.com/owner/repo/", &topic),
    );

    let (a, b, c) = (a.unwrap(), b.unwrap(), c.unwrap());
    assert_eq!(fetcher.count(), 1);
    assert_eq!(a.path(), b.path());
    assert_eq!(b.path(), c.path());
    assert!(a.path().join("payload.bin").exists());
    assert_eq!(provider.cache().status().entry_count, 1);
}

#[tokio::test]
async fn test_failure_reaches_every_waiter_and_is_not_cached() {
    let root = TempDir::new().unwrap();
    let mut fetcher = CountingFetcher::new(Duration::from_millis(50));
    fetcher.fail = true;
    let fetcher = Arc::new(fetcher);
    let (provider, _clock) = provider(fetcher.clone(), &root, |_| {});
    let topic = TopicRegistry::builtin().resolve("auth");

    let (a, b) = tokio::join!(
        provider.acquire("https://github.com/owner/missing", &topic),
        provider.acquire("https://github.com/owner/missing", &topic),
    );

    for result in [a, b] {
        assert!(matches!(
            result,
            Err(AnalysisError::Snapshot(SnapshotError::NotFound { .. }))
        ));
    }
    assert_eq!(fetcher.count(), 1);
    assert_eq!(provider.cache().status().entry_count, 0);

    // The next request tries again
    let _ = provider
        .acquire("https://github.com/owner/missing", &topic)
        .await;
    assert_eq!(fetcher.count(), 2);
}

#[tokio::test]
async fn test_clone_timeout() {
    let root = TempDir::new().unwrap();
    let fetcher = Arc::new(CountingFetcher::new(Duration::from_secs(30)));
    let (provider, _clock) = provider(fetcher, &root, |c| c.clone_timeout_secs = 1);
    let topic = TopicRegistry::builtin().resolve("auth");

    let err = provider
        .acquire("https://github.com/owner/slow", &topic)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        AnalysisError::Snapshot(SnapshotError::Timeout { secs: 1, .. })
    ));
    assert!(err.is_retryable());
    // The partial directory is removed
    assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_size_budget() {
    let root = TempDir::new().unwrap();
    let mut fetcher = CountingFetcher::new(Duration::ZERO);
    fetcher.payload = 4096;
    let (provider, _clock) = provider(Arc::new(fetcher), &root, |c| c.max_snapshot_bytes = 1024);
    let topic = TopicRegistry::builtin().resolve("auth");

    let err = provider
        .acquire("https://github.com/owner/huge", &topic)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        AnalysisError::Snapshot(SnapshotError::SizeExceeded {
            size: 4096,
            max: 1024
        })
    ));
}

#[tokio::test]
async fn test_ttl_expiry_keeps_directory_for_holders() {
    let root = TempDir::new().unwrap();
    let fetcher = Arc::new(CountingFetcher::new(Duration::ZERO));
    let (provider, clock) = provider(fetcher.clone(), &root, |c| c.ttl_secs = 60);
    let topic = TopicRegistry::builtin().resolve("api");

    let held = provider
        .acquire("https://github.com/owner/repo", &topic)
        .await
        .unwrap();
    clock.advance(chrono::Duration::seconds(61));

    let fresh = provider
        .acquire("https://github.com/owner/repo", &topic)
        .await
        .unwrap();

    assert_eq!(fetcher.count(), 2);
    assert_ne!(held.path(), fresh.path());
    // The evicted snapshot is still readable by its holder
    assert!(held.path().join("payload.bin").exists());

    let evicted = held.path().to_path_buf();
    drop(held);
    assert!(!evicted.exists());
}
