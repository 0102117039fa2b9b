//! Throwaway repositories and commit fixtures for unit tests

use super::commit::{Commit, CommitStats};
use chrono::{DateTime, TimeZone, Utc};
use git2::{Repository, Signature, Time};
use std::path::Path;
use tempfile::TempDir;

/// Midnight UTC on the given day
pub(crate) fn ts(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 0, 0, 0).unwrap()
}

/// Minimal commit with a hash and timestamp, no files
pub(crate) fn commit_at(hash: &str, timestamp: DateTime<Utc>) -> Commit {
    Commit {
        hash: hash.to_string(),
        author_name: "Ada".to_string(),
        author_email: "ada@example.com".to_string(),
        timestamp,
        message: String::new(),
        files_changed: vec![],
        file_stats: vec![],
        stats: Some(CommitStats {
            insertions: 0,
            deletions: 0,
            files: 0,
        }),
        diff: String::new(),
        key_files: vec![],
    }
}

/// A git repository in a temporary directory
pub(crate) struct TestRepo {
    dir: TempDir,
    repo: Repository,
}

impl TestRepo {
    pub(crate) fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        Self { dir, repo }
    }

    pub(crate) fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write `files` and commit them on HEAD with the given author and time
    pub(crate) fn commit(
        &self,
        files: &[(&str, &str)],
        message: &str,
        author: &str,
        when: DateTime<Utc>,
    ) -> git2::Oid {
        let mut index = self.repo.index().unwrap();
        for (path, content) in files {
            let full = self.dir.path().join(path);
            std::fs::create_dir_all(full.parent().unwrap()).unwrap();
            std::fs::write(&full, content).unwrap();
            index.add_path(Path::new(path)).unwrap();
        }
        index.write().unwrap();

        let tree_id = index.write_tree().unwrap();
        let tree = self.repo.find_tree(tree_id).unwrap();
        let email = format!("{}@example.com", author.to_lowercase());
        let sig = Signature::new(author, &email, &Time::new(when.timestamp(), 0)).unwrap();

        let parent = self.repo.head().ok().map(|h| h.peel_to_commit().unwrap());
        let parents: Vec<&git2::Commit> = parent.iter().collect();

        self.repo
            .commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
            .unwrap()
    }
}
