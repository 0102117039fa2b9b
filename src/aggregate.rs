//! Ownership, hotspot and complexity rollups over a selected commit set
//!
//! Every rollup is a pure function of the input slice and is recomputed in
//! full on each call. Grouping goes through ordered maps and every sort has a
//! total tie-break, so identical input yields byte-identical output.

use crate::git::Commit;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Default number of hotspots shown
pub const DEFAULT_HOTSPOT_LIMIT: usize = 10;

/// Activity of one author within the selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OwnershipRecord {
    pub author: String,
    pub email: String,
    pub commit_count: usize,
    pub lines_changed: u64,
    pub first_commit_date: DateTime<Utc>,
    pub last_commit_date: DateTime<Utc>,
    /// Some contributing commit had no line counts and used its file count
    pub lines_estimated: bool,
}

/// Churn of one file within the selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HotspotRecord {
    pub file: String,
    pub commits_touching: usize,
    pub lines_changed: u64,
    /// Some contribution was apportioned from commit-level totals
    pub lines_estimated: bool,
}

/// Change volume of one calendar month (UTC)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ComplexityBucket {
    /// `YYYY-MM`
    pub period: String,
    pub lines_added: u64,
    pub lines_deleted: u64,
    /// Distinct files touched during the month
    pub files_touched: usize,
    pub commits: usize,
}

/// All three rollups
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Aggregates {
    pub ownership: Vec<OwnershipRecord>,
    /// Full ranked list; see [`Aggregates::top_hotspots`] for the display view
    pub hotspots: Vec<HotspotRecord>,
    pub complexity: Vec<ComplexityBucket>,
}

impl Aggregates {
    pub fn top_hotspots(&self, limit: usize) -> &[HotspotRecord] {
        &self.hotspots[..limit.min(self.hotspots.len())]
    }

    pub fn is_empty(&self) -> bool {
        self.ownership.is_empty() && self.hotspots.is_empty() && self.complexity.is_empty()
    }
}

/// Compute every rollup for `commits`
pub fn aggregate(commits: &[Commit]) -> Aggregates {
    Aggregates {
        ownership: ownership(commits),
        hotspots: hotspots(commits),
        complexity: complexity(commits),
    }
}

/// Per-author rollup, authors identified by name and email
///
/// Ordered by commit count, then lines changed, both descending, then by
/// name and email.
pub fn ownership(commits: &[Commit]) -> Vec<OwnershipRecord> {
    let mut by_author: BTreeMap<(&str, &str), OwnershipRecord> = BTreeMap::new();

    for commit in commits {
        let key = (commit.author_name.as_str(), commit.author_email.as_str());
        let record = by_author.entry(key).or_insert_with(|| OwnershipRecord {
            author: commit.author_name.clone(),
            email: commit.author_email.clone(),
            commit_count: 0,
            lines_changed: 0,
            first_commit_date: commit.timestamp,
            last_commit_date: commit.timestamp,
            lines_estimated: false,
        });

        record.commit_count += 1;
        record.lines_changed += commit.lines_changed();
        record.lines_estimated |= commit.lines_estimated();
        record.first_commit_date = record.first_commit_date.min(commit.timestamp);
        record.last_commit_date = record.last_commit_date.max(commit.timestamp);
    }

    let mut records: Vec<OwnershipRecord> = by_author.into_values().collect();
    records.sort_by(|a, b| {
        b.commit_count
            .cmp(&a.commit_count)
            .then_with(|| b.lines_changed.cmp(&a.lines_changed))
            .then_with(|| a.author.cmp(&b.author))
            .then_with(|| a.email.cmp(&b.email))
    });
    records
}

/// Per-file rollup, ordered by lines changed and commits touching (both
/// descending), then path
pub fn hotspots(commits: &[Commit]) -> Vec<HotspotRecord> {
    let mut by_file: BTreeMap<&str, HotspotRecord> = BTreeMap::new();

    for commit in commits {
        let estimated = commit.file_stats.is_empty();
        let contributions = file_contributions(commit);

        // A path listed twice in one commit still counts as one touch
        let mut seen = BTreeSet::new();
        for (path, lines) in contributions {
            let record = by_file.entry(path).or_insert_with(|| HotspotRecord {
                file: path.to_string(),
                commits_touching: 0,
                lines_changed: 0,
                lines_estimated: false,
            });
            if seen.insert(path) {
                record.commits_touching += 1;
            }
            record.lines_changed += lines;
            record.lines_estimated |= estimated;
        }
    }

    let mut records: Vec<HotspotRecord> = by_file.into_values().collect();
    records.sort_by(|a, b| {
        b.lines_changed
            .cmp(&a.lines_changed)
            .then_with(|| b.commits_touching.cmp(&a.commits_touching))
            .then_with(|| a.file.cmp(&b.file))
    });
    records
}

/// Lines attributed to each file of a commit
///
/// Uses per-file stats when present. Otherwise the commit total from
/// [`Commit::lines_changed`] is split evenly, the remainder going one line each
/// to the earliest files, so the parts always sum to the commit total.
fn file_contributions(commit: &Commit) -> Vec<(&str, u64)> {
    if !commit.file_stats.is_empty() {
        return commit
            .file_stats
            .iter()
            .map(|f| (f.path.as_str(), f.insertions + f.deletions))
            .collect();
    }

    let files = &commit.files_changed;
    if files.is_empty() {
        return Vec::new();
    }

    let total = commit.lines_changed();
    let count = files.len() as u64;
    let share = total / count;
    let remainder = total % count;

    files
        .iter()
        .enumerate()
        .map(|(i, path)| {
            let extra = u64::from((i as u64) < remainder);
            (path.as_str(), share + extra)
        })
        .collect()
}

/// Monthly rollup in chronological order; months without commits are absent
pub fn complexity(commits: &[Commit]) -> Vec<ComplexityBucket> {
    #[derive(Default)]
    struct Month<'a> {
        added: u64,
        deleted: u64,
        files: BTreeSet<&'a str>,
        commits: usize,
    }

    let mut months: BTreeMap<String, Month<'_>> = BTreeMap::new();

    for commit in commits {
        let month = months
            .entry(commit.timestamp.format("%Y-%m").to_string())
            .or_default();
        if let Some(stats) = commit.stats {
            month.added += stats.insertions;
            month.deleted += stats.deletions;
        }
        month
            .files
            .extend(commit.files_changed.iter().map(String::as_str));
        month.commits += 1;
    }

    months
        .into_iter()
        .map(|(period, month)| ComplexityBucket {
            period,
            lines_added: month.added,
            lines_deleted: month.deleted,
            files_touched: month.files.len(),
            commits: month.commits,
        })
        .collect()
}
