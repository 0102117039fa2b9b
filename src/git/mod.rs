//! Git history access for repository snapshots
//!
//! Reads commits, their changed paths, per-file line counts and a bounded diff
//! text out of a local working copy.

/// Commit data model
pub mod commit;
/// Git repository walking and commit extraction
pub mod walker;

pub use commit::{Commit, CommitStats, FileStat};
pub use walker::{GitWalker, HistorySource, MemoryHistory};

#[cfg(test)]
pub(crate) mod test_support;
