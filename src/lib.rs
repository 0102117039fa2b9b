//! # Codebase Time Machine - Topic-Scoped Git History Analysis
//!
//! Explains how a feature area of a repository evolved: which commits touched
//! it, who owns it, where change concentrates, and how churn trends over time.
//!
//! ## Overview
//!
//! A request names a remote repository and a topic (e.g. `auth`). The pipeline
//! takes a shallow, topic-filtered snapshot of the repository, walks its
//! history within a lookback window, keeps the commits that match the topic by
//! keyword or path glob, summarizes each one, and aggregates ownership,
//! hotspot and complexity rollups. A language model turns the selection into
//! a narrative and optionally answers a follow-up question; when it is slow or
//! unavailable, a summary derived from the data alone is returned instead.
//!
//! ## Key Features
//!
//! - **Snapshot Cache**: TTL-bound, one clone per (repository, topic) at a time
//! - **Shallow + Sparse Fetch**: depth-limited clones restricted to topic paths
//! - **Windowed Selection**: configurable lookback with a single fallback widening
//! - **Deterministic Aggregates**: ownership, hotspots and monthly complexity
//! - **Graceful Narration**: explicit fallback and insufficient-evidence markers
//!
//! ## Architecture
//!
//! ```text
//! AnalyzeRequest
//!       │
//!       ▼
//! SnapshotProvider ──► SnapshotCache (TTL, clone lock)
//!       │                   │
//!       │              Fetcher (git clone --depth, sparse-checkout)
//!       ▼
//! GitWalker ──► CommitSelector ──► DiffSummarizer ──► aggregate()
//!                                                         │
//!                                                         ▼
//!                                  NarrativeClient (or fallback)
//!                                                         │
//!                                                         ▼
//!                                                  AnalysisResult
//! ```
//!
//! ## Modules
//!
//! - [`client`]: The analysis pipeline and cache-control surface
//! - [`snapshot`]: Snapshot acquisition, cache and fetchers
//! - [`git`]: Commit model and history walking
//! - [`topic`]: Topic definitions and matching
//! - [`selector`]: Windowed commit selection
//! - [`summarizer`]: Bounded per-commit summaries
//! - [`aggregate`]: Ownership, hotspot and complexity rollups
//! - [`narrative`]: Narrative service client, prompts and fallbacks
//! - [`config`]: Configuration management with environment variable support
//! - [`types`]: Request/response types with JSON schema
//! - [`error`]: Error types
//!
//! ## Usage Example
//!
//! ```no_run
//! use codebase_time_machine::{AnalysisClient, AnalyzeRequest};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = AnalysisClient::new()?;
//!     let result = client
//!         .analyze(AnalyzeRequest::new("https://github.com/owner/repo", "auth"))
//!         .await?;
//!
//!     for hotspot in &result.hotspots {
//!         println!("{} ({} lines)", hotspot.file, hotspot.lines_changed);
//!     }
//!     Ok(())
//! }
//! ```

/// Ownership, hotspot and complexity rollups
pub mod aggregate;

/// Pipeline orchestration and cache control
pub mod client;

/// Injectable time source
pub mod clock;

/// Configuration management with environment variable overrides
pub mod config;

/// Error types and utilities
pub mod error;

/// Git commit model and history walking
pub mod git;

/// Glob pattern helpers for topic paths
pub mod glob_utils;

/// Narrative service client, prompts and fallbacks
pub mod narrative;

/// Platform directories
pub mod paths;

/// Windowed topic commit selection
pub mod selector;

/// Repository snapshots and their cache
pub mod snapshot;

/// Per-commit diff summaries
pub mod summarizer;

/// Topic definitions and matching
pub mod topic;

/// Request/response types with JSON schema definitions
pub mod types;

pub use client::AnalysisClient;
pub use config::Config;
pub use error::AnalysisError;
pub use types::{AnalysisResult, AnalyzeRequest};
