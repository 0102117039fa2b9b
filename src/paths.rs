/// Centralized platform-specific path computation
///
/// Directory roots come from the `dirs` crate (XDG on Linux, Known Folders on
/// Windows, `~/Library` on macOS); everything this crate writes lives under a
/// `codebase-time-machine` subdirectory of those roots.
use std::path::PathBuf;

const PROJECT_DIR_NAME: &str = "codebase-time-machine";

/// Platform-agnostic path utilities
pub struct PlatformPaths;

impl PlatformPaths {
    /// Cache root for the current platform, or `.` when it cannot be determined
    pub fn cache_dir() -> PathBuf {
        dirs::cache_dir().unwrap_or_else(|| PathBuf::from("."))
    }

    /// Config root for the current platform, or `.` when it cannot be determined
    pub fn config_dir() -> PathBuf {
        dirs::config_dir().unwrap_or_else(|| PathBuf::from("."))
    }

    /// Returns: {cache_dir}/codebase-time-machine
    pub fn project_cache_dir() -> PathBuf {
        Self::cache_dir().join(PROJECT_DIR_NAME)
    }

    /// Returns: {config_dir}/codebase-time-machine
    pub fn project_config_dir() -> PathBuf {
        Self::config_dir().join(PROJECT_DIR_NAME)
    }

    /// Directory holding temporary repository snapshots
    ///
    /// Returns: {cache_dir}/codebase-time-machine/snapshots
    pub fn default_snapshot_dir() -> PathBuf {
        Self::project_cache_dir().join("snapshots")
    }

    /// Get default config file path
    ///
    /// Returns: {config_dir}/codebase-time-machine/config.toml
    pub fn default_config_path() -> PathBuf {
        Self::project_config_dir().join("config.toml")
    }
}
