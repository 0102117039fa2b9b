//! Glob pattern utilities for topic path filtering
//!
//! Unlike include/exclude filters, an empty pattern set here matches nothing:
//! a topic without path patterns can only match through its keywords.

use crate::error::ValidationError;
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};

/// Compile topic path patterns into a single case-insensitive matcher
///
/// # Examples
///
/// ```
/// use codebase_time_machine::glob_utils::compile_patterns;
///
/// let set = compile_patterns(&["**/auth/**".to_string()]).unwrap();
/// assert!(set.is_match("src/auth/session.rs"));
/// assert!(set.is_match("Auth/mw.ts"));
/// assert!(!set.is_match("routes/users.ts"));
/// ```
pub fn compile_patterns(patterns: &[String]) -> Result<GlobSet, ValidationError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = GlobBuilder::new(pattern)
            .case_insensitive(true)
            .literal_separator(true)
            .build()
            .map_err(|e| ValidationError::InvalidPattern(format!("'{}': {}", pattern, e)))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| ValidationError::InvalidPattern(e.to_string()))
}

/// Path globs matching any file or directory whose name contains `word`
///
/// `word` is escaped, so glob metacharacters in it are matched literally.
pub fn patterns_for_word(word: &str) -> Vec<String> {
    let escaped = globset::escape(&word.to_lowercase());
    vec![format!("**/*{escaped}*"), format!("**/*{escaped}*/**")]
}

/// Check if a path matches the compiled set, ignoring a leading slash
pub fn matches_path(set: &GlobSet, path: &str) -> bool {
    set.is_match(path) || set.is_match(path.trim_start_matches('/'))
}
