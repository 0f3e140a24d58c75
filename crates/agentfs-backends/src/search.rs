//! Glob and grep helpers shared by the backends.

use std::path::Path;

use agentfs_core::{BackendError, GrepMatch, VirtualPath};
use globset::{GlobBuilder, GlobMatcher};
use regex::Regex;

/// Compile a glob where `*` and `?` stay within one path segment and `**`
/// crosses segments.
///
/// # Errors
/// Returns [`BackendError::InvalidPattern`] when the glob does not parse.
pub fn compile_glob(pattern: &str) -> Result<GlobMatcher, BackendError> {
    GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .map(|glob| glob.compile_matcher())
        .map_err(|e| BackendError::InvalidPattern(e.to_string()))
}

/// Compile a grep pattern. Every backend searches with this dialect.
///
/// # Errors
/// Returns [`BackendError::InvalidPattern`] when the pattern does not parse.
pub fn compile_regex(pattern: &str) -> Result<Regex, BackendError> {
    Regex::new(pattern).map_err(|e| BackendError::InvalidPattern(e.to_string()))
}

/// Path of `path` below `base`, without a leading `/`.
///
/// Returns `None` when `path` is not under `base`.
#[must_use]
pub fn relative_to<'a>(base: &VirtualPath, path: &'a str) -> Option<&'a str> {
    if base.is_root() {
        return path.strip_prefix('/');
    }
    path.strip_prefix(base.as_str())?.strip_prefix('/')
}

/// Whether the file name of `path` matches the grep file filter.
#[must_use]
pub fn file_filter_matches(filter: Option<&GlobMatcher>, path: &str) -> bool {
    filter.is_none_or(|matcher| {
        let name = Path::new(path)
            .file_name()
            .map_or_else(|| Path::new(path), Path::new);
        matcher.is_match(name) || matcher.is_match(path.trim_start_matches('/'))
    })
}

/// Matching lines of one file.
#[must_use]
pub fn grep_content(regex: &Regex, path: &str, content: &str) -> Vec<GrepMatch> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| regex.is_match(line))
        .map(|(i, line)| GrepMatch {
            path: path.to_string(),
            line: i + 1,
            text: line.to_string(),
        })
        .collect()
}
