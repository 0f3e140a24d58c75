//! Virtual path validation and canonicalization.
//!
//! Every path that reaches a backend has been through [`normalize`]: it is
//! absolute, uses forward slashes only, and contains no traversal segments.

use std::{fmt, ops::Deref};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Path validation error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("Path traversal not allowed: {0}")]
    Traversal(String),
    #[error(
        "Windows absolute paths are not supported: {0}. Use virtual paths starting with / (e.g., /workspace/file.txt)"
    )]
    ForeignAbsolute(String),
    #[error("Path must start with one of {allowed:?}: {path}")]
    NotAllowed { path: String, allowed: Vec<String> },
}

/// An absolute, traversal-free path shared by every backend.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VirtualPath(String);

impl VirtualPath {
    /// The root path `/`.
    #[must_use]
    pub fn root() -> Self {
        Self("/".to_string())
    }

    /// Borrow as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume into the inner string.
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }

    /// Whether this is the root path.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    /// The path with a trailing `/`, suitable for prefix comparisons.
    #[must_use]
    pub fn as_dir_prefix(&self) -> String {
        if self.is_root() {
            self.0.clone()
        } else {
            format!("{}/", self.0)
        }
    }
}

impl Deref for VirtualPath {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<str> for VirtualPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VirtualPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq<&str> for VirtualPath {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Validate and normalize a path.
///
/// Rejects traversal (`..`, leading `~`) and drive-letter prefixes, converts
/// backslashes, collapses empty and `.` segments and forces a leading `/`.
///
/// # Errors
/// Returns [`PathError`] if the path is unsafe or in a foreign absolute form.
pub fn normalize(path: &str) -> Result<VirtualPath, PathError> {
    if path.contains("..") || path.starts_with('~') {
        return Err(PathError::Traversal(path.to_string()));
    }

    if has_drive_prefix(path) {
        return Err(PathError::ForeignAbsolute(path.to_string()));
    }

    let segments: Vec<&str> = path
        .split(['/', '\\'])
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect();

    Ok(VirtualPath(format!("/{}", segments.join("/"))))
}

/// Validate a path and require it to start with one of `allowed`.
///
/// # Errors
/// Returns [`PathError`] if validation fails or no prefix matches.
pub fn normalize_with_prefixes<S: AsRef<str>>(
    path: &str,
    allowed: &[S],
) -> Result<VirtualPath, PathError> {
    let normalized = normalize(path)?;
    if allowed
        .iter()
        .any(|prefix| normalized.starts_with(prefix.as_ref()))
    {
        Ok(normalized)
    } else {
        Err(PathError::NotAllowed {
            path: path.to_string(),
            allowed: allowed.iter().map(|p| p.as_ref().to_string()).collect(),
        })
    }
}

fn has_drive_prefix(path: &str) -> bool {
    let mut chars = path.chars();
    matches!(
        (chars.next(), chars.next()),
        (Some(letter), Some(':')) if letter.is_ascii_alphabetic()
    )
}
