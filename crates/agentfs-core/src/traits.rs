//! Core traits for storage and execution.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{files::FileDelta, path::VirtualPath};

/// Backend error.
///
/// Display strings are the one-line texts handed back to the agent.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("File '{0}' not found")]
    NotFound(String),
    #[error("Path '{0}' is a directory")]
    IsDirectory(String),
    #[error("String not found in file: '{0}'")]
    StringNotFound(String),
    #[error(
        "String '{string}' appears {occurrences} times in file. Use replace_all=true to replace all instances, or provide a more specific string with surrounding context."
    )]
    AmbiguousMatch { string: String, occurrences: usize },
    #[error("Line offset {offset} exceeds file length ({lines} lines)")]
    OffsetOutOfRange { offset: usize, lines: usize },
    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Sandbox error: {0}")]
    Remote(String),
}

/// A directory entry or search hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    /// Virtual path. Directories end with `/`.
    pub path: String,
    /// Whether the entry is a directory.
    #[serde(default)]
    pub is_dir: bool,
    /// Size in bytes, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Last modification time, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<DateTime<Utc>>,
}

impl FileInfo {
    /// A file entry.
    #[must_use]
    pub fn file(path: impl Into<String>, size: u64) -> Self {
        Self {
            path: path.into(),
            is_dir: false,
            size: Some(size),
            modified_at: None,
        }
    }

    /// A directory entry. A trailing `/` is added if missing.
    #[must_use]
    pub fn dir(path: impl Into<String>) -> Self {
        let mut path = path.into();
        if !path.ends_with('/') {
            path.push('/');
        }
        Self {
            path,
            is_dir: true,
            size: None,
            modified_at: None,
        }
    }

    /// Attach a modification time.
    #[must_use]
    pub const fn with_modified_at(mut self, modified_at: DateTime<Utc>) -> Self {
        self.modified_at = Some(modified_at);
        self
    }
}

/// Outcome of a write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteResult {
    /// Path written.
    pub path: VirtualPath,
    /// File updates for the caller to merge, for state-held storage.
    pub files_update: Option<FileDelta>,
}

/// Outcome of an edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditResult {
    /// Path edited.
    pub path: VirtualPath,
    /// Number of occurrences replaced.
    pub occurrences: usize,
    /// File updates for the caller to merge, for state-held storage.
    pub files_update: Option<FileDelta>,
}

/// A single grep hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrepMatch {
    /// Virtual path of the file.
    pub path: String,
    /// 1-based line number.
    pub line: usize,
    /// Line text.
    pub text: String,
}

/// Outcome of a shell command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteResponse {
    /// Combined stdout and stderr.
    pub output: String,
    /// Exit code, if the process exited normally.
    pub exit_code: Option<i32>,
    /// Whether `output` was cut short.
    #[serde(default)]
    pub truncated: bool,
}

/// Storage capability shared by every backend.
#[async_trait]
pub trait Backend: Send + Sync {
    /// List the direct children of `path`. A missing directory lists as empty.
    async fn ls(&self, path: &VirtualPath) -> Result<Vec<FileInfo>, BackendError>;

    /// Read `limit` lines starting at 0-based `offset`, numbered `cat -n` style.
    async fn read(
        &self,
        path: &VirtualPath,
        offset: usize,
        limit: usize,
    ) -> Result<String, BackendError>;

    /// Create or fully overwrite a file.
    async fn write(&self, path: &VirtualPath, content: &str) -> Result<WriteResult, BackendError>;

    /// Replace `old` with `new` in a file.
    async fn edit(
        &self,
        path: &VirtualPath,
        old: &str,
        new: &str,
        replace_all: bool,
    ) -> Result<EditResult, BackendError>;

    /// Files under `path` whose path relative to `path` matches `pattern`.
    async fn glob(&self, pattern: &str, path: &VirtualPath) -> Result<Vec<FileInfo>, BackendError>;

    /// Lines matching the regex `pattern`, optionally restricted by directory
    /// and file-name glob. No matches is an empty list, not an error.
    async fn grep(
        &self,
        pattern: &str,
        path: Option<&VirtualPath>,
        glob: Option<&str>,
    ) -> Result<Vec<GrepMatch>, BackendError>;

    /// The execute capability, if this backend has one.
    fn execution(&self) -> Option<&dyn Execute> {
        None
    }
}

/// Shell execution capability.
#[async_trait]
pub trait Execute: Send + Sync {
    /// Identifier of the execution environment.
    fn id(&self) -> &str;

    /// Run a shell command and collect its output.
    async fn execute(&self, command: &str) -> Result<ExecuteResponse, BackendError>;
}
