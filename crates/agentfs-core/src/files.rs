//! Session file table and its deletion-aware reducer.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A file stored in session state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Lines of the file, split on `\n`.
    pub content: Vec<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp.
    pub modified_at: DateTime<Utc>,
}

impl FileRecord {
    /// Create a new record from text, stamped now.
    #[must_use]
    pub fn new(text: &str) -> Self {
        let now = Utc::now();
        Self {
            content: split_lines(text),
            created_at: now,
            modified_at: now,
        }
    }

    /// A copy of this record holding `text`, keeping the creation time.
    #[must_use]
    pub fn updated(&self, text: &str) -> Self {
        Self {
            content: split_lines(text),
            created_at: self.created_at,
            modified_at: Utc::now(),
        }
    }

    /// The file contents as a single string.
    #[must_use]
    pub fn text(&self) -> String {
        self.content.join("\n")
    }

    /// Size of the contents in bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        let newlines = self.content.len().saturating_sub(1);
        let bytes: usize = self.content.iter().map(String::len).sum();
        (bytes + newlines) as u64
    }

    /// Whether the file holds no text.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.content.iter().all(String::is_empty) && self.content.len() <= 1
    }
}

fn split_lines(text: &str) -> Vec<String> {
    text.split('\n').map(ToString::to_string).collect()
}

/// Mapping of virtual path to file record.
pub type FileTable = BTreeMap<String, FileRecord>;

/// One entry of a file delta.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FileUpdate {
    /// Insert or replace the file.
    Write(FileRecord),
    /// Remove the file. Serialized as `null`.
    Delete,
}

/// Updates to apply to a [`FileTable`].
pub type FileDelta = BTreeMap<String, FileUpdate>;

/// Merge `update` into `base`.
///
/// `Delete` entries remove their key; `Write` entries insert or replace.
#[must_use]
pub fn reduce_files(base: &FileTable, update: &FileDelta) -> FileTable {
    let mut result = base.clone();
    for (path, entry) in update {
        match entry {
            FileUpdate::Write(record) => {
                result.insert(path.clone(), record.clone());
            }
            FileUpdate::Delete => {
                result.remove(path);
            }
        }
    }
    result
}

/// The smallest delta that turns `before` into `after`.
#[must_use]
pub fn diff_files(before: &FileTable, after: &FileTable) -> FileDelta {
    let mut delta: FileDelta = after
        .iter()
        .filter(|(path, record)| before.get(*path) != Some(*record))
        .map(|(path, record)| (path.clone(), FileUpdate::Write(record.clone())))
        .collect();

    for path in before.keys().filter(|path| !after.contains_key(*path)) {
        delta.insert(path.clone(), FileUpdate::Delete);
    }

    delta
}
