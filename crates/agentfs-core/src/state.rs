//! Session state and the deltas tools and subagents produce against it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    files::{FileDelta, FileTable, reduce_files},
    message::Message,
};

/// State keys that never cross the subagent boundary.
pub const EXCLUDED_STATE_KEYS: [&str; 2] = ["messages", "todos"];

/// Todo status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    Pending,
    InProgress,
    Completed,
}

/// A task-list entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Todo {
    pub content: String,
    pub status: TodoStatus,
}

/// A single session's worth of agent state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    /// Conversation history.
    #[serde(default)]
    pub messages: Vec<Message>,
    /// Task list.
    #[serde(default)]
    pub todos: Vec<Todo>,
    /// Virtual files held in state.
    #[serde(default)]
    pub files: FileTable,
    /// Any other state field.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl SessionState {
    /// Create empty state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a delta into this state.
    ///
    /// Messages are appended, files go through [`reduce_files`], todos are
    /// replaced when present, and `extra` keys are replaced per key with
    /// `null` removing the key.
    pub fn apply(&mut self, delta: StateDelta) {
        self.messages.extend(delta.messages);
        if !delta.files.is_empty() {
            self.files = reduce_files(&self.files, &delta.files);
        }
        if let Some(todos) = delta.todos {
            self.todos = todos;
        }
        for (key, value) in delta.extra {
            if value.is_null() {
                self.extra.remove(&key);
            } else {
                self.extra.insert(key, value);
            }
        }
    }

    /// The last message, if any.
    #[must_use]
    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }
}

/// A mergeable update to [`SessionState`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateDelta {
    /// Messages to append.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<Message>,
    /// File updates.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub files: FileDelta,
    /// Replacement task list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub todos: Option<Vec<Todo>>,
    /// Other keys to replace.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, Value>,
}

impl StateDelta {
    /// A delta carrying only messages.
    #[must_use]
    pub fn from_messages(messages: Vec<Message>) -> Self {
        Self {
            messages,
            ..Self::default()
        }
    }

    /// A delta carrying only file updates.
    #[must_use]
    pub fn from_files(files: FileDelta) -> Self {
        Self {
            files,
            ..Self::default()
        }
    }

    /// Whether applying this delta would change nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
            && self.files.is_empty()
            && self.todos.is_none()
            && self.extra.is_empty()
    }

    /// Accumulate `other` on top of this delta. Later entries win per key.
    pub fn merge(&mut self, other: Self) {
        self.messages.extend(other.messages);
        self.files.extend(other.files);
        if other.todos.is_some() {
            self.todos = other.todos;
        }
        self.extra.extend(other.extra);
    }
}
