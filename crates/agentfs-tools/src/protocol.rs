//! Argument payloads for the filesystem tools.
//!
//! Field names are what the model sends; missing optional fields take the
//! defaults below.

use agentfs_core::format::{DEFAULT_READ_LIMIT, DEFAULT_READ_OFFSET, GrepOutputMode};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

fn root() -> String {
    "/".to_string()
}

const fn default_offset() -> usize {
    DEFAULT_READ_OFFSET
}

const fn default_limit() -> usize {
    DEFAULT_READ_LIMIT
}

const fn default_tree_depth() -> usize {
    3
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LsArgs {
    #[serde(default = "root")]
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadFileArgs {
    pub file_path: String,
    #[serde(default = "default_offset")]
    pub offset: usize,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteFileArgs {
    pub file_path: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditFileArgs {
    pub file_path: String,
    pub old_string: String,
    pub new_string: String,
    #[serde(default)]
    pub replace_all: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobArgs {
    pub pattern: String,
    #[serde(default = "root")]
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrepArgs {
    pub pattern: String,
    #[serde(default)]
    pub path: Option<String>,
    /// File-name filter such as `*.py`.
    #[serde(default)]
    pub glob: Option<String>,
    #[serde(default)]
    pub output_mode: GrepOutputMode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteArgs {
    pub command: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryTreeArgs {
    #[serde(default = "root")]
    pub path: String,
    #[serde(default = "default_tree_depth")]
    pub max_depth: usize,
}

pub(crate) fn ls_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "path": { "type": "string", "description": "Absolute directory path", "default": "/" }
        }
    })
}

pub(crate) fn read_file_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "file_path": { "type": "string", "description": "Absolute path of the file to read" },
            "offset": { "type": "integer", "minimum": 0, "default": DEFAULT_READ_OFFSET },
            "limit": { "type": "integer", "minimum": 1, "default": DEFAULT_READ_LIMIT }
        },
        "required": ["file_path"]
    })
}

pub(crate) fn write_file_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "file_path": { "type": "string", "description": "Absolute path of the file to write" },
            "content": { "type": "string" }
        },
        "required": ["file_path", "content"]
    })
}

pub(crate) fn edit_file_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "file_path": { "type": "string", "description": "Absolute path of the file to edit" },
            "old_string": { "type": "string", "description": "Exact text to replace" },
            "new_string": { "type": "string" },
            "replace_all": { "type": "boolean", "default": false }
        },
        "required": ["file_path", "old_string", "new_string"]
    })
}

pub(crate) fn glob_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "pattern": { "type": "string", "description": "Glob such as **/*.py" },
            "path": { "type": "string", "default": "/" }
        },
        "required": ["pattern"]
    })
}

pub(crate) fn grep_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "pattern": { "type": "string", "description": "Regular expression" },
            "path": { "type": "string", "description": "Directory to search, defaults to /" },
            "glob": { "type": "string", "description": "File-name filter such as *.py" },
            "output_mode": {
                "type": "string",
                "enum": ["files_with_matches", "content", "count"],
                "default": "files_with_matches"
            }
        },
        "required": ["pattern"]
    })
}

pub(crate) fn execute_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "command": { "type": "string", "description": "Shell command to run" }
        },
        "required": ["command"]
    })
}

pub(crate) fn directory_tree_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "path": { "type": "string", "default": "/" },
            "max_depth": { "type": "integer", "minimum": 0, "default": 3 }
        }
    })
}
