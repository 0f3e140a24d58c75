//! Core abstractions for agent virtual filesystems.
//!
//! This crate provides the fundamental building blocks:
//! - `VirtualPath` / `normalize` - Path validation and canonicalization
//! - `FileRecord` / `FileTable` - Session file table with a deletion-aware reducer
//! - `SessionState` / `StateDelta` - Session state and mergeable deltas
//! - `Message` - Conversation items and dangling tool-call repair
//! - `Backend` / `Execute` - Storage capability traits
//! - `ExecutionContext` - Per-call context handed to backend factories

pub mod blocking;
pub mod context;
pub mod files;
pub mod format;
pub mod message;
pub mod path;
pub mod state;
pub mod traits;

pub use context::{BackendFactory, BackendSource, ExecutionContext};
pub use files::{FileDelta, FileRecord, FileTable, FileUpdate, diff_files, reduce_files};
pub use message::{Message, ToolCall, ToolMessage, patch_dangling_tool_calls};
pub use path::{PathError, VirtualPath, normalize, normalize_with_prefixes};
pub use state::{EXCLUDED_STATE_KEYS, SessionState, StateDelta, Todo, TodoStatus};
pub use traits::{
    Backend, BackendError, EditResult, Execute, ExecuteResponse, FileInfo, GrepMatch,
    WriteResult,
};
