//! Agent-facing tools over the storage backends.
//!
//! - [`Tool`] and [`ToolRegistry`] - callable tools with JSON argument schemas
//! - [`filesystem`] - `ls`, `read_file`, `write_file`, `edit_file`, `glob`,
//!   `grep` and `execute` bound to a backend source
//! - [`AgentMiddleware`] - hooks around the agent loop and each tool call
//! - [`ToolResultEvictor`] - stores oversized results and leaves a pointer
//! - [`FilesystemMiddleware`] and [`PatchToolCallsMiddleware`]

mod evict;
pub mod filesystem;
mod fs_middleware;
mod middleware;
mod patch;
pub mod protocol;
mod tool;
mod tree;

pub use evict::{EvictionConfig, EvictionRecord, ToolResultEvictor};
pub use filesystem::{FILESYSTEM_TOOL_NAMES, FsBinding, filesystem_tools};
pub use fs_middleware::FilesystemMiddleware;
pub use middleware::{AgentMiddleware, Next, ToolCallRequest, call_through};
pub use patch::PatchToolCallsMiddleware;
pub use tool::{Tool, ToolError, ToolOutput, ToolRegistry, ToolSpec, parse_args, reply};
pub use tree::{DirectoryTreeTool, LIST_DIRECTORY_TREE, directory_tree};
