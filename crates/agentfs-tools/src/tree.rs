//! `list_directory_tree`: nested JSON view of a directory.

use agentfs_core::{Backend, BackendError, ExecutionContext, FileInfo, VirtualPath};
use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use serde_json::{Map, Value, json};

use crate::{
    filesystem::FsBinding,
    protocol::{self, DirectoryTreeArgs},
    tool::{Tool, ToolError, ToolOutput, parse_args},
};

pub const LIST_DIRECTORY_TREE: &str = "list_directory_tree";

const DESCRIPTION: &str =
    "Shows the directory structure under a path as a nested tree, skipping hidden entries.";

/// Builds the tree from repeated backend `ls` calls.
pub struct DirectoryTreeTool {
    binding: FsBinding,
}

impl DirectoryTreeTool {
    #[must_use]
    pub const fn new(binding: FsBinding) -> Self {
        Self { binding }
    }
}

fn entry_name(path: &str) -> &str {
    path.trim_end_matches('/').rsplit('/').next().unwrap_or_default()
}

fn node(info: &FileInfo) -> Map<String, Value> {
    let mut node = Map::new();
    node.insert("name".into(), json!(entry_name(&info.path)));
    node.insert("path".into(), json!(info.path));
    node.insert("is_dir".into(), json!(info.is_dir));
    if let Some(size) = info.size {
        node.insert("size".into(), json!(size));
    }
    node
}

/// Children of `dir` down to `remaining` further levels.
fn children<'a>(
    backend: &'a dyn Backend,
    dir: VirtualPath,
    remaining: usize,
) -> BoxFuture<'a, Result<Vec<Value>, BackendError>> {
    async move {
        let mut out = Vec::new();
        for info in backend.ls(&dir).await? {
            if entry_name(&info.path).starts_with('.') {
                continue;
            }
            let mut entry = node(&info);
            if info.is_dir && remaining > 0 {
                let child = agentfs_core::normalize(&info.path)
                    .map_err(|e| BackendError::Remote(e.to_string()))?;
                let nested = children(backend, child, remaining - 1).await?;
                entry.insert("children".into(), Value::Array(nested));
            }
            out.push(Value::Object(entry));
        }
        Ok(out)
    }
    .boxed()
}

/// Tree rooted at `root`, `max_depth` levels deep.
///
/// # Errors
/// Propagates backend failures from any `ls` call.
pub async fn directory_tree(
    backend: &dyn Backend,
    root: &VirtualPath,
    max_depth: usize,
) -> Result<Value, BackendError> {
    let mut tree = Map::new();
    tree.insert("name".into(), json!(entry_name(root.as_str())));
    tree.insert("path".into(), json!(root.as_str()));
    tree.insert("is_dir".into(), json!(true));
    if max_depth > 0 {
        let nested = children(backend, root.clone(), max_depth - 1).await?;
        tree.insert("children".into(), Value::Array(nested));
    }
    Ok(json!({ "root": root.as_str(), "tree": tree }))
}

#[async_trait]
impl Tool for DirectoryTreeTool {
    fn name(&self) -> &str {
        LIST_DIRECTORY_TREE
    }

    fn description(&self) -> &str {
        DESCRIPTION
    }

    fn parameters_schema(&self) -> Value {
        protocol::directory_tree_schema()
    }

    async fn call(&self, args: Value, ctx: &ExecutionContext) -> Result<ToolOutput, ToolError> {
        let args: DirectoryTreeArgs = parse_args(LIST_DIRECTORY_TREE, args)?;
        let path = self.binding.path(&args.path)?;
        let backend = self.binding.resolve(ctx);
        let text = match directory_tree(backend.as_ref(), &path, args.max_depth).await {
            Ok(tree) => serde_json::to_string_pretty(&tree).unwrap_or_default(),
            Err(e) => format!("Error: {e}"),
        };
        Ok(ToolOutput::text(ctx, LIST_DIRECTORY_TREE, text))
    }
}
