//! Filesystem tools bound to a backend source.

use std::{collections::HashMap, sync::Arc};

use agentfs_core::{
    Backend, BackendSource, ExecuteResponse, ExecutionContext, FileDelta, Message, StateDelta,
    ToolMessage, VirtualPath,
    format::{format_grep_matches, truncate_if_too_long},
    normalize, normalize_with_prefixes,
};
use async_trait::async_trait;
use serde_json::Value;

use crate::{
    protocol::{
        self, EditFileArgs, ExecuteArgs, GlobArgs, GrepArgs, LsArgs, ReadFileArgs, WriteFileArgs,
    },
    tool::{Tool, ToolError, ToolOutput, parse_args, reply},
};

pub const LS: &str = "ls";
pub const READ_FILE: &str = "read_file";
pub const WRITE_FILE: &str = "write_file";
pub const EDIT_FILE: &str = "edit_file";
pub const GLOB: &str = "glob";
pub const GREP: &str = "grep";
pub const EXECUTE: &str = "execute";

/// Names of the tools built by [`filesystem_tools`].
pub const FILESYSTEM_TOOL_NAMES: [&str; 7] =
    [LS, READ_FILE, WRITE_FILE, EDIT_FILE, GLOB, GREP, EXECUTE];

const LS_DESCRIPTION: &str = "Lists all files in a directory. The path must be absolute.";
const READ_FILE_DESCRIPTION: &str = "Reads a file, returning numbered lines. Use offset and limit to page through large files.";
const WRITE_FILE_DESCRIPTION: &str = "Writes content to a file, creating or overwriting it.";
const EDIT_FILE_DESCRIPTION: &str = "Replaces an exact string in a file. The string must be unique unless replace_all is set.";
const GLOB_DESCRIPTION: &str = "Finds files matching a glob pattern such as **/*.py.";
const GREP_DESCRIPTION: &str = "Searches file contents with a regular expression.";
const EXECUTE_DESCRIPTION: &str = "Runs a shell command in the sandbox and returns its output and exit code.";

/// Reply for `execute` on a backend without command execution.
pub const EXECUTION_UNAVAILABLE: &str = "Error: Execution not available. This agent's backend does not support command execution. To use the execute tool, provide a backend with the execute capability.";

/// Backend binding and path policy shared by the filesystem tools.
#[derive(Debug, Clone)]
pub struct FsBinding {
    backend: BackendSource,
    allowed_prefixes: Option<Arc<[String]>>,
}

impl FsBinding {
    #[must_use]
    pub const fn new(backend: BackendSource) -> Self {
        Self {
            backend,
            allowed_prefixes: None,
        }
    }

    /// Only accept paths under one of `prefixes`.
    #[must_use]
    pub fn with_allowed_prefixes(mut self, prefixes: Vec<String>) -> Self {
        self.allowed_prefixes = Some(prefixes.into());
        self
    }

    #[must_use]
    pub const fn source(&self) -> &BackendSource {
        &self.backend
    }

    /// Normalize `path` and check it against the allowed prefixes.
    ///
    /// # Errors
    /// Returns [`ToolError::Path`] for unsafe or disallowed paths.
    pub fn path(&self, path: &str) -> Result<VirtualPath, ToolError> {
        let path = match &self.allowed_prefixes {
            Some(allowed) => normalize_with_prefixes(path, allowed)?,
            None => normalize(path)?,
        };
        Ok(path)
    }

    #[must_use]
    pub fn resolve(&self, ctx: &ExecutionContext) -> Arc<dyn Backend> {
        self.backend.resolve(ctx)
    }
}

fn list_output(paths: impl IntoIterator<Item = String>) -> String {
    let paths: Vec<String> = paths.into_iter().collect();
    truncate_if_too_long(serde_json::to_string(&paths).unwrap_or_default())
}

/// Format a command result for the model.
#[must_use]
pub fn format_execute_response(response: &ExecuteResponse) -> String {
    let mut parts = vec![response.output.clone()];
    if let Some(code) = response.exit_code {
        let status = if code == 0 { "succeeded" } else { "failed" };
        parts.push(format!("\n[Command {status} with exit code {code}]"));
    }
    if response.truncated {
        parts.push("\n[Output was truncated due to size limits]".to_string());
    }
    parts.concat()
}

macro_rules! described {
    ($ty:ident, $name:expr) => {
        impl $ty {
            #[must_use]
            pub const fn new(binding: FsBinding) -> Self {
                Self {
                    binding,
                    description: None,
                }
            }

            fn with_overrides(binding: FsBinding, descriptions: &HashMap<String, String>) -> Self {
                Self {
                    binding,
                    description: descriptions.get($name).cloned(),
                }
            }

            /// Replace the default description.
            #[must_use]
            pub fn with_description(mut self, description: impl Into<String>) -> Self {
                self.description = Some(description.into());
                self
            }
        }
    };
}

/// `ls`: list the direct children of a directory.
pub struct LsTool {
    binding: FsBinding,
    description: Option<String>,
}
described!(LsTool, LS);

#[async_trait]
impl Tool for LsTool {
    fn name(&self) -> &str {
        LS
    }

    fn description(&self) -> &str {
        self.description.as_deref().unwrap_or(LS_DESCRIPTION)
    }

    fn parameters_schema(&self) -> Value {
        protocol::ls_schema()
    }

    async fn call(&self, args: Value, ctx: &ExecutionContext) -> Result<ToolOutput, ToolError> {
        let args: LsArgs = parse_args(LS, args)?;
        let path = self.binding.path(&args.path)?;
        let text = match self.binding.resolve(ctx).ls(&path).await {
            Ok(entries) => list_output(entries.into_iter().map(|e| e.path)),
            Err(e) => format!("Error: {e}"),
        };
        Ok(ToolOutput::text(ctx, LS, text))
    }
}

/// `read_file`: numbered lines from a file.
pub struct ReadFileTool {
    binding: FsBinding,
    description: Option<String>,
}
described!(ReadFileTool, READ_FILE);

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        READ_FILE
    }

    fn description(&self) -> &str {
        self.description.as_deref().unwrap_or(READ_FILE_DESCRIPTION)
    }

    fn parameters_schema(&self) -> Value {
        protocol::read_file_schema()
    }

    async fn call(&self, args: Value, ctx: &ExecutionContext) -> Result<ToolOutput, ToolError> {
        let args: ReadFileArgs = parse_args(READ_FILE, args)?;
        let path = self.binding.path(&args.file_path)?;
        let text = match self.binding.resolve(ctx).read(&path, args.offset, args.limit).await {
            Ok(text) => text,
            Err(e) => format!("Error: {e}"),
        };
        Ok(ToolOutput::text(ctx, READ_FILE, text))
    }
}

/// `write_file`: create or overwrite a file.
pub struct WriteFileTool {
    binding: FsBinding,
    description: Option<String>,
}
described!(WriteFileTool, WRITE_FILE);

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        WRITE_FILE
    }

    fn description(&self) -> &str {
        self.description.as_deref().unwrap_or(WRITE_FILE_DESCRIPTION)
    }

    fn parameters_schema(&self) -> Value {
        protocol::write_file_schema()
    }

    async fn call(&self, args: Value, ctx: &ExecutionContext) -> Result<ToolOutput, ToolError> {
        let args: WriteFileArgs = parse_args(WRITE_FILE, args)?;
        let path = self.binding.path(&args.file_path)?;
        match self.binding.resolve(ctx).write(&path, &args.content).await {
            Ok(result) => {
                let message = reply(ctx, WRITE_FILE, format!("Updated file {}", result.path));
                Ok(with_files(message, result.files_update))
            }
            Err(e) => Ok(ToolOutput::text(ctx, WRITE_FILE, format!("Error: {e}"))),
        }
    }
}

/// `edit_file`: exact string replacement.
pub struct EditFileTool {
    binding: FsBinding,
    description: Option<String>,
}
described!(EditFileTool, EDIT_FILE);

#[async_trait]
impl Tool for EditFileTool {
    fn name(&self) -> &str {
        EDIT_FILE
    }

    fn description(&self) -> &str {
        self.description.as_deref().unwrap_or(EDIT_FILE_DESCRIPTION)
    }

    fn parameters_schema(&self) -> Value {
        protocol::edit_file_schema()
    }

    async fn call(&self, args: Value, ctx: &ExecutionContext) -> Result<ToolOutput, ToolError> {
        let args: EditFileArgs = parse_args(EDIT_FILE, args)?;
        let path = self.binding.path(&args.file_path)?;
        let backend = self.binding.resolve(ctx);
        match backend
            .edit(&path, &args.old_string, &args.new_string, args.replace_all)
            .await
        {
            Ok(result) => {
                let message = reply(
                    ctx,
                    EDIT_FILE,
                    format!(
                        "Successfully replaced {} instance(s) of the string in '{}'",
                        result.occurrences, result.path
                    ),
                );
                Ok(with_files(message, result.files_update))
            }
            Err(e) => Ok(ToolOutput::text(ctx, EDIT_FILE, format!("Error: {e}"))),
        }
    }
}

fn with_files(message: ToolMessage, files: Option<FileDelta>) -> ToolOutput {
    match files {
        Some(files) => ToolOutput::Update(StateDelta {
            messages: vec![Message::Tool(message)],
            files,
            ..StateDelta::default()
        }),
        None => ToolOutput::Message(message),
    }
}

/// `glob`: paths matching a pattern.
pub struct GlobTool {
    binding: FsBinding,
    description: Option<String>,
}
described!(GlobTool, GLOB);

#[async_trait]
impl Tool for GlobTool {
    fn name(&self) -> &str {
        GLOB
    }

    fn description(&self) -> &str {
        self.description.as_deref().unwrap_or(GLOB_DESCRIPTION)
    }

    fn parameters_schema(&self) -> Value {
        protocol::glob_schema()
    }

    async fn call(&self, args: Value, ctx: &ExecutionContext) -> Result<ToolOutput, ToolError> {
        let args: GlobArgs = parse_args(GLOB, args)?;
        let path = self.binding.path(&args.path)?;
        let text = match self.binding.resolve(ctx).glob(&args.pattern, &path).await {
            Ok(found) => list_output(found.into_iter().map(|f| f.path)),
            Err(e) => format!("Error: {e}"),
        };
        Ok(ToolOutput::text(ctx, GLOB, text))
    }
}

/// `grep`: regex search over file contents.
pub struct GrepTool {
    binding: FsBinding,
    description: Option<String>,
}
described!(GrepTool, GREP);

#[async_trait]
impl Tool for GrepTool {
    fn name(&self) -> &str {
        GREP
    }

    fn description(&self) -> &str {
        self.description.as_deref().unwrap_or(GREP_DESCRIPTION)
    }

    fn parameters_schema(&self) -> Value {
        protocol::grep_schema()
    }

    async fn call(&self, args: Value, ctx: &ExecutionContext) -> Result<ToolOutput, ToolError> {
        let args: GrepArgs = parse_args(GREP, args)?;
        let path = args.path.as_deref().map(|p| self.binding.path(p)).transpose()?;
        let text = match self
            .binding
            .resolve(ctx)
            .grep(&args.pattern, path.as_ref(), args.glob.as_deref())
            .await
        {
            Ok(matches) => format_grep_matches(&matches, args.output_mode),
            Err(e) => format!("Error: {e}"),
        };
        Ok(ToolOutput::text(ctx, GREP, text))
    }
}

/// `execute`: run a shell command where the backend supports it.
pub struct ExecuteTool {
    binding: FsBinding,
    description: Option<String>,
}
described!(ExecuteTool, EXECUTE);

#[async_trait]
impl Tool for ExecuteTool {
    fn name(&self) -> &str {
        EXECUTE
    }

    fn description(&self) -> &str {
        self.description.as_deref().unwrap_or(EXECUTE_DESCRIPTION)
    }

    fn parameters_schema(&self) -> Value {
        protocol::execute_schema()
    }

    async fn call(&self, args: Value, ctx: &ExecutionContext) -> Result<ToolOutput, ToolError> {
        let args: ExecuteArgs = parse_args(EXECUTE, args)?;
        let backend = self.binding.resolve(ctx);
        let Some(runner) = backend.execution() else {
            return Ok(ToolOutput::text(ctx, EXECUTE, EXECUTION_UNAVAILABLE));
        };
        tracing::debug!(sandbox = runner.id(), command = %args.command, "Executing command");
        let text = match runner.execute(&args.command).await {
            Ok(response) => format_execute_response(&response),
            Err(e) => format!("Error: {e}"),
        };
        Ok(ToolOutput::text(ctx, EXECUTE, text))
    }
}

/// Build every filesystem tool over `binding`.
///
/// `descriptions` overrides default descriptions by tool name.
#[must_use]
pub fn filesystem_tools(
    binding: &FsBinding,
    descriptions: &HashMap<String, String>,
) -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(LsTool::with_overrides(binding.clone(), descriptions)),
        Arc::new(ReadFileTool::with_overrides(binding.clone(), descriptions)),
        Arc::new(WriteFileTool::with_overrides(binding.clone(), descriptions)),
        Arc::new(EditFileTool::with_overrides(binding.clone(), descriptions)),
        Arc::new(GlobTool::with_overrides(binding.clone(), descriptions)),
        Arc::new(GrepTool::with_overrides(binding.clone(), descriptions)),
        Arc::new(ExecuteTool::with_overrides(binding.clone(), descriptions)),
    ]
}

#[cfg(test)]
mod tests {
    use agentfs_backends::{FilesystemBackend, StateBackend};
    use agentfs_core::{FileRecord, FileTable, FileUpdate, SessionState};
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;

    fn state_ctx(files: &[(&str, &str)]) -> ExecutionContext {
        let mut state = SessionState::new();
        state.files = files
            .iter()
            .map(|(path, content)| ((*path).to_string(), FileRecord::new(content)))
            .collect::<FileTable>();
        ExecutionContext::new(Arc::new(state)).for_tool_call("call_1")
    }

    fn tools(binding: &FsBinding) -> HashMap<String, Arc<dyn Tool>> {
        filesystem_tools(binding, &HashMap::new())
            .into_iter()
            .map(|t| (t.name().to_string(), t))
            .collect()
    }

    async fn text(tool: &Arc<dyn Tool>, args: Value, ctx: &ExecutionContext) -> String {
        let output = tool.call(args, ctx).await.unwrap();
        output.content().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_state_tools_round_trip() {
        let ctx = state_ctx(&[("/notes/a.md", "alpha\nbeta")]);
        let tools = tools(&FsBinding::new(StateBackend::source()));

        let listed = text(&tools[LS], json!({ "path": "/notes" }), &ctx).await;
        assert_eq!(listed, r#"["/notes/a.md"]"#);

        let read = text(&tools[READ_FILE], json!({ "file_path": "/notes/a.md" }), &ctx).await;
        assert_eq!(read, "     1\talpha\n     2\tbeta");

        let missing = text(&tools[READ_FILE], json!({ "file_path": "/nope" }), &ctx).await;
        assert_eq!(missing, "Error: File '/nope' not found");

        let output = tools[WRITE_FILE]
            .call(json!({ "file_path": "/out.txt", "content": "hi" }), &ctx)
            .await
            .unwrap();
        let ToolOutput::Update(delta) = output else {
            panic!("state writes produce an update");
        };
        assert_eq!(delta.messages[0].text(), "Updated file /out.txt");
        assert!(matches!(delta.files.get("/out.txt"), Some(FileUpdate::Write(r)) if r.text() == "hi"));
    }

    #[tokio::test]
    async fn test_edit_reports_occurrences_and_errors() {
        let ctx = state_ctx(&[("/f.txt", "x x")]);
        let tools = tools(&FsBinding::new(StateBackend::source()));

        let ambiguous = text(
            &tools[EDIT_FILE],
            json!({ "file_path": "/f.txt", "old_string": "x", "new_string": "y" }),
            &ctx,
        )
        .await;
        assert!(ambiguous.starts_with("Error: String 'x' appears 2 times in file."));

        let ok = text(
            &tools[EDIT_FILE],
            json!({ "file_path": "/f.txt", "old_string": "x", "new_string": "y", "replace_all": true }),
            &ctx,
        )
        .await;
        assert_eq!(ok, "Successfully replaced 2 instance(s) of the string in '/f.txt'");
    }

    #[tokio::test]
    async fn test_paths_are_validated_before_backend() {
        let ctx = state_ctx(&[]);
        let binding = FsBinding::new(StateBackend::source())
            .with_allowed_prefixes(vec!["/workspace/".to_string()]);
        let tools = tools(&binding);

        let traversal = tools[READ_FILE]
            .call(json!({ "file_path": "/workspace/../etc/passwd" }), &ctx)
            .await;
        assert!(matches!(traversal, Err(ToolError::Path(_))));

        let outside = tools[LS].call(json!({ "path": "/other" }), &ctx).await;
        assert!(matches!(outside, Err(ToolError::Path(_))));

        let bad_args = tools[WRITE_FILE].call(json!({ "file_path": "/workspace/x" }), &ctx).await;
        assert!(matches!(bad_args, Err(ToolError::InvalidArguments { .. })));
    }

    #[tokio::test]
    async fn test_host_directory_glob_grep() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.py"), "import os\nprint(1)\n").unwrap();
        std::fs::write(dir.path().join("b.txt"), "print(2)\n").unwrap();
        let backend: Arc<dyn Backend> = Arc::new(FilesystemBackend::new(dir.path()));
        let tools = tools(&FsBinding::new(BackendSource::Instance(backend)));
        let ctx = state_ctx(&[]);

        let globbed = text(&tools[GLOB], json!({ "pattern": "*.py" }), &ctx).await;
        assert_eq!(globbed, r#"["/a.py"]"#);

        let files = text(&tools[GREP], json!({ "pattern": "print" }), &ctx).await;
        assert_eq!(files, "/a.py\n/b.txt");

        let content = text(
            &tools[GREP],
            json!({ "pattern": "print", "glob": "*.py", "output_mode": "content" }),
            &ctx,
        )
        .await;
        assert_eq!(content, "/a.py:\n  2: print(1)");

        let output = tools[WRITE_FILE]
            .call(json!({ "file_path": "/c.txt", "content": "c" }), &ctx)
            .await
            .unwrap();
        assert!(matches!(output, ToolOutput::Message(_)));
    }

    #[tokio::test]
    async fn test_execute_without_capability() {
        let ctx = state_ctx(&[]);
        let tools = tools(&FsBinding::new(StateBackend::source()));
        let reply = text(&tools[EXECUTE], json!({ "command": "ls" }), &ctx).await;
        assert_eq!(reply, EXECUTION_UNAVAILABLE);
    }

    #[test]
    fn test_format_execute_response() {
        let ok = ExecuteResponse {
            output: "done".into(),
            exit_code: Some(0),
            truncated: false,
        };
        assert_eq!(format_execute_response(&ok), "done\n[Command succeeded with exit code 0]");

        let failed = ExecuteResponse {
            output: "boom".into(),
            exit_code: Some(2),
            truncated: true,
        };
        assert_eq!(
            format_execute_response(&failed),
            "boom\n[Command failed with exit code 2]\n[Output was truncated due to size limits]"
        );
    }

    #[test]
    fn test_custom_descriptions() {
        let mut descriptions = HashMap::new();
        descriptions.insert(LS.to_string(), "custom ls".to_string());
        let tools = filesystem_tools(&FsBinding::new(StateBackend::source()), &descriptions);
        assert_eq!(tools.len(), FILESYSTEM_TOOL_NAMES.len());
        assert_eq!(tools[0].description(), "custom ls");
        assert_eq!(tools[1].description(), READ_FILE_DESCRIPTION);
    }
}
