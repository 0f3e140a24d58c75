//! Moves oversized tool results into storage.

use agentfs_core::{
    Backend, FileDelta, Message, StateDelta, ToolMessage,
    format::{TOOL_RESULT_CHAR_LIMIT, number_lines, sanitize_tool_call_id},
    normalize,
};
use serde::Deserialize;

use crate::{filesystem::FILESYSTEM_TOOL_NAMES, tool::ToolOutput, tree::LIST_DIRECTORY_TREE};

const PREVIEW_LINES: usize = 10;
const PREVIEW_LINE_LENGTH: usize = 1_000;

/// Eviction settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EvictionConfig {
    /// Results longer than this many characters are evicted.
    pub threshold_chars: usize,
    /// Tools whose results are never evicted.
    pub exempt_tools: Vec<String>,
    /// Directory the results are stored under.
    pub directory: String,
}

impl Default for EvictionConfig {
    fn default() -> Self {
        Self {
            threshold_chars: TOOL_RESULT_CHAR_LIMIT,
            exempt_tools: FILESYSTEM_TOOL_NAMES
                .iter()
                .chain(std::iter::once(&LIST_DIRECTORY_TREE))
                .map(ToString::to_string)
                .collect(),
            directory: "/large_tool_results".to_string(),
        }
    }
}

impl EvictionConfig {
    #[must_use]
    pub const fn with_threshold(mut self, threshold_chars: usize) -> Self {
        self.threshold_chars = threshold_chars;
        self
    }

    #[must_use]
    pub fn with_exempt_tools(mut self, tools: Vec<String>) -> Self {
        self.exempt_tools = tools;
        self
    }
}

/// One evicted result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvictionRecord {
    pub tool_call_id: String,
    pub path: String,
    pub original_chars: usize,
}

/// Replaces large tool results with a pointer to a stored copy.
#[derive(Debug, Clone, Default)]
pub struct ToolResultEvictor {
    config: EvictionConfig,
}

impl ToolResultEvictor {
    #[must_use]
    pub const fn new(config: EvictionConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub const fn config(&self) -> &EvictionConfig {
        &self.config
    }

    #[must_use]
    pub fn is_exempt(&self, tool: &str) -> bool {
        self.config.exempt_tools.iter().any(|t| t == tool)
    }

    /// Storage path for a call's result.
    #[must_use]
    pub fn storage_path(&self, tool_call_id: &str) -> String {
        format!(
            "{}/{}",
            self.config.directory.trim_end_matches('/'),
            sanitize_tool_call_id(tool_call_id)
        )
    }

    /// Evict every oversized tool message in `output`.
    pub async fn process(
        &self,
        output: ToolOutput,
        backend: &dyn Backend,
    ) -> (ToolOutput, Vec<EvictionRecord>) {
        match output {
            ToolOutput::Message(message) => {
                let (message, files, record) = self.evict(message, backend).await;
                let records = record.into_iter().collect();
                match files {
                    Some(files) => (
                        ToolOutput::Update(StateDelta {
                            messages: vec![Message::Tool(message)],
                            files,
                            ..StateDelta::default()
                        }),
                        records,
                    ),
                    None => (ToolOutput::Message(message), records),
                }
            }
            ToolOutput::Update(mut delta) => {
                let mut records = Vec::new();
                let mut messages = Vec::with_capacity(delta.messages.len());
                for message in std::mem::take(&mut delta.messages) {
                    let Message::Tool(tool_message) = message else {
                        messages.push(message);
                        continue;
                    };
                    let (tool_message, files, record) = self.evict(tool_message, backend).await;
                    if let Some(files) = files {
                        delta.files.extend(files);
                    }
                    records.extend(record);
                    messages.push(Message::Tool(tool_message));
                }
                delta.messages = messages;
                (ToolOutput::Update(delta), records)
            }
        }
    }

    async fn evict(
        &self,
        message: ToolMessage,
        backend: &dyn Backend,
    ) -> (ToolMessage, Option<FileDelta>, Option<EvictionRecord>) {
        let chars = message.content.chars().count();
        if chars <= self.config.threshold_chars {
            return (message, None, None);
        }

        let path = match normalize(&self.storage_path(&message.tool_call_id)) {
            Ok(path) => path,
            Err(e) => {
                tracing::warn!(tool_call_id = %message.tool_call_id, error = %e, "Cannot evict tool result");
                return (message, None, None);
            }
        };

        let written = match backend.write(&path, &message.content).await {
            Ok(written) => written,
            Err(e) => {
                tracing::warn!(
                    tool_call_id = %message.tool_call_id,
                    path = %path,
                    error = %e,
                    "Failed to store large tool result, keeping it inline"
                );
                return (message, None, None);
            }
        };

        tracing::info!(
            tool_call_id = %message.tool_call_id,
            path = %path,
            chars,
            "Evicted large tool result"
        );

        let pointer = too_large_message(&message.tool_call_id, path.as_str(), &message.content);
        let record = EvictionRecord {
            tool_call_id: message.tool_call_id.clone(),
            path: path.into_string(),
            original_chars: chars,
        };
        let replaced = ToolMessage {
            content: pointer,
            ..message
        };
        (replaced, written.files_update, Some(record))
    }
}

fn too_large_message(tool_call_id: &str, path: &str, content: &str) -> String {
    let head: Vec<&str> = content.lines().take(PREVIEW_LINES).collect();
    let sample = number_lines(&head, 1, PREVIEW_LINE_LENGTH);
    format!(
        "Tool result too large, the result of this tool call {tool_call_id} was saved in the filesystem at this path: {path}\n\
         You can read the result from the filesystem by using the read_file tool, but make sure to only read part of the result at a time.\n\
         You can do this by specifying an offset and limit in the read_file tool call.\n\
         For example, to read the first 100 lines, you can use the read_file tool with offset=0 and limit=100.\n\
         \n\
         Here are the first 10 lines of the result:\n\
         {sample}\n"
    )
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, sync::Arc};

    use agentfs_backends::{FilesystemBackend, StateBackend};
    use agentfs_core::{ExecutionContext, FileTable, FileUpdate, SessionState, reduce_files};
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;
    use crate::{
        filesystem::{FsBinding, READ_FILE, filesystem_tools},
        tool::Tool,
    };

    fn big(lines: usize) -> String {
        (1..=lines).map(|i| format!("row {i}")).collect::<Vec<_>>().join("\n")
    }

    fn msg(id: &str, content: String) -> ToolMessage {
        ToolMessage::new(id, content).with_name("search")
    }

    #[tokio::test]
    async fn test_small_results_pass_through() {
        let evictor = ToolResultEvictor::default();
        let backend = StateBackend::default();
        let original = ToolOutput::Message(msg("c1", "short".into()));

        let (out, records) = evictor.process(original.clone(), &backend).await;
        assert_eq!(out, original);
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_large_result_goes_to_state() {
        let evictor = ToolResultEvictor::new(EvictionConfig::default().with_threshold(100));
        let backend = StateBackend::default();
        let content = big(50);

        let (out, records) = evictor
            .process(ToolOutput::Message(msg("call/1", content.clone())), &backend)
            .await;

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].path, "/large_tool_results/call_1");
        assert_eq!(records[0].original_chars, content.chars().count());

        let ToolOutput::Update(delta) = out else {
            panic!("state storage returns an update");
        };
        let Some(FileUpdate::Write(stored)) = delta.files.get("/large_tool_results/call_1") else {
            panic!("result stored");
        };
        assert_eq!(stored.text(), content);

        let pointer = delta.messages[0].text();
        assert!(pointer.starts_with(
            "Tool result too large, the result of this tool call call/1 was saved in the filesystem at this path: /large_tool_results/call_1\n"
        ));
        assert!(pointer.contains("     1\trow 1\n"));
        assert!(pointer.contains("    10\trow 10\n"));
        assert!(!pointer.contains("row 11"));
        let Message::Tool(tool_message) = &delta.messages[0] else {
            panic!("tool message kept");
        };
        assert_eq!(tool_message.tool_call_id, "call/1");
        assert_eq!(tool_message.name.as_deref(), Some("search"));
    }

    #[tokio::test]
    async fn test_host_storage_keeps_plain_message() {
        let dir = TempDir::new().unwrap();
        let backend = FilesystemBackend::new(dir.path());
        let evictor = ToolResultEvictor::new(EvictionConfig::default().with_threshold(10));
        let content = big(5);

        let (out, records) = evictor
            .process(ToolOutput::Message(msg("abc", content.clone())), &backend)
            .await;
        assert_eq!(records.len(), 1);
        assert!(matches!(out, ToolOutput::Message(_)));
        let stored = std::fs::read_to_string(dir.path().join("large_tool_results/abc")).unwrap();
        assert_eq!(stored, content);
    }

    #[tokio::test]
    async fn test_update_messages_are_processed_individually() {
        let evictor = ToolResultEvictor::new(EvictionConfig::default().with_threshold(20));
        let backend = StateBackend::default();
        let delta = StateDelta {
            messages: vec![
                Message::Tool(msg("a", big(10))),
                Message::ai("not a tool message but long enough to exceed"),
                Message::Tool(msg("b", "tiny".into())),
                Message::Tool(msg("c", big(10))),
            ],
            ..StateDelta::default()
        };

        let (out, records) = evictor.process(ToolOutput::Update(delta), &backend).await;
        let ToolOutput::Update(delta) = out else {
            panic!("update stays an update");
        };
        assert_eq!(records.len(), 2);
        assert_eq!(delta.messages.len(), 4);
        assert_eq!(delta.messages[2].text(), "tiny");
        assert!(delta.messages[1].text().starts_with("not a tool message"));
        assert_eq!(delta.files.len(), 2);
    }

    #[tokio::test]
    async fn test_evicted_result_reads_back_in_full() {
        let evictor = ToolResultEvictor::new(EvictionConfig::default().with_threshold(100));
        let wide = "x".repeat(1_500);
        let content = std::iter::once(wide.clone())
            .chain((2..=12).map(|i| format!("line {i}")))
            .collect::<Vec<_>>()
            .join("\n");

        let (out, _) = evictor
            .process(ToolOutput::Message(msg("wide", content.clone())), &StateBackend::default())
            .await;
        let ToolOutput::Update(delta) = out else {
            panic!("state storage returns an update");
        };

        let pointer = delta.messages[0].text();
        let preview: Vec<&str> = pointer
            .lines()
            .skip_while(|l| !l.starts_with("     1\t"))
            .collect();
        assert_eq!(preview.len(), 10);
        assert_eq!(preview[0], format!("     1\t{}", &wide[..1_000]));
        assert_eq!(preview[9], "    10\tline 10");
        assert_eq!(pointer.lines().map(str::len).max(), Some(1_007));

        let mut state = SessionState::new();
        state.files = reduce_files(&FileTable::new(), &delta.files);
        let ctx = ExecutionContext::new(Arc::new(state)).for_tool_call("next");
        let read_file = filesystem_tools(&FsBinding::new(StateBackend::source()), &HashMap::new())
            .into_iter()
            .find(|t| t.name() == READ_FILE)
            .unwrap();
        let read = read_file
            .call(
                json!({ "file_path": "/large_tool_results/wide", "offset": 0, "limit": 100 }),
                &ctx,
            )
            .await
            .unwrap();
        let restored: Vec<&str> = read
            .content()
            .unwrap()
            .lines()
            .map(|l| l.split_once('\t').unwrap().1)
            .collect();
        assert_eq!(restored.len(), 12);
        assert_eq!(restored.join("\n"), content);
    }

    #[tokio::test]
    async fn test_threshold_is_inclusive_and_counts_chars() {
        let evictor = ToolResultEvictor::new(EvictionConfig::default().with_threshold(100));
        let backend = StateBackend::default();

        let at_limit = ToolOutput::Message(msg("edge", "é".repeat(100)));
        let (out, records) = evictor.process(at_limit.clone(), &backend).await;
        assert_eq!(out, at_limit);
        assert!(records.is_empty());

        let (out, records) = evictor
            .process(ToolOutput::Message(msg("edge", "é".repeat(101))), &backend)
            .await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].original_chars, 101);
        assert!(matches!(out, ToolOutput::Update(_)));
    }

    #[test]
    fn test_exemptions_and_paths() {
        let evictor = ToolResultEvictor::default();
        assert!(evictor.is_exempt("read_file"));
        assert!(evictor.is_exempt("grep"));
        assert!(!evictor.is_exempt("web_search"));
        assert_eq!(evictor.config().threshold_chars, 80_000);
        assert_eq!(evictor.storage_path("a.b c"), "/large_tool_results/a_b_c");
    }
}
