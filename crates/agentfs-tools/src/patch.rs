//! Repairs tool calls left without a result.

use agentfs_core::{Message, SessionState, patch_dangling_tool_calls};
use async_trait::async_trait;

use crate::middleware::AgentMiddleware;

/// Before the loop starts, answers every dangling tool call with a
/// cancellation message so the history is valid for the model again.
#[derive(Debug, Clone, Copy, Default)]
pub struct PatchToolCallsMiddleware;

#[async_trait]
impl AgentMiddleware for PatchToolCallsMiddleware {
    fn name(&self) -> &str {
        "patch_tool_calls"
    }

    async fn before_agent(&self, state: &SessionState) -> Option<Vec<Message>> {
        let patched = patch_dangling_tool_calls(&state.messages)?;
        tracing::debug!(
            added = patched.len() - state.messages.len(),
            "Patched dangling tool calls"
        );
        Some(patched)
    }
}

#[cfg(test)]
mod tests {
    use agentfs_core::{ToolCall, ToolMessage};
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn test_patches_only_dangling_calls() {
        let mut state = SessionState::new();
        state.messages = vec![
            Message::human("go"),
            Message::Ai {
                content: String::new(),
                tool_calls: vec![
                    ToolCall::new("a", "ls", json!({})),
                    ToolCall::new("b", "grep", json!({})),
                ],
            },
            Message::Tool(ToolMessage::new("a", "[]")),
            Message::human("never mind"),
        ];

        let patched = PatchToolCallsMiddleware.before_agent(&state).await.unwrap();
        assert_eq!(patched.len(), 5);
        assert_eq!(
            patched[2].text(),
            "Tool call grep with id b was cancelled - another message came in before it could be completed."
        );

        state.messages = patched;
        assert!(PatchToolCallsMiddleware.before_agent(&state).await.is_none());
    }
}
