//! Chat model contract.

use agentfs_core::{Message, ToolCall};
use agentfs_tools::ToolSpec;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One model turn's input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    pub messages: Vec<Message>,
    /// Tools the model may call this turn.
    pub tools: Vec<ToolSpec>,
}

/// The model's reply: text plus any tool calls.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelResponse {
    pub content: String,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
}

impl ModelResponse {
    /// A final answer.
    #[must_use]
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }

    /// A turn that calls tools.
    #[must_use]
    pub const fn calls(tool_calls: Vec<ToolCall>) -> Self {
        Self {
            content: String::new(),
            tool_calls,
        }
    }

    #[must_use]
    pub fn into_message(self) -> Message {
        Message::Ai {
            content: self.content,
            tool_calls: self.tool_calls,
        }
    }
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Model request failed: {0}")]
    RequestFailed(String),
    #[error("Model returned an invalid response: {0}")]
    InvalidResponse(String),
}

/// A chat model that can call tools.
#[async_trait]
pub trait ChatModel: Send + Sync {
    fn name(&self) -> &str {
        "model"
    }

    async fn invoke(&self, request: ModelRequest) -> Result<ModelResponse, ModelError>;
}
