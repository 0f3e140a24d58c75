//! Conversation items exchanged between the agent, its model and its tools.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique identifier pairing the call with its result.
    pub id: String,
    /// Tool name.
    pub name: String,
    /// Tool arguments.
    #[serde(default)]
    pub args: Value,
}

impl ToolCall {
    /// Create a new tool call.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, args: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            args,
        }
    }
}

/// The result of a tool call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolMessage {
    /// Identifier of the call this result answers.
    pub tool_call_id: String,
    /// Name of the tool that produced it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Result text.
    pub content: String,
}

impl ToolMessage {
    /// Create a tool message.
    #[must_use]
    pub fn new(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            name: None,
            content: content.into(),
        }
    }

    /// Attach the tool name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// A conversation item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    /// System instructions.
    System { content: String },
    /// User (or synthetic task) input.
    Human { content: String },
    /// Model output, possibly requesting tools.
    Ai {
        content: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCall>,
    },
    /// Tool result.
    Tool(ToolMessage),
}

impl Message {
    /// A human message.
    #[must_use]
    pub fn human(content: impl Into<String>) -> Self {
        Self::Human {
            content: content.into(),
        }
    }

    /// An AI message without tool calls.
    #[must_use]
    pub fn ai(content: impl Into<String>) -> Self {
        Self::Ai {
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }

    /// The text content of the message.
    #[must_use]
    pub fn text(&self) -> &str {
        match self {
            Self::System { content } | Self::Human { content } | Self::Ai { content, .. } => {
                content
            }
            Self::Tool(message) => &message.content,
        }
    }

    /// Tool calls carried by an AI message.
    #[must_use]
    pub fn tool_calls(&self) -> &[ToolCall] {
        match self {
            Self::Ai { tool_calls, .. } => tool_calls,
            _ => &[],
        }
    }
}

/// Insert a synthetic result for every tool call that never got one.
///
/// A turn interrupted mid-flight can leave an AI message whose tool calls
/// have no matching tool message. The synthetic result is placed right after
/// the AI message that issued the call. Returns `None` when nothing dangles.
#[must_use]
pub fn patch_dangling_tool_calls(messages: &[Message]) -> Option<Vec<Message>> {
    let mut patched = Vec::with_capacity(messages.len());
    let mut changed = false;

    for (i, message) in messages.iter().enumerate() {
        patched.push(message.clone());
        for call in message.tool_calls() {
            let answered = messages[i..].iter().any(|later| {
                matches!(later, Message::Tool(result) if result.tool_call_id == call.id)
            });
            if !answered {
                tracing::debug!(tool_call_id = %call.id, tool = %call.name, "Patching dangling tool call");
                patched.push(Message::Tool(
                    ToolMessage::new(
                        call.id.clone(),
                        format!(
                            "Tool call {} with id {} was cancelled - another message came in before it could be completed.",
                            call.name, call.id
                        ),
                    )
                    .with_name(call.name.clone()),
                ));
                changed = true;
            }
        }
    }

    changed.then_some(patched)
}
