//! Tool trait, results and registry.

use std::{collections::HashMap, sync::Arc};

use agentfs_core::{ExecutionContext, Message, PathError, StateDelta, ToolMessage};
use async_trait::async_trait;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use thiserror::Error;

/// Tool error.
///
/// Everything except [`ToolError::MissingToolCallId`] is reported back to
/// the model as the tool result; a missing id is a wiring defect.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Invalid arguments for {tool}: {message}")]
    InvalidArguments { tool: String, message: String },
    #[error(transparent)]
    Path(#[from] PathError),
    #[error("Tool call ID is required for {0}")]
    MissingToolCallId(String),
    #[error("Tool execution failed: {0}")]
    Failed(String),
}

impl ToolError {
    /// Whether the model can read this error and carry on.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        !matches!(self, Self::MissingToolCallId(_))
    }
}

/// What a tool call produces.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutput {
    /// A single result message.
    Message(ToolMessage),
    /// A state update, carrying its result messages and any other changes.
    Update(StateDelta),
}

impl ToolOutput {
    /// A plain text result for the call in `ctx`.
    #[must_use]
    pub fn text(ctx: &ExecutionContext, tool: &str, content: impl Into<String>) -> Self {
        Self::Message(reply(ctx, tool, content))
    }

    /// Convert into a state delta.
    #[must_use]
    pub fn into_delta(self) -> StateDelta {
        match self {
            Self::Message(message) => StateDelta::from_messages(vec![Message::Tool(message)]),
            Self::Update(delta) => delta,
        }
    }

    /// Text of the first tool message carried by this output.
    #[must_use]
    pub fn content(&self) -> Option<&str> {
        match self {
            Self::Message(message) => Some(&message.content),
            Self::Update(delta) => delta.messages.iter().find_map(|m| match m {
                Message::Tool(t) => Some(t.content.as_str()),
                _ => None,
            }),
        }
    }
}

/// A tool message answering the call in `ctx`.
#[must_use]
pub fn reply(ctx: &ExecutionContext, tool: &str, content: impl Into<String>) -> ToolMessage {
    ToolMessage::new(ctx.tool_call_id.clone().unwrap_or_default(), content).with_name(tool)
}

/// Tool description advertised to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON Schema for the arguments.
    pub parameters: Value,
}

/// A callable tool.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Stable tool name.
    fn name(&self) -> &str;

    /// Description shown to the model.
    fn description(&self) -> &str;

    /// JSON Schema for the arguments.
    fn parameters_schema(&self) -> Value;

    /// Name, description and schema together.
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }

    /// Run the tool.
    async fn call(&self, args: Value, ctx: &ExecutionContext) -> Result<ToolOutput, ToolError>;
}

/// Deserialize tool arguments.
///
/// # Errors
/// Returns [`ToolError::InvalidArguments`] if `args` does not fit `T`.
pub fn parse_args<T: DeserializeOwned>(tool: &str, args: Value) -> Result<T, ToolError> {
    serde_json::from_value(args).map_err(|e| ToolError::InvalidArguments {
        tool: tool.to_string(),
        message: e.to_string(),
    })
}

/// Name-keyed tool collection. Registration order is kept.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tool, replacing any tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if let Some(&i) = self.index.get(&name) {
            tracing::debug!(tool = %name, "Replacing registered tool");
            self.tools[i] = tool;
        } else {
            self.index.insert(name, self.tools.len());
            self.tools.push(tool);
        }
    }

    /// Look up a tool by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.index.get(name).map(|&i| &self.tools[i])
    }

    /// Tool names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tools.iter().map(|tool| tool.name())
    }

    /// Specs of every registered tool.
    #[must_use]
    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools.iter().map(|tool| tool.spec()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Extend<Arc<dyn Tool>> for ToolRegistry {
    fn extend<I: IntoIterator<Item = Arc<dyn Tool>>>(&mut self, iter: I) {
        for tool in iter {
            self.register(tool);
        }
    }
}

impl FromIterator<Arc<dyn Tool>> for ToolRegistry {
    fn from_iter<I: IntoIterator<Item = Arc<dyn Tool>>>(iter: I) -> Self {
        let mut registry = Self::new();
        registry.extend(iter);
        registry
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
