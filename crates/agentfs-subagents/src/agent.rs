//! The tool-calling agent loop.

use std::sync::Arc;

use agentfs_core::{ExecutionContext, Message, SessionState, StateDelta, ToolCall, ToolMessage};
use agentfs_tools::{
    AgentMiddleware, Tool, ToolCallRequest, ToolError, ToolRegistry, ToolSpec, call_through,
};
use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use serde::Deserialize;
use thiserror::Error;

use crate::model::{ChatModel, ModelError, ModelRequest};

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("Agent stopped after {0} turns without a final answer")]
    TurnLimit(usize),
    #[error(transparent)]
    Tool(ToolError),
}

/// Loop settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Model calls allowed before giving up.
    pub max_turns: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self { max_turns: 100 }
    }
}

/// Runs an agent over a state until it produces a final answer.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn invoke(&self, state: SessionState) -> Result<SessionState, ExecutorError>;
}

/// Model plus tools plus middleware, driven turn by turn.
pub struct AgentExecutor {
    model: Arc<dyn ChatModel>,
    system_prompt: Option<String>,
    tools: ToolRegistry,
    middleware: Vec<Arc<dyn AgentMiddleware>>,
    config: ExecutorConfig,
}

impl AgentExecutor {
    #[must_use]
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self {
            model,
            system_prompt: None,
            tools: ToolRegistry::new(),
            middleware: Vec::new(),
            config: ExecutorConfig::default(),
        }
    }

    #[must_use]
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    #[must_use]
    pub fn with_tools(mut self, tools: impl IntoIterator<Item = Arc<dyn Tool>>) -> Self {
        self.tools.extend(tools);
        self
    }

    /// Append a middleware; its tools are registered too.
    #[must_use]
    pub fn with_middleware(mut self, middleware: Arc<dyn AgentMiddleware>) -> Self {
        self.tools.extend(middleware.tools());
        self.middleware.push(middleware);
        self
    }

    #[must_use]
    pub const fn with_config(mut self, config: ExecutorConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub const fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Tool specs after every middleware's filter.
    #[must_use]
    pub fn advertised_tools(&self, ctx: &ExecutionContext) -> Vec<ToolSpec> {
        self.middleware
            .iter()
            .fold(self.tools.specs(), |specs, m| m.filter_tools(ctx, specs))
    }

    async fn run_call(
        &self,
        call: &ToolCall,
        ctx: &ExecutionContext,
    ) -> Result<StateDelta, ExecutorError> {
        let ctx = ctx.for_tool_call(call.id.clone());
        let Some(tool) = self.tools.get(&call.name) else {
            let available = self.tools.names().collect::<Vec<_>>().join(", ");
            tracing::debug!(tool = %call.name, "Model called an unknown tool");
            return Ok(error_reply(
                call,
                format!("Error: {} is not a valid tool, try one of [{available}].", call.name),
            ));
        };

        let request = ToolCallRequest {
            call: call.clone(),
            tool: Arc::clone(tool),
            ctx,
        };
        match call_through(&self.middleware, request).await {
            Ok(output) => Ok(output.into_delta()),
            Err(e) if e.is_recoverable() => {
                tracing::debug!(tool = %call.name, error = %e, "Tool call failed");
                Ok(error_reply(call, format!("Error: {e}")))
            }
            Err(e) => {
                tracing::error!(tool = %call.name, tool_call_id = %call.id, error = %e, "Tool contract violated");
                Err(ExecutorError::Tool(e))
            }
        }
    }
}

fn error_reply(call: &ToolCall, content: String) -> StateDelta {
    StateDelta::from_messages(vec![Message::Tool(
        ToolMessage::new(call.id.clone(), content).with_name(call.name.clone()),
    )])
}

#[async_trait]
impl TaskExecutor for AgentExecutor {
    async fn invoke(&self, mut state: SessionState) -> Result<SessionState, ExecutorError> {
        for middleware in &self.middleware {
            if let Some(messages) = middleware.before_agent(&state).await {
                state.messages = messages;
            }
        }

        for turn in 0..self.config.max_turns {
            let ctx = ExecutionContext::new(Arc::new(state.clone()));
            let request = ModelRequest {
                system_prompt: self.system_prompt.clone(),
                messages: state.messages.clone(),
                tools: self.advertised_tools(&ctx),
            };
            let response = self.model.invoke(request).await.inspect_err(|e| {
                tracing::error!(model = self.model.name(), turn, error = %e, "Model call failed");
            })?;

            let calls = response.tool_calls.clone();
            state.messages.push(response.into_message());
            if calls.is_empty() {
                tracing::debug!(turn, "Agent finished");
                return Ok(state);
            }

            tracing::debug!(turn, calls = calls.len(), "Dispatching tool calls");
            let ctx = ExecutionContext::new(Arc::new(state.clone()));
            let mut pending: FuturesUnordered<_> =
                calls.iter().map(|call| self.run_call(call, &ctx)).collect();
            while let Some(delta) = pending.next().await {
                state.apply(delta?);
            }
        }

        Err(ExecutorError::TurnLimit(self.config.max_turns))
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::VecDeque, sync::Mutex};

    use agentfs_backends::StateBackend;
    use agentfs_tools::{FilesystemMiddleware, ToolOutput};
    use serde_json::{Value, json};

    use super::*;
    use crate::model::ModelResponse;

    /// Replays canned responses and records each request.
    struct Scripted {
        replies: Mutex<VecDeque<ModelResponse>>,
        seen: Mutex<Vec<ModelRequest>>,
    }

    impl Scripted {
        fn new(replies: Vec<ModelResponse>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ChatModel for Scripted {
        async fn invoke(&self, request: ModelRequest) -> Result<ModelResponse, ModelError> {
            self.seen.lock().unwrap().push(request);
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| ModelError::RequestFailed("script exhausted".into()))
        }
    }

    struct NeedsId;

    #[async_trait]
    impl Tool for NeedsId {
        fn name(&self) -> &str {
            "strict"
        }

        fn description(&self) -> &str {
            "fails hard"
        }

        fn parameters_schema(&self) -> Value {
            json!({ "type": "object" })
        }

        async fn call(&self, _args: Value, _ctx: &ExecutionContext) -> Result<ToolOutput, ToolError> {
            Err(ToolError::MissingToolCallId("strict".into()))
        }
    }

    fn start(prompt: &str) -> SessionState {
        SessionState {
            messages: vec![Message::human(prompt)],
            ..SessionState::default()
        }
    }

    #[tokio::test]
    async fn test_tool_results_merge_into_state() {
        let model = Scripted::new(vec![
            ModelResponse::calls(vec![
                ToolCall::new("w1", "write_file", json!({ "file_path": "/a.md", "content": "A" })),
                ToolCall::new("w2", "write_file", json!({ "file_path": "/b.md", "content": "B" })),
                ToolCall::new("x", "nope", json!({})),
            ]),
            ModelResponse::text("done"),
        ]);
        let executor = AgentExecutor::new(model.clone())
            .with_system_prompt("be brief")
            .with_middleware(Arc::new(FilesystemMiddleware::new(StateBackend::source())));

        let state = executor.invoke(start("write two files")).await.unwrap();

        assert_eq!(state.files.len(), 2);
        assert_eq!(state.files["/a.md"].text(), "A");
        assert_eq!(state.last_message().unwrap().text(), "done");
        // human, ai, three tool results, ai
        assert_eq!(state.messages.len(), 6);
        let unknown = state
            .messages
            .iter()
            .find(|m| matches!(m, Message::Tool(t) if t.tool_call_id == "x"))
            .unwrap();
        assert!(unknown.text().starts_with("Error: nope is not a valid tool"));

        let seen = model.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].system_prompt.as_deref(), Some("be brief"));
        assert!(!seen[0].tools.iter().any(|t| t.name == "execute"));
        assert!(seen[0].tools.iter().any(|t| t.name == "write_file"));
    }

    #[tokio::test]
    async fn test_turn_limit() {
        let looping: Vec<ModelResponse> = (0..5)
            .map(|i| ModelResponse::calls(vec![ToolCall::new(format!("c{i}"), "ls", json!({}))]))
            .collect();
        let executor = AgentExecutor::new(Scripted::new(looping))
            .with_middleware(Arc::new(FilesystemMiddleware::new(StateBackend::source())))
            .with_config(ExecutorConfig { max_turns: 3 });

        let err = executor.invoke(start("loop")).await.unwrap_err();
        assert!(matches!(err, ExecutorError::TurnLimit(3)));
    }

    #[tokio::test]
    async fn test_contract_violation_aborts() {
        let model = Scripted::new(vec![ModelResponse::calls(vec![ToolCall::new(
            "s1",
            "strict",
            json!({}),
        )])]);
        let executor = AgentExecutor::new(model).with_tools([Arc::new(NeedsId) as Arc<dyn Tool>]);

        let err = executor.invoke(start("go")).await.unwrap_err();
        assert!(matches!(err, ExecutorError::Tool(ToolError::MissingToolCallId(_))));
    }

    #[tokio::test]
    async fn test_invalid_arguments_are_reported() {
        let model = Scripted::new(vec![
            ModelResponse::calls(vec![ToolCall::new("r", "read_file", json!({}))]),
            ModelResponse::text("ok"),
        ]);
        let executor = AgentExecutor::new(model)
            .with_middleware(Arc::new(FilesystemMiddleware::new(StateBackend::source())));

        let state = executor.invoke(start("read")).await.unwrap();
        assert!(state.messages[2].text().starts_with("Error: Invalid arguments for read_file"));
    }
}
