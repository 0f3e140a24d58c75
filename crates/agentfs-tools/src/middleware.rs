//! Middleware hooks around the agent loop and tool calls.

use std::sync::Arc;

use agentfs_core::{ExecutionContext, Message, SessionState, ToolCall};
use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::tool::{Tool, ToolError, ToolOutput, ToolSpec};

/// A tool call on its way to the tool.
#[derive(Clone)]
pub struct ToolCallRequest {
    pub call: ToolCall,
    pub tool: Arc<dyn Tool>,
    /// State snapshot and the call's id.
    pub ctx: ExecutionContext,
}

impl std::fmt::Debug for ToolCallRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolCallRequest")
            .field("call", &self.call)
            .field("tool", &self.tool.name())
            .finish_non_exhaustive()
    }
}

/// The rest of the middleware chain, ending at the tool itself.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    remaining: &'a [Arc<dyn AgentMiddleware>],
}

impl<'a> Next<'a> {
    #[must_use]
    pub const fn new(remaining: &'a [Arc<dyn AgentMiddleware>]) -> Self {
        Self { remaining }
    }

    /// Hand the request to the next middleware, or call the tool.
    pub fn run(self, request: ToolCallRequest) -> BoxFuture<'a, Result<ToolOutput, ToolError>> {
        Box::pin(async move {
            match self.remaining.split_first() {
                Some((first, rest)) => first.wrap_tool_call(request, Self::new(rest)).await,
                None => request.tool.call(request.call.args.clone(), &request.ctx).await,
            }
        })
    }
}

/// Hooks an agent runs at fixed points. Every hook has a pass-through default.
#[async_trait]
pub trait AgentMiddleware: Send + Sync {
    fn name(&self) -> &str;

    /// Tools this middleware adds to the agent.
    fn tools(&self) -> Vec<Arc<dyn Tool>> {
        Vec::new()
    }

    /// Runs once before the loop. `Some` replaces the message list.
    async fn before_agent(&self, _state: &SessionState) -> Option<Vec<Message>> {
        None
    }

    /// Narrow the tools advertised to the model for this turn.
    fn filter_tools(&self, _ctx: &ExecutionContext, specs: Vec<ToolSpec>) -> Vec<ToolSpec> {
        specs
    }

    async fn wrap_tool_call(
        &self,
        request: ToolCallRequest,
        next: Next<'_>,
    ) -> Result<ToolOutput, ToolError> {
        next.run(request).await
    }
}

/// Run `request` through `chain` in order.
///
/// # Errors
/// Returns whatever the tool or a middleware raises.
pub async fn call_through(
    chain: &[Arc<dyn AgentMiddleware>],
    request: ToolCallRequest,
) -> Result<ToolOutput, ToolError> {
    Next::new(chain).run(request).await
}
