//! Approval gating for tool calls.

use std::{collections::HashMap, sync::Arc};

use agentfs_tools::{AgentMiddleware, Next, ToolCallRequest, ToolError, ToolOutput};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// What a reviewer may do with a gated call.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approve,
    Edit,
    Reject,
}

/// Gate settings for one tool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct InterruptConfig {
    pub enabled: bool,
    pub allowed_decisions: Vec<Decision>,
    /// Shown to the reviewer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Default for InterruptConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            allowed_decisions: vec![Decision::Approve, Decision::Edit, Decision::Reject],
            description: None,
        }
    }
}

impl InterruptConfig {
    #[must_use]
    pub fn allows(&self, decision: Decision) -> bool {
        self.allowed_decisions.contains(&decision)
    }
}

/// Tool name to gate settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct InterruptPolicy {
    tools: HashMap<String, InterruptConfig>,
}

impl InterruptPolicy {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Gate `tool` with `config`.
    #[must_use]
    pub fn gate(mut self, tool: impl Into<String>, config: InterruptConfig) -> Self {
        self.tools.insert(tool.into(), config);
        self
    }

    /// Settings for `tool` when it is gated.
    #[must_use]
    pub fn get(&self, tool: &str) -> Option<&InterruptConfig> {
        self.tools.get(tool).filter(|config| config.enabled)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.tools.values().any(|config| config.enabled)
    }
}

/// Result of an approval request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "behavior", rename_all = "snake_case")]
pub enum ApprovalResult {
    /// Run the call, possibly with edited arguments.
    Allow { updated_input: Value },
    /// Skip the call and answer it with `message`.
    Deny { message: String },
}

#[derive(Debug, Error)]
pub enum ApprovalError {
    #[error("Approval service unavailable")]
    ServiceUnavailable,
    #[error("Approval request failed: {0}")]
    RequestFailed(String),
    #[error("Approval request timed out")]
    TimedOut,
}

/// Decides on gated tool calls.
#[async_trait]
pub trait ApprovalHandler: Send + Sync {
    async fn request_approval(
        &self,
        tool_name: &str,
        tool_input: Value,
        tool_call_id: &str,
        config: &InterruptConfig,
    ) -> Result<ApprovalResult, ApprovalError>;
}

/// Approves everything, logging each gated call.
#[derive(Debug, Default, Clone)]
pub struct AutoApproveHandler;

#[async_trait]
impl ApprovalHandler for AutoApproveHandler {
    async fn request_approval(
        &self,
        tool_name: &str,
        tool_input: Value,
        tool_call_id: &str,
        _config: &InterruptConfig,
    ) -> Result<ApprovalResult, ApprovalError> {
        tracing::warn!(tool = tool_name, tool_call_id, "No approval handler, auto-approving");
        Ok(ApprovalResult::Allow {
            updated_input: tool_input,
        })
    }
}

/// Sends gated calls to an [`ApprovalHandler`] before they run.
pub struct InterruptMiddleware {
    policy: InterruptPolicy,
    handler: Arc<dyn ApprovalHandler>,
}

impl InterruptMiddleware {
    #[must_use]
    pub fn new(policy: InterruptPolicy, handler: Arc<dyn ApprovalHandler>) -> Self {
        Self { policy, handler }
    }

    #[must_use]
    pub const fn policy(&self) -> &InterruptPolicy {
        &self.policy
    }
}

#[async_trait]
impl AgentMiddleware for InterruptMiddleware {
    fn name(&self) -> &str {
        "interrupt"
    }

    async fn wrap_tool_call(
        &self,
        mut request: ToolCallRequest,
        next: Next<'_>,
    ) -> Result<ToolOutput, ToolError> {
        let Some(config) = self.policy.get(&request.call.name) else {
            return next.run(request).await;
        };

        let call = &request.call;
        let result = self
            .handler
            .request_approval(&call.name, call.args.clone(), &call.id, config)
            .await
            .map_err(|e| ToolError::Failed(e.to_string()))?;

        match result {
            ApprovalResult::Allow { updated_input } => {
                if updated_input != call.args {
                    if !config.allows(Decision::Edit) {
                        return Ok(ToolOutput::text(
                            &request.ctx,
                            &call.name,
                            format!("Error: editing arguments is not allowed for {}", call.name),
                        ));
                    }
                    tracing::debug!(tool = %call.name, "Running tool with edited arguments");
                    request.call.args = updated_input;
                }
                next.run(request).await
            }
            ApprovalResult::Deny { message } => {
                tracing::debug!(tool = %call.name, tool_call_id = %call.id, "Tool call denied");
                Ok(ToolOutput::text(&request.ctx, &call.name, message))
            }
        }
    }
}
