//! Agent loop and subagent delegation.
//!
//! - [`AgentExecutor`] - calls a [`ChatModel`] and dispatches its tool calls
//!   through the middleware chain until a final answer
//! - [`SubagentOrchestrator`] - runs tasks on isolated subagents and
//!   reconciles what they changed
//! - [`InterruptMiddleware`] - approval gating for selected tools
//! - [`AgentBuilder`] - a ready-wired top-level agent

mod agent;
pub mod approvals;
mod builder;
mod model;
mod orchestrator;
mod spec;

pub use agent::{AgentExecutor, ExecutorConfig, ExecutorError, TaskExecutor};
pub use approvals::{
    ApprovalError, ApprovalHandler, ApprovalResult, AutoApproveHandler, Decision, InterruptConfig,
    InterruptMiddleware, InterruptPolicy,
};
pub use builder::AgentBuilder;
pub use model::{ChatModel, ModelError, ModelRequest, ModelResponse};
pub use orchestrator::{
    DEFAULT_SUBAGENT_PROMPT, GENERAL_PURPOSE, GENERAL_PURPOSE_DESCRIPTION, OrchestratorBuilder,
    OrchestratorError, SubagentMiddleware, SubagentOrchestrator, TASK, TASK_TOOL_DESCRIPTION,
    TaskArgs, TaskError, TaskTool,
};
pub use spec::{CompiledSubagent, SubagentSpec};
