//! Subagent definitions.

use std::sync::Arc;

use agentfs_tools::{AgentMiddleware, Tool};

use crate::{agent::TaskExecutor, approvals::InterruptPolicy, model::ChatModel};

/// A subagent to be built by the orchestrator.
///
/// Unset tools, model and interrupt policy fall back to the orchestrator's
/// defaults. Middleware is appended after the default middleware.
#[derive(Clone)]
pub struct SubagentSpec {
    pub name: String,
    pub description: String,
    pub system_prompt: String,
    pub tools: Option<Vec<Arc<dyn Tool>>>,
    pub model: Option<Arc<dyn ChatModel>>,
    pub middleware: Vec<Arc<dyn AgentMiddleware>>,
    pub interrupt_on: Option<InterruptPolicy>,
}

impl SubagentSpec {
    /// A subagent with the orchestrator's default tools and model.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            system_prompt: system_prompt.into(),
            tools: None,
            model: None,
            middleware: Vec::new(),
            interrupt_on: None,
        }
    }

    #[must_use]
    pub fn with_tools(mut self, tools: Vec<Arc<dyn Tool>>) -> Self {
        self.tools = Some(tools);
        self
    }

    #[must_use]
    pub fn with_model(mut self, model: Arc<dyn ChatModel>) -> Self {
        self.model = Some(model);
        self
    }

    #[must_use]
    pub fn with_middleware(mut self, middleware: Arc<dyn AgentMiddleware>) -> Self {
        self.middleware.push(middleware);
        self
    }

    #[must_use]
    pub fn with_interrupt_on(mut self, policy: InterruptPolicy) -> Self {
        self.interrupt_on = Some(policy);
        self
    }
}

impl std::fmt::Debug for SubagentSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubagentSpec")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("tools", &self.tools.as_ref().map(Vec::len))
            .field("middleware", &self.middleware.len())
            .finish_non_exhaustive()
    }
}

/// A ready-made subagent.
#[derive(Clone)]
pub struct CompiledSubagent {
    pub name: String,
    pub description: String,
    pub executor: Arc<dyn TaskExecutor>,
}

impl CompiledSubagent {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        executor: Arc<dyn TaskExecutor>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            executor,
        }
    }
}

impl std::fmt::Debug for CompiledSubagent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledSubagent")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}
