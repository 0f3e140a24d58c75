//! Assembles a top-level agent with filesystem and subagent support.

use std::sync::Arc;

use agentfs_backends::StateBackend;
use agentfs_core::BackendSource;
use agentfs_tools::{
    AgentMiddleware, EvictionConfig, FilesystemMiddleware, PatchToolCallsMiddleware, Tool,
};

use crate::{
    agent::{AgentExecutor, ExecutorConfig},
    approvals::{ApprovalHandler, AutoApproveHandler, InterruptMiddleware, InterruptPolicy},
    model::ChatModel,
    orchestrator::{OrchestratorError, SubagentMiddleware, SubagentOrchestrator},
    spec::{CompiledSubagent, SubagentSpec},
};

/// Builds an [`AgentExecutor`] wired with, in order: filesystem tools and
/// eviction, the `task` tool, dangling-call repair, then caller middleware.
///
/// Subagents get the same filesystem and repair middleware over the same
/// backend source.
pub struct AgentBuilder {
    model: Arc<dyn ChatModel>,
    backend: BackendSource,
    system_prompt: Option<String>,
    tools: Vec<Arc<dyn Tool>>,
    middleware: Vec<Arc<dyn AgentMiddleware>>,
    subagents: Vec<SubagentSpec>,
    compiled: Vec<CompiledSubagent>,
    eviction: Option<EvictionConfig>,
    interrupt_on: Option<InterruptPolicy>,
    approval_handler: Arc<dyn ApprovalHandler>,
    config: ExecutorConfig,
}

impl AgentBuilder {
    /// Start with files kept in session state.
    #[must_use]
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self {
            model,
            backend: StateBackend::source(),
            system_prompt: None,
            tools: Vec::new(),
            middleware: Vec::new(),
            subagents: Vec::new(),
            compiled: Vec::new(),
            eviction: Some(EvictionConfig::default()),
            interrupt_on: None,
            approval_handler: Arc::new(AutoApproveHandler),
            config: ExecutorConfig::default(),
        }
    }

    #[must_use]
    pub fn backend(mut self, backend: BackendSource) -> Self {
        self.backend = backend;
        self
    }

    #[must_use]
    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    #[must_use]
    pub fn tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.push(tool);
        self
    }

    #[must_use]
    pub fn middleware(mut self, middleware: Arc<dyn AgentMiddleware>) -> Self {
        self.middleware.push(middleware);
        self
    }

    #[must_use]
    pub fn subagent(mut self, spec: SubagentSpec) -> Self {
        self.subagents.push(spec);
        self
    }

    #[must_use]
    pub fn compiled_subagent(mut self, subagent: CompiledSubagent) -> Self {
        self.compiled.push(subagent);
        self
    }

    /// `None` keeps every tool result inline.
    #[must_use]
    pub fn eviction(mut self, config: Option<EvictionConfig>) -> Self {
        self.eviction = config;
        self
    }

    #[must_use]
    pub fn interrupt_on(mut self, policy: InterruptPolicy) -> Self {
        self.interrupt_on = Some(policy);
        self
    }

    #[must_use]
    pub fn approval_handler(mut self, handler: Arc<dyn ApprovalHandler>) -> Self {
        self.approval_handler = handler;
        self
    }

    #[must_use]
    pub const fn config(mut self, config: ExecutorConfig) -> Self {
        self.config = config;
        self
    }

    fn filesystem(&self) -> Arc<dyn AgentMiddleware> {
        let middleware = FilesystemMiddleware::new(self.backend.clone());
        Arc::new(match &self.eviction {
            Some(config) => middleware.with_eviction(config.clone()),
            None => middleware.without_eviction(),
        })
    }

    /// Build the agent.
    ///
    /// # Errors
    /// Returns [`OrchestratorError::DuplicateSubagent`] for clashing subagent
    /// names.
    pub fn build(self) -> Result<AgentExecutor, OrchestratorError> {
        let filesystem = self.filesystem();
        let patch: Arc<dyn AgentMiddleware> = Arc::new(PatchToolCallsMiddleware);

        let mut orchestrator = SubagentOrchestrator::builder(Arc::clone(&self.model))
            .default_tools(self.tools.clone())
            .default_middleware(vec![Arc::clone(&filesystem), Arc::clone(&patch)])
            .approval_handler(Arc::clone(&self.approval_handler))
            .executor_config(self.config);
        if let Some(policy) = &self.interrupt_on {
            orchestrator = orchestrator.default_interrupt_on(policy.clone());
        }
        for spec in self.subagents {
            orchestrator = orchestrator.subagent(spec);
        }
        for subagent in self.compiled {
            orchestrator = orchestrator.compiled(subagent);
        }
        let orchestrator = Arc::new(orchestrator.build()?);

        let mut executor = AgentExecutor::new(self.model)
            .with_tools(self.tools)
            .with_config(self.config)
            .with_middleware(filesystem)
            .with_middleware(Arc::new(SubagentMiddleware::new(orchestrator)))
            .with_middleware(patch);
        if let Some(prompt) = self.system_prompt {
            executor = executor.with_system_prompt(prompt);
        }
        for middleware in self.middleware {
            executor = executor.with_middleware(middleware);
        }
        if let Some(policy) = self.interrupt_on.filter(|p| !p.is_empty()) {
            executor = executor.with_middleware(Arc::new(InterruptMiddleware::new(
                policy,
                self.approval_handler,
            )));
        }
        Ok(executor)
    }
}
