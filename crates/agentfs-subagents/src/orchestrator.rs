//! Delegates tasks to isolated subagents and folds their results back.

use std::{collections::HashMap, sync::Arc};

use agentfs_core::{
    EXCLUDED_STATE_KEYS, ExecutionContext, Message, SessionState, StateDelta, ToolMessage,
    diff_files,
};
use agentfs_tools::{AgentMiddleware, Tool, ToolError, ToolOutput, parse_args};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;

use crate::{
    agent::{AgentExecutor, ExecutorConfig, ExecutorError},
    approvals::{ApprovalHandler, AutoApproveHandler, InterruptMiddleware, InterruptPolicy},
    model::ChatModel,
    spec::{CompiledSubagent, SubagentSpec},
};

pub const TASK: &str = "task";
pub const GENERAL_PURPOSE: &str = "general-purpose";

pub const DEFAULT_SUBAGENT_PROMPT: &str = "In order to complete the objective that the user asks of you, you have access to a number of standard tools.";

pub const GENERAL_PURPOSE_DESCRIPTION: &str = "General-purpose agent for researching complex questions, searching for files and content, and executing multi-step tasks. When you are searching for a keyword or file and are not confident that you will find the right match in the first few tries use this agent to perform the search for you. This agent has access to all of the same tools as the main agent.";

/// Default `task` tool description. `{available_agents}` is replaced by the
/// agent list.
pub const TASK_TOOL_DESCRIPTION: &str = "Launch an ephemeral subagent to handle a complex, multi-step task in an isolated context.

Available agent types and the tools they have access to:
{available_agents}

The subagent starts with only your description of the task and returns a single final report. Describe the task in full and say exactly what the report should contain. Launch several agents at once when tasks are independent.";

const PLACEHOLDER: &str = "{available_agents}";

/// Errors building a [`SubagentOrchestrator`].
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Two subagents share a name. The general-purpose subagent counts.
    #[error("Duplicate subagent name: {0}")]
    DuplicateSubagent(String),
}

/// Errors raised by [`SubagentOrchestrator::task`].
///
/// An unknown subagent type is not an error; it is answered with a tool
/// message so the model can retry.
#[derive(Debug, Error)]
pub enum TaskError {
    /// The execution context carried no tool-call id to reply to.
    #[error("Tool call ID is required for subagent invocation")]
    MissingToolCallId,
    /// The subagent run itself failed.
    #[error("Subagent {name} failed: {source}")]
    Subagent {
        name: String,
        #[source]
        source: ExecutorError,
    },
}

/// Builder for [`SubagentOrchestrator`].
pub struct OrchestratorBuilder {
    default_model: Arc<dyn ChatModel>,
    default_tools: Vec<Arc<dyn Tool>>,
    default_middleware: Vec<Arc<dyn AgentMiddleware>>,
    default_interrupt_on: Option<InterruptPolicy>,
    approval_handler: Arc<dyn ApprovalHandler>,
    general_purpose: bool,
    task_description: Option<String>,
    executor_config: ExecutorConfig,
    specs: Vec<SubagentSpec>,
    compiled: Vec<CompiledSubagent>,
}

impl OrchestratorBuilder {
    #[must_use]
    pub fn default_tools(mut self, tools: Vec<Arc<dyn Tool>>) -> Self {
        self.default_tools = tools;
        self
    }

    /// Middleware applied to every built subagent, before its own.
    #[must_use]
    pub fn default_middleware(mut self, middleware: Vec<Arc<dyn AgentMiddleware>>) -> Self {
        self.default_middleware = middleware;
        self
    }

    #[must_use]
    pub fn default_interrupt_on(mut self, policy: InterruptPolicy) -> Self {
        self.default_interrupt_on = Some(policy);
        self
    }

    #[must_use]
    pub fn approval_handler(mut self, handler: Arc<dyn ApprovalHandler>) -> Self {
        self.approval_handler = handler;
        self
    }

    /// Include the built-in general-purpose subagent. On by default.
    #[must_use]
    pub const fn general_purpose(mut self, enabled: bool) -> Self {
        self.general_purpose = enabled;
        self
    }

    #[must_use]
    pub fn task_description(mut self, description: impl Into<String>) -> Self {
        self.task_description = Some(description.into());
        self
    }

    #[must_use]
    pub const fn executor_config(mut self, config: ExecutorConfig) -> Self {
        self.executor_config = config;
        self
    }

    #[must_use]
    pub fn subagent(mut self, spec: SubagentSpec) -> Self {
        self.specs.push(spec);
        self
    }

    #[must_use]
    pub fn compiled(mut self, subagent: CompiledSubagent) -> Self {
        self.compiled.push(subagent);
        self
    }

    fn compile(&self, spec: SubagentSpec) -> CompiledSubagent {
        let model = spec.model.unwrap_or_else(|| Arc::clone(&self.default_model));
        let tools = spec.tools.unwrap_or_else(|| self.default_tools.clone());

        let mut executor = AgentExecutor::new(model)
            .with_system_prompt(spec.system_prompt)
            .with_tools(tools)
            .with_config(self.executor_config);
        for middleware in self.default_middleware.iter().chain(&spec.middleware) {
            executor = executor.with_middleware(Arc::clone(middleware));
        }
        let interrupt_on = spec.interrupt_on.or_else(|| self.default_interrupt_on.clone());
        if let Some(policy) = interrupt_on.filter(|p| !p.is_empty()) {
            executor = executor.with_middleware(Arc::new(InterruptMiddleware::new(
                policy,
                Arc::clone(&self.approval_handler),
            )));
        }

        CompiledSubagent::new(spec.name, spec.description, Arc::new(executor))
    }

    /// Compile every spec.
    ///
    /// # Errors
    /// Returns [`OrchestratorError::DuplicateSubagent`] when two subagents,
    /// including the general-purpose one, share a name.
    pub fn build(mut self) -> Result<SubagentOrchestrator, OrchestratorError> {
        let mut specs = std::mem::take(&mut self.specs);
        if self.general_purpose {
            specs.insert(
                0,
                SubagentSpec::new(GENERAL_PURPOSE, GENERAL_PURPOSE_DESCRIPTION, DEFAULT_SUBAGENT_PROMPT),
            );
        }

        let mut agents: Vec<CompiledSubagent> = Vec::new();
        let mut index = HashMap::new();
        let compiled = std::mem::take(&mut self.compiled);
        let built = specs.into_iter().map(|spec| self.compile(spec)).collect::<Vec<_>>();
        for agent in built.into_iter().chain(compiled) {
            if index.contains_key(&agent.name) {
                return Err(OrchestratorError::DuplicateSubagent(agent.name));
            }
            index.insert(agent.name.clone(), agents.len());
            agents.push(agent);
        }

        let listing = agents
            .iter()
            .map(|a| format!("- {}: {}", a.name, a.description))
            .collect::<Vec<_>>()
            .join("\n");
        let description = match self.task_description {
            Some(custom) if custom.contains(PLACEHOLDER) => custom.replace(PLACEHOLDER, &listing),
            Some(custom) => custom,
            None => TASK_TOOL_DESCRIPTION.replace(PLACEHOLDER, &listing),
        };

        tracing::debug!(subagents = agents.len(), "Built subagent orchestrator");
        Ok(SubagentOrchestrator {
            agents,
            index,
            description,
        })
    }
}

/// Registry of subagents and the `task` operation.
pub struct SubagentOrchestrator {
    agents: Vec<CompiledSubagent>,
    index: HashMap<String, usize>,
    description: String,
}

impl SubagentOrchestrator {
    #[must_use]
    pub fn builder(default_model: Arc<dyn ChatModel>) -> OrchestratorBuilder {
        OrchestratorBuilder {
            default_model,
            default_tools: Vec::new(),
            default_middleware: Vec::new(),
            default_interrupt_on: None,
            approval_handler: Arc::new(AutoApproveHandler),
            general_purpose: true,
            task_description: None,
            executor_config: ExecutorConfig::default(),
            specs: Vec::new(),
            compiled: Vec::new(),
        }
    }

    /// Subagent names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.agents.iter().map(|a| a.name.as_str())
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&CompiledSubagent> {
        self.index.get(name).map(|&i| &self.agents[i])
    }

    /// Description for the `task` tool.
    #[must_use]
    pub fn task_description(&self) -> &str {
        &self.description
    }

    /// Run `description` on the subagent named `subagent_type`.
    ///
    /// An unknown type is answered with a tool message listing the valid
    /// types. Otherwise the subagent sees only the parent's files and extra
    /// state plus the description, and its final message comes back as the
    /// tool result together with what it changed.
    ///
    /// # Errors
    /// Returns [`TaskError::MissingToolCallId`] when `ctx` carries no call id,
    /// and [`TaskError::Subagent`] when the subagent run fails.
    pub async fn task(
        &self,
        description: &str,
        subagent_type: &str,
        ctx: &ExecutionContext,
    ) -> Result<ToolOutput, TaskError> {
        let Some(agent) = self.get(subagent_type) else {
            let allowed = self
                .names()
                .map(|name| format!("`{name}`"))
                .collect::<Vec<_>>()
                .join(", ");
            return Ok(ToolOutput::text(
                ctx,
                TASK,
                format!(
                    "We cannot invoke subagent {subagent_type} because it does not exist, the only allowed types are {allowed}"
                ),
            ));
        };
        let tool_call_id = ctx.tool_call_id.clone().ok_or(TaskError::MissingToolCallId)?;

        tracing::info!(subagent = %agent.name, tool_call_id = %tool_call_id, "Invoking subagent");
        let child = carve_out(&ctx.state, description);
        let result = agent
            .executor
            .invoke(child)
            .await
            .map_err(|source| TaskError::Subagent {
                name: agent.name.clone(),
                source,
            })?;

        let delta = reconcile(&ctx.state, &result, tool_call_id);
        tracing::info!(
            subagent = %agent.name,
            files_changed = delta.files.len(),
            "Subagent finished"
        );
        Ok(ToolOutput::Update(delta))
    }
}

impl std::fmt::Debug for SubagentOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// Child state: parent files and extra keys, one human message, no todos.
fn carve_out(parent: &SessionState, description: &str) -> SessionState {
    SessionState {
        messages: vec![Message::human(description)],
        todos: Vec::new(),
        files: parent.files.clone(),
        extra: parent
            .extra
            .iter()
            .filter(|(key, _)| !EXCLUDED_STATE_KEYS.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect(),
    }
}

/// What the child changed, plus its final message as the tool result.
fn reconcile(parent: &SessionState, child: &SessionState, tool_call_id: String) -> StateDelta {
    let report = child.last_message().map(Message::text).unwrap_or_default();

    let mut extra: std::collections::BTreeMap<String, Value> = child
        .extra
        .iter()
        .filter(|(key, _)| !EXCLUDED_STATE_KEYS.contains(&key.as_str()))
        .filter(|(key, value)| parent.extra.get(*key) != Some(*value))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    for key in parent.extra.keys() {
        if !child.extra.contains_key(key) && !EXCLUDED_STATE_KEYS.contains(&key.as_str()) {
            extra.insert(key.clone(), Value::Null);
        }
    }

    StateDelta {
        messages: vec![Message::Tool(
            ToolMessage::new(tool_call_id, report).with_name(TASK),
        )],
        files: diff_files(&parent.files, &child.files),
        todos: None,
        extra,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskArgs {
    pub description: String,
    pub subagent_type: String,
}

/// The `task` tool.
pub struct TaskTool {
    orchestrator: Arc<SubagentOrchestrator>,
}

impl TaskTool {
    #[must_use]
    pub const fn new(orchestrator: Arc<SubagentOrchestrator>) -> Self {
        Self { orchestrator }
    }
}

#[async_trait]
impl Tool for TaskTool {
    fn name(&self) -> &str {
        TASK
    }

    fn description(&self) -> &str {
        self.orchestrator.task_description()
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "description": { "type": "string", "description": "Full task for the subagent" },
                "subagent_type": {
                    "type": "string",
                    "enum": self.orchestrator.names().collect::<Vec<_>>()
                }
            },
            "required": ["description", "subagent_type"]
        })
    }

    async fn call(&self, args: Value, ctx: &ExecutionContext) -> Result<ToolOutput, ToolError> {
        let args: TaskArgs = parse_args(TASK, args)?;
        self.orchestrator
            .task(&args.description, &args.subagent_type, ctx)
            .await
            .map_err(|e| match e {
                TaskError::MissingToolCallId => {
                    ToolError::MissingToolCallId("subagent invocation".to_string())
                }
                TaskError::Subagent { .. } => ToolError::Failed(e.to_string()),
            })
    }
}

/// Contributes the `task` tool.
pub struct SubagentMiddleware {
    orchestrator: Arc<SubagentOrchestrator>,
}

impl SubagentMiddleware {
    #[must_use]
    pub const fn new(orchestrator: Arc<SubagentOrchestrator>) -> Self {
        Self { orchestrator }
    }

    #[must_use]
    pub const fn orchestrator(&self) -> &Arc<SubagentOrchestrator> {
        &self.orchestrator
    }
}

#[async_trait]
impl AgentMiddleware for SubagentMiddleware {
    fn name(&self) -> &str {
        "subagents"
    }

    fn tools(&self) -> Vec<Arc<dyn Tool>> {
        vec![Arc::new(TaskTool::new(Arc::clone(&self.orchestrator)))]
    }
}
