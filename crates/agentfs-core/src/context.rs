//! Execution context handed to tools and backend factories.

use std::{collections::HashMap, fmt, sync::Arc};

use serde_json::Value;

use crate::{state::SessionState, traits::Backend};

/// Per-call context for tool execution.
///
/// Carries a snapshot of the session state, the id of the tool call being
/// served, and arbitrary metadata for app-specific needs.
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    /// Session state as of the start of the call.
    pub state: Arc<SessionState>,

    /// Id of the tool call being served, if any.
    pub tool_call_id: Option<String>,

    /// Arbitrary metadata for app-specific needs.
    pub metadata: HashMap<String, Value>,
}

impl ExecutionContext {
    /// Create a context over a state snapshot.
    #[must_use]
    pub fn new(state: Arc<SessionState>) -> Self {
        Self {
            state,
            tool_call_id: None,
            metadata: HashMap::new(),
        }
    }

    /// Create a context with metadata.
    #[must_use]
    pub fn with_metadata(state: Arc<SessionState>, metadata: HashMap<String, Value>) -> Self {
        Self {
            state,
            tool_call_id: None,
            metadata,
        }
    }

    /// The same context serving a specific tool call.
    #[must_use]
    pub fn for_tool_call(&self, tool_call_id: impl Into<String>) -> Self {
        Self {
            state: Arc::clone(&self.state),
            tool_call_id: Some(tool_call_id.into()),
            metadata: self.metadata.clone(),
        }
    }

    /// Get a metadata value by key.
    #[must_use]
    pub fn get_metadata(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }

    /// Set a metadata value.
    pub fn set_metadata(&mut self, key: impl Into<String>, value: Value) {
        self.metadata.insert(key.into(), value);
    }
}

/// Builds a backend for the current call.
pub type BackendFactory = Arc<dyn Fn(&ExecutionContext) -> Arc<dyn Backend> + Send + Sync>;

/// Where a tool gets its backend from.
#[derive(Clone)]
pub enum BackendSource {
    /// A shared, long-lived backend.
    Instance(Arc<dyn Backend>),
    /// A backend built per call, e.g. over the call's state snapshot.
    Factory(BackendFactory),
}

impl BackendSource {
    /// Wrap a factory closure.
    pub fn factory<F>(f: F) -> Self
    where
        F: Fn(&ExecutionContext) -> Arc<dyn Backend> + Send + Sync + 'static,
    {
        Self::Factory(Arc::new(f))
    }

    /// The backend to use for `ctx`.
    #[must_use]
    pub fn resolve(&self, ctx: &ExecutionContext) -> Arc<dyn Backend> {
        match self {
            Self::Instance(backend) => Arc::clone(backend),
            Self::Factory(factory) => factory(ctx),
        }
    }
}

impl From<Arc<dyn Backend>> for BackendSource {
    fn from(backend: Arc<dyn Backend>) -> Self {
        Self::Instance(backend)
    }
}

impl fmt::Debug for BackendSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Instance(_) => f.write_str("BackendSource::Instance"),
            Self::Factory(_) => f.write_str("BackendSource::Factory"),
        }
    }
}
