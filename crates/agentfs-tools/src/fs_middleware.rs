//! Filesystem tools plus large-result eviction as one middleware.

use std::{collections::HashMap, sync::Arc};

use agentfs_core::{BackendSource, ExecutionContext};
use async_trait::async_trait;

use crate::{
    evict::{EvictionConfig, ToolResultEvictor},
    filesystem::{EXECUTE, FsBinding, filesystem_tools},
    middleware::{AgentMiddleware, Next, ToolCallRequest},
    tool::{Tool, ToolError, ToolOutput, ToolSpec},
    tree::DirectoryTreeTool,
};

/// Contributes the filesystem tools and evicts oversized results of any
/// other tool into the same backend.
pub struct FilesystemMiddleware {
    binding: FsBinding,
    descriptions: HashMap<String, String>,
    evictor: Option<ToolResultEvictor>,
}

impl FilesystemMiddleware {
    /// Middleware over `backend` with default eviction.
    #[must_use]
    pub fn new(backend: BackendSource) -> Self {
        Self {
            binding: FsBinding::new(backend),
            descriptions: HashMap::new(),
            evictor: Some(ToolResultEvictor::default()),
        }
    }

    #[must_use]
    pub fn with_eviction(mut self, config: EvictionConfig) -> Self {
        self.evictor = Some(ToolResultEvictor::new(config));
        self
    }

    #[must_use]
    pub fn without_eviction(mut self) -> Self {
        self.evictor = None;
        self
    }

    /// Override tool descriptions by tool name.
    #[must_use]
    pub fn with_tool_descriptions(mut self, descriptions: HashMap<String, String>) -> Self {
        self.descriptions = descriptions;
        self
    }

    #[must_use]
    pub fn with_allowed_prefixes(mut self, prefixes: Vec<String>) -> Self {
        self.binding = self.binding.with_allowed_prefixes(prefixes);
        self
    }

    #[must_use]
    pub const fn binding(&self) -> &FsBinding {
        &self.binding
    }
}

#[async_trait]
impl AgentMiddleware for FilesystemMiddleware {
    fn name(&self) -> &str {
        "filesystem"
    }

    fn tools(&self) -> Vec<Arc<dyn Tool>> {
        let mut tools = filesystem_tools(&self.binding, &self.descriptions);
        tools.push(Arc::new(DirectoryTreeTool::new(self.binding.clone())));
        tools
    }

    fn filter_tools(&self, ctx: &ExecutionContext, specs: Vec<ToolSpec>) -> Vec<ToolSpec> {
        if self.binding.resolve(ctx).execution().is_some() {
            return specs;
        }
        specs.into_iter().filter(|spec| spec.name != EXECUTE).collect()
    }

    async fn wrap_tool_call(
        &self,
        request: ToolCallRequest,
        next: Next<'_>,
    ) -> Result<ToolOutput, ToolError> {
        let Some(evictor) = &self.evictor else {
            return next.run(request).await;
        };
        if evictor.is_exempt(request.tool.name()) {
            return next.run(request).await;
        }

        let ctx = request.ctx.clone();
        let output = next.run(request).await?;
        let backend = self.binding.resolve(&ctx);
        let (output, records) = evictor.process(output, backend.as_ref()).await;
        for record in &records {
            tracing::debug!(
                tool_call_id = %record.tool_call_id,
                path = %record.path,
                "Tool result replaced with pointer"
            );
        }
        Ok(output)
    }
}
