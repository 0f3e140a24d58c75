//! Prefix routing across several backends.

use std::{collections::BTreeMap, sync::Arc};

use agentfs_core::{
    Backend, BackendError, EditResult, Execute, FileInfo, GrepMatch, VirtualPath, WriteResult,
};
use async_trait::async_trait;

struct Route {
    /// Always ends with `/`.
    prefix: String,
    backend: Arc<dyn Backend>,
}

/// Routes each call to the backend registered under the longest matching
/// path prefix, falling back to a default backend.
///
/// Paths are forwarded unchanged, so a routed backend sees full virtual paths.
pub struct CompositeBackend {
    default: Arc<dyn Backend>,
    routes: Vec<Route>,
}

impl CompositeBackend {
    /// Create a composite with only a default backend.
    #[must_use]
    pub fn new(default: Arc<dyn Backend>) -> Self {
        Self {
            default,
            routes: Vec::new(),
        }
    }

    /// Register `backend` for paths under `prefix`.
    #[must_use]
    pub fn route(mut self, prefix: impl Into<String>, backend: Arc<dyn Backend>) -> Self {
        let mut prefix = prefix.into();
        if !prefix.ends_with('/') {
            prefix.push('/');
        }
        self.routes.push(Route { prefix, backend });
        self
    }

    /// The fallback backend.
    #[must_use]
    pub fn default_backend(&self) -> &Arc<dyn Backend> {
        &self.default
    }

    /// Registered prefixes in registration order.
    pub fn prefixes(&self) -> impl Iterator<Item = &str> {
        self.routes.iter().map(|route| route.prefix.as_str())
    }

    /// Index of the route owning `path`; `None` means the default backend.
    ///
    /// The longest matching prefix wins; equal lengths keep the earliest
    /// registration. A path equal to a prefix without its trailing `/` also
    /// matches that prefix.
    fn owner(&self, path: &str) -> Option<usize> {
        let mut best: Option<(usize, usize)> = None;
        for (i, route) in self.routes.iter().enumerate() {
            let matches = path.starts_with(&route.prefix)
                || path == route.prefix.trim_end_matches('/');
            if matches && best.is_none_or(|(_, len)| route.prefix.len() > len) {
                best = Some((i, route.prefix.len()));
            }
        }
        best.map(|(i, _)| i)
    }

    fn backend_at(&self, owner: Option<usize>) -> &Arc<dyn Backend> {
        owner.map_or(&self.default, |i| &self.routes[i].backend)
    }

    /// The backend that serves `path`.
    #[must_use]
    pub fn resolve(&self, path: &str) -> &Arc<dyn Backend> {
        let owner = self.owner(path);
        tracing::debug!(
            path,
            route = owner.map_or("<default>", |i| self.routes[i].prefix.as_str()),
            "Resolved backend"
        );
        self.backend_at(owner)
    }

    /// Backends to consult for a search rooted at `base`: the owner of
    /// `base` plus every route nested below it.
    fn search_targets(&self, base: &VirtualPath) -> Vec<Option<usize>> {
        let mut targets = vec![self.owner(base)];
        let dir = base.as_dir_prefix();
        for (i, route) in self.routes.iter().enumerate() {
            if route.prefix.starts_with(&dir) && route.prefix != dir && !targets.contains(&Some(i))
            {
                targets.push(Some(i));
            }
        }
        targets
    }

    /// Immediate child directories of `path` implied by nested route prefixes.
    fn route_dirs_under(&self, path: &VirtualPath) -> Vec<String> {
        let dir = path.as_dir_prefix();
        self.routes
            .iter()
            .filter_map(|route| {
                let rest = route.prefix.strip_prefix(&dir)?;
                let child = rest.split('/').next().filter(|c| !c.is_empty())?;
                Some(format!("{dir}{child}/"))
            })
            .collect()
    }
}

#[async_trait]
impl Backend for CompositeBackend {
    async fn ls(&self, path: &VirtualPath) -> Result<Vec<FileInfo>, BackendError> {
        let mut entries = self.resolve(path).ls(path).await?;
        for dir in self.route_dirs_under(path) {
            if !entries.iter().any(|entry| entry.path == dir) {
                entries.push(FileInfo::dir(dir));
            }
        }
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    async fn read(
        &self,
        path: &VirtualPath,
        offset: usize,
        limit: usize,
    ) -> Result<String, BackendError> {
        self.resolve(path).read(path, offset, limit).await
    }

    async fn write(&self, path: &VirtualPath, content: &str) -> Result<WriteResult, BackendError> {
        self.resolve(path).write(path, content).await
    }

    async fn edit(
        &self,
        path: &VirtualPath,
        old: &str,
        new: &str,
        replace_all: bool,
    ) -> Result<EditResult, BackendError> {
        self.resolve(path).edit(path, old, new, replace_all).await
    }

    async fn glob(&self, pattern: &str, path: &VirtualPath) -> Result<Vec<FileInfo>, BackendError> {
        let mut merged = BTreeMap::new();
        for target in self.search_targets(path) {
            for info in self.backend_at(target).glob(pattern, path).await? {
                if self.owner(&info.path) == target {
                    merged.entry(info.path.clone()).or_insert(info);
                }
            }
        }
        Ok(merged.into_values().collect())
    }

    async fn grep(
        &self,
        pattern: &str,
        path: Option<&VirtualPath>,
        glob: Option<&str>,
    ) -> Result<Vec<GrepMatch>, BackendError> {
        let root = VirtualPath::root();
        let base = path.unwrap_or(&root);

        let mut matches = Vec::new();
        for target in self.search_targets(base) {
            let found = self.backend_at(target).grep(pattern, path, glob).await?;
            matches.extend(found.into_iter().filter(|m| self.owner(&m.path) == target));
        }
        matches.sort_by(|a, b| a.path.cmp(&b.path).then(a.line.cmp(&b.line)));
        matches.dedup();
        Ok(matches)
    }

    fn execution(&self) -> Option<&dyn Execute> {
        self.default.execution()
    }
}
