//! Backend over the session file table.

use std::{collections::BTreeSet, sync::Arc};

use agentfs_core::{
    Backend, BackendError, BackendSource, EditResult, ExecutionContext, FileDelta, FileInfo,
    FileRecord, FileTable, FileUpdate, GrepMatch, SessionState, VirtualPath, WriteResult,
    format::{format_read, perform_string_replacement},
};
use async_trait::async_trait;

use crate::search::{compile_glob, compile_regex, file_filter_matches, grep_content, relative_to};

/// Files held in session state.
///
/// Reads see the snapshot the backend was built from. Writes and edits never
/// touch that snapshot; they return a [`FileDelta`] for the caller to merge
/// into the session.
#[derive(Debug, Clone, Default)]
pub struct StateBackend {
    state: Arc<SessionState>,
}

impl StateBackend {
    /// Build over the state carried by `ctx`.
    #[must_use]
    pub fn new(ctx: &ExecutionContext) -> Self {
        Self {
            state: Arc::clone(&ctx.state),
        }
    }

    /// Build over a bare file table.
    #[must_use]
    pub fn from_files(files: FileTable) -> Self {
        Self {
            state: Arc::new(SessionState {
                files,
                ..SessionState::default()
            }),
        }
    }

    /// A source that builds a fresh backend for every call.
    #[must_use]
    pub fn source() -> BackendSource {
        BackendSource::factory(|ctx| -> Arc<dyn Backend> { Arc::new(Self::new(ctx)) })
    }

    fn files(&self) -> &FileTable {
        &self.state.files
    }

    fn record(&self, path: &VirtualPath) -> Result<&FileRecord, BackendError> {
        self.files()
            .get(path.as_str())
            .ok_or_else(|| BackendError::NotFound(path.to_string()))
    }

    fn files_under<'a>(
        &'a self,
        base: &'a VirtualPath,
    ) -> impl Iterator<Item = (&'a str, &'a str, &'a FileRecord)> + 'a {
        self.files().iter().filter_map(move |(path, record)| {
            relative_to(base, path).map(|rel| (path.as_str(), rel, record))
        })
    }
}

fn file_info(path: &str, record: &FileRecord) -> FileInfo {
    FileInfo::file(path, record.size()).with_modified_at(record.modified_at)
}

fn single_update(path: &VirtualPath, record: FileRecord) -> FileDelta {
    FileDelta::from([(path.to_string(), FileUpdate::Write(record))])
}

#[async_trait]
impl Backend for StateBackend {
    async fn ls(&self, path: &VirtualPath) -> Result<Vec<FileInfo>, BackendError> {
        let prefix = path.as_dir_prefix();
        let mut entries = Vec::new();
        let mut dirs = BTreeSet::new();

        for (file, rel, record) in self.files_under(path) {
            match rel.split_once('/') {
                Some((dir, _)) => {
                    dirs.insert(format!("{prefix}{dir}"));
                }
                None => entries.push(file_info(file, record)),
            }
        }

        entries.extend(dirs.into_iter().map(FileInfo::dir));
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    async fn read(
        &self,
        path: &VirtualPath,
        offset: usize,
        limit: usize,
    ) -> Result<String, BackendError> {
        format_read(&self.record(path)?.text(), offset, limit)
    }

    async fn write(&self, path: &VirtualPath, content: &str) -> Result<WriteResult, BackendError> {
        let record = match self.files().get(path.as_str()) {
            Some(existing) => existing.updated(content),
            None => FileRecord::new(content),
        };
        tracing::debug!(path = %path, bytes = content.len(), "Writing file to state");
        Ok(WriteResult {
            path: path.clone(),
            files_update: Some(single_update(path, record)),
        })
    }

    async fn edit(
        &self,
        path: &VirtualPath,
        old: &str,
        new: &str,
        replace_all: bool,
    ) -> Result<EditResult, BackendError> {
        let existing = self.record(path)?;
        let (content, occurrences) =
            perform_string_replacement(&existing.text(), old, new, replace_all)?;
        Ok(EditResult {
            path: path.clone(),
            occurrences,
            files_update: Some(single_update(path, existing.updated(&content))),
        })
    }

    async fn glob(&self, pattern: &str, path: &VirtualPath) -> Result<Vec<FileInfo>, BackendError> {
        let matcher = compile_glob(pattern)?;
        Ok(self
            .files_under(path)
            .filter(|(_, rel, _)| matcher.is_match(rel))
            .map(|(file, _, record)| file_info(file, record))
            .collect())
    }

    async fn grep(
        &self,
        pattern: &str,
        path: Option<&VirtualPath>,
        glob: Option<&str>,
    ) -> Result<Vec<GrepMatch>, BackendError> {
        let regex = compile_regex(pattern)?;
        let filter = glob.map(compile_glob).transpose()?;
        let root = VirtualPath::root();
        let base = path.unwrap_or(&root);

        let mut matches = Vec::new();
        for (file, _, record) in self.files_under(base) {
            if file_filter_matches(filter.as_ref(), file) {
                matches.extend(grep_content(&regex, file, &record.text()));
            }
        }
        Ok(matches)
    }
}
