//! Backend forwarding to a sandboxed execution environment.

#[cfg(feature = "local-sandbox")]
mod local;

use std::sync::Arc;

use agentfs_core::{
    Backend, BackendError, EditResult, Execute, ExecuteResponse, FileInfo, GrepMatch, VirtualPath,
    WriteResult,
    format::{format_read, perform_string_replacement},
};
use async_trait::async_trait;
use thiserror::Error;

use crate::search::{
    compile_glob, compile_regex, file_filter_matches, grep_content, relative_to,
};

#[cfg(feature = "local-sandbox")]
pub use local::{LocalSession, LocalSessionConfig};

/// Sandbox session error.
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("File '{0}' not found")]
    NotFound(String),
    #[error("Spawn failed: {0}")]
    SpawnFailed(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Remote(String),
}

impl From<SandboxError> for BackendError {
    fn from(e: SandboxError) -> Self {
        match e {
            SandboxError::NotFound(path) => Self::NotFound(path),
            SandboxError::Io(e) => Self::Io(e),
            SandboxError::SpawnFailed(msg) | SandboxError::Remote(msg) => Self::Remote(msg),
        }
    }
}

/// A remote environment that can run commands and move files.
///
/// Paths are virtual paths rooted at the sandbox root, and commands run with
/// the sandbox root as their working directory.
#[async_trait]
pub trait SandboxSession: Send + Sync {
    /// Session identifier.
    fn id(&self) -> &str;

    /// Run a shell command.
    async fn execute(&self, command: &str) -> Result<ExecuteResponse, SandboxError>;

    /// Create or overwrite a file.
    async fn upload(&self, path: &str, content: &[u8]) -> Result<(), SandboxError>;

    /// Fetch a file.
    async fn download(&self, path: &str) -> Result<Vec<u8>, SandboxError>;

    /// List a directory, optionally descending into subdirectories.
    async fn list(&self, path: &str, recursive: bool) -> Result<Vec<FileInfo>, SandboxError>;
}

/// Forwards file operations and execution to a [`SandboxSession`].
#[derive(Clone)]
pub struct SandboxBackend {
    session: Arc<dyn SandboxSession>,
}

impl SandboxBackend {
    /// Wrap a session.
    #[must_use]
    pub fn new(session: Arc<dyn SandboxSession>) -> Self {
        Self { session }
    }

    /// The underlying session.
    #[must_use]
    pub fn session(&self) -> &Arc<dyn SandboxSession> {
        &self.session
    }

    async fn download_text(&self, path: &VirtualPath) -> Result<String, BackendError> {
        let bytes = self.session.download(path).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

impl std::fmt::Debug for SandboxBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SandboxBackend")
            .field("session", &self.session.id())
            .finish()
    }
}

#[async_trait]
impl Backend for SandboxBackend {
    async fn ls(&self, path: &VirtualPath) -> Result<Vec<FileInfo>, BackendError> {
        let mut entries = self.session.list(path, false).await?;
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    async fn read(
        &self,
        path: &VirtualPath,
        offset: usize,
        limit: usize,
    ) -> Result<String, BackendError> {
        format_read(&self.download_text(path).await?, offset, limit)
    }

    async fn write(&self, path: &VirtualPath, content: &str) -> Result<WriteResult, BackendError> {
        self.session.upload(path, content.as_bytes()).await?;
        Ok(WriteResult {
            path: path.clone(),
            files_update: None,
        })
    }

    async fn edit(
        &self,
        path: &VirtualPath,
        old: &str,
        new: &str,
        replace_all: bool,
    ) -> Result<EditResult, BackendError> {
        let current = self.download_text(path).await?;
        let (content, occurrences) = perform_string_replacement(&current, old, new, replace_all)?;
        self.session.upload(path, content.as_bytes()).await?;
        Ok(EditResult {
            path: path.clone(),
            occurrences,
            files_update: None,
        })
    }

    async fn glob(&self, pattern: &str, path: &VirtualPath) -> Result<Vec<FileInfo>, BackendError> {
        let matcher = compile_glob(pattern)?;
        let mut matches: Vec<FileInfo> = self
            .session
            .list(path, true)
            .await?
            .into_iter()
            .filter(|info| !info.is_dir)
            .filter(|info| relative_to(path, &info.path).is_some_and(|rel| matcher.is_match(rel)))
            .collect();
        matches.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(matches)
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

        let mut files: Vec<FileInfo> = self
            .session
            .list(base, true)
            .await?
            .into_iter()
            .filter(|info| !info.is_dir && file_filter_matches(filter.as_ref(), &info.path))
            .collect();
        files.sort_by(|a, b| a.path.cmp(&b.path));
        tracing::debug!(
            session = %self.session.id(),
            files = files.len(),
            %pattern,
            "Searching sandbox files"
        );

        let mut matches = Vec::new();
        for info in files {
            let bytes = match self.session.download(&info.path).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::debug!(path = %info.path, error = %e, "Skipping unreadable file");
                    continue;
                }
            };
            matches.extend(grep_content(&regex, &info.path, &String::from_utf8_lossy(&bytes)));
        }
        Ok(matches)
    }

    fn execution(&self) -> Option<&dyn Execute> {
        Some(self)
    }
}

#[async_trait]
impl Execute for SandboxBackend {
    fn id(&self) -> &str {
        self.session.id()
    }

    async fn execute(&self, command: &str) -> Result<ExecuteResponse, BackendError> {
        tracing::debug!(session = %self.session.id(), %command, "Executing in sandbox");
        Ok(self.session.execute(command).await?)
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::BTreeMap, sync::Mutex};

    use agentfs_core::normalize;

    use super::*;

    /// In-memory sandbox that records the commands it is asked to run.
    #[derive(Default)]
    struct FakeSession {
        files: Mutex<BTreeMap<String, Vec<u8>>>,
        commands: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl SandboxSession for FakeSession {
        fn id(&self) -> &str {
            "fake-1"
        }

        async fn execute(&self, command: &str) -> Result<ExecuteResponse, SandboxError> {
            self.commands.lock().unwrap().push(command.to_string());
            Ok(ExecuteResponse {
                output: format!("ran {command}"),
                exit_code: Some(0),
                truncated: false,
            })
        }

        async fn upload(&self, path: &str, content: &[u8]) -> Result<(), SandboxError> {
            self.files
                .lock()
                .unwrap()
                .insert(path.to_string(), content.to_vec());
            Ok(())
        }

        async fn download(&self, path: &str) -> Result<Vec<u8>, SandboxError> {
            self.files
                .lock()
                .unwrap()
                .get(path)
                .cloned()
                .ok_or_else(|| SandboxError::NotFound(path.to_string()))
        }

        async fn list(&self, path: &str, _recursive: bool) -> Result<Vec<FileInfo>, SandboxError> {
            let base = normalize(path).unwrap();
            Ok(self
                .files
                .lock()
                .unwrap()
                .iter()
                .filter(|(p, _)| relative_to(&base, p).is_some())
                .map(|(p, c)| FileInfo::file(p.clone(), c.len() as u64))
                .collect())
        }
    }

    fn p(path: &str) -> VirtualPath {
        normalize(path).unwrap()
    }

    #[tokio::test]
    async fn test_file_operations_forward_to_session() {
        let session = Arc::new(FakeSession::default());
        let backend = SandboxBackend::new(session.clone());

        backend.write(&p("/work/a.txt"), "a a a").await.unwrap();
        let edit = backend.edit(&p("/work/a.txt"), "a", "b", true).await.unwrap();
        assert_eq!(edit.occurrences, 3);
        assert!(edit.files_update.is_none());
        assert_eq!(session.files.lock().unwrap()["/work/a.txt"], b"b b b");

        let read = backend.read(&p("/work/a.txt"), 0, 10).await.unwrap();
        assert_eq!(read, "     1\tb b b");

        assert!(matches!(
            backend.read(&p("/work/missing"), 0, 10).await,
            Err(BackendError::NotFound(_))
        ));

        let globbed = backend.glob("*.txt", &p("/work")).await.unwrap();
        assert_eq!(globbed.len(), 1);
    }

    #[tokio::test]
    async fn test_execute_capability() {
        let backend = SandboxBackend::new(Arc::new(FakeSession::default()));
        let execution = backend.execution().unwrap();
        assert_eq!(execution.id(), "fake-1");

        let response = execution.execute("ls -la").await.unwrap();
        assert_eq!(response.output, "ran ls -la");
        assert_eq!(response.exit_code, Some(0));
    }

    #[tokio::test]
    async fn test_grep_searches_downloaded_files() {
        let session = Arc::new(FakeSession::default());
        let backend = SandboxBackend::new(session.clone());
        backend.write(&p("/src/a.rs"), "fn main() {}\nlet x = \"a:b\";").await.unwrap();
        backend.write(&p("/src/b.py"), "fn main").await.unwrap();
        backend.write(&p("/docs/c.rs"), "fn main").await.unwrap();

        let hits = backend
            .grep("fn main", Some(&p("/src")), Some("*.rs"))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].path, "/src/a.rs");
        assert_eq!(hits[0].line, 1);

        let all = backend.grep(r#""a:b""#, None, None).await.unwrap();
        assert_eq!(all[0].text, "let x = \"a:b\";");
        assert!(session.commands.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_grep_no_matches_and_invalid_pattern() {
        let backend = SandboxBackend::new(Arc::new(FakeSession::default()));
        backend.write(&p("/a.txt"), "hello").await.unwrap();
        assert!(backend.grep("x", None, None).await.unwrap().is_empty());

        let err = backend.grep("(", None, None).await.unwrap_err();
        assert!(matches!(err, BackendError::InvalidPattern(_)));
    }
}
