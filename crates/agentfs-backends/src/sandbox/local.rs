//! Sandbox session backed by a host directory and the local shell.

use std::{
    collections::HashMap,
    io,
    path::{Path, PathBuf},
    process::Stdio,
};

use agentfs_core::{ExecuteResponse, FileInfo, normalize};
use async_trait::async_trait;
use command_group::AsyncCommandGroup;
use serde::Deserialize;
use tokio::{
    io::{AsyncRead, AsyncReadExt},
    process::Command,
};
use walkdir::WalkDir;

use super::{SandboxError, SandboxSession};
use crate::filesystem::{file_info, to_virtual};

/// Local session configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LocalSessionConfig {
    /// Largest combined output kept from a command, in bytes.
    pub max_output_bytes: usize,
    /// Shell to run commands with. Defaults to `$SHELL`, then `sh`.
    pub shell: Option<PathBuf>,
    /// Extra environment variables for commands.
    pub env: HashMap<String, String>,
}

impl Default for LocalSessionConfig {
    fn default() -> Self {
        Self {
            max_output_bytes: 100_000,
            shell: None,
            env: HashMap::new(),
        }
    }
}

/// Runs commands in a host directory, each in its own process group.
///
/// No timeout is applied; callers bound command duration themselves.
#[derive(Debug)]
pub struct LocalSession {
    id: String,
    root: PathBuf,
    config: LocalSessionConfig,
}

impl LocalSession {
    /// Create a session rooted at `root` with default settings.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_config(root, LocalSessionConfig::default())
    }

    /// Create a session with explicit settings.
    #[must_use]
    pub fn with_config(root: impl Into<PathBuf>, config: LocalSessionConfig) -> Self {
        Self {
            id: format!("local-{}", uuid::Uuid::new_v4()),
            root: root.into(),
            config,
        }
    }

    /// The host directory backing the sandbox.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn host_path(&self, path: &str) -> Result<PathBuf, SandboxError> {
        let path = normalize(path).map_err(|e| SandboxError::Remote(e.to_string()))?;
        Ok(self.root.join(path.trim_start_matches('/')))
    }

    fn shell(&self) -> (PathBuf, &'static str) {
        if let Some(shell) = &self.config.shell {
            return (shell.clone(), "-c");
        }
        if cfg!(windows) {
            return (PathBuf::from("cmd"), "/C");
        }
        if let Some(shell) = std::env::var_os("SHELL").map(PathBuf::from) {
            if shell.is_absolute() && shell.is_file() {
                return (shell, "-c");
            }
        }
        let sh = which::which("sh").unwrap_or_else(|_| PathBuf::from("/bin/sh"));
        (sh, "-c")
    }
}

/// Cut `output` to at most `max_bytes`, on a character boundary.
fn cap_output(mut output: String, max_bytes: usize) -> (String, bool) {
    if output.len() <= max_bytes {
        return (output, false);
    }
    let mut cut = max_bytes;
    while !output.is_char_boundary(cut) {
        cut -= 1;
    }
    output.truncate(cut);
    (output, true)
}

/// Read at most `limit` bytes from `pipe`, then drain the rest so the child
/// never blocks on a full pipe. The flag is set when bytes were dropped.
async fn read_capped<R>(pipe: Option<&mut R>, limit: usize) -> io::Result<(Vec<u8>, bool)>
where
    R: AsyncRead + Unpin,
{
    let Some(pipe) = pipe else {
        return Ok((Vec::new(), false));
    };
    let mut buf = Vec::new();
    (&mut *pipe)
        .take(u64::try_from(limit).unwrap_or(u64::MAX))
        .read_to_end(&mut buf)
        .await?;
    let dropped = tokio::io::copy(pipe, &mut tokio::io::sink()).await?;
    Ok((buf, dropped > 0))
}

#[async_trait]
impl SandboxSession for LocalSession {
    fn id(&self) -> &str {
        &self.id
    }

    async fn execute(&self, command: &str) -> Result<ExecuteResponse, SandboxError> {
        let (shell, flag) = self.shell();
        let mut cmd = Command::new(&shell);
        cmd.arg(flag)
            .arg(command)
            .current_dir(&self.root)
            .envs(&self.config.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd
            .group_spawn()
            .map_err(|e| SandboxError::SpawnFailed(format!("{}: {e}", shell.display())))?;

        let limit = self.config.max_output_bytes;
        let mut stdout = child.inner().stdout.take();
        let mut stderr = child.inner().stderr.take();
        let (out, err) = tokio::join!(
            read_capped(stdout.as_mut(), limit),
            read_capped(stderr.as_mut(), limit)
        );
        let (out, out_dropped) = out?;
        let (err, err_dropped) = err?;
        let status = child.wait().await?;

        let mut output = String::from_utf8_lossy(&out).into_owned();
        output.push_str(&String::from_utf8_lossy(&err));
        let (output, capped) = cap_output(output, limit);
        let truncated = capped || out_dropped || err_dropped;

        tracing::debug!(
            session = %self.id,
            exit_code = ?status.code(),
            bytes = output.len(),
            truncated,
            "Local command finished"
        );

        Ok(ExecuteResponse {
            output,
            exit_code: status.code(),
            truncated,
        })
    }

    async fn upload(&self, path: &str, content: &[u8]) -> Result<(), SandboxError> {
        let host = self.host_path(path)?;
        if let Some(parent) = host.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&host, content).await?;
        Ok(())
    }

    async fn download(&self, path: &str) -> Result<Vec<u8>, SandboxError> {
        let host = self.host_path(path)?;
        match tokio::fs::read(&host).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(SandboxError::NotFound(path.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self, path: &str, recursive: bool) -> Result<Vec<FileInfo>, SandboxError> {
        let start = self.host_path(path)?;
        let root = self.root.clone();
        let max_depth = if recursive { usize::MAX } else { 1 };

        tokio::task::spawn_blocking(move || -> Result<Vec<FileInfo>, SandboxError> {
            if !start.is_dir() {
                return Ok(Vec::new());
            }
            let mut entries = Vec::new();
            for entry in WalkDir::new(&start)
                .min_depth(1)
                .max_depth(max_depth)
                .sort_by_file_name()
            {
                let entry = entry.map_err(io::Error::other)?;
                let meta = entry.metadata().map_err(io::Error::other)?;
                entries.push(file_info(to_virtual(&root, entry.path()), &meta));
            }
            Ok(entries)
        })
        .await
        .map_err(|e| SandboxError::Remote(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use agentfs_core::{Backend, blocking::Blocking, normalize};
    use tempfile::TempDir;

    use super::*;
    use crate::{FilesystemBackend, sandbox::SandboxBackend};

    #[test]
    fn test_cap_output_respects_char_boundaries() {
        let (out, truncated) = cap_output("héllo".to_string(), 2);
        assert_eq!(out, "h");
        assert!(truncated);

        let (out, truncated) = cap_output("ok".to_string(), 10);
        assert_eq!(out, "ok");
        assert!(!truncated);
    }

    #[tokio::test]
    async fn test_upload_download_list() {
        let dir = TempDir::new().unwrap();
        let session = LocalSession::new(dir.path());
        assert!(session.id().starts_with("local-"));

        session.upload("/a/b.txt", b"hello").await.unwrap();
        assert_eq!(session.download("/a/b.txt").await.unwrap(), b"hello");
        assert!(matches!(
            session.download("/nope").await,
            Err(SandboxError::NotFound(_))
        ));

        let shallow = session.list("/", false).await.unwrap();
        assert_eq!(shallow.len(), 1);
        assert_eq!(shallow[0].path, "/a/");

        let deep = session.list("/", true).await.unwrap();
        let paths: Vec<&str> = deep.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["/a/", "/a/b.txt"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_execute_in_root() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "x").unwrap();
        let session = LocalSession::new(dir.path());

        let ok = session.execute("ls && echo oops >&2").await.unwrap();
        assert_eq!(ok.exit_code, Some(0));
        assert!(ok.output.contains("marker.txt"));
        assert!(ok.output.contains("oops"));
        assert!(!ok.truncated);

        let failed = session.execute("exit 3").await.unwrap();
        assert_eq!(failed.exit_code, Some(3));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_execute_truncates_output() {
        let dir = TempDir::new().unwrap();
        let config = LocalSessionConfig {
            max_output_bytes: 16,
            shell: Some(PathBuf::from("/bin/sh")),
            ..LocalSessionConfig::default()
        };
        let session = LocalSession::with_config(dir.path(), config);

        let response = session
            .execute("i=0; while [ $i -lt 50 ]; do echo line$i; i=$((i+1)); done")
            .await
            .unwrap();
        assert!(response.truncated);
        assert_eq!(response.output.len(), 16);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_large_output_is_bounded_and_child_reaped() {
        let dir = TempDir::new().unwrap();
        let config = LocalSessionConfig {
            max_output_bytes: 1024,
            shell: Some(PathBuf::from("/bin/sh")),
            ..LocalSessionConfig::default()
        };
        let session = LocalSession::with_config(dir.path(), config);

        let response = session
            .execute("head -c 1000000 /dev/zero | tr '\\0' 'a'; echo done >&2; exit 4")
            .await
            .unwrap();
        assert!(response.truncated);
        assert_eq!(response.output.len(), 1024);
        assert_eq!(response.exit_code, Some(4));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_blocking_execute_on_current_thread_runtime() {
        let dir = TempDir::new().unwrap();
        let backend = Blocking::new(Arc::new(SandboxBackend::new(Arc::new(LocalSession::new(
            dir.path(),
        )))));

        let response = backend.execute("echo hi").unwrap().unwrap();
        assert_eq!(response.output, "hi\n");
        assert_eq!(response.exit_code, Some(0));
    }

    #[cfg(unix)]
    #[tokio::test(flavor = "multi_thread")]
    async fn test_blocking_execute_on_multi_thread_runtime() {
        let dir = TempDir::new().unwrap();
        let backend = Blocking::new(Arc::new(SandboxBackend::new(Arc::new(LocalSession::new(
            dir.path(),
        )))));

        let response = backend.execute("echo hi").unwrap().unwrap();
        assert_eq!(response.output, "hi\n");
    }

    #[tokio::test]
    async fn test_grep_uses_same_regex_dialect_as_filesystem() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("conf.txt"), "port 8080\nname d\n").unwrap();
        let sandbox = SandboxBackend::new(Arc::new(LocalSession::new(dir.path())));
        let host = FilesystemBackend::new(dir.path());

        let from_sandbox = sandbox.grep(r"\d+", None, None).await.unwrap();
        let from_host = host.grep(r"\d+", None, None).await.unwrap();
        assert_eq!(from_sandbox.len(), 1);
        assert_eq!(from_sandbox[0].text, "port 8080");
        assert_eq!(from_sandbox, from_host);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_sandbox_backend_grep_over_local_session() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/lib.rs"), "pub fn answer() -> u32 {\n    42\n}\n")
            .unwrap();
        let backend = SandboxBackend::new(Arc::new(LocalSession::new(dir.path())));

        let hits = backend
            .grep("fn answer", Some(&normalize("/src").unwrap()), Some("*.rs"))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].path, "/src/lib.rs");
        assert_eq!(hits[0].line, 1);

        assert!(backend.grep("nomatch_xyz", None, None).await.unwrap().is_empty());
    }
}
