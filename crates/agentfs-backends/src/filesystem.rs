//! Backend over a host directory.

use std::{
    io,
    path::{Path, PathBuf},
};

use agentfs_core::{
    Backend, BackendError, EditResult, FileInfo, GrepMatch, VirtualPath, WriteResult,
    format::{format_read, perform_string_replacement},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use walkdir::WalkDir;

use crate::search::{compile_glob, compile_regex, file_filter_matches, grep_content, relative_to};

/// Maps virtual `/a/b` onto `root/a/b`.
#[derive(Debug, Clone)]
pub struct FilesystemBackend {
    root: PathBuf,
}

impl FilesystemBackend {
    /// Create a backend rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The host directory backing `/`.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn host_path(&self, path: &VirtualPath) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }

    async fn read_text(&self, path: &VirtualPath) -> Result<String, BackendError> {
        let host = self.host_path(path);
        match tokio::fs::metadata(&host).await {
            Ok(meta) if meta.is_dir() => return Err(BackendError::IsDirectory(path.to_string())),
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(BackendError::NotFound(path.to_string()));
            }
            Err(e) => return Err(e.into()),
        }
        let bytes = tokio::fs::read(&host).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    async fn write_text(&self, path: &VirtualPath, content: &str) -> Result<(), BackendError> {
        let host = self.host_path(path);
        if let Some(parent) = host.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&host, content).await?;
        Ok(())
    }

    /// Walk the files under `base` on a blocking thread.
    async fn walk_files(&self, base: &VirtualPath) -> Result<Vec<(String, PathBuf)>, BackendError> {
        let root = self.root.clone();
        let start = self.host_path(base);
        tokio::task::spawn_blocking(move || collect_files(&root, &start))
            .await
            .map_err(io::Error::other)?
    }
}

fn collect_files(root: &Path, start: &Path) -> Result<Vec<(String, PathBuf)>, BackendError> {
    if !start.exists() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(start).follow_links(false).sort_by_file_name() {
        let entry = entry.map_err(|e| BackendError::Io(io::Error::other(e)))?;
        if entry.file_type().is_file() {
            files.push((to_virtual(root, entry.path()), entry.path().to_path_buf()));
        }
    }
    Ok(files)
}

pub(crate) fn to_virtual(root: &Path, host: &Path) -> String {
    let relative = host.strip_prefix(root).unwrap_or(host);
    let segments: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    format!("/{}", segments.join("/"))
}

pub(crate) fn file_info(path: String, meta: &std::fs::Metadata) -> FileInfo {
    let info = if meta.is_dir() {
        FileInfo::dir(path)
    } else {
        FileInfo::file(path, meta.len())
    };
    match meta.modified() {
        Ok(modified) => info.with_modified_at(DateTime::<Utc>::from(modified)),
        Err(_) => info,
    }
}

#[async_trait]
impl Backend for FilesystemBackend {
    async fn ls(&self, path: &VirtualPath) -> Result<Vec<FileInfo>, BackendError> {
        let host = self.host_path(path);
        let mut dir = match tokio::fs::read_dir(&host).await {
            Ok(dir) => dir,
            Err(e) if matches!(e.kind(), io::ErrorKind::NotFound | io::ErrorKind::NotADirectory) => {
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            let meta = entry.metadata().await?;
            entries.push(file_info(to_virtual(&self.root, &entry.path()), &meta));
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
        format_read(&self.read_text(path).await?, offset, limit)
    }

    async fn write(&self, path: &VirtualPath, content: &str) -> Result<WriteResult, BackendError> {
        self.write_text(path, content).await?;
        tracing::debug!(path = %path, root = %self.root.display(), "Wrote file to host");
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
        let current = self.read_text(path).await?;
        let (content, occurrences) = perform_string_replacement(&current, old, new, replace_all)?;
        self.write_text(path, &content).await?;
        Ok(EditResult {
            path: path.clone(),
            occurrences,
            files_update: None,
        })
    }

    async fn glob(&self, pattern: &str, path: &VirtualPath) -> Result<Vec<FileInfo>, BackendError> {
        let matcher = compile_glob(pattern)?;
        let mut matches = Vec::new();
        for (virtual_path, host) in self.walk_files(path).await? {
            let Some(rel) = relative_to(path, &virtual_path) else {
                continue;
            };
            if matcher.is_match(rel) {
                let meta = tokio::fs::metadata(&host).await?;
                matches.push(file_info(virtual_path, &meta));
            }
        }
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

        let mut matches = Vec::new();
        for (virtual_path, host) in self.walk_files(base).await? {
            if !file_filter_matches(filter.as_ref(), &virtual_path) {
                continue;
            }
            let bytes = match tokio::fs::read(&host).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::debug!(path = %virtual_path, error = %e, "Skipping unreadable file");
                    continue;
                }
            };
            let content = String::from_utf8_lossy(&bytes);
            matches.extend(grep_content(&regex, &virtual_path, &content));
        }
        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use agentfs_core::normalize;
    use tempfile::TempDir;

    use super::*;

    fn p(path: &str) -> VirtualPath {
        normalize(path).unwrap()
    }

    #[tokio::test]
    async fn test_write_creates_parents_and_round_trips() {
        let dir = TempDir::new().unwrap();
        let backend = FilesystemBackend::new(dir.path());

        let content = "alpha\nbeta\n";
        let result = backend.write(&p("/nested/deep/file.txt"), content).await.unwrap();
        assert!(result.files_update.is_none());

        let on_disk = std::fs::read_to_string(dir.path().join("nested/deep/file.txt")).unwrap();
        assert_eq!(on_disk, content);

        let read = backend.read(&p("/nested/deep/file.txt"), 0, 10).await.unwrap();
        assert_eq!(read, "     1\talpha\n     2\tbeta");
    }

    #[tokio::test]
    async fn test_read_errors() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let backend = FilesystemBackend::new(dir.path());

        assert!(matches!(
            backend.read(&p("/missing.txt"), 0, 10).await,
            Err(BackendError::NotFound(_))
        ));
        assert!(matches!(
            backend.read(&p("/sub"), 0, 10).await,
            Err(BackendError::IsDirectory(_))
        ));
    }

    #[tokio::test]
    async fn test_edit_on_disk() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("f.txt"), "a a a").unwrap();
        let backend = FilesystemBackend::new(dir.path());

        assert!(matches!(
            backend.edit(&p("/f.txt"), "a", "b", false).await,
            Err(BackendError::AmbiguousMatch { occurrences: 3, .. })
        ));
        let ok = backend.edit(&p("/f.txt"), "a", "b", true).await.unwrap();
        assert_eq!(ok.occurrences, 3);
        assert_eq!(std::fs::read_to_string(dir.path().join("f.txt")).unwrap(), "b b b");
    }

    #[tokio::test]
    async fn test_ls_glob_grep() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("src/pkg")).unwrap();
        std::fs::write(dir.path().join("README.md"), "hello").unwrap();
        std::fs::write(dir.path().join("src/main.py"), "print('main')\n").unwrap();
        std::fs::write(dir.path().join("src/pkg/util.py"), "x = 1\nprint(x)\n").unwrap();
        let backend = FilesystemBackend::new(dir.path());

        let root: Vec<String> = backend
            .ls(&VirtualPath::root())
            .await
            .unwrap()
            .into_iter()
            .map(|f| f.path)
            .collect();
        assert_eq!(root, vec!["/README.md", "/src/"]);
        assert!(backend.ls(&p("/nope")).await.unwrap().is_empty());

        let globbed: Vec<String> = backend
            .glob("**/*.py", &p("/src"))
            .await
            .unwrap()
            .into_iter()
            .map(|f| f.path)
            .collect();
        assert_eq!(globbed, vec!["/src/main.py", "/src/pkg/util.py"]);

        let hits = backend.grep(r"print\(", None, Some("*.py")).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[1].path, "/src/pkg/util.py");
        assert_eq!(hits[1].line, 2);
    }
}
