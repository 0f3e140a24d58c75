//! Synchronous forms of the async backend operations.

use std::{future::Future, io, sync::Arc, sync::OnceLock};

use tokio::runtime::{Builder, Handle, Runtime, RuntimeFlavor};

use crate::{
    path::VirtualPath,
    traits::{Backend, BackendError, EditResult, ExecuteResponse, FileInfo, GrepMatch, WriteResult},
};

/// Drive a future to completion from synchronous code.
///
/// On a multi-thread runtime the current worker blocks in place and the
/// future runs on the ambient handle. A current-thread runtime cannot drive
/// its IO and timers while this thread waits, so the future runs on a fresh
/// runtime on a scoped thread. Outside any runtime a shared current-thread
/// runtime is used.
///
/// # Errors
/// Returns an error if a dedicated runtime cannot be created.
pub fn block_on<F>(future: F) -> io::Result<F::Output>
where
    F: Future + Send,
    F::Output: Send,
{
    let Ok(handle) = Handle::try_current() else {
        return Ok(runtime()?.block_on(future));
    };
    match handle.runtime_flavor() {
        RuntimeFlavor::MultiThread => {
            Ok(tokio::task::block_in_place(|| handle.block_on(future)))
        }
        _ => {
            let output = std::thread::scope(|s| {
                s.spawn(|| -> io::Result<F::Output> {
                    let rt = Builder::new_current_thread().enable_all().build()?;
                    Ok(rt.block_on(future))
                })
                .join()
            });
            match output {
                Ok(output) => output,
                Err(panic) => std::panic::resume_unwind(panic),
            }
        }
    }
}

fn runtime() -> io::Result<&'static Runtime> {
    static RT: OnceLock<Runtime> = OnceLock::new();

    if let Some(rt) = RT.get() {
        return Ok(rt);
    }
    let rt = Builder::new_current_thread().enable_all().build()?;
    Ok(RT.get_or_init(|| rt))
}

/// A backend driven synchronously.
///
/// Each method blocks the calling thread until the async operation finishes.
/// See [`block_on`] for how the future is driven.
///
/// # Errors
/// Every method returns the wrapped backend's error, or
/// [`BackendError::Io`] if no runtime could be created to drive it.
pub struct Blocking<B: ?Sized> {
    inner: Arc<B>,
}

impl<B: Backend + ?Sized> Blocking<B> {
    /// Wrap a backend.
    #[must_use]
    pub const fn new(inner: Arc<B>) -> Self {
        Self { inner }
    }

    /// The wrapped backend.
    #[must_use]
    pub const fn inner(&self) -> &Arc<B> {
        &self.inner
    }

    fn run<T, F>(&self, future: F) -> Result<T, BackendError>
    where
        F: Future<Output = Result<T, BackendError>> + Send,
        T: Send,
    {
        block_on(future)?
    }

    /// Blocking [`Backend::ls`].
    ///
    /// # Errors
    /// See [`Blocking`].
    pub fn ls(&self, path: &VirtualPath) -> Result<Vec<FileInfo>, BackendError> {
        self.run(self.inner.ls(path))
    }

    /// Blocking [`Backend::read`].
    ///
    /// # Errors
    /// See [`Blocking`].
    pub fn read(
        &self,
        path: &VirtualPath,
        offset: usize,
        limit: usize,
    ) -> Result<String, BackendError> {
        self.run(self.inner.read(path, offset, limit))
    }

    /// Blocking [`Backend::write`].
    ///
    /// # Errors
    /// See [`Blocking`].
    pub fn write(&self, path: &VirtualPath, content: &str) -> Result<WriteResult, BackendError> {
        self.run(self.inner.write(path, content))
    }

    /// Blocking [`Backend::edit`].
    ///
    /// # Errors
    /// See [`Blocking`].
    pub fn edit(
        &self,
        path: &VirtualPath,
        old: &str,
        new: &str,
        replace_all: bool,
    ) -> Result<EditResult, BackendError> {
        self.run(self.inner.edit(path, old, new, replace_all))
    }

    /// Blocking [`Backend::glob`].
    ///
    /// # Errors
    /// See [`Blocking`].
    pub fn glob(&self, pattern: &str, path: &VirtualPath) -> Result<Vec<FileInfo>, BackendError> {
        self.run(self.inner.glob(pattern, path))
    }

    /// Blocking [`Backend::grep`].
    ///
    /// # Errors
    /// See [`Blocking`].
    pub fn grep(
        &self,
        pattern: &str,
        path: Option<&VirtualPath>,
        glob: Option<&str>,
    ) -> Result<Vec<GrepMatch>, BackendError> {
        self.run(self.inner.grep(pattern, path, glob))
    }

    /// Run a command, or `None` if the backend cannot execute.
    pub fn execute(&self, command: &str) -> Option<Result<ExecuteResponse, BackendError>> {
        let execution = self.inner.execution()?;
        Some(self.run(execution.execute(command)))
    }
}

impl<B: ?Sized> Clone for Blocking<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}
