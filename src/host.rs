//! Sandboxed file-system access for the restore engine.
//!
//! [`HostInteraction`] is the only component that touches disk. Every write
//! and delete is resolved against the working directory and rejected when the
//! resolved path escapes it, so a hostile `..`-laden identifier can never
//! reach user files outside the project.

use crate::error::{EngineError, Error};
use std::future::Future;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

/// Severity for operation-level diagnostics surfaced to front ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warning,
    Operation,
}

/// Sink for operation-level diagnostics ("file written", "file deleted").
///
/// Front ends supply their own implementation; [`TracingLogger`] forwards to
/// the `tracing` subscriber and is the default.
pub trait Logger: Send + Sync {
    fn log(&self, level: LogLevel, message: &str);
}

/// Default logger backed by `tracing`.
#[derive(Debug, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Error => tracing::error!("{}", message),
            LogLevel::Warning => tracing::warn!("{}", message),
            LogLevel::Operation => tracing::info!("{}", message),
        }
    }
}

/// File I/O scoped to a working directory, with a separate cache directory.
pub struct HostInteraction {
    working_directory: PathBuf,
    cache_directory: PathBuf,
    logger: Arc<dyn Logger>,
}

impl HostInteraction {
    /// Create a host rooted at `working_directory` with its cache under
    /// `cache_directory`, logging through [`TracingLogger`].
    pub fn new(working_directory: impl Into<PathBuf>, cache_directory: impl Into<PathBuf>) -> Self {
        Self::with_logger(working_directory, cache_directory, Arc::new(TracingLogger))
    }

    /// Create a host with a caller-supplied diagnostic sink.
    pub fn with_logger(
        working_directory: impl Into<PathBuf>,
        cache_directory: impl Into<PathBuf>,
        logger: Arc<dyn Logger>,
    ) -> Self {
        Self {
            working_directory: working_directory.into(),
            cache_directory: cache_directory.into(),
            logger,
        }
    }

    pub fn working_directory(&self) -> &Path {
        &self.working_directory
    }

    pub fn cache_directory(&self) -> &Path {
        &self.cache_directory
    }

    pub fn logger(&self) -> &Arc<dyn Logger> {
        &self.logger
    }

    /// Resolve a destination-relative path against the working directory,
    /// failing with `UnauthorizedWrite` when the normalized result does not
    /// stay under it.
    pub fn resolve_sandboxed(&self, relative_path: &str) -> Result<PathBuf, Error> {
        let candidate = Path::new(relative_path);
        if candidate.is_absolute() {
            return Err(Error::unauthorized_write(relative_path));
        }

        let mut resolved = self.working_directory.clone();
        let base_depth = resolved.components().count();
        for component in candidate.components() {
            match component {
                Component::CurDir => {}
                Component::Normal(part) => resolved.push(part),
                Component::ParentDir => {
                    if resolved.components().count() <= base_depth || !resolved.pop() {
                        return Err(Error::unauthorized_write(relative_path));
                    }
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(Error::unauthorized_write(relative_path));
                }
            }
        }
        Ok(resolved)
    }

    /// True when the working-directory-relative path already exists as a file.
    pub fn file_exists(&self, relative_path: &str) -> bool {
        self.resolve_sandboxed(relative_path)
            .map(|p| p.is_file())
            .unwrap_or(false)
    }

    /// Write a file under the working directory.
    ///
    /// Returns `Ok(false)` without invoking the content factory when the file
    /// already exists. This is the engine's non-clobber policy: a user may
    /// have hand-edited an installed file, and restore never silently
    /// overwrites it. Otherwise creates parent directories, writes the
    /// content fully, and flushes before returning `Ok(true)`.
    ///
    /// A cancelled token turns the write into a no-op reporting `Ok(false)`;
    /// the caller observes the token for its own cancellation result.
    pub async fn write_file<F, Fut>(
        &self,
        relative_path: &str,
        content: F,
        cancel: &CancellationToken,
    ) -> Result<bool, Error>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<u8>, Error>>,
    {
        let absolute = self.resolve_sandboxed(relative_path)?;

        if absolute.is_file() || cancel.is_cancelled() {
            return Ok(false);
        }

        let bytes = content().await?;
        if cancel.is_cancelled() {
            return Ok(false);
        }

        self.write_bytes(&absolute, &bytes)
            .await
            .map_err(|e| Error::new(crate::error::ErrorCode::UnknownError, e.to_string()))?;

        self.logger.log(
            LogLevel::Operation,
            &format!("Wrote file \"{}\"", relative_path),
        );
        Ok(true)
    }

    async fn write_bytes(&self, absolute: &Path, bytes: &[u8]) -> Result<(), EngineError> {
        if let Some(parent) = absolute.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::File::create(absolute).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        Ok(())
    }

    /// Delete working-directory-relative paths, best effort.
    ///
    /// Each path is handled independently: "already gone" counts as success,
    /// and a failure on one path is logged without stopping the rest or
    /// failing the call. Returns the number of files actually removed.
    pub async fn delete_files(
        &self,
        relative_paths: &[String],
        cancel: &CancellationToken,
    ) -> usize {
        let mut removed = 0;
        for relative_path in relative_paths {
            if cancel.is_cancelled() {
                break;
            }
            let absolute = match self.resolve_sandboxed(relative_path) {
                Ok(p) => p,
                Err(e) => {
                    self.logger.log(
                        LogLevel::Warning,
                        &format!("Skipping delete of \"{}\": {}", relative_path, e),
                    );
                    continue;
                }
            };
            if !absolute.is_file() {
                continue;
            }
            match tokio::fs::remove_file(&absolute).await {
                Ok(()) => {
                    removed += 1;
                    self.logger.log(
                        LogLevel::Operation,
                        &format!("Deleted file \"{}\"", relative_path),
                    );
                }
                // A concurrent delete of the same path is success, not error
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    self.logger.log(
                        LogLevel::Warning,
                        &format!("Failed to delete \"{}\": {}", relative_path, e),
                    );
                }
            }
        }
        removed
    }
}
