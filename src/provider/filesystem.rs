//! Provider that copies files from the local filesystem.
//!
//! The library id is a raw path, not `name@version`: a file installs as
//! itself, a directory installs its recursive file listing. Relative ids
//! resolve against the working directory and must stay under it; an id like
//! `../elsewhere/file.txt` is rejected outright. Absolute ids are accepted
//! because they name a location the user spelled out explicitly.

use crate::error::{Error, ErrorCode, OperationResult};
use crate::host::HostInteraction;
use crate::provider::install::materialize;
use crate::provider::Provider;
use crate::state::{
    FileProvenance, GoalStateFile, LibraryGoalState, LibraryInstallationState,
};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

pub const PROVIDER_ID: &str = "filesystem";

pub struct FileSystemProvider {
    host: Arc<HostInteraction>,
}

impl FileSystemProvider {
    pub fn new(host: Arc<HostInteraction>) -> Self {
        Self { host }
    }

    /// Resolve the library id to a source path. Relative ids must stay under
    /// the working directory; escapes are invalid library ids, not sandbox
    /// violations, because no write was attempted yet.
    fn source_path(&self, library_id: &str) -> Result<PathBuf, Error> {
        let path = Path::new(library_id);
        if path.is_absolute() {
            return Ok(path.to_path_buf());
        }
        self.host
            .resolve_sandboxed(library_id)
            .map_err(|_| Error::invalid_library_id(library_id))
    }

    fn list_files(&self, library_id: &str, source: &Path) -> Result<Vec<GoalStateFile>, Error> {
        if source.is_file() {
            let name = source
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| Error::invalid_library_id(library_id))?;
            return Ok(vec![GoalStateFile {
                relative_path: name.to_string(),
                provenance: FileProvenance::LocalPath(source.to_path_buf()),
            }]);
        }

        if !source.is_dir() {
            return Err(Error::new(
                ErrorCode::FileNotFound,
                format!("The path \"{}\" does not exist", library_id),
            ));
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(source)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(source)
                .map_err(|_| Error::invalid_library_id(library_id))?;
            let relative = relative
                .to_str()
                .ok_or_else(|| Error::invalid_library_id(library_id))?
                .replace(std::path::MAIN_SEPARATOR, "/");
            files.push(GoalStateFile {
                relative_path: relative,
                provenance: FileProvenance::LocalPath(entry.path().to_path_buf()),
            });
        }
        Ok(files)
    }

    fn resolve_goal(&self, state: &LibraryInstallationState) -> Result<LibraryGoalState, Error> {
        let source = self.source_path(&state.library_id)?;
        let mut files = self.list_files(&state.library_id, &source)?;

        if let Some(requested) = &state.files {
            files.retain(|f| requested.contains(&f.relative_path));
        }

        Ok(LibraryGoalState {
            provider_id: PROVIDER_ID.to_string(),
            library_id: state.library_id.clone(),
            identifier: None,
            destination: state.destination_path.clone(),
            files,
        })
    }
}

#[async_trait]
impl Provider for FileSystemProvider {
    fn id(&self) -> &str {
        PROVIDER_ID
    }

    fn uses_default_identifier(&self) -> bool {
        false
    }

    async fn resolve(
        &self,
        state: &LibraryInstallationState,
        _cancel: &CancellationToken,
    ) -> Result<LibraryGoalState, Error> {
        self.resolve_goal(state)
    }

    async fn install(
        &self,
        state: &LibraryInstallationState,
        previous: Option<&LibraryGoalState>,
        cancel: &CancellationToken,
    ) -> OperationResult<LibraryGoalState> {
        if cancel.is_cancelled() {
            return OperationResult::cancelled();
        }
        let goal = match self.resolve_goal(state) {
            Ok(goal) => goal,
            Err(_) if cancel.is_cancelled() => return OperationResult::cancelled(),
            Err(e) => return OperationResult::failed(vec![e]),
        };
        materialize(&self.host, None, goal, previous, Vec::new(), cancel).await
    }
}
