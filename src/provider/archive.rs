//! Provider that installs files out of a `.tar.gz` package archive.
//!
//! The library id is a path to an archive, resolved with the same rules as
//! the filesystem provider. Resolution lists the archive's regular-file
//! entries without unpacking anything; install extracts only the selected
//! entries into the destination.

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

pub const PROVIDER_ID: &str = "archive";

pub struct ArchiveProvider {
    host: Arc<HostInteraction>,
}

impl ArchiveProvider {
    pub fn new(host: Arc<HostInteraction>) -> Self {
        Self { host }
    }

    fn archive_path(&self, library_id: &str) -> Result<PathBuf, Error> {
        let path = Path::new(library_id);
        if path.is_absolute() {
            return Ok(path.to_path_buf());
        }
        self.host
            .resolve_sandboxed(library_id)
            .map_err(|_| Error::invalid_library_id(library_id))
    }

    async fn resolve_goal(
        &self,
        state: &LibraryInstallationState,
    ) -> Result<LibraryGoalState, Error> {
        let archive = self.archive_path(&state.library_id)?;
        if !archive.is_file() {
            return Err(Error::new(
                ErrorCode::FileNotFound,
                format!("The archive \"{}\" does not exist", state.library_id),
            ));
        }

        let entries = list_entries(archive.clone()).await?;

        let mut files: Vec<GoalStateFile> = entries
            .into_iter()
            .map(|entry| GoalStateFile {
                relative_path: entry.clone(),
                provenance: FileProvenance::ArchiveEntry {
                    archive: archive.clone(),
                    entry,
                },
            })
            .collect();

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

/// List the archive's regular-file entry paths. Entries with unsafe path
/// components are skipped so extraction can never climb out of the
/// destination.
async fn list_entries(archive: PathBuf) -> Result<Vec<String>, Error> {
    let display = archive.display().to_string();
    let result = tokio::task::spawn_blocking(move || -> Result<Vec<String>, std::io::Error> {
        let file = std::fs::File::open(&archive)?;
        let decoder = flate2::read::GzDecoder::new(file);
        let mut tar = tar::Archive::new(decoder);
        let mut entries = Vec::new();
        for entry in tar.entries()? {
            let entry = entry?;
            if !entry.header().entry_type().is_file() {
                continue;
            }
            let path = entry.path()?;
            if path
                .components()
                .any(|c| !matches!(c, std::path::Component::Normal(_)))
            {
                continue;
            }
            entries.push(path.to_string_lossy().replace('\\', "/"));
        }
        Ok(entries)
    })
    .await;

    match result {
        Ok(Ok(entries)) => Ok(entries),
        Ok(Err(e)) => Err(Error::new(
            ErrorCode::InvalidLibraryId,
            format!("\"{}\" is not a readable archive: {}", display, e),
        )),
        Err(e) => Err(Error::new(ErrorCode::UnknownError, e.to_string())),
    }
}

#[async_trait]
impl Provider for ArchiveProvider {
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
        self.resolve_goal(state).await
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
        let goal = match self.resolve_goal(state).await {
            Ok(goal) => goal,
            Err(_) if cancel.is_cancelled() => return OperationResult::cancelled(),
            Err(e) => return OperationResult::failed(vec![e]),
        };
        materialize(&self.host, None, goal, previous, Vec::new(), cancel).await
    }
}
