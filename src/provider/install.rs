//! Shared install machinery: goal-state materialization and stale cleanup.
//!
//! Every provider's `install` is the same three phases once the goal state is
//! resolved: write each missing file, delete what the previous goal state
//! installed but the new one no longer wants, and report `up_to_date` when
//! neither phase changed anything. The phases live here; providers only
//! differ in how a file's provenance turns into bytes.

use crate::cache::CacheService;
use crate::error::{Error, ErrorCode, OperationResult};
use crate::host::HostInteraction;
use crate::state::{join_destination, FileProvenance, LibraryGoalState};
use std::collections::HashSet;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

/// Write the goal state's files through the host, clean up stale files from
/// `previous`, and fold any resolution warnings into the final result.
///
/// Warnings (e.g. requested files missing from metadata) make the entry
/// unsuccessful without stopping the remaining valid files from installing.
/// Write and download failures are fatal to the entry.
pub(crate) async fn materialize(
    host: &HostInteraction,
    cache: Option<&CacheService>,
    goal: LibraryGoalState,
    previous: Option<&LibraryGoalState>,
    warnings: Vec<Error>,
    cancel: &CancellationToken,
) -> OperationResult<LibraryGoalState> {
    let mut errors = warnings;
    let mut written = 0usize;

    for file in &goal.files {
        if cancel.is_cancelled() {
            return OperationResult::cancelled().with_files_written(written);
        }
        let target = join_destination(&goal.destination, &file.relative_path);
        let provenance = file.provenance.clone();
        let wrote = host
            .write_file(
                &target,
                move || fetch_content(cache.cloned(), provenance),
                cancel,
            )
            .await;
        match wrote {
            Ok(true) => written += 1,
            Ok(false) => {}
            Err(e) => {
                errors.push(e);
                return OperationResult::failed_with_result(Some(goal), errors)
                    .with_files_written(written);
            }
        }
    }

    if cancel.is_cancelled() {
        return OperationResult::cancelled().with_files_written(written);
    }

    let deleted = cleanup_stale(host, &goal, previous, cancel).await;

    if !errors.is_empty() {
        OperationResult::failed_with_result(Some(goal), errors).with_files_written(written)
    } else if written == 0 && deleted == 0 {
        OperationResult::up_to_date(goal)
    } else {
        OperationResult::succeeded(goal).with_files_written(written)
    }
}

/// Delete files the previous goal state installed for this entry that the new
/// goal state no longer contains. Restricted to the prior goal state's own
/// provenance, so files the engine never wrote are never touched.
async fn cleanup_stale(
    host: &HostInteraction,
    goal: &LibraryGoalState,
    previous: Option<&LibraryGoalState>,
    cancel: &CancellationToken,
) -> usize {
    let Some(previous) = previous else {
        return 0;
    };

    let wanted: HashSet<String> = goal.installed_paths().into_iter().collect();
    let stale: Vec<String> = previous
        .installed_paths()
        .into_iter()
        .filter(|path| !wanted.contains(path))
        .collect();
    if stale.is_empty() {
        return 0;
    }
    host.delete_files(&stale, cancel).await
}

/// Turn a file's provenance into its content.
async fn fetch_content(
    cache: Option<CacheService>,
    provenance: FileProvenance,
) -> Result<Vec<u8>, Error> {
    match provenance {
        FileProvenance::Url(url) => match cache {
            Some(cache) => cache.download_bytes(&url).await,
            None => Err(Error::new(
                ErrorCode::DownloadFailed,
                format!("No HTTP client available to download \"{}\"", url),
            )),
        },
        FileProvenance::LocalPath(path) => tokio::fs::read(&path).await.map_err(|_| {
            Error::new(
                ErrorCode::FileNotFound,
                format!("The file \"{}\" could not be read", path.display()),
            )
        }),
        FileProvenance::ArchiveEntry { archive, entry } => {
            read_archive_entry(archive, entry).await
        }
    }
}

/// Read one entry out of a `.tar.gz` archive. Decompression is synchronous,
/// so it runs on the blocking pool.
async fn read_archive_entry(archive: PathBuf, entry: String) -> Result<Vec<u8>, Error> {
    let display = archive.display().to_string();
    let result = tokio::task::spawn_blocking(move || -> Result<Vec<u8>, std::io::Error> {
        use std::io::Read;
        let file = std::fs::File::open(&archive)?;
        let decoder = flate2::read::GzDecoder::new(file);
        let mut tar = tar::Archive::new(decoder);
        for tar_entry in tar.entries()? {
            let mut tar_entry = tar_entry?;
            if tar_entry.path()?.to_string_lossy() == entry {
                let mut bytes = Vec::new();
                tar_entry.read_to_end(&mut bytes)?;
                return Ok(bytes);
            }
        }
        Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("entry {} not present", entry),
        ))
    })
    .await;

    match result {
        Ok(Ok(bytes)) => Ok(bytes),
        Ok(Err(e)) => Err(Error::new(
            ErrorCode::FileNotFound,
            format!("Could not read from archive \"{}\": {}", display, e),
        )),
        Err(e) => Err(Error::new(ErrorCode::UnknownError, e.to_string())),
    }
}
