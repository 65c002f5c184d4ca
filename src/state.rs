//! Value types for manifest entries and resolved goal states.

use crate::identifier::LibraryIdentifier;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One declared library installation, as read from the manifest.
///
/// `provider_id` and `destination_path` may be empty until the orchestrator
/// substitutes the manifest defaults; validation runs after substitution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryInstallationState {
    #[serde(default, rename = "provider")]
    pub provider_id: String,

    #[serde(rename = "library")]
    pub library_id: String,

    #[serde(default, rename = "destination")]
    pub destination_path: String,

    /// Explicit subset of files to install. Absent means every file the
    /// provider considers canonical for this library and version.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<String>>,
}

impl LibraryInstallationState {
    /// Key identifying this entry for prior-goal-state matching.
    pub(crate) fn entry_key(&self) -> (String, String, String) {
        (
            self.provider_id.clone(),
            self.library_id.clone(),
            self.destination_path.clone(),
        )
    }
}

/// Where an installed file's content comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FileProvenance {
    /// Downloaded from a CDN URL.
    Url(String),
    /// Copied from a path on the local filesystem.
    LocalPath(PathBuf),
    /// Extracted from an entry inside a package archive.
    ArchiveEntry { archive: PathBuf, entry: String },
}

/// One file the provider intends to materialize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalStateFile {
    /// Path relative to the entry's destination directory.
    pub relative_path: String,
    pub provenance: FileProvenance,
}

/// The resolved file manifest for one entry at restore time.
///
/// Produced fresh each run. The engine never persists goal states; a caller
/// may record them and pass them back on the next run so stale files from the
/// prior install can be cleaned up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryGoalState {
    pub provider_id: String,
    pub library_id: String,
    /// Present for providers that use the `name@version` grammar.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier: Option<LibraryIdentifierParts>,
    pub destination: String,
    pub files: Vec<GoalStateFile>,
}

/// Serializable form of a parsed identifier carried inside a goal state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryIdentifierParts {
    pub name: String,
    pub version: String,
}

impl From<&LibraryIdentifier> for LibraryIdentifierParts {
    fn from(id: &LibraryIdentifier) -> Self {
        Self {
            name: id.name.clone(),
            version: id.version.clone(),
        }
    }
}

impl LibraryGoalState {
    /// Destination-relative paths of every file in this goal state, with the
    /// destination directory prefixed. These are the working-directory
    /// relative paths the host writes and deletes.
    pub fn installed_paths(&self) -> Vec<String> {
        self.files
            .iter()
            .map(|f| join_destination(&self.destination, &f.relative_path))
            .collect()
    }

    pub(crate) fn matches_entry(&self, key: &(String, String, String)) -> bool {
        self.provider_id == key.0 && self.library_id == key.1 && self.destination == key.2
    }
}

/// Join a destination directory and a file path with forward slashes,
/// tolerating a trailing slash on the destination.
pub(crate) fn join_destination(destination: &str, relative_path: &str) -> String {
    if destination.is_empty() {
        relative_path.to_string()
    } else {
        format!(
            "{}/{}",
            destination.trim_end_matches('/'),
            relative_path.trim_start_matches('/')
        )
    }
}
