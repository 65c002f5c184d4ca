//! The declarative manifest and the restore orchestrator.
//!
//! A manifest is parsed fresh at session start and discarded after restore;
//! the engine persists nothing between runs except the files it wrote. Each
//! entry moves through validation, provider dispatch, and result aggregation
//! independently; a failure in one entry never disturbs the others, and the
//! aggregate always carries exactly one result per declared library in
//! declaration order.

use crate::error::{Error, OperationResult};
use crate::identifier::LibraryIdentifier;
use crate::provider::ProviderRegistry;
use crate::state::{LibraryGoalState, LibraryInstallationState};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

const SUPPORTED_VERSION: &str = "1.0";

/// Entries restore concurrently up to this bound; they are I/O bound, and the
/// bound keeps file-system and network pressure low.
const MAX_CONCURRENT_RESTORES: usize = 4;

/// In-memory form of the manifest file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    #[serde(default = "default_version")]
    pub version: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_provider: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_destination: Option<String>,

    #[serde(default)]
    pub libraries: Vec<LibraryInstallationState>,
}

fn default_version() -> String {
    SUPPORTED_VERSION.to_string()
}

impl Manifest {
    /// Parse a manifest from its JSON text.
    pub fn from_json(text: &str) -> Result<Self, Error> {
        let manifest: Manifest =
            serde_json::from_str(text).map_err(|e| Error::invalid_manifest(&e.to_string()))?;
        if manifest.version != SUPPORTED_VERSION {
            return Err(Error::invalid_manifest(&format!(
                "unsupported manifest version \"{}\"",
                manifest.version
            )));
        }
        Ok(manifest)
    }

    /// Read and parse a manifest file.
    pub fn from_file(path: &Path) -> Result<Self, Error> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::invalid_manifest(&format!("{}: {}", path.display(), e)))?;
        Self::from_json(&text)
    }

    /// An entry with the manifest defaults substituted where the entry left
    /// the field empty.
    fn entry_with_defaults(&self, entry: &LibraryInstallationState) -> LibraryInstallationState {
        let mut entry = entry.clone();
        if entry.provider_id.is_empty() {
            if let Some(default) = &self.default_provider {
                entry.provider_id = default.clone();
            }
        }
        if entry.destination_path.is_empty() {
            if let Some(default) = &self.default_destination {
                entry.destination_path = default.clone();
            }
        }
        entry
    }

    /// Restore every declared library through the registry.
    ///
    /// `prior` is the previous run's goal states, if the caller recorded
    /// them; each entry is paired with at most one prior state (matched on
    /// provider, library, and destination, consumed in declaration order) so
    /// files the prior install wrote and the new goal state no longer wants
    /// get cleaned up.
    ///
    /// The returned list preserves manifest declaration order regardless of
    /// completion order, and always contains one result per entry: per-entry
    /// failures are captured, never raised.
    pub async fn restore(
        &self,
        registry: &ProviderRegistry,
        prior: Option<&[LibraryGoalState]>,
        cancel: &CancellationToken,
    ) -> Vec<OperationResult<LibraryGoalState>> {
        let entries: Vec<LibraryInstallationState> = self
            .libraries
            .iter()
            .map(|e| self.entry_with_defaults(e))
            .collect();
        let priors = match_priors(&entries, prior);

        let semaphore = Arc::new(Semaphore::new(MAX_CONCURRENT_RESTORES));
        let mut tasks: JoinSet<(usize, OperationResult<LibraryGoalState>)> = JoinSet::new();

        for (index, (entry, prior_goal)) in entries.into_iter().zip(priors).enumerate() {
            let semaphore = Arc::clone(&semaphore);
            let cancel = cancel.clone();
            let provider = registry.get(&entry.provider_id).cloned();
            tasks.spawn(async move {
                let _permit = semaphore
                    .acquire()
                    .await
                    .expect("restore semaphore closed");
                let result = restore_entry(entry, provider, prior_goal, &cancel).await;
                (index, result)
            });
        }

        let mut results: Vec<Option<OperationResult<LibraryGoalState>>> =
            (0..self.libraries.len()).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => results[index] = Some(result),
                Err(e) => tracing::error!("restore task panicked: {}", e),
            }
        }

        results
            .into_iter()
            .map(|r| r.unwrap_or_else(|| OperationResult::failed(Vec::new())))
            .collect()
    }

    /// Number of files a restore run actually wrote, summed across every
    /// entry including partial installs. Files skipped by the non-clobber
    /// policy are not counted. Front ends use this for their "N files
    /// written" summary.
    pub fn files_written(results: &[OperationResult<LibraryGoalState>]) -> usize {
        results.iter().map(|r| r.files_written).sum()
    }
}

/// Pair each entry with at most one prior goal state, consumed in declaration
/// order so duplicate entries do not share one prior state.
fn match_priors(
    entries: &[LibraryInstallationState],
    prior: Option<&[LibraryGoalState]>,
) -> Vec<Option<LibraryGoalState>> {
    let Some(prior) = prior else {
        return entries.iter().map(|_| None).collect();
    };
    let mut used = vec![false; prior.len()];
    entries
        .iter()
        .map(|entry| {
            let key = entry.entry_key();
            prior.iter().enumerate().find_map(|(i, goal)| {
                if !used[i] && goal.matches_entry(&key) {
                    used[i] = true;
                    Some(goal.clone())
                } else {
                    None
                }
            })
        })
        .collect()
}

/// Validate and dispatch one entry. The per-entry state machine: already
/// cancelled → cancelled; missing fields (all reported together) → failed;
/// unknown provider → failed; malformed id for grammar-using providers →
/// failed; otherwise the provider's install result, normalized so an
/// inconsistent provider result never masquerades as success.
async fn restore_entry(
    entry: LibraryInstallationState,
    provider: Option<Arc<dyn crate::provider::Provider>>,
    prior_goal: Option<LibraryGoalState>,
    cancel: &CancellationToken,
) -> OperationResult<LibraryGoalState> {
    if cancel.is_cancelled() {
        return OperationResult::cancelled();
    }

    let mut errors = Vec::new();
    if entry.provider_id.is_empty() {
        errors.push(Error::provider_undefined());
    }
    if entry.destination_path.is_empty() {
        errors.push(Error::path_undefined());
    }
    if entry.library_id.is_empty() {
        errors.push(Error::library_id_undefined());
    }
    if !errors.is_empty() {
        return OperationResult::failed(errors);
    }

    let Some(provider) = provider else {
        return OperationResult::failed(vec![Error::unknown_provider(&entry.provider_id)]);
    };

    if provider.uses_default_identifier() {
        if let Err(e) = LibraryIdentifier::parse(&entry.library_id) {
            return OperationResult::failed(vec![e]);
        }
    }

    let mut result = provider.install(&entry, prior_goal.as_ref(), cancel).await;
    if !result.success && !result.cancelled && result.errors.is_empty() {
        result.errors.push(Error::unknown_error());
    }
    result
}
