//! Provider backed by the cdnjs catalog.
//!
//! Resolution is two cache-gated fetches: the catalog (for search) and the
//! per-library metadata, each with a one-day TTL. File content comes straight
//! from the CDN host and is never cached; the non-clobber write policy
//! already makes repeat restores cheap.

use crate::cache::{url_cache_name, CacheService};
use crate::error::{Error, OperationResult};
use crate::host::HostInteraction;
use crate::identifier::LibraryIdentifier;
use crate::provider::install::materialize;
use crate::provider::{CompletionSet, Provider};
use crate::state::{
    FileProvenance, GoalStateFile, LibraryGoalState, LibraryInstallationState,
};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const PROVIDER_ID: &str = "cdnjs";

const API_BASE: &str = "https://api.cdnjs.com";
const FILES_BASE: &str = "https://cdnjs.cloudflare.com/ajax/libs";
const CATALOG_TTL: Duration = Duration::from_secs(24 * 60 * 60);
const METADATA_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Catalog payload from `GET /libraries?fields=name`.
#[derive(Debug, Deserialize)]
struct Catalog {
    #[serde(default)]
    results: Vec<CatalogEntry>,
}

#[derive(Debug, Deserialize)]
struct CatalogEntry {
    name: String,
}

/// Metadata payload from `GET /libraries/{name}`.
#[derive(Debug, Deserialize)]
struct LibraryMetadata {
    #[serde(default)]
    assets: Vec<AssetGroup>,
}

#[derive(Debug, Deserialize)]
struct AssetGroup {
    version: String,
    #[serde(default)]
    files: Vec<String>,
}

pub struct CdnjsProvider {
    host: Arc<HostInteraction>,
    cache: Arc<CacheService>,
    api_base: String,
    files_base: String,
}

impl CdnjsProvider {
    pub fn new(host: Arc<HostInteraction>, cache: Arc<CacheService>) -> Self {
        Self::with_base_urls(host, cache, API_BASE, FILES_BASE)
    }

    /// Point the provider at alternate endpoints. Tests use this to run
    /// against a local HTTP fixture.
    pub fn with_base_urls(
        host: Arc<HostInteraction>,
        cache: Arc<CacheService>,
        api_base: impl Into<String>,
        files_base: impl Into<String>,
    ) -> Self {
        Self {
            host,
            cache,
            api_base: api_base.into(),
            files_base: files_base.into(),
        }
    }

    /// Provider-namespaced cache subdirectory.
    fn cache_dir(&self) -> PathBuf {
        self.host.cache_directory().join(PROVIDER_ID)
    }

    fn file_url(&self, identifier: &LibraryIdentifier, file: &str) -> String {
        format!(
            "{}/{}/{}/{}",
            self.files_base, identifier.name, identifier.version, file
        )
    }

    async fn fetch_metadata(
        &self,
        identifier: &LibraryIdentifier,
        cancel: &CancellationToken,
    ) -> Result<LibraryMetadata, Error> {
        let url = format!(
            "{}/libraries/{}",
            self.api_base,
            urlencoding::encode(&identifier.name)
        );
        // URL-derived file names keep hostile library names out of the cache
        // path entirely
        let cache_file = self.cache_dir().join(url_cache_name(&url));
        let text = self
            .cache
            .fetch(&url, &cache_file, METADATA_TTL, cancel)
            .await?;
        serde_json::from_str(&text).map_err(|_| Error::download_failed(&url))
    }

    async fn fetch_catalog(&self, cancel: &CancellationToken) -> Result<Catalog, Error> {
        let url = format!("{}/libraries?fields=name", self.api_base);
        let cache_file = self.cache_dir().join(url_cache_name(&url));
        let text = self
            .cache
            .fetch(&url, &cache_file, CATALOG_TTL, cancel)
            .await?;
        serde_json::from_str(&text).map_err(|_| Error::download_failed(&url))
    }

    /// Resolve the goal state plus non-fatal per-file warnings for requested
    /// files absent from the library's metadata.
    async fn resolve_with_warnings(
        &self,
        state: &LibraryInstallationState,
        cancel: &CancellationToken,
    ) -> Result<(LibraryGoalState, Vec<Error>), Error> {
        let identifier = LibraryIdentifier::parse(&state.library_id)?;
        let metadata = self.fetch_metadata(&identifier, cancel).await?;

        let known_files = metadata
            .assets
            .iter()
            .find(|group| group.version == identifier.version)
            .map(|group| group.files.clone())
            .ok_or_else(|| Error::invalid_library_id(&state.library_id))?;

        let mut warnings = Vec::new();
        let selected: Vec<String> = match &state.files {
            Some(requested) => requested
                .iter()
                .filter(|file| {
                    if known_files.contains(*file) {
                        true
                    } else {
                        warnings.push(Error::file_not_found(file, &state.library_id));
                        false
                    }
                })
                .cloned()
                .collect(),
            None => known_files,
        };

        let files = selected
            .into_iter()
            .map(|file| GoalStateFile {
                provenance: FileProvenance::Url(self.file_url(&identifier, &file)),
                relative_path: file,
            })
            .collect();

        let goal = LibraryGoalState {
            provider_id: PROVIDER_ID.to_string(),
            library_id: state.library_id.clone(),
            identifier: Some((&identifier).into()),
            destination: state.destination_path.clone(),
            files,
        };
        Ok((goal, warnings))
    }
}

#[async_trait]
impl Provider for CdnjsProvider {
    fn id(&self) -> &str {
        PROVIDER_ID
    }

    async fn resolve(
        &self,
        state: &LibraryInstallationState,
        cancel: &CancellationToken,
    ) -> Result<LibraryGoalState, Error> {
        let (goal, _warnings) = self.resolve_with_warnings(state, cancel).await?;
        Ok(goal)
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
        let (goal, warnings) = match self.resolve_with_warnings(state, cancel).await {
            Ok(resolved) => resolved,
            // A fetch aborted by cancellation is a cancelled entry, not a
            // download failure
            Err(_) if cancel.is_cancelled() => return OperationResult::cancelled(),
            Err(e) => return OperationResult::failed(vec![e]),
        };
        materialize(&self.host, Some(&self.cache), goal, previous, warnings, cancel).await
    }

    async fn search(&self, term: &str) -> Result<CompletionSet, Error> {
        let cancel = CancellationToken::new();
        let catalog = self.fetch_catalog(&cancel).await?;
        let names: Vec<String> = catalog.results.into_iter().map(|e| e.name).collect();
        Ok(CompletionSet::ranked(term, 0, term.chars().count(), &names))
    }
}
