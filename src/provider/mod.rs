//! The provider contract and the per-session provider registry.
//!
//! A provider resolves a validated manifest entry into a concrete goal state
//! and performs the install/uninstall against the host. One implementation
//! exists per source kind; the engine depends only on this trait, never on
//! how an implementation was located.

mod archive;
mod cdnjs;
mod completion;
mod filesystem;
mod install;

pub use archive::ArchiveProvider;
pub use cdnjs::CdnjsProvider;
pub use completion::{CompletionItem, CompletionSet};
pub use filesystem::FileSystemProvider;

use crate::cache::CacheService;
use crate::error::{Error, OperationResult};
use crate::host::HostInteraction;
use crate::identifier::LibraryIdentifier;
use crate::state::{LibraryGoalState, LibraryInstallationState};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Pluggable resolver/installer for one library source kind.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Identifier used in the manifest's `provider` field.
    fn id(&self) -> &str;

    /// Whether library ids for this provider follow the default
    /// `name@version` grammar. Path-shaped providers return `false` and
    /// interpret the id themselves.
    fn uses_default_identifier(&self) -> bool {
        true
    }

    /// Resolve a validated entry into the file manifest to install.
    async fn resolve(
        &self,
        state: &LibraryInstallationState,
        cancel: &CancellationToken,
    ) -> Result<LibraryGoalState, Error>;

    /// Resolve the goal state, write each missing file through the host, and
    /// delete files that the previous goal state installed but the new one no
    /// longer wants. The deletion set is derived purely from `previous`, so a
    /// provider never touches files outside its own prior provenance.
    async fn install(
        &self,
        state: &LibraryInstallationState,
        previous: Option<&LibraryGoalState>,
        cancel: &CancellationToken,
    ) -> OperationResult<LibraryGoalState>;

    /// Candidate identifiers for interactive completion, ranked by ascending
    /// index of the search text within the candidate. Providers without a
    /// searchable catalog return an empty set.
    async fn search(&self, _term: &str) -> Result<CompletionSet, Error> {
        Ok(CompletionSet::default())
    }
}

/// Maps provider id to provider instance for one restore session.
///
/// Constructed once per session from a static list of implementations; it
/// also carries the id/display-name formatting that the original product kept
/// in a process-wide singleton, so call sites thread it explicitly instead.
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn Provider>>,
}

impl ProviderRegistry {
    /// An empty registry. Callers compose their own provider set.
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
        }
    }

    /// The stock providers bound to a host and cache: `cdnjs`, `filesystem`,
    /// and `archive`.
    pub fn default_providers(host: Arc<HostInteraction>, cache: Arc<CacheService>) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(CdnjsProvider::new(
            Arc::clone(&host),
            Arc::clone(&cache),
        )));
        registry.register(Arc::new(FileSystemProvider::new(Arc::clone(&host))));
        registry.register(Arc::new(ArchiveProvider::new(host)));
        registry
    }

    /// Register a provider under its own id. A later registration with the
    /// same id replaces the earlier one.
    pub fn register(&mut self, provider: Arc<dyn Provider>) {
        self.providers.insert(provider.id().to_string(), provider);
    }

    pub fn get(&self, provider_id: &str) -> Option<&Arc<dyn Provider>> {
        self.providers.get(provider_id)
    }

    pub fn provider_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Human-readable name for a library id under a given provider: `name
    /// version` when the provider uses the default grammar and the id parses,
    /// the raw id otherwise.
    pub fn display_name(&self, provider_id: &str, library_id: &str) -> String {
        let uses_grammar = self
            .get(provider_id)
            .map(|p| p.uses_default_identifier())
            .unwrap_or(true);
        if uses_grammar {
            if let Ok(identifier) = LibraryIdentifier::parse(library_id) {
                return identifier.display_name();
            }
        }
        library_id.to_string()
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}
