//! Librestore: a manifest-driven restore engine for client-side libraries.
//!
//! The engine reconciles a project's file tree with a declarative JSON
//! manifest of third-party library files (e.g. `jquery@3.1.1`). Each entry is
//! resolved through a pluggable [`Provider`](provider::Provider) into a
//! concrete goal state, materialized through a sandboxed
//! [`HostInteraction`](host::HostInteraction), and stale files from a prior
//! run are cleaned up without ever touching files the engine did not write.
//! Restores are idempotent: an unchanged manifest restored twice performs no
//! work on the second run.
//!
//! Front ends (CLI, build tasks, IDE extensions) are thin invokers: they
//! construct a host, a cache, and a registry, parse the manifest, and consume
//! one [`OperationResult`] per declared library.
//!
//! ```no_run
//! use librestore::{CacheService, HostInteraction, Manifest, ProviderRegistry};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), librestore::Error> {
//!     let host = Arc::new(HostInteraction::new("my-project", "my-project/.cache"));
//!     let cache = Arc::new(CacheService::new().expect("http client"));
//!     let registry = ProviderRegistry::default_providers(host, cache);
//!
//!     let manifest = Manifest::from_file("my-project/librestore.json".as_ref())?;
//!     let results = manifest
//!         .restore(&registry, None, &CancellationToken::new())
//!         .await;
//!
//!     for result in &results {
//!         if !result.success {
//!             for error in &result.errors {
//!                 eprintln!("{}", error);
//!             }
//!         }
//!     }
//!     Ok(())
//! }
//! ```

/// Error codes, per-entry errors, and the operation result type.
pub mod error;

/// `name@version` identifier parsing.
pub mod identifier;

/// Manifest entries, goal states, and file provenance.
pub mod state;

/// Sandboxed file-system access and the diagnostic logger.
pub mod host;

/// TTL-gated cache for remote catalog and metadata text.
pub mod cache;

/// The provider contract, stock providers, and the registry.
pub mod provider;

/// The manifest and the restore orchestrator.
pub mod manifest;

pub use cache::CacheService;
pub use error::{EngineError, Error, ErrorCode, OperationResult};
pub use host::{HostInteraction, LogLevel, Logger, TracingLogger};
pub use identifier::LibraryIdentifier;
pub use manifest::Manifest;
pub use provider::{CompletionItem, CompletionSet, Provider, ProviderRegistry};
pub use state::{FileProvenance, GoalStateFile, LibraryGoalState, LibraryInstallationState};
