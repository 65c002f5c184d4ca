//! Error codes, per-entry errors, and the restore result type.
//!
//! Per-entry failures never cross the restore boundary as `Err`; they are
//! captured as [`Error`] values inside an [`OperationResult`]. The
//! [`EngineError`] enum covers infrastructure faults that providers convert
//! into coded errors before returning.

use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;

pub type EngineResult<T> = Result<T, EngineError>;

/// Infrastructure-level failure, internal to the engine.
///
/// Providers map these into coded [`Error`] values; callers of the public
/// restore API never see this type for per-entry failures.
#[derive(ThisError, Debug)]
pub enum EngineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Path error: {0}")]
    Path(String),
}

/// The closed set of per-entry error codes.
///
/// The short `LIBxxx` identifiers are a stable contract: front ends surface
/// code plus message and never engine internals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    /// A fallible operation produced neither a result nor an error.
    UnknownError,
    /// The manifest entry has no library id after default substitution.
    LibraryIdUndefined,
    /// The manifest entry has no provider after default substitution.
    ProviderUndefined,
    /// The manifest entry has no destination after default substitution.
    PathUndefined,
    /// The library id violates the identifier grammar or names an unsafe path.
    InvalidLibraryId,
    /// No provider with the requested id is registered.
    UnknownProvider,
    /// A catalog, metadata, or file download failed.
    DownloadFailed,
    /// A write resolved outside the working directory sandbox.
    UnauthorizedWrite,
    /// A requested file is not part of the resolved library.
    FileNotFound,
    /// The manifest file itself could not be parsed.
    InvalidManifest,
}

impl ErrorCode {
    /// Stable short identifier for this code.
    pub fn code(&self) -> &'static str {
        match self {
            ErrorCode::UnknownError => "LIB000",
            ErrorCode::LibraryIdUndefined => "LIB001",
            ErrorCode::ProviderUndefined => "LIB002",
            ErrorCode::PathUndefined => "LIB003",
            ErrorCode::InvalidLibraryId => "LIB004",
            ErrorCode::UnknownProvider => "LIB005",
            ErrorCode::DownloadFailed => "LIB006",
            ErrorCode::UnauthorizedWrite => "LIB007",
            ErrorCode::FileNotFound => "LIB008",
            ErrorCode::InvalidManifest => "LIB009",
        }
    }
}

/// A per-entry error: stable code plus human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Error {
    pub code: ErrorCode,
    pub message: String,
}

impl Error {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn unknown_error() -> Self {
        Self::new(
            ErrorCode::UnknownError,
            "The operation failed without reporting a cause",
        )
    }

    pub fn library_id_undefined() -> Self {
        Self::new(
            ErrorCode::LibraryIdUndefined,
            "The manifest entry does not specify a library id",
        )
    }

    pub fn provider_undefined() -> Self {
        Self::new(
            ErrorCode::ProviderUndefined,
            "The manifest entry does not specify a provider",
        )
    }

    pub fn path_undefined() -> Self {
        Self::new(
            ErrorCode::PathUndefined,
            "The manifest entry does not specify a destination path",
        )
    }

    pub fn invalid_library_id(library_id: &str) -> Self {
        Self::new(
            ErrorCode::InvalidLibraryId,
            format!("\"{}\" is not a valid library id", library_id),
        )
    }

    pub fn unknown_provider(provider_id: &str) -> Self {
        Self::new(
            ErrorCode::UnknownProvider,
            format!("There is no provider with id \"{}\"", provider_id),
        )
    }

    pub fn download_failed(url: &str) -> Self {
        Self::new(
            ErrorCode::DownloadFailed,
            format!("Failed to download \"{}\"", url),
        )
    }

    pub fn unauthorized_write(path: &str) -> Self {
        Self::new(
            ErrorCode::UnauthorizedWrite,
            format!("Writing to \"{}\" is outside the working directory", path),
        )
    }

    pub fn file_not_found(file: &str, library_id: &str) -> Self {
        Self::new(
            ErrorCode::FileNotFound,
            format!("The file \"{}\" is not part of \"{}\"", file, library_id),
        )
    }

    pub fn invalid_manifest(detail: &str) -> Self {
        Self::new(
            ErrorCode::InvalidManifest,
            format!("The manifest could not be parsed: {}", detail),
        )
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code.code(), self.message)
    }
}

/// Outcome of one fallible engine operation.
///
/// Invariant: `success` is true iff `cancelled` is false, `errors` is empty,
/// and `result` is present. The constructors are the only way to build one,
/// so the invariant holds by construction; a result that is neither
/// successful, failed, nor cancelled is normalized to an
/// [`ErrorCode::UnknownError`] failure rather than coerced to success.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationResult<T> {
    pub success: bool,
    pub cancelled: bool,
    pub result: Option<T>,
    pub errors: Vec<Error>,
    /// True when the operation verified the goal state without changing
    /// anything on disk.
    pub up_to_date: bool,
    /// Number of files the operation actually wrote. Files skipped by the
    /// non-clobber policy are not counted.
    #[serde(default)]
    pub files_written: usize,
}

impl<T> OperationResult<T> {
    /// A successful operation carrying its result.
    pub fn succeeded(result: T) -> Self {
        Self {
            success: true,
            cancelled: false,
            result: Some(result),
            errors: Vec::new(),
            up_to_date: false,
            files_written: 0,
        }
    }

    /// A successful operation that found nothing to change.
    pub fn up_to_date(result: T) -> Self {
        Self {
            up_to_date: true,
            ..Self::succeeded(result)
        }
    }

    /// A failed operation. An empty error list is normalized to the
    /// unknown-failure code so the invariant never reports a bare failure.
    pub fn failed(errors: Vec<Error>) -> Self {
        Self::failed_with_result(None, errors)
    }

    /// A failed operation that still produced a partial result, e.g. an
    /// install that skipped files missing from the library's metadata.
    pub fn failed_with_result(result: Option<T>, mut errors: Vec<Error>) -> Self {
        if errors.is_empty() {
            errors.push(Error::unknown_error());
        }
        Self {
            success: false,
            cancelled: false,
            result,
            errors,
            up_to_date: false,
            files_written: 0,
        }
    }

    /// An operation that observed cancellation before completing.
    pub fn cancelled() -> Self {
        Self {
            success: false,
            cancelled: true,
            result: None,
            errors: Vec::new(),
            up_to_date: false,
            files_written: 0,
        }
    }

    /// Record how many files the operation actually wrote.
    pub fn with_files_written(mut self, files_written: usize) -> Self {
        self.files_written = files_written;
        self
    }
}
