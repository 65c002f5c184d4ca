//! Library identifier parsing.
//!
//! Catalog providers address libraries as `name@version`, split on the last
//! `@` so scoped names like `@angular/core@12.0.0` keep their prefix. A
//! provider may opt out of this grammar entirely (see
//! [`Provider::uses_default_identifier`](crate::provider::Provider::uses_default_identifier));
//! filesystem-shaped providers treat the id as a raw path instead.

use crate::error::Error;

const SEPARATOR: char = '@';

/// A parsed `name@version` library reference.
///
/// The version is an opaque, already-resolved string; the engine never
/// interprets it as a semver range.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LibraryIdentifier {
    pub name: String,
    pub version: String,
}

impl LibraryIdentifier {
    /// Parse a raw library id into name and version.
    ///
    /// Fails with [`ErrorCode::InvalidLibraryId`](crate::error::ErrorCode)
    /// when the id is empty, has no separator, ends with the separator, or
    /// carries leading/trailing whitespace on the whole id or either part.
    /// Never returns a partially-populated identifier.
    pub fn parse(raw: &str) -> Result<Self, Error> {
        if raw.is_empty() || raw.trim() != raw {
            return Err(Error::invalid_library_id(raw));
        }

        let (name, version) = match raw.rfind(SEPARATOR) {
            Some(idx) => (&raw[..idx], &raw[idx + SEPARATOR.len_utf8()..]),
            None => return Err(Error::invalid_library_id(raw)),
        };

        if name.is_empty()
            || version.is_empty()
            || name.trim() != name
            || version.trim() != version
        {
            return Err(Error::invalid_library_id(raw));
        }

        Ok(Self {
            name: name.to_string(),
            version: version.to_string(),
        })
    }

    /// Human-readable `name version` form used in diagnostics.
    pub fn display_name(&self) -> String {
        format!("{} {}", self.name, self.version)
    }
}

impl std::fmt::Display for LibraryIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}{}", self.name, SEPARATOR, self.version)
    }
}
