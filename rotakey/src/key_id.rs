//! Composite key identifiers: `<base name><delimiter><version>`.

use crate::error::KeyringError;
use std::fmt;

/// Delimiter used when none is configured.
pub const DEFAULT_VERSION_DELIMITER: &str = "--";

/// Separates a key identifier's base name from its version.
///
/// Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionDelimiter(String);

impl VersionDelimiter {
    /// Creates a delimiter.
    ///
    /// # Errors
    ///
    /// Returns `KeyringError::InvalidConfig` if `delimiter` is empty.
    pub fn new(delimiter: impl Into<String>) -> Result<Self, KeyringError> {
        let delimiter = delimiter.into();
        if delimiter.is_empty() {
            return Err(KeyringError::InvalidConfig(
                "version delimiter must not be empty".to_string(),
            ));
        }
        Ok(Self(delimiter))
    }

    /// Returns the delimiter string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for VersionDelimiter {
    fn default() -> Self {
        Self(DEFAULT_VERSION_DELIMITER.to_string())
    }
}

impl fmt::Display for VersionDelimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A key identifier split into base name and version.
///
/// Base names must not contain the delimiter: parsing splits at its first
/// occurrence, so everything after it belongs to the version.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyIdentifier {
    base_name: String,
    version: String,
}

impl KeyIdentifier {
    /// Creates an identifier from its parts.
    #[must_use]
    pub fn new(base_name: impl Into<String>, version: impl Into<String>) -> Self {
        Self { base_name: base_name.into(), version: version.into() }
    }

    /// Parses `key_id` into base name and version.
    ///
    /// An identifier containing `delimiter` is split at the first occurrence.
    /// Otherwise the whole identifier is the base name and the version comes
    /// from `primary_version`, which is called exactly once in that case and
    /// never in the versioned case.
    ///
    /// Formatting the result of an unversioned parse yields
    /// `key_id + delimiter + primary`, not `key_id`: the alias is pinned to
    /// the version that was current at lookup time.
    ///
    /// # Errors
    ///
    /// Returns `KeyringError::NoPrimaryVersion` if the lookup reports no
    /// primary version, or whatever error the lookup itself returns.
    pub fn parse<F>(
        key_id: &str,
        delimiter: &VersionDelimiter,
        primary_version: F,
    ) -> Result<Self, KeyringError>
    where
        F: FnOnce(&str) -> Result<Option<String>, KeyringError>,
    {
        if let Some((base_name, version)) = key_id.split_once(delimiter.as_str()) {
            return Ok(Self::new(base_name, version));
        }

        let version = primary_version(key_id)?
            .ok_or_else(|| KeyringError::NoPrimaryVersion(key_id.to_string()))?;
        Ok(Self::new(key_id, version))
    }

    /// Returns the base name.
    #[must_use]
    pub fn base_name(&self) -> &str {
        &self.base_name
    }

    /// Returns the version.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Joins base name and version with `delimiter`.
    #[must_use]
    pub fn format(&self, delimiter: &VersionDelimiter) -> String {
        let mut id = String::with_capacity(
            self.base_name.len() + delimiter.as_str().len() + self.version.len(),
        );
        id.push_str(&self.base_name);
        id.push_str(delimiter.as_str());
        id.push_str(&self.version);
        id
    }
}
