//! Keyring configuration.
//!
//! ```json
//! {
//!   "version_delimiter": "--",
//!   "cache": { "ttl_secs": 60, "max_entries": 5000 }
//! }
//! ```
//!
//! Every field is optional. Values are validated when a component is built
//! from them, before any lookup happens.

use crate::cache::{CacheConfig, CachingKeyring, DEFAULT_MAX_ENTRIES, DEFAULT_TTL};
use crate::error::{Error, KeyringError};
use crate::key_id::{VersionDelimiter, DEFAULT_VERSION_DELIMITER};
use crate::rotating::{KeyByteSource, RotatingKeyring};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Cache section of [`KeyringConfig`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheSettings {
    /// Time-to-live in seconds; `0` disables caching
    pub ttl_secs: u64,
    /// Maximum cached keys; must be positive
    pub max_entries: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self { ttl_secs: DEFAULT_TTL.as_secs(), max_entries: DEFAULT_MAX_ENTRIES }
    }
}

/// Configuration for a cached rotating keyring.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KeyringConfig {
    /// Separator between key base name and version
    pub version_delimiter: String,
    /// Cache settings
    pub cache: CacheSettings,
}

impl Default for KeyringConfig {
    fn default() -> Self {
        Self {
            version_delimiter: DEFAULT_VERSION_DELIMITER.to_string(),
            cache: CacheSettings::default(),
        }
    }
}

impl KeyringConfig {
    /// Parses a JSON configuration.
    ///
    /// # Errors
    ///
    /// Returns `Error::Json` for malformed JSON or unknown fields.
    pub fn from_json_str(json: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the file cannot be read, or `Error::Json` if
    /// it is malformed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Returns the validated version delimiter.
    ///
    /// # Errors
    ///
    /// Returns `KeyringError::InvalidConfig` if the delimiter is empty.
    pub fn version_delimiter(&self) -> Result<VersionDelimiter, KeyringError> {
        VersionDelimiter::new(self.version_delimiter.as_str())
    }

    /// Returns the validated cache configuration.
    ///
    /// # Errors
    ///
    /// Returns `KeyringError::InvalidConfig` if `max_entries` is zero.
    pub fn cache(&self) -> Result<CacheConfig, KeyringError> {
        CacheConfig::new(Duration::from_secs(self.cache.ttl_secs), self.cache.max_entries)
    }

    /// Checks every setting.
    ///
    /// # Errors
    ///
    /// Returns the first invalid setting.
    pub fn validate(&self) -> Result<(), KeyringError> {
        self.version_delimiter()?;
        self.cache()?;
        Ok(())
    }

    /// Builds a cached rotating keyring over `source`.
    ///
    /// # Errors
    ///
    /// Returns `KeyringError::InvalidConfig` if any setting is invalid.
    pub fn build_rotating<S: KeyByteSource>(
        &self,
        source: S,
    ) -> Result<CachingKeyring<RotatingKeyring<S>>, KeyringError> {
        let delimiter = self.version_delimiter()?;
        let cache = self.cache()?;
        Ok(CachingKeyring::new(RotatingKeyring::new(source, delimiter), cache))
    }
}
