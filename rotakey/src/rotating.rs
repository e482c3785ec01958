//! Keyrings that support key rotation.
//!
//! A rotating keyring splits each identifier into base name and version
//! (see [`KeyIdentifier`]) and asks a [`KeyByteSource`] for the bytes of that
//! exact version. Identifiers without a version resolve to the source's
//! primary version, so encrypting with a bare name always uses the current
//! key while decrypting uses the version recorded in the ciphertext.

use crate::error::KeyringError;
use crate::key_id::{KeyIdentifier, VersionDelimiter};
use crate::keyring::{Key, Keyring};
use secrecy::SecretVec;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use tracing::trace;

/// Supplies versioned key material to a [`RotatingKeyring`].
///
/// Implementations read from wherever keys live: a directory of key files,
/// environment variables, a secrets manager.
pub trait KeyByteSource: Send + Sync {
    /// Returns the version currently designated as primary for `base_name`,
    /// or `None` if none is configured.
    ///
    /// # Errors
    ///
    /// Returns `KeyringError` if the source cannot be read.
    fn primary_version(&self, base_name: &str) -> Result<Option<String>, KeyringError>;

    /// Returns the bytes for exactly this name and version, or `None` if the
    /// source holds no such key.
    ///
    /// # Errors
    ///
    /// Returns `KeyringError` if the source cannot be read.
    fn key_bytes(&self, id: &KeyIdentifier) -> Result<Option<SecretVec<u8>>, KeyringError>;
}

/// Keyring that resolves versioned identifiers against a [`KeyByteSource`].
///
/// # Example
///
/// ```
/// use rotakey::key_id::VersionDelimiter;
/// use rotakey::keyring::Keyring;
/// use rotakey::rotating::{MemoryKeySource, RotatingKeyring};
///
/// let source = MemoryKeySource::new();
/// source.insert("alpha", "v1", vec![1u8; 32]);
/// source.insert("alpha", "v2", vec![2u8; 32]);
/// source.set_primary("alpha", "v2");
///
/// let keyring = RotatingKeyring::new(source, VersionDelimiter::default());
/// assert_eq!(keyring.get("alpha").unwrap().unwrap().id(), "alpha--v2");
/// assert_eq!(keyring.get("alpha--v1").unwrap().unwrap().id(), "alpha--v1");
/// ```
pub struct RotatingKeyring<S> {
    source: S,
    delimiter: VersionDelimiter,
}

impl<S: KeyByteSource> RotatingKeyring<S> {
    /// Creates a rotating keyring.
    pub const fn new(source: S, delimiter: VersionDelimiter) -> Self {
        Self { source, delimiter }
    }

    /// Parses `key_id`, consulting the source for the primary version when
    /// the identifier carries none.
    ///
    /// # Errors
    ///
    /// Returns `KeyringError::NoPrimaryVersion` for an unversioned identifier
    /// without a primary version.
    pub fn resolve(&self, key_id: &str) -> Result<KeyIdentifier, KeyringError> {
        KeyIdentifier::parse(key_id, &self.delimiter, |name| self.source.primary_version(name))
    }

    /// Returns the version delimiter.
    pub const fn delimiter(&self) -> &VersionDelimiter {
        &self.delimiter
    }

    /// Returns the underlying key source.
    pub const fn source(&self) -> &S {
        &self.source
    }
}

impl<S: KeyByteSource> Keyring for RotatingKeyring<S> {
    fn get(&self, key_id: &str) -> Result<Option<Key>, KeyringError> {
        let id = self.resolve(key_id)?;
        let resolved = id.format(&self.delimiter);
        trace!(key_id, resolved = %resolved, "resolved key identifier");

        Ok(self.source.key_bytes(&id)?.map(|bytes| Key::new(resolved, bytes)))
    }
}

/// In-memory [`KeyByteSource`].
///
/// Keys and primary versions can be changed at any time through a shared
/// reference, which makes this source convenient for tests and demos that
/// simulate rotation.
#[derive(Default)]
pub struct MemoryKeySource {
    keys: RwLock<HashMap<(String, String), Vec<u8>>>,
    primaries: RwLock<HashMap<String, String>>,
}

impl MemoryKeySource {
    /// Creates an empty source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the bytes for one key version.
    pub fn insert(&self, base_name: impl Into<String>, version: impl Into<String>, bytes: Vec<u8>) {
        self.keys
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((base_name.into(), version.into()), bytes);
    }

    /// Removes one key version, returning `true` if it existed.
    pub fn remove(&self, base_name: &str, version: &str) -> bool {
        self.keys
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&(base_name.to_string(), version.to_string()))
            .is_some()
    }

    /// Designates `version` as primary for `base_name`.
    pub fn set_primary(&self, base_name: impl Into<String>, version: impl Into<String>) {
        self.primaries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(base_name.into(), version.into());
    }
}

impl KeyByteSource for MemoryKeySource {
    fn primary_version(&self, base_name: &str) -> Result<Option<String>, KeyringError> {
        Ok(self.primaries.read().unwrap_or_else(PoisonError::into_inner).get(base_name).cloned())
    }

    fn key_bytes(&self, id: &KeyIdentifier) -> Result<Option<SecretVec<u8>>, KeyringError> {
        let keys = self.keys.read().unwrap_or_else(PoisonError::into_inner);
        let bytes = keys.get(&(id.base_name().to_string(), id.version().to_string()));
        Ok(bytes.map(|bytes| SecretVec::new(bytes.clone())))
    }
}
