//! Keyring abstraction: resolves key identifiers to key material.

use crate::error::KeyringError;
use secrecy::{ExposeSecret, SecretVec};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Key material located by a keyring.
///
/// `id` is the identifier the key was actually resolved to, which for
/// rotating keyrings includes the version. Cloning shares the underlying
/// bytes; they are zeroized when the last clone is dropped.
#[derive(Clone)]
pub struct Key {
    id: String,
    bytes: Arc<SecretVec<u8>>,
}

impl Key {
    /// Creates a key.
    #[must_use]
    pub fn new(id: impl Into<String>, bytes: SecretVec<u8>) -> Self {
        Self { id: id.into(), bytes: Arc::new(bytes) }
    }

    /// Returns the resolved identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the key material.
    #[must_use]
    pub fn bytes(&self) -> &SecretVec<u8> {
        &self.bytes
    }

    /// Returns the key length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.expose_secret().len()
    }

    /// Returns `true` if the key holds no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Key").field("id", &self.id).field("bytes", &"[REDACTED]").finish()
    }
}

/// Resolves key identifiers to key material.
///
/// Used by the encryption layer for both directions: with the configured
/// default identifier when encrypting, and with the identifier recorded in
/// the ciphertext when decrypting.
///
/// Implementations must be thread-safe (`Send + Sync`) to support
/// concurrent encryption operations.
pub trait Keyring: Send + Sync {
    /// Looks up the key for `key_id`.
    ///
    /// Returns `Ok(None)` if the keyring has no such key. Callers must treat
    /// that as a failure of the surrounding encrypt/decrypt operation.
    ///
    /// # Errors
    ///
    /// Returns `KeyringError` if the identifier cannot be resolved or the
    /// key source fails.
    fn get(&self, key_id: &str) -> Result<Option<Key>, KeyringError>;
}

impl<K: Keyring + ?Sized> Keyring for &K {
    fn get(&self, key_id: &str) -> Result<Option<Key>, KeyringError> {
        (**self).get(key_id)
    }
}

impl<K: Keyring + ?Sized> Keyring for Box<K> {
    fn get(&self, key_id: &str) -> Result<Option<Key>, KeyringError> {
        (**self).get(key_id)
    }
}

impl<K: Keyring + ?Sized> Keyring for Arc<K> {
    fn get(&self, key_id: &str) -> Result<Option<Key>, KeyringError> {
        (**self).get(key_id)
    }
}

/// Fixed, non-rotating keyring backed by a map of identifier to bytes.
///
/// # Example
///
/// ```
/// use rotakey::keyring::{Keyring, StaticKeyring};
///
/// let keyring = StaticKeyring::new().with_key("myKey", vec![7u8; 32]);
/// let key = keyring.get("myKey").unwrap().expect("key present");
/// assert_eq!(key.id(), "myKey");
/// assert!(keyring.get("otherKey").unwrap().is_none());
/// ```
#[derive(Default)]
pub struct StaticKeyring {
    keys: HashMap<String, Key>,
}

impl StaticKeyring {
    /// Creates an empty keyring.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a keyring from a map of identifier to key bytes.
    #[must_use]
    pub fn from_map<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = (S, Vec<u8>)>,
        S: Into<String>,
    {
        keys.into_iter().fold(Self::new(), |keyring, (id, bytes)| keyring.with_key(id, bytes))
    }

    /// Adds a key, replacing any key with the same identifier.
    #[must_use]
    pub fn with_key(mut self, id: impl Into<String>, bytes: Vec<u8>) -> Self {
        let id = id.into();
        self.keys.insert(id.clone(), Key::new(id, SecretVec::new(bytes)));
        self
    }

    /// Returns the number of keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns `true` if the keyring holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl Keyring for StaticKeyring {
    fn get(&self, key_id: &str) -> Result<Option<Key>, KeyringError> {
        Ok(self.keys.get(key_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_keyring_lookup() {
        let keyring = StaticKeyring::from_map([("a", vec![1u8; 32]), ("b", vec![2u8; 16])]);

        let key = keyring.get("b").unwrap().expect("key b should exist");
        assert_eq!(key.id(), "b");
        assert_eq!(key.bytes().expose_secret(), &vec![2u8; 16]);
        assert_eq!(keyring.len(), 2);
    }

    #[test]
    fn test_static_keyring_absent() {
        let keyring = StaticKeyring::new().with_key("a", vec![1u8; 32]);
        assert!(keyring.get("a--v1").unwrap().is_none());
        assert!(keyring.get("").unwrap().is_none());
    }

    #[test]
    fn test_static_keyring_replaces_duplicate() {
        let keyring = StaticKeyring::new().with_key("a", vec![1u8; 32]).with_key("a", vec![9u8; 8]);

        assert_eq!(keyring.len(), 1);
        assert_eq!(keyring.get("a").unwrap().unwrap().len(), 8);
    }

    #[test]
    fn test_key_debug_redacts_bytes() {
        let key = Key::new("secret", SecretVec::new(vec![0xAB; 4]));
        let debug = format!("{key:?}");

        assert!(debug.contains("secret"));
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains("171"));
    }

    #[test]
    fn test_keyring_through_arc_and_box() {
        let keyring = Arc::new(StaticKeyring::new().with_key("a", vec![1u8; 32]));
        let boxed: Box<dyn Keyring> = Box::new(Arc::clone(&keyring));

        assert!(boxed.get("a").unwrap().is_some());
        assert!(boxed.get("b").unwrap().is_none());
    }
}
