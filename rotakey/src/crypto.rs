//! Field encryption and decryption with keys resolved through a keyring.
//!
//! Every value is encrypted with ChaCha20-Poly1305 under a key derived from
//! a keyring key and the field context. The keyring identifier that was
//! actually used is stored next to the ciphertext, so values written before
//! a key rotation keep decrypting with the version they were written with.

use crate::context::FieldContext;
use crate::error::Error;
use crate::kdf::derive_field_key;
use crate::keyring::{Key, Keyring};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chacha20poly1305::{
    aead::{rand_core::RngCore, Aead, KeyInit, OsRng, Payload},
    ChaCha20Poly1305, Nonce,
};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Algorithm name recorded in every encrypted field.
pub const ALGORITHM: &str = "CHACHA20_POLY1305_HKDF_SHA256";

/// Nonce size for ChaCha20-Poly1305 (96 bits).
const NONCE_SIZE: usize = 12;

/// Poly1305 tag size.
const TAG_SIZE: usize = 16;

/// An encrypted value as stored in a document.
///
/// Serialized form, where `ciphertext` is base64 of nonce, ciphertext and tag:
/// ```text
/// {"alg":"CHACHA20_POLY1305_HKDF_SHA256","kid":"myKey--v2","ciphertext":"<base64>"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedField {
    /// Algorithm identifier
    pub alg: String,
    /// Identifier of the keyring key used for encryption
    pub kid: String,
    /// Base64 of nonce, ciphertext and tag
    pub ciphertext: String,
}

/// Encrypts and decrypts field values using keys from a [`Keyring`].
///
/// Encryption always uses the default key identifier, which may be an
/// unversioned alias for a rotating keyring. Decryption uses the identifier
/// recorded in the encrypted field.
///
/// # Example
///
/// ```
/// use rotakey::context::FieldContext;
/// use rotakey::crypto::CryptoManager;
/// use rotakey::keyring::StaticKeyring;
///
/// let keyring = StaticKeyring::new().with_key("myKey", vec![42u8; 64]);
/// let crypto = CryptoManager::new(keyring, "myKey");
/// let context = FieldContext::new("magicWord");
///
/// let encrypted = crypto.encrypt(b"Alakazam", &context).unwrap();
/// assert_eq!(encrypted.kid, "myKey");
/// assert_eq!(crypto.decrypt(&encrypted, &context).unwrap(), b"Alakazam");
/// ```
pub struct CryptoManager<K> {
    keyring: Arc<K>,
    default_key_id: String,
}

impl<K: Keyring> CryptoManager<K> {
    /// Creates a crypto manager that encrypts with `default_key_id`.
    pub fn new(keyring: K, default_key_id: impl Into<String>) -> Self {
        Self::from_shared(Arc::new(keyring), default_key_id)
    }

    /// Creates a crypto manager over a keyring shared with other owners.
    pub fn from_shared(keyring: Arc<K>, default_key_id: impl Into<String>) -> Self {
        Self { keyring, default_key_id: default_key_id.into() }
    }

    /// Returns the keyring.
    pub fn keyring(&self) -> &K {
        &self.keyring
    }

    /// Returns the identifier used for encryption.
    pub fn default_key_id(&self) -> &str {
        &self.default_key_id
    }

    /// Encrypts `plaintext` with the default key.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The key cannot be resolved (`Error::Keyring`) or does not exist
    ///   (`Error::KeyNotFound`)
    /// - The key is too short
    /// - Encryption fails
    pub fn encrypt(
        &self,
        plaintext: &[u8],
        context: &FieldContext,
    ) -> Result<EncryptedField, Error> {
        let key = self.resolve(&self.default_key_id)?;
        let cipher = Self::cipher(&key, context)?;

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from(nonce_bytes);

        let aad = context.to_string();
        let sealed = cipher
            .encrypt(&nonce, Payload { msg: plaintext, aad: aad.as_bytes() })
            .map_err(|e| {
                Error::EncryptionFailed(format!("ChaCha20-Poly1305 encryption failed: {e}"))
            })?;

        let mut combined = Vec::with_capacity(NONCE_SIZE + sealed.len());
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&sealed);

        debug!(kid = key.id(), field = context.field_name(), "encrypted field");
        Ok(EncryptedField {
            alg: ALGORITHM.to_string(),
            kid: key.id().to_string(),
            ciphertext: STANDARD.encode(combined),
        })
    }

    /// Decrypts a field encrypted with the same context.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The algorithm is not supported
    /// - The ciphertext is malformed
    /// - The recorded key cannot be resolved or does not exist
    /// - Authentication fails (wrong context, tampering)
    pub fn decrypt(
        &self,
        field: &EncryptedField,
        context: &FieldContext,
    ) -> Result<Vec<u8>, Error> {
        if field.alg != ALGORITHM {
            return Err(Error::UnsupportedAlgorithm(field.alg.clone()));
        }

        let combined = STANDARD
            .decode(&field.ciphertext)
            .map_err(|e| Error::InvalidEncryptedField(format!("ciphertext is not base64: {e}")))?;
        if combined.len() < NONCE_SIZE + TAG_SIZE {
            return Err(Error::InvalidEncryptedField(format!(
                "ciphertext too short: {} bytes",
                combined.len()
            )));
        }
        let (nonce_bytes, sealed) = combined.split_at(NONCE_SIZE);

        let key = self.resolve(&field.kid)?;
        let cipher = Self::cipher(&key, context)?;

        let nonce_bytes: [u8; NONCE_SIZE] = nonce_bytes
            .try_into()
            .map_err(|_| Error::DecryptionFailed("Invalid nonce size".to_string()))?;
        let nonce = Nonce::from(nonce_bytes);

        let aad = context.to_string();
        cipher
            .decrypt(&nonce, Payload { msg: sealed, aad: aad.as_bytes() })
            .map_err(|_| Error::AuthenticationFailed)
    }

    fn resolve(&self, key_id: &str) -> Result<Key, Error> {
        self.keyring.get(key_id)?.ok_or_else(|| Error::KeyNotFound(key_id.to_string()))
    }

    fn cipher(key: &Key, context: &FieldContext) -> Result<ChaCha20Poly1305, Error> {
        let field_key = derive_field_key(key.bytes(), context)?;
        ChaCha20Poly1305::new_from_slice(field_key.expose_secret())
            .map_err(|e| Error::EncryptionFailed(format!("Invalid field key: {e}")))
    }
}

impl<K> Clone for CryptoManager<K> {
    fn clone(&self) -> Self {
        Self { keyring: Arc::clone(&self.keyring), default_key_id: self.default_key_id.clone() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::KeyringError;
    use crate::key_id::VersionDelimiter;
    use crate::keyring::StaticKeyring;
    use crate::rotating::{MemoryKeySource, RotatingKeyring};

    fn static_manager() -> CryptoManager<StaticKeyring> {
        CryptoManager::new(StaticKeyring::new().with_key("myKey", vec![42u8; 64]), "myKey")
    }

    #[test]
    fn test_encrypt_decrypt_round_trip() {
        let crypto = static_manager();
        let context = FieldContext::new("magicWord");

        let encrypted = crypto.encrypt(b"Alakazam", &context).expect("Encryption failed");
        let decrypted = crypto.decrypt(&encrypted, &context).expect("Decryption failed");

        assert_eq!(decrypted, b"Alakazam");
        assert_eq!(encrypted.alg, ALGORITHM);
        assert_eq!(encrypted.kid, "myKey");
    }

    #[test]
    fn test_nonce_randomizes_ciphertext() {
        let crypto = static_manager();
        let context = FieldContext::new("magicWord");

        let first = crypto.encrypt(b"Xyzzy", &context).unwrap();
        let second = crypto.encrypt(b"Xyzzy", &context).unwrap();

        assert_ne!(first.ciphertext, second.ciphertext);
    }

    #[test]
    fn test_wrong_context_fails() {
        let crypto = static_manager();

        let encrypted = crypto.encrypt(b"Alakazam", &FieldContext::new("magicWord")).unwrap();
        let result = crypto.decrypt(&encrypted, &FieldContext::new("name"));

        assert!(matches!(result, Err(Error::AuthenticationFailed)));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let crypto = static_manager();
        let context = FieldContext::new("magicWord");

        let mut encrypted = crypto.encrypt(b"Alakazam", &context).unwrap();
        let mut raw = STANDARD.decode(&encrypted.ciphertext).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0xFF;
        encrypted.ciphertext = STANDARD.encode(raw);

        assert!(matches!(crypto.decrypt(&encrypted, &context), Err(Error::AuthenticationFailed)));
    }

    #[test]
    fn test_malformed_fields_rejected() {
        let crypto = static_manager();
        let context = FieldContext::new("magicWord");
        let valid = crypto.encrypt(b"Alakazam", &context).unwrap();

        let wrong_alg =
            EncryptedField { alg: "AEAD_AES_256_CBC_HMAC_SHA512".into(), ..valid.clone() };
        assert!(matches!(
            crypto.decrypt(&wrong_alg, &context),
            Err(Error::UnsupportedAlgorithm(_))
        ));

        let not_base64 = EncryptedField { ciphertext: "***".into(), ..valid.clone() };
        assert!(matches!(
            crypto.decrypt(&not_base64, &context),
            Err(Error::InvalidEncryptedField(_))
        ));

        let too_short = EncryptedField { ciphertext: STANDARD.encode([0u8; 8]), ..valid };
        assert!(matches!(
            crypto.decrypt(&too_short, &context),
            Err(Error::InvalidEncryptedField(_))
        ));
    }

    #[test]
    fn test_missing_default_key_fails_encryption() {
        let crypto = CryptoManager::new(StaticKeyring::new(), "myKey");
        let result = crypto.encrypt(b"Alakazam", &FieldContext::new("magicWord"));

        assert!(matches!(result, Err(Error::KeyNotFound(id)) if id == "myKey"));
    }

    #[test]
    fn test_unknown_kid_fails_decryption() {
        let crypto = static_manager();
        let context = FieldContext::new("magicWord");
        let mut encrypted = crypto.encrypt(b"Alakazam", &context).unwrap();
        encrypted.kid = "retiredKey".to_string();

        assert!(matches!(crypto.decrypt(&encrypted, &context), Err(Error::KeyNotFound(_))));
    }

    #[test]
    fn test_short_key_rejected() {
        let crypto = CryptoManager::new(StaticKeyring::new().with_key("k", vec![1u8; 8]), "k");
        let result = crypto.encrypt(b"x", &FieldContext::new("f"));

        assert!(matches!(result, Err(Error::InvalidKeyLength { .. })));
    }

    #[test]
    fn test_rotation_keeps_old_values_readable() {
        let source = MemoryKeySource::new();
        source.insert("alpha", "v1", vec![1u8; 32]);
        source.set_primary("alpha", "v1");
        let keyring = RotatingKeyring::new(source, VersionDelimiter::default());
        let crypto = CryptoManager::new(keyring, "alpha");
        let context = FieldContext::new("magicWord");

        let old = crypto.encrypt(b"Alakazam", &context).unwrap();
        assert_eq!(old.kid, "alpha--v1");

        crypto.keyring().source().insert("alpha", "v2", vec![2u8; 32]);
        crypto.keyring().source().set_primary("alpha", "v2");

        let new = crypto.encrypt(b"Alakazam", &context).unwrap();
        assert_eq!(new.kid, "alpha--v2");

        assert_eq!(crypto.decrypt(&old, &context).unwrap(), b"Alakazam");
        assert_eq!(crypto.decrypt(&new, &context).unwrap(), b"Alakazam");
    }

    #[test]
    fn test_unresolvable_default_key() {
        let keyring = RotatingKeyring::new(MemoryKeySource::new(), VersionDelimiter::default());
        let crypto = CryptoManager::new(keyring, "alpha");

        let result = crypto.encrypt(b"x", &FieldContext::new("f"));
        assert!(matches!(result, Err(Error::Keyring(KeyringError::NoPrimaryVersion(_)))));
    }

    #[test]
    fn test_encrypted_field_json_shape() {
        let crypto = static_manager();
        let encrypted = crypto.encrypt(b"Alakazam", &FieldContext::new("magicWord")).unwrap();

        let json = serde_json::to_value(&encrypted).unwrap();
        assert_eq!(json["alg"], ALGORITHM);
        assert_eq!(json["kid"], "myKey");
        assert!(json["ciphertext"].is_string());
    }

    #[test]
    fn test_clone_shares_keyring() {
        let first = static_manager();
        let second = first.clone();
        let context = FieldContext::new("magicWord");

        let encrypted = first.encrypt(b"test", &context).unwrap();
        assert_eq!(second.decrypt(&encrypted, &context).unwrap(), b"test");
    }
}
