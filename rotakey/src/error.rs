//! Error types for `rotakey` operations.

use std::fmt;

/// Main error type for field encryption and document operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Encryption operation failed
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    /// Decryption operation failed
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),

    /// Authentication tag verification failed (data may be corrupted or tampered)
    #[error("authentication failed: ciphertext may be corrupted or tampered")]
    AuthenticationFailed,

    /// Keyring operation failed
    #[error("keyring error: {0}")]
    Keyring(#[from] KeyringError),

    /// The keyring was consulted and holds no key for this identifier
    #[error("key not found: {0}")]
    KeyNotFound(String),

    /// Key material is too short for the cipher
    #[error("invalid key length: expected at least {expected} bytes, got {actual}")]
    InvalidKeyLength {
        /// Minimum accepted length
        expected: usize,
        /// Length of the key returned by the keyring
        actual: usize,
    },

    /// Key derivation failed
    #[error("key derivation failed")]
    KeyDerivation,

    /// Encrypted field names an algorithm this crate does not implement
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// Encrypted field is structurally invalid
    #[error("invalid encrypted field: {0}")]
    InvalidEncryptedField(String),

    /// No document is stored under this id
    #[error("document not found: {0}")]
    DocumentNotFound(String),

    /// Stored document has the wrong shape for the operation
    #[error("invalid document: {0}")]
    InvalidDocument(String),

    /// JSON (de)serialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while resolving key identifiers to key material.
///
/// A key that simply does not exist is not an error: keyrings report it as
/// `Ok(None)`.
#[derive(Debug)]
pub enum KeyringError {
    /// Unversioned identifier given, but no primary version is configured
    /// for its base name
    NoPrimaryVersion(String),

    /// Configuration rejected at construction time
    InvalidConfig(String),

    /// Key source refuses to map this identifier
    InvalidKeyId(String),

    /// Key source failed
    Source(String),

    /// I/O operation failed
    Io(std::io::Error),
}

impl fmt::Display for KeyringError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoPrimaryVersion(name) => {
                write!(f, "no primary version configured for key: {name}")
            }
            Self::InvalidConfig(msg) => write!(f, "invalid keyring configuration: {msg}"),
            Self::InvalidKeyId(id) => write!(f, "invalid key identifier: {id}"),
            Self::Source(msg) => write!(f, "key source error: {msg}"),
            Self::Io(err) => write!(f, "I/O error: {err}"),
        }
    }
}

impl std::error::Error for KeyringError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for KeyringError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl KeyringError {
    /// Returns `true` if the identifier could not be resolved to a concrete
    /// name and version.
    #[must_use]
    pub const fn is_resolution_failure(&self) -> bool {
        matches!(self, Self::NoPrimaryVersion(_))
    }
}
