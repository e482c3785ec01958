//! # `rotakey`
//!
//! Rotating keyrings and field-level encryption for JSON documents.
//!
//! ## Features
//!
//! - Versioned key identifiers (`name--version`) with primary-version lookup
//! - Pluggable key sources behind a small [`rotating::KeyByteSource`] trait
//! - TTL + LRU caching decorator for any [`keyring::Keyring`]
//! - ChaCha20-Poly1305 field encryption with per-field HKDF keys
//! - Explicit per-field encryption schema for `serde_json` documents
//!
//! ## Example
//!
//! ```rust
//! use rotakey::prelude::*;
//! use serde_json::json;
//!
//! let source = MemoryKeySource::new();
//! source.insert("alpha", "v1", vec![1u8; 32]);
//! source.insert("alpha", "v2", vec![2u8; 32]);
//! source.set_primary("alpha", "v2");
//!
//! let keyring = KeyringConfig::default().build_rotating(source)?;
//! let crypto = CryptoManager::new(keyring, "alpha");
//! let fields = EncryptedFields::new(["magicWord"]);
//!
//! let stored = fields.encrypt_value(&crypto, json!({"magicWord": "Alakazam"}), None)?;
//! assert_eq!(stored["encrypted$magicWord"]["kid"], "alpha--v2");
//!
//! let restored = fields.decrypt_value(&crypto, stored, None)?;
//! assert_eq!(restored["magicWord"], "Alakazam");
//! # Ok::<(), rotakey::error::Error>(())
//! ```

#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod cache;
pub mod collection;
pub mod config;
pub mod context;
pub mod crypto;
pub mod document;
pub mod error;
pub mod kdf;
pub mod key_id;
pub mod keyring;
pub mod rotating;

pub mod prelude {
    //! Convenience re-exports for common use.
    pub use crate::cache::{CacheConfig, CachingKeyring};
    pub use crate::collection::Collection;
    pub use crate::config::KeyringConfig;
    pub use crate::context::FieldContext;
    pub use crate::crypto::{CryptoManager, EncryptedField};
    pub use crate::document::EncryptedFields;
    pub use crate::error::{Error, KeyringError};
    pub use crate::key_id::{KeyIdentifier, VersionDelimiter};
    pub use crate::keyring::{Key, Keyring, StaticKeyring};
    pub use crate::rotating::{KeyByteSource, MemoryKeySource, RotatingKeyring};
}
