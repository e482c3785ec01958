//! Field key derivation using HKDF-SHA256.
//!
//! Keyring keys are never used directly as cipher keys. Each field gets its
//! own 256-bit key derived from the keyring key with the field context as
//! HKDF `info`, so keys of any length (at least [`MIN_KEY_SIZE`]) can be
//! stored in a keyring.

use crate::context::FieldContext;
use crate::error::Error;
use hkdf::Hkdf;
use secrecy::{ExposeSecret, SecretVec};
use sha2::Sha256;

/// Derived field key size in bytes (256 bits).
pub const FIELD_KEY_SIZE: usize = 32;

/// Shortest keyring key accepted as input key material.
pub const MIN_KEY_SIZE: usize = 32;

const INFO_PREFIX: &[u8] = b"rotakey-field-v1|";

/// Derives the cipher key for one field.
///
/// # Errors
///
/// Returns `Error::InvalidKeyLength` if `key` is shorter than
/// [`MIN_KEY_SIZE`], or `Error::KeyDerivation` if HKDF fails.
///
/// # Example
///
/// ```
/// use rotakey::context::FieldContext;
/// use rotakey::kdf::{derive_field_key, FIELD_KEY_SIZE};
/// use secrecy::{ExposeSecret, SecretVec};
///
/// let key = SecretVec::new(vec![0u8; 64]);
/// let derived = derive_field_key(&key, &FieldContext::new("magicWord")).unwrap();
/// assert_eq!(derived.expose_secret().len(), FIELD_KEY_SIZE);
/// ```
pub fn derive_field_key(
    key: &SecretVec<u8>,
    context: &FieldContext,
) -> Result<SecretVec<u8>, Error> {
    let ikm = key.expose_secret();
    if ikm.len() < MIN_KEY_SIZE {
        return Err(Error::InvalidKeyLength { expected: MIN_KEY_SIZE, actual: ikm.len() });
    }

    let hkdf = Hkdf::<Sha256>::new(None, ikm);
    let info = context.to_string();

    let mut derived = vec![0u8; FIELD_KEY_SIZE];
    hkdf.expand_multi_info(&[INFO_PREFIX, info.as_bytes()], &mut derived)
        .map_err(|_| Error::KeyDerivation)?;

    Ok(SecretVec::new(derived))
}
