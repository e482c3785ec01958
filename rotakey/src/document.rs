//! Field-level encryption of JSON documents.
//!
//! Which fields are encrypted is declared up front with [`EncryptedFields`]
//! rather than discovered from the data types. Encrypting a document
//! replaces every registered field `f`, at any depth, with a field named
//! `encrypted$f` holding an [`EncryptedField`]; decrypting reverses that.
//!
//! ```text
//! {"name":"Nibbles","magicWord":"Alakazam"}
//!   -> {"name":"Nibbles","encrypted$magicWord":{"alg":"...","kid":"myKey","ciphertext":"..."}}
//! ```

use crate::context::FieldContext;
use crate::crypto::{CryptoManager, EncryptedField};
use crate::error::Error;
use crate::keyring::Keyring;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use zeroize::Zeroizing;

/// Prefix marking encrypted fields in stored documents.
pub const DEFAULT_ENCRYPTED_FIELD_PREFIX: &str = "encrypted$";

/// Set of field names to encrypt, plus the stored-name prefix.
///
/// # Example
///
/// ```
/// use rotakey::crypto::CryptoManager;
/// use rotakey::document::EncryptedFields;
/// use rotakey::keyring::StaticKeyring;
/// use serde_json::json;
///
/// let keyring = StaticKeyring::new().with_key("myKey", vec![1u8; 32]);
/// let crypto = CryptoManager::new(keyring, "myKey");
/// let fields = EncryptedFields::new(["magicWord"]);
///
/// let document = json!({"name": "Booper", "magicWord": "Xyzzy"});
/// let stored = fields.encrypt_value(&crypto, document, None).unwrap();
/// assert!(stored.get("magicWord").is_none());
/// assert!(stored.get("encrypted$magicWord").is_some());
///
/// let restored = fields.decrypt_value(&crypto, stored, None).unwrap();
/// assert_eq!(restored, json!({"name": "Booper", "magicWord": "Xyzzy"}));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedFields {
    fields: BTreeSet<String>,
    prefix: String,
}

impl EncryptedFields {
    /// Registers the field names to encrypt.
    #[must_use]
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
            prefix: DEFAULT_ENCRYPTED_FIELD_PREFIX.to_string(),
        }
    }

    /// Sets the prefix used for stored encrypted field names.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Returns `true` if `field_name` is registered for encryption.
    #[must_use]
    pub fn contains(&self, field_name: &str) -> bool {
        self.fields.contains(field_name)
    }

    /// Returns the stored-name prefix.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Encrypts every registered field in `value`.
    ///
    /// A registered field's value, whatever its JSON type, is encrypted as
    /// a whole. `scope` is bound into each field's context.
    ///
    /// # Errors
    ///
    /// Returns the first encryption error, or `Error::InvalidEncryptedField`
    /// if an object already holds the stored name of a registered field.
    /// No partially encrypted document is returned.
    pub fn encrypt_value<K: Keyring>(
        &self,
        crypto: &CryptoManager<K>,
        value: Value,
        scope: Option<&str>,
    ) -> Result<Value, Error> {
        match value {
            Value::Object(object) => {
                let mut encrypted = Map::with_capacity(object.len());
                for (name, field) in object {
                    if self.contains(&name) {
                        let plaintext = Zeroizing::new(serde_json::to_vec(&field)?);
                        let sealed = crypto.encrypt(&plaintext, &context(&name, scope))?;
                        let stored_name = format!("{}{name}", self.prefix);
                        insert_unique(&mut encrypted, stored_name, serde_json::to_value(sealed)?)?;
                    } else {
                        let field = self.encrypt_value(crypto, field, scope)?;
                        insert_unique(&mut encrypted, name, field)?;
                    }
                }
                Ok(Value::Object(encrypted))
            }
            Value::Array(items) => items
                .into_iter()
                .map(|item| self.encrypt_value(crypto, item, scope))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            other => Ok(other),
        }
    }

    /// Decrypts every registered field in `value`.
    ///
    /// Prefixed fields whose name is not registered are left as stored.
    ///
    /// # Errors
    ///
    /// Returns the first decryption error, or `Error::InvalidEncryptedField`
    /// if an object holds both the stored and the plain name of a field.
    /// No partially decrypted document is returned.
    pub fn decrypt_value<K: Keyring>(
        &self,
        crypto: &CryptoManager<K>,
        value: Value,
        scope: Option<&str>,
    ) -> Result<Value, Error> {
        match value {
            Value::Object(object) => {
                let mut decrypted = Map::with_capacity(object.len());
                for (name, field) in object {
                    match name.strip_prefix(self.prefix.as_str()) {
                        Some(plain_name) if self.contains(plain_name) => {
                            let plain = open(crypto, &name, plain_name, field, scope)?;
                            insert_unique(&mut decrypted, plain_name.to_string(), plain)?;
                        }
                        _ => {
                            let field = self.decrypt_value(crypto, field, scope)?;
                            insert_unique(&mut decrypted, name, field)?;
                        }
                    }
                }
                Ok(Value::Object(decrypted))
            }
            Value::Array(items) => items
                .into_iter()
                .map(|item| self.decrypt_value(crypto, item, scope))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            other => Ok(other),
        }
    }

    /// Decrypts a single registered field of a stored object, leaving the
    /// rest of the document untouched.
    ///
    /// Returns `None` if `stored` is not an object or has no encrypted
    /// `field_name`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidEncryptedField` if `field_name` is not
    /// registered or its stored value is malformed, or the decryption error.
    pub fn decrypt_field<K: Keyring>(
        &self,
        crypto: &CryptoManager<K>,
        stored: &Value,
        field_name: &str,
        scope: Option<&str>,
    ) -> Result<Option<Value>, Error> {
        if !self.contains(field_name) {
            return Err(Error::InvalidEncryptedField(format!(
                "{field_name} is not registered for encryption"
            )));
        }
        let stored_name = format!("{}{field_name}", self.prefix);
        stored
            .get(&stored_name)
            .map(|field| open(crypto, &stored_name, field_name, field.clone(), scope))
            .transpose()
    }

    /// Serializes `data` and encrypts its registered fields.
    ///
    /// # Errors
    ///
    /// Returns error if serialization or encryption fails.
    pub fn encrypt_to_value<K: Keyring, T: Serialize + ?Sized>(
        &self,
        crypto: &CryptoManager<K>,
        data: &T,
        scope: Option<&str>,
    ) -> Result<Value, Error> {
        self.encrypt_value(crypto, serde_json::to_value(data)?, scope)
    }

    /// Decrypts registered fields and deserializes the result.
    ///
    /// # Errors
    ///
    /// Returns error if decryption or deserialization fails.
    pub fn decrypt_into<K: Keyring, T: DeserializeOwned>(
        &self,
        crypto: &CryptoManager<K>,
        value: Value,
        scope: Option<&str>,
    ) -> Result<T, Error> {
        Ok(serde_json::from_value(self.decrypt_value(crypto, value, scope)?)?)
    }
}

fn open<K: Keyring>(
    crypto: &CryptoManager<K>,
    stored_name: &str,
    plain_name: &str,
    field: Value,
    scope: Option<&str>,
) -> Result<Value, Error> {
    let sealed: EncryptedField = serde_json::from_value(field)
        .map_err(|e| Error::InvalidEncryptedField(format!("{stored_name}: {e}")))?;
    let plaintext = Zeroizing::new(crypto.decrypt(&sealed, &context(plain_name, scope))?);
    Ok(serde_json::from_slice(&plaintext)?)
}

/// Inserts `name`, refusing to overwrite a field already written.
fn insert_unique(object: &mut Map<String, Value>, name: String, value: Value) -> Result<(), Error> {
    if object.contains_key(&name) {
        return Err(Error::InvalidEncryptedField(format!("{name} appears twice")));
    }
    object.insert(name, value);
    Ok(())
}

fn context(field_name: &str, scope: Option<&str>) -> FieldContext {
    let context = FieldContext::new(field_name);
    match scope {
        Some(scope) => context.with_scope(scope),
        None => context,
    }
}
