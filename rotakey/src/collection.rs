//! In-memory document collection with transparent field encryption.

use crate::crypto::CryptoManager;
use crate::document::EncryptedFields;
use crate::error::Error;
use crate::keyring::Keyring;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// Stores JSON documents by id, encrypting registered fields on write and
/// decrypting them on typed reads.
///
/// # Example
///
/// ```
/// use rotakey::collection::Collection;
/// use rotakey::crypto::CryptoManager;
/// use rotakey::document::EncryptedFields;
/// use rotakey::keyring::StaticKeyring;
/// use serde_json::{json, Value};
///
/// let keyring = StaticKeyring::new().with_key("myKey", vec![1u8; 32]);
/// let crypto = CryptoManager::new(keyring, "myKey");
/// let collection = Collection::new("rabbits", crypto, EncryptedFields::new(["magicWord"]));
///
/// collection.upsert("booper", &json!({"name": "Booper", "magicWord": "Xyzzy"})).unwrap();
/// let raw = collection.get_raw("booper").unwrap();
/// assert!(raw.get("encrypted$magicWord").is_some());
///
/// let doc: Value = collection.get_as("booper").unwrap().unwrap();
/// assert_eq!(doc["magicWord"], "Xyzzy");
/// ```
pub struct Collection<K> {
    name: String,
    crypto: CryptoManager<K>,
    fields: EncryptedFields,
    documents: RwLock<HashMap<String, Value>>,
}

impl<K: Keyring> Collection<K> {
    /// Creates an empty collection. `name` scopes every encrypted field.
    pub fn new(name: impl Into<String>, crypto: CryptoManager<K>, fields: EncryptedFields) -> Self {
        Self { name: name.into(), crypto, fields, documents: RwLock::new(HashMap::new()) }
    }

    /// Returns the collection name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Encrypts and stores `data` under `id`, replacing any existing
    /// document. Nothing is stored if encryption fails.
    ///
    /// # Errors
    ///
    /// Returns error if serialization or encryption fails.
    pub fn upsert<T: Serialize + ?Sized>(
        &self,
        id: impl Into<String>,
        data: &T,
    ) -> Result<(), Error> {
        let stored = self.fields.encrypt_to_value(&self.crypto, data, self.scope())?;
        self.documents.write().unwrap_or_else(PoisonError::into_inner).insert(id.into(), stored);
        Ok(())
    }

    /// Encrypts `item` and appends it to the array stored under `id`.
    ///
    /// # Errors
    ///
    /// Returns `Error::DocumentNotFound` if nothing is stored under `id`,
    /// `Error::InvalidDocument` if the stored document is not an array, or
    /// the encryption error. The document is unchanged on error.
    pub fn append<T: Serialize + ?Sized>(&self, id: &str, item: &T) -> Result<(), Error> {
        let stored = self.fields.encrypt_to_value(&self.crypto, item, self.scope())?;

        let mut documents = self.documents.write().unwrap_or_else(PoisonError::into_inner);
        let document = documents.get_mut(id).ok_or_else(|| Error::DocumentNotFound(id.into()))?;
        let items = document
            .as_array_mut()
            .ok_or_else(|| Error::InvalidDocument(format!("{id} is not an array")))?;
        items.push(stored);
        Ok(())
    }

    /// Returns the document as stored, with encrypted fields left encrypted.
    pub fn get_raw(&self, id: &str) -> Option<Value> {
        self.documents.read().unwrap_or_else(PoisonError::into_inner).get(id).cloned()
    }

    /// Returns the decrypted document, or `None` if `id` is not stored.
    ///
    /// # Errors
    ///
    /// Returns error if decryption or deserialization fails.
    pub fn get_as<T: DeserializeOwned>(&self, id: &str) -> Result<Option<T>, Error> {
        self.get_raw(id)
            .map(|stored| self.fields.decrypt_into(&self.crypto, stored, self.scope()))
            .transpose()
    }

    /// Decrypts one encrypted field of a stored object, such as an element
    /// of an array returned by [`Collection::get_raw`].
    ///
    /// # Errors
    ///
    /// Returns error if the field is not registered, is malformed, or
    /// fails to decrypt.
    pub fn decrypt_field(&self, stored: &Value, field_name: &str) -> Result<Option<Value>, Error> {
        self.fields.decrypt_field(&self.crypto, stored, field_name, self.scope())
    }

    /// Removes a document, returning `true` if it existed.
    pub fn remove(&self, id: &str) -> bool {
        self.documents.write().unwrap_or_else(PoisonError::into_inner).remove(id).is_some()
    }

    /// Returns the number of stored documents.
    pub fn len(&self) -> usize {
        self.documents.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Returns `true` if no documents are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn scope(&self) -> Option<&str> {
        Some(self.name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyring::StaticKeyring;
    use serde_json::json;

    fn collection(keyring: StaticKeyring) -> Collection<StaticKeyring> {
        Collection::new(
            "rolodex",
            CryptoManager::new(keyring, "myKey"),
            EncryptedFields::new(["magicWord"]),
        )
    }

    #[test]
    fn test_upsert_and_read_back() {
        let collection = collection(StaticKeyring::new().with_key("myKey", vec![3u8; 32]));
        let doc = json!({"name": "Nibbles", "magicWord": "Alakazam"});

        collection.upsert("nibbles", &doc).unwrap();

        let raw = collection.get_raw("nibbles").unwrap();
        assert!(raw.get("magicWord").is_none());
        let read: Value = collection.get_as("nibbles").unwrap().unwrap();
        assert_eq!(read, doc);
    }

    #[test]
    fn test_missing_document() {
        let collection = collection(StaticKeyring::new().with_key("myKey", vec![3u8; 32]));

        assert!(collection.get_raw("nobody").is_none());
        assert!(collection.get_as::<Value>("nobody").unwrap().is_none());
        assert!(!collection.remove("nobody"));
    }

    #[test]
    fn test_failed_encryption_stores_nothing() {
        let collection = collection(StaticKeyring::new());

        let result = collection.upsert("nibbles", &json!({"magicWord": "Alakazam"}));
        assert!(matches!(result, Err(Error::KeyNotFound(_))));
        assert!(collection.is_empty());
    }

    #[test]
    fn test_append_encrypts_new_element() {
        let collection = collection(StaticKeyring::new().with_key("myKey", vec![3u8; 32]));
        let rolodex = json!([{"name": "Nibbles", "magicWord": "Alakazam"}]);
        collection.upsert("rolodex", &rolodex).unwrap();

        collection.append("rolodex", &json!({"name": "Bugs", "magicWord": "Abracadabra"})).unwrap();

        let raw = collection.get_raw("rolodex").unwrap();
        let rabbits = raw.as_array().unwrap();
        assert_eq!(rabbits.len(), 2);
        assert!(rabbits[1].get("magicWord").is_none());

        let magic_words: Vec<Value> = rabbits
            .iter()
            .map(|rabbit| collection.decrypt_field(rabbit, "magicWord").unwrap().unwrap())
            .collect();
        assert_eq!(magic_words, vec![json!("Alakazam"), json!("Abracadabra")]);
    }

    #[test]
    fn test_append_requires_stored_array() {
        let collection = collection(StaticKeyring::new().with_key("myKey", vec![3u8; 32]));
        let rabbit = json!({"magicWord": "Xyzzy"});

        let missing = collection.append("rolodex", &rabbit);
        assert!(matches!(missing, Err(Error::DocumentNotFound(_))));

        collection.upsert("single", &rabbit).unwrap();
        let not_array = collection.append("single", &rabbit);
        assert!(matches!(not_array, Err(Error::InvalidDocument(_))));
    }

    #[test]
    fn test_upsert_replaces() {
        let collection = collection(StaticKeyring::new().with_key("myKey", vec![3u8; 32]));

        collection.upsert("r", &json!({"magicWord": "one"})).unwrap();
        collection.upsert("r", &json!({"magicWord": "two"})).unwrap();

        let read: Value = collection.get_as("r").unwrap().unwrap();
        assert_eq!(read["magicWord"], "two");
        assert_eq!(collection.len(), 1);
        assert!(collection.remove("r"));
    }
}
