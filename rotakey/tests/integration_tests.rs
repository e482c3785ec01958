//! Integration tests for rotakey with in-memory and filesystem key sources.

use rotakey::prelude::*;
use rotakey_key_file::FilesystemKeySource;
use secrecy::ExposeSecret;
use serde_json::{json, Value};
use std::time::Duration;
use tempfile::TempDir;

fn alpha_source() -> MemoryKeySource {
    let source = MemoryKeySource::new();
    source.insert("alpha", "v1", vec![0x11; 32]);
    source.insert("alpha", "v2", vec![0x22; 32]);
    source.set_primary("alpha", "v2");
    source
}

fn cached(source: MemoryKeySource) -> CachingKeyring<RotatingKeyring<MemoryKeySource>> {
    let config = CacheConfig::new(Duration::from_secs(60), 5000).expect("valid cache config");
    CachingKeyring::new(RotatingKeyring::new(source, VersionDelimiter::default()), config)
}

#[test]
fn test_end_to_end_rotating_resolution() {
    let keyring = cached(alpha_source());

    let primary = keyring.get("alpha").unwrap().expect("primary key");
    assert_eq!(primary.id(), "alpha--v2");
    assert_eq!(primary.bytes().expose_secret(), &vec![0x22; 32]);

    let older = keyring.get("alpha--v1").unwrap().expect("explicit version");
    assert_eq!(older.id(), "alpha--v1");
    assert_eq!(older.bytes().expose_secret(), &vec![0x11; 32]);

    assert!(keyring.get("alpha--v9").unwrap().is_none());

    let err = keyring.get("beta").unwrap_err();
    assert!(matches!(err, KeyringError::NoPrimaryVersion(_)));
    assert!(err.is_resolution_failure());
}

#[test]
fn test_cache_serves_repeat_lookups() {
    let keyring = cached(alpha_source());

    keyring.get("alpha--v1").unwrap().unwrap();
    keyring.get("alpha--v1").unwrap().unwrap();
    keyring.get("alpha--v9").unwrap();
    keyring.get("alpha--v9").unwrap();

    let stats = keyring.stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 3);
    assert_eq!(keyring.len(), 1);
}

#[test]
fn test_invalid_config_fails_fast() {
    assert!(VersionDelimiter::new("").is_err());
    assert!(CacheConfig::new(Duration::from_secs(60), 0).is_err());

    let config = KeyringConfig::from_json_str(r#"{"version_delimiter": ""}"#).unwrap();
    assert!(config.build_rotating(MemoryKeySource::new()).is_err());
}

#[test]
fn test_rotation_keeps_old_fields_readable() {
    let source = MemoryKeySource::new();
    source.insert("myKey", "v1", vec![1u8; 32]);
    source.set_primary("myKey", "v1");

    // Uncached so rotation is visible immediately.
    let keyring = std::sync::Arc::new(RotatingKeyring::new(source, VersionDelimiter::default()));
    let crypto = CryptoManager::from_shared(keyring.clone(), "myKey");
    let context = FieldContext::new("magicWord").with_scope("rabbits");

    let before = crypto.encrypt(b"Alakazam", &context).unwrap();
    assert_eq!(before.kid, "myKey--v1");

    keyring.source().insert("myKey", "v2", vec![2u8; 32]);
    keyring.source().set_primary("myKey", "v2");

    let after = crypto.encrypt(b"Xyzzy", &context).unwrap();
    assert_eq!(after.kid, "myKey--v2");

    assert_eq!(crypto.decrypt(&before, &context).unwrap(), b"Alakazam");
    assert_eq!(crypto.decrypt(&after, &context).unwrap(), b"Xyzzy");
}

#[test]
fn test_filesystem_rotation_with_encryption() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let key_dir = temp_dir.path().join("keys");
    FilesystemKeySource::init(&key_dir).expect("Failed to initialize keys");

    let writer = FilesystemKeySource::new(&key_dir, VersionDelimiter::default()).unwrap();
    writer.rotate("myKey").unwrap();

    let keyring = RotatingKeyring::new(
        FilesystemKeySource::new(&key_dir, VersionDelimiter::default()).unwrap(),
        VersionDelimiter::default(),
    );
    let crypto = CryptoManager::new(keyring, "myKey");
    let fields = EncryptedFields::new(["magicWord"]);
    let doc = json!({"name": "Floppy", "magicWord": "Ajji Majji la Tarajji"});

    let stored_v1 = fields.encrypt_value(&crypto, doc.clone(), Some("rabbits")).unwrap();
    assert_eq!(stored_v1["encrypted$magicWord"]["kid"], "myKey--v1");

    writer.rotate("myKey").unwrap();
    assert_eq!(writer.versions("myKey").unwrap(), vec!["v1", "v2"]);

    let stored_v2 = fields.encrypt_value(&crypto, doc.clone(), Some("rabbits")).unwrap();
    assert_eq!(stored_v2["encrypted$magicWord"]["kid"], "myKey--v2");

    for stored in [stored_v1, stored_v2] {
        let restored = fields.decrypt_value(&crypto, stored, Some("rabbits")).unwrap();
        assert_eq!(restored, doc);
    }
}

#[test]
fn test_cached_filesystem_keyring() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let source = FilesystemKeySource::new(temp_dir.path(), VersionDelimiter::default()).unwrap();
    let first = source.rotate("alpha").unwrap();

    let keyring = KeyringConfig::default().build_rotating(source).unwrap();

    let key = keyring.get("alpha").unwrap().expect("primary key");
    assert_eq!(key.id(), "alpha--v1");
    assert_eq!(key.len(), rotakey_key_file::GENERATED_KEY_SIZE);
    assert_eq!(first.version(), "v1");

    // A rotation behind the cache is only seen after invalidation.
    keyring.inner().source().rotate("alpha").unwrap();
    assert_eq!(keyring.get("alpha").unwrap().unwrap().id(), "alpha--v1");
    assert!(keyring.invalidate("alpha"));
    assert_eq!(keyring.get("alpha").unwrap().unwrap().id(), "alpha--v2");

    assert!(keyring.get("missing--v1").unwrap().is_none());
    assert!(keyring.get("missing").is_err());
}

#[test]
fn test_collection_over_cached_keyring() {
    let keyring = cached(alpha_source());
    let crypto = CryptoManager::new(keyring, "alpha");
    let collection = Collection::new("rabbits", crypto, EncryptedFields::new(["magicWord"]));

    let rolodex = json!([
        {"name": "Nibbles", "magicWord": "Alakazam"},
        {"name": "Booper", "magicWord": "Xyzzy"}
    ]);
    collection.upsert("rolodex", &rolodex).unwrap();

    let raw = collection.get_raw("rolodex").unwrap();
    assert_eq!(raw[0]["name"], "Nibbles");
    assert_eq!(raw[0]["encrypted$magicWord"]["kid"], "alpha--v2");
    assert!(raw[1].get("magicWord").is_none());

    let read: Value = collection.get_as("rolodex").unwrap().unwrap();
    assert_eq!(read, rolodex);
}
