//! Key rotation example for `rotakey`.
//!
//! Encrypts a field, rotates the key on disk, and shows that both the old
//! and the new ciphertext stay readable.

use rotakey::prelude::*;
use rotakey_key_file::FilesystemKeySource;
use std::path::PathBuf;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("rotakey Key Rotation Example");
    println!("============================\n");

    let key_dir = PathBuf::from("./example_keys");
    FilesystemKeySource::init(&key_dir)?;

    let config = KeyringConfig::default();
    let source = FilesystemKeySource::new(&key_dir, config.version_delimiter()?)?;
    let first = source.rotate("myKey")?;
    println!("Created {}\n", first.format(&config.version_delimiter()?));

    let keyring = config.build_rotating(source)?;
    let crypto = CryptoManager::new(keyring, "myKey");
    let context = FieldContext::new("magicWord").with_scope("rabbits");

    let before = crypto.encrypt(b"Alakazam", &context)?;
    println!("Encrypted with {}", before.kid);

    // Rotate behind the cache, then drop the stale alias.
    let second = crypto.keyring().inner().source().rotate("myKey")?;
    crypto.keyring().invalidate("myKey");
    println!("Rotated to {}\n", second.format(&config.version_delimiter()?));

    let after = crypto.encrypt(b"Xyzzy", &context)?;
    println!("Encrypted with {}", after.kid);

    for field in [&before, &after] {
        let plaintext = crypto.decrypt(field, &context)?;
        println!("{} -> {}", field.kid, String::from_utf8_lossy(&plaintext));
    }

    println!("\nKeys are kept in {}", key_dir.display());
    Ok(())
}
