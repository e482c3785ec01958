//! `rotakey` CLI tool for key management and the field encryption demo.

#![warn(clippy::pedantic, clippy::nursery)]

mod rabbit;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rabbit::Rabbit;
use rand::rngs::OsRng;
use rand::RngCore;
use rotakey::prelude::*;
use rotakey_key_file::{FilesystemKeySource, GENERATED_KEY_SIZE};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Collection name; also scopes every encrypted field.
const COLLECTION: &str = "rabbits";
const DOCUMENT_ID: &str = "rolodex";
const DEFAULT_KEY_NAME: &str = "myKey";

#[derive(Parser)]
#[command(name = "rotakey")]
#[command(about = "Rotating keyring and field encryption CLI", long_about = None)]
struct Cli {
    /// JSON keyring configuration (delimiter, cache TTL and size)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store a rolodex with encrypted magic words and read it back
    Demo {
        /// Directory of versioned key files (a random in-memory key is used if omitted)
        #[arg(short, long)]
        key_dir: Option<PathBuf>,
        /// Key used for encryption; a bare name resolves to its primary version
        #[arg(long, default_value = DEFAULT_KEY_NAME)]
        key: String,
    },
    /// Create a new key version and make it primary
    Keygen {
        /// Directory of versioned key files
        #[arg(short, long, default_value = "./keys")]
        key_dir: PathBuf,
        /// Base name of the key
        #[arg(short, long, default_value = DEFAULT_KEY_NAME)]
        name: String,
    },
    /// Show which key version an identifier resolves to
    Resolve {
        /// Directory of versioned key files
        #[arg(short, long, default_value = "./keys")]
        key_dir: PathBuf,
        /// Key name or versioned identifier
        key_id: String,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Demo { key_dir: Some(key_dir), key } => {
            let keyring = config.build_rotating(filesystem_source(&key_dir, &config)?)?;
            run_demo(keyring, &key)
        }
        Commands::Demo { key_dir: None, key } => run_demo(keyring_with_random_key(&key), &key),
        Commands::Keygen { key_dir, name } => keygen(&key_dir, &name, &config),
        Commands::Resolve { key_dir, key_id } => resolve(&key_dir, &key_id, &config),
    }
}

fn load_config(path: Option<&Path>) -> Result<KeyringConfig> {
    let Some(path) = path else {
        return Ok(KeyringConfig::default());
    };
    let config = KeyringConfig::from_file(path)
        .with_context(|| format!("failed to load config from {}", path.display()))?;
    config.validate()?;
    Ok(config)
}

fn filesystem_source(key_dir: &Path, config: &KeyringConfig) -> Result<FilesystemKeySource> {
    FilesystemKeySource::new(key_dir, config.version_delimiter()?)
        .with_context(|| format!("cannot use key directory {}", key_dir.display()))
}

/// Keyring holding a single random key.
///
/// The key isn't stored anywhere, so data encrypted with it cannot be
/// decrypted after the program ends.
fn keyring_with_random_key(name: &str) -> StaticKeyring {
    let mut key = vec![0u8; GENERATED_KEY_SIZE];
    OsRng.fill_bytes(&mut key);
    StaticKeyring::new().with_key(name, key)
}

fn run_demo<K: Keyring>(keyring: K, key_id: &str) -> Result<()> {
    let crypto = CryptoManager::new(keyring, key_id);
    let fields = EncryptedFields::new([rabbit::ENCRYPTED_FIELD]);
    let collection = Collection::new(COLLECTION, crypto, fields);

    collection.upsert(DOCUMENT_ID, &rabbit::rolodex()).context("failed to store rolodex")?;
    info!(document = DOCUMENT_ID, "stored rolodex");
    display_stored(&collection)?;

    let decrypted: Vec<Rabbit> = collection
        .get_as(DOCUMENT_ID)
        .context("failed to decrypt rolodex")?
        .context("rolodex missing after upsert")?;
    println!("Decrypted rolodex");
    println!("=================");
    for rabbit in &decrypted {
        println!("{rabbit}");
    }
    println!();

    collection
        .append(DOCUMENT_ID, &Rabbit::new("Fluffy", "Hocus Pocus"))
        .context("failed to append rabbit")?;
    info!(document = DOCUMENT_ID, "appended rabbit");
    display_stored(&collection)?;

    // Field by field, without binding the whole document.
    println!("Decrypted rolodex (field by field)");
    println!("==================================");
    let stored = collection.get_raw(DOCUMENT_ID).context("rolodex missing after append")?;
    for entry in stored.as_array().into_iter().flatten() {
        let name = entry["name"].as_str().unwrap_or_default();
        let magic_word = collection
            .decrypt_field(entry, rabbit::ENCRYPTED_FIELD)?
            .and_then(|value| value.as_str().map(str::to_string))
            .unwrap_or_default();
        println!("{}", Rabbit::new(name, magic_word));
    }
    println!();

    Ok(())
}

fn display_stored<K: Keyring>(collection: &Collection<K>) -> Result<()> {
    let stored = collection.get_raw(DOCUMENT_ID).context("rolodex missing")?;
    println!();
    println!("Document as stored:");
    println!("{}", serde_json::to_string_pretty(&stored)?);
    println!();
    Ok(())
}

fn keygen(key_dir: &Path, name: &str, config: &KeyringConfig) -> Result<()> {
    FilesystemKeySource::init(key_dir)
        .with_context(|| format!("cannot create key directory {}", key_dir.display()))?;
    let source = filesystem_source(key_dir, config)?;

    let id = source.rotate(name)?;
    let formatted = id.format(&config.version_delimiter()?);
    info!(key = %formatted, "created key");
    println!("Created {formatted} (now primary for {name})");
    Ok(())
}

fn resolve(key_dir: &Path, key_id: &str, config: &KeyringConfig) -> Result<()> {
    let source = filesystem_source(key_dir, config)?;
    let keyring = RotatingKeyring::new(source, config.version_delimiter()?);

    match keyring.get(key_id)? {
        Some(key) => {
            println!("{key_id} -> {} ({} bytes)", key.id(), key.len());
            Ok(())
        }
        None => bail!("key not found: {key_id}"),
    }
}
