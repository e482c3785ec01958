//! File-based key source for `rotakey`.
//!
//! This source reads versioned keys from a directory and is suitable for
//! development, testing, and deployments that mount secrets as files.

#![warn(clippy::pedantic, clippy::nursery)]

use rand::rngs::OsRng;
use rand::RngCore;
use rotakey::error::KeyringError;
use rotakey::key_id::{KeyIdentifier, VersionDelimiter};
use rotakey::rotating::KeyByteSource;
use secrecy::SecretVec;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Size of keys created by [`FilesystemKeySource::rotate`].
pub const GENERATED_KEY_SIZE: usize = 64;

/// Default suffix of key files.
pub const DEFAULT_KEY_SUFFIX: &str = ".key";

/// Default suffix of primary-version marker files.
pub const DEFAULT_PRIMARY_SUFFIX: &str = ".key.primary";

/// Filesystem key source.
///
/// Keys are stored with the following structure (delimiter `--`):
/// ```text
/// secrets/
/// ├── myKey--v1.key         (raw key bytes, 0600 permissions)
/// ├── myKey--v2.key         (raw key bytes, 0600 permissions)
/// └── myKey.key.primary     (contains "v2")
/// ```
pub struct FilesystemKeySource {
    key_dir: PathBuf,
    delimiter: VersionDelimiter,
    key_suffix: String,
    primary_suffix: String,
}

impl FilesystemKeySource {
    /// Creates a new `FilesystemKeySource`.
    ///
    /// # Arguments
    ///
    /// * `key_dir` - Directory containing key files
    /// * `delimiter` - Separator between base name and version in file names
    ///
    /// # Errors
    ///
    /// Returns error if the directory doesn't exist.
    pub fn new(
        key_dir: impl Into<PathBuf>,
        delimiter: VersionDelimiter,
    ) -> Result<Self, KeyringError> {
        let key_dir = key_dir.into();
        if !key_dir.is_dir() {
            return Err(KeyringError::InvalidConfig(format!(
                "Key directory does not exist: {}",
                key_dir.display()
            )));
        }
        Ok(Self {
            key_dir,
            delimiter,
            key_suffix: DEFAULT_KEY_SUFFIX.to_string(),
            primary_suffix: DEFAULT_PRIMARY_SUFFIX.to_string(),
        })
    }

    /// Overrides the key and primary-marker file suffixes.
    ///
    /// # Errors
    ///
    /// Returns error if either suffix is empty or they are equal.
    pub fn with_suffixes(
        mut self,
        key_suffix: impl Into<String>,
        primary_suffix: impl Into<String>,
    ) -> Result<Self, KeyringError> {
        let key_suffix = key_suffix.into();
        let primary_suffix = primary_suffix.into();
        if key_suffix.is_empty() || primary_suffix.is_empty() || key_suffix == primary_suffix {
            return Err(KeyringError::InvalidConfig(format!(
                "key suffix {key_suffix:?} and primary suffix {primary_suffix:?} \
                 must be distinct and non-empty"
            )));
        }
        self.key_suffix = key_suffix;
        self.primary_suffix = primary_suffix;
        Ok(self)
    }

    /// Creates the key directory if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns error if directory creation fails.
    pub fn init(key_dir: impl AsRef<Path>) -> Result<(), KeyringError> {
        let key_dir = key_dir.as_ref();
        fs::create_dir_all(key_dir)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(key_dir, fs::Permissions::from_mode(0o700))?;
        }
        Ok(())
    }

    /// Returns the key directory.
    #[must_use]
    pub fn key_dir(&self) -> &Path {
        &self.key_dir
    }

    /// Lists the versions stored for `base_name`, sorted.
    ///
    /// # Errors
    ///
    /// Returns error if the name is invalid or the directory can't be read.
    pub fn versions(&self, base_name: &str) -> Result<Vec<String>, KeyringError> {
        check_component(base_name, base_name)?;
        let prefix = format!("{base_name}{}", self.delimiter);

        let mut versions = Vec::new();
        for entry in fs::read_dir(&self.key_dir)? {
            let file_name = entry?.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            if let Some(version) = file_name
                .strip_prefix(prefix.as_str())
                .and_then(|rest| rest.strip_suffix(self.key_suffix.as_str()))
            {
                if !version.contains(self.delimiter.as_str()) {
                    versions.push(version.to_string());
                }
            }
        }
        versions.sort();
        Ok(versions)
    }

    /// Creates a new random key version for `base_name` and makes it
    /// primary.
    ///
    /// New versions are named `v<N>`, one past the highest existing
    /// numbered version. Existing versions are left in place so data
    /// encrypted with them stays readable.
    ///
    /// # Errors
    ///
    /// Returns error if the name is invalid, the highest version number is
    /// already `u64::MAX`, or writing fails.
    pub fn rotate(&self, base_name: &str) -> Result<KeyIdentifier, KeyringError> {
        let next = match self
            .versions(base_name)?
            .iter()
            .filter_map(|version| version.strip_prefix('v')?.parse::<u64>().ok())
            .max()
        {
            None => 1,
            Some(highest) => highest.checked_add(1).ok_or_else(|| {
                KeyringError::Source(format!(
                    "no further version number available for {base_name}"
                ))
            })?,
        };
        let id = KeyIdentifier::new(base_name, format!("v{next}"));

        let mut key = vec![0u8; GENERATED_KEY_SIZE];
        OsRng.fill_bytes(&mut key);
        write_secret(&self.key_path(&id)?, &key, true)?;
        self.set_primary(base_name, id.version())?;

        debug!(key = %id.format(&self.delimiter), "rotated key");
        Ok(id)
    }

    /// Writes the primary-version marker for `base_name`.
    ///
    /// # Errors
    ///
    /// Returns error if a name is invalid, the version has no key file, or
    /// writing fails.
    pub fn set_primary(&self, base_name: &str, version: &str) -> Result<(), KeyringError> {
        let id = KeyIdentifier::new(base_name, version);
        if !self.key_path(&id)?.is_file() {
            return Err(KeyringError::Source(format!(
                "cannot make missing key primary: {}",
                id.format(&self.delimiter)
            )));
        }
        write_secret(&self.primary_path(base_name)?, version.as_bytes(), false)
    }

    fn key_path(&self, id: &KeyIdentifier) -> Result<PathBuf, KeyringError> {
        let formatted = id.format(&self.delimiter);
        check_component(id.base_name(), &formatted)?;
        check_component(id.version(), &formatted)?;
        Ok(self.key_dir.join(format!("{formatted}{}", self.key_suffix)))
    }

    fn primary_path(&self, base_name: &str) -> Result<PathBuf, KeyringError> {
        check_component(base_name, base_name)?;
        Ok(self.key_dir.join(format!("{base_name}{}", self.primary_suffix)))
    }
}

impl KeyByteSource for FilesystemKeySource {
    fn primary_version(&self, base_name: &str) -> Result<Option<String>, KeyringError> {
        let version = match read_optional(&self.primary_path(base_name)?)? {
            Some(contents) => String::from_utf8(contents).map_err(|_| {
                KeyringError::Source(format!("primary version for {base_name} is not UTF-8"))
            })?,
            None => return Ok(None),
        };
        let version = version.trim();
        Ok((!version.is_empty()).then(|| version.to_string()))
    }

    fn key_bytes(&self, id: &KeyIdentifier) -> Result<Option<SecretVec<u8>>, KeyringError> {
        let path = self.key_path(id)?;
        debug!(path = %path.display(), "reading key file");
        Ok(read_optional(&path)?.map(SecretVec::new))
    }
}

/// Rejects names that would escape the key directory.
fn check_component(component: &str, key_id: &str) -> Result<(), KeyringError> {
    if component.contains(['/', '\\', '\0']) || component == "." || component == ".." {
        return Err(KeyringError::InvalidKeyId(key_id.to_string()));
    }
    Ok(())
}

fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, KeyringError> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

fn write_secret(path: &Path, contents: &[u8], create_new: bool) -> Result<(), KeyringError> {
    let mut options = fs::OpenOptions::new();
    options.write(true);
    if create_new {
        options.create_new(true);
    } else {
        options.create(true).truncate(true);
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(contents)?;
    file.sync_all()?;
    Ok(())
}
