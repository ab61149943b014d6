//! Key-value stores holding signing keys and published public keys.
//!
//! Two logical stores are used:
//! - the public store keeps `current-kid`, `active-kids`, `active-secrets` and one
//!   public JWK per kid
//! - the secret store keeps one base64 encoded private key or shared secret per kid
//!
//! [`FileKeyStore`] keeps one file per key under a directory. [`MemoryKeyStore`]
//! is used by tests and short lived tooling.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use error_stack::{Report, ResultExt};
use tempfile::NamedTempFile;

use crate::error::PensiunError;

/// Platform-agnostic key-value store.
pub trait KeyStore {
    /// Retrieve a value by key.
    ///
    /// Returns `Ok(Some(value))` if the key exists,
    /// `Ok(None)` if the key doesn't exist,
    /// or `Err` if there was an error accessing the store.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, Report<PensiunError>>;

    /// Insert or replace a value.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage cannot be written.
    fn put(&self, key: &str, value: &str) -> Result<(), Report<PensiunError>>;

    /// Remove a value. Removing a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage cannot be modified.
    fn delete(&self, key: &str) -> Result<(), Report<PensiunError>>;

    /// Like [`KeyStore::get`] but a missing key is an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is missing or the store cannot be read.
    fn get_required(&self, key: &str) -> Result<String, Report<PensiunError>> {
        self.get(key)?.ok_or_else(|| {
            Report::new(PensiunError::KeyStore {
                message: format!("Key '{}' not found in store", key),
            })
        })
    }
}

fn validate_key_name(key: &str) -> Result<(), Report<PensiunError>> {
    let valid = !key.is_empty()
        && key != "."
        && key != ".."
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));

    if valid {
        Ok(())
    } else {
        Err(Report::new(PensiunError::KeyStore {
            message: format!("Invalid store key '{}'", key),
        }))
    }
}

/// Directory backed store, one file per key.
#[derive(Debug, Clone)]
pub struct FileKeyStore {
    dir: PathBuf,
    private: bool,
}

impl FileKeyStore {
    /// Store for public values.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            private: false,
        }
    }

    /// Store for secrets. The directory is created 0700 and files 0600.
    pub fn new_private(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            private: true,
        }
    }

    /// Public and secret stores for a key store root directory.
    ///
    /// Public values live in `<root>/public`, secrets in `<root>/secret`.
    pub fn pair(root: &Path) -> (Self, Self) {
        (
            Self::new(root.join("public")),
            Self::new_private(root.join("secret")),
        )
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, Report<PensiunError>> {
        validate_key_name(key)?;
        Ok(self.dir.join(key))
    }

    fn create_dir(&self) -> std::io::Result<()> {
        let mut builder = fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        if self.private {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(0o700);
        }
        builder.create(&self.dir)
    }

    /// Writes through a temp file in the same directory, then renames it into
    /// place. The temp file is created 0600, public values are widened to 0644
    /// before the rename.
    fn write_file(&self, path: &Path, value: &str) -> std::io::Result<()> {
        self.create_dir()?;

        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(value.as_bytes())?;
        tmp.as_file().sync_all()?;

        #[cfg(unix)]
        if !self.private {
            use std::os::unix::fs::PermissionsExt;
            tmp.as_file().set_permissions(fs::Permissions::from_mode(0o644))?;
        }

        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }
}

impl KeyStore for FileKeyStore {
    fn get(&self, key: &str) -> Result<Option<String>, Report<PensiunError>> {
        let path = self.path_for(key)?;
        if !path.exists() {
            return Ok(None);
        }

        let value = fs::read_to_string(&path).change_context(PensiunError::KeyStore {
            message: format!("Failed to read '{}'", path.display()),
        })?;
        Ok(Some(value.trim_end().to_string()))
    }

    fn put(&self, key: &str, value: &str) -> Result<(), Report<PensiunError>> {
        let path = self.path_for(key)?;
        self.write_file(&path, value)
            .change_context(PensiunError::KeyStore {
                message: format!("Failed to write '{}'", path.display()),
            })
    }

    fn delete(&self, key: &str) -> Result<(), Report<PensiunError>> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Report::new(e).change_context(PensiunError::KeyStore {
                message: format!("Failed to delete '{}'", path.display()),
            })),
        }
    }
}

/// In-memory store.
#[derive(Debug, Default)]
pub struct MemoryKeyStore {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryKeyStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn poisoned() -> Report<PensiunError> {
        Report::new(PensiunError::KeyStore {
            message: "Memory store lock poisoned".into(),
        })
    }
}

impl KeyStore for MemoryKeyStore {
    fn get(&self, key: &str) -> Result<Option<String>, Report<PensiunError>> {
        let values = self.values.read().map_err(|_| Self::poisoned())?;
        Ok(values.get(key).cloned())
    }

    fn put(&self, key: &str, value: &str) -> Result<(), Report<PensiunError>> {
        validate_key_name(key)?;
        let mut values = self.values.write().map_err(|_| Self::poisoned())?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), Report<PensiunError>> {
        let mut values = self.values.write().map_err(|_| Self::poisoned())?;
        values.remove(key);
        Ok(())
    }
}

impl<T: KeyStore + ?Sized> KeyStore for &T {
    fn get(&self, key: &str) -> Result<Option<String>, Report<PensiunError>> {
        (**self).get(key)
    }

    fn put(&self, key: &str, value: &str) -> Result<(), Report<PensiunError>> {
        (**self).put(key, value)
    }

    fn delete(&self, key: &str) -> Result<(), Report<PensiunError>> {
        (**self).delete(key)
    }
}
