//! A tiny local key/value store, the desktop analogue of browser local storage.

use crate::error::{EditError, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Slot name the persisted API key lives under.
pub const CREDENTIAL_SLOT: &str = "gemini-api-key";

/// String key/value pairs kept in a single JSON file.
///
/// Every call reads or rewrites the whole file; the store holds a handful of
/// entries at most.
#[derive(Debug, Clone)]
pub struct LocalStore {
    path: PathBuf,
}

impl LocalStore {
    /// Opens the store at `<config_dir>/gemedit/storage.json`.
    pub fn open_default() -> Result<Self> {
        let dir = dirs::config_dir().ok_or_else(|| {
            EditError::Config("could not determine the user configuration directory".into())
        })?;
        Ok(Self::at(dir.join("gemedit").join("storage.json")))
    }

    /// Opens a store backed by an explicit file.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads a value.
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.load()?.remove(key))
    }

    /// Writes a value, replacing any previous one.
    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.load()?;
        entries.insert(key.to_string(), value.to_string());
        self.save(&entries)
    }

    /// Deletes a value. Returns whether it existed.
    ///
    /// An unreadable file is discarded as a whole, so a corrupt store can
    /// always be cleared.
    pub fn remove(&self, key: &str) -> Result<bool> {
        let mut entries = match self.load() {
            Ok(entries) => entries,
            Err(e @ EditError::CorruptStore { .. }) => {
                tracing::warn!("{e}; discarding it");
                std::fs::remove_file(&self.path)?;
                return Ok(true);
            }
            Err(e) => return Err(e),
        };
        let existed = entries.remove(key).is_some();
        if existed {
            self.save(&entries)?;
        }
        Ok(existed)
    }

    fn load(&self) -> Result<BTreeMap<String, String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) if text.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(text) => serde_json::from_str(&text).map_err(|e| EditError::CorruptStore {
                path: self.path.clone(),
                message: e.to_string(),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Writes to a private temp file next to the target and renames it into
    /// place, so readers see either the old or the new contents.
    fn save(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(parent)?;

        let mut file = tempfile::NamedTempFile::new_in(parent)?;
        restrict_permissions(file.as_file())?;
        serde_json::to_writer_pretty(&mut file, entries)?;
        file.as_file().sync_all()?;
        file.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}

#[cfg(unix)]
fn restrict_permissions(file: &std::fs::File) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_file: &std::fs::File) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::at(dir.path().join("nested").join("storage.json"));
        assert_eq!(store.get(CREDENTIAL_SLOT).unwrap(), None);
        assert!(!store.remove(CREDENTIAL_SLOT).unwrap());
    }

    #[test]
    fn test_set_get_remove() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::at(dir.path().join("nested").join("storage.json"));

        store.set(CREDENTIAL_SLOT, "first").unwrap();
        store.set("other", "kept").unwrap();
        store.set(CREDENTIAL_SLOT, "second").unwrap();
        assert_eq!(store.get(CREDENTIAL_SLOT).unwrap().as_deref(), Some("second"));

        assert!(store.remove(CREDENTIAL_SLOT).unwrap());
        assert_eq!(store.get(CREDENTIAL_SLOT).unwrap(), None);
        assert_eq!(store.get("other").unwrap().as_deref(), Some("kept"));
    }

    #[test]
    fn test_corrupt_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.json");
        std::fs::write(&path, r#"{"gemini-api-key": "abc"#).unwrap();

        let err = LocalStore::at(&path).get(CREDENTIAL_SLOT).unwrap_err();
        assert!(matches!(err, EditError::CorruptStore { .. }));
        assert_eq!(err.kind(), crate::error::ErrorKind::Config);
    }

    #[test]
    fn test_remove_discards_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.json");
        std::fs::write(&path, r#"{"gemini-api-key": "abc"#).unwrap();
        let store = LocalStore::at(&path);

        assert!(store.remove(CREDENTIAL_SLOT).unwrap());
        assert!(!path.exists());
        assert_eq!(store.get(CREDENTIAL_SLOT).unwrap(), None);

        store.set(CREDENTIAL_SLOT, "fresh").unwrap();
        assert_eq!(store.get(CREDENTIAL_SLOT).unwrap().as_deref(), Some("fresh"));
    }

    #[test]
    fn test_set_leaves_only_the_target_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::at(dir.path().join("storage.json"));
        store.set(CREDENTIAL_SLOT, "first").unwrap();
        store.set(CREDENTIAL_SLOT, "second").unwrap();

        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("storage.json")]);
    }

    #[cfg(unix)]
    #[test]
    fn test_store_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::at(dir.path().join("storage.json"));
        store.set(CREDENTIAL_SLOT, "secret").unwrap();

        let mode = std::fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
