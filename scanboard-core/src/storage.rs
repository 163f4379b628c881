//! Key/value persistence port with file and in-memory adapters

use crate::error::ScanError;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// String values stored under string keys
pub trait StoragePort: Send + Sync {
    /// `Ok(None)` when nothing is stored under `key`.
    fn read(&self, key: &str) -> Result<Option<String>, ScanError>;
    /// Replace the value in a single write.
    fn write(&self, key: &str, value: &str) -> Result<(), ScanError>;
    fn remove(&self, key: &str) -> Result<(), ScanError>;
}

/// One `<key>.json` file per key inside a directory
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

fn io_failure(action: &str, path: &Path, e: std::io::Error) -> ScanError {
    ScanError::PersistenceFailure(format!("{} '{}': {}", action, path.display(), e))
}

impl StoragePort for FileStorage {
    fn read(&self, key: &str) -> Result<Option<String>, ScanError> {
        let path = self.path_for(key);
        match fs::read_to_string(&path) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_failure("Cannot read", &path, e)),
        }
    }

    fn write(&self, key: &str, value: &str) -> Result<(), ScanError> {
        fs::create_dir_all(&self.dir).map_err(|e| io_failure("Cannot create", &self.dir, e))?;

        let path = self.path_for(key);
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, value).map_err(|e| io_failure("Cannot write", &tmp_path, e))?;

        // rename replaces the destination; on failure the previous file stays as it was
        if let Err(e) = fs::rename(&tmp_path, &path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(io_failure("Cannot replace", &path, e));
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), ScanError> {
        let path = self.path_for(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_failure("Cannot remove", &path, e)),
        }
    }
}

/// Process-local storage, lost on exit
#[derive(Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(|poisoned| {
            log::error!("Mutex poisoned, recovering");
            poisoned.into_inner()
        })
    }
}

impl StoragePort for MemoryStorage {
    fn read(&self, key: &str) -> Result<Option<String>, ScanError> {
        Ok(self.entries().get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<(), ScanError> {
        self.entries().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), ScanError> {
        self.entries().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn file_storage_roundtrip_and_remove() {
        let temp = tempdir().unwrap();
        let storage = FileStorage::new(temp.path().join("state"));
        assert_eq!(storage.read("scanHistory").unwrap(), None);

        storage.write("scanHistory", "[]").unwrap();
        storage.write("scanHistory", "[1]").unwrap();
        assert_eq!(storage.read("scanHistory").unwrap().as_deref(), Some("[1]"));
        assert!(temp.path().join("state").join("scanHistory.json").exists());
        assert!(!temp.path().join("state").join("scanHistory.json.tmp").exists());

        storage.remove("scanHistory").unwrap();
        storage.remove("scanHistory").unwrap();
        assert_eq!(storage.read("scanHistory").unwrap(), None);
    }

    #[test]
    fn file_storage_reports_unwritable_dir() {
        let temp = tempdir().unwrap();
        let blocker = temp.path().join("blocker");
        fs::write(&blocker, "not a dir").unwrap();
        let storage = FileStorage::new(&blocker);
        let err = storage.write("k", "v").unwrap_err();
        assert!(matches!(err, ScanError::PersistenceFailure(_)));
    }

    #[test]
    fn failed_replace_keeps_previous_entry() {
        let temp = tempdir().unwrap();
        let storage = FileStorage::new(temp.path());
        // a non-empty directory where the entry file should go cannot be replaced
        let target = temp.path().join("scanHistory.json");
        fs::create_dir(&target).unwrap();
        fs::write(target.join("keep"), "old").unwrap();

        let err = storage.write("scanHistory", "[]").unwrap_err();
        assert!(matches!(err, ScanError::PersistenceFailure(_)));
        assert_eq!(fs::read_to_string(target.join("keep")).unwrap(), "old");
        assert!(!temp.path().join("scanHistory.json.tmp").exists());
    }

    #[test]
    fn memory_storage_roundtrip() {
        let storage = MemoryStorage::new();
        storage.write("a", "1").unwrap();
        assert_eq!(storage.read("a").unwrap().as_deref(), Some("1"));
        storage.remove("a").unwrap();
        assert_eq!(storage.read("a").unwrap(), None);
    }
}
