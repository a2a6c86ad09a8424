//! File-backed storage backend.
//!
//! The whole store is one JSON object. Every operation re-reads the file and
//! every write replaces it atomically (temp file + rename), so separate
//! handles on the same path always observe each other's writes.
//!
//! Read-modify-write cycles hold an advisory lock on a sibling `.lock` file,
//! which serializes them across processes sharing the store.

use crate::{SessionStorage, StorageError, StorageResult};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

/// JSON file storage.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    lock_path: PathBuf,
    /// Serializes read-modify-write cycles within this process.
    lock: Mutex<()>,
}

/// Held for the duration of one read-modify-write cycle.
struct StoreGuard<'a> {
    _local: MutexGuard<'a, ()>,
    file: File,
}

impl Drop for StoreGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            warn!(error = %e, "Failed to release session file lock");
        }
    }
}

impl FileStorage {
    /// Open (or lazily create) the store at `path`.
    ///
    /// Fails if the file exists but does not hold a JSON object of strings.
    pub fn open(path: impl Into<PathBuf>) -> StorageResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut lock_name = OsString::from(path.as_os_str());
        lock_name.push(".lock");

        let storage = Self {
            lock_path: PathBuf::from(lock_name),
            path,
            lock: Mutex::new(()),
        };
        {
            let _guard = storage.acquire()?;
            storage.read_map()?;
        }

        debug!(path = %storage.path.display(), "Opened file storage");
        Ok(storage)
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn acquire(&self) -> StorageResult<StoreGuard<'_>> {
        let local = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let file = private_options()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.lock_path)?;
        file.lock()?;
        Ok(StoreGuard {
            _local: local,
            file,
        })
    }

    fn read_map(&self) -> StorageResult<BTreeMap<String, String>> {
        match fs::read_to_string(&self.path) {
            Ok(content) if content.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(content) => serde_json::from_str(&content).map_err(|e| {
                StorageError::Encoding(format!("{}: {}", self.path.display(), e))
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_map(&self, map: &BTreeMap<String, String>) -> StorageResult<()> {
        let content =
            serde_json::to_string_pretty(map).map_err(|e| StorageError::Encoding(e.to_string()))?;

        let tmp_path = self.temp_path();
        if let Err(e) = write_private(&tmp_path, content.as_bytes()) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e.into());
        }
        if let Err(e) = fs::rename(&tmp_path, &self.path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e.into());
        }
        Ok(())
    }

    /// Hidden sibling of the store, unique per process and write.
    fn temp_path(&self) -> PathBuf {
        let file_name = self
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "session".to_string());
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let tmp_name = format!(".{}.tmp.{}.{}", file_name, std::process::id(), nanos);
        match self.path.parent() {
            Some(parent) => parent.join(tmp_name),
            None => PathBuf::from(tmp_name),
        }
    }
}

/// Create `path` with owner-only permissions and flush `content` to disk.
fn write_private(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let mut file = private_options().write(true).create_new(true).open(path)?;
    file.write_all(content)?;
    file.sync_all()
}

#[cfg(unix)]
fn private_options() -> OpenOptions {
    use std::os::unix::fs::OpenOptionsExt;
    let mut options = OpenOptions::new();
    options.mode(0o600);
    options
}

#[cfg(not(unix))]
fn private_options() -> OpenOptions {
    OpenOptions::new()
}

impl SessionStorage for FileStorage {
    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let _guard = self.acquire()?;
        let mut map = self.read_map()?;
        map.insert(key.to_string(), value.to_string());
        self.write_map(&map)
    }

    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let _guard = self.acquire()?;
        Ok(self.read_map()?.remove(key))
    }

    fn remove(&self, key: &str) -> StorageResult<bool> {
        Ok(self.take(key)?.is_some())
    }

    fn take(&self, key: &str) -> StorageResult<Option<String>> {
        let _guard = self.acquire()?;
        let mut map = self.read_map()?;
        let value = map.remove(key);
        if value.is_some() {
            self.write_map(&map)?;
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_file_storage_basic_operations() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::open(dir.path().join("session.json")).unwrap();

        assert_eq!(storage.get("handle").unwrap(), None);

        storage.set("handle", "alice.example").unwrap();
        assert_eq!(storage.get("handle").unwrap(), Some("alice.example".to_string()));

        assert!(storage.remove("handle").unwrap());
        assert!(!storage.remove("handle").unwrap());
        assert!(!storage.has("handle").unwrap());
    }

    #[test]
    fn test_writes_visible_to_other_handles() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("session.json");
        let writer = FileStorage::open(&path).unwrap();
        let reader = FileStorage::open(&path).unwrap();

        writer.set("token", "tok-1").unwrap();
        assert_eq!(reader.get("token").unwrap(), Some("tok-1".to_string()));

        reader.remove("token").unwrap();
        assert_eq!(writer.get("token").unwrap(), None);
    }

    #[test]
    fn test_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("session.json");

        {
            let storage = FileStorage::open(&path).unwrap();
            storage.set("state", "s-1").unwrap();
        }

        let reopened = FileStorage::open(&path).unwrap();
        assert_eq!(reopened.get("state").unwrap(), Some("s-1".to_string()));
    }

    #[test]
    fn test_corrupt_file_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("session.json");
        fs::write(&path, "not json").unwrap();

        let result = FileStorage::open(&path);
        assert!(matches!(result, Err(StorageError::Encoding(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let storage = FileStorage::open(dir.path().join("session.json")).unwrap();
        storage.set("token", "secret").unwrap();

        let mode = fs::metadata(storage.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_writes_leave_no_temp_files() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::open(dir.path().join("session.json")).unwrap();

        storage.set("handle", "alice.example").unwrap();
        storage.set("token", "secret").unwrap();
        storage.remove("token").unwrap();

        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert!(names.contains(&"session.json".to_string()));
        assert!(
            names.iter().all(|name| !name.contains(".tmp")),
            "leftover temp file in {:?}",
            names
        );
    }

    #[test]
    fn test_take_returns_value_once() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::open(dir.path().join("session.json")).unwrap();
        storage.set("state", "s-1").unwrap();

        assert_eq!(storage.take("state").unwrap(), Some("s-1".to_string()));
        assert_eq!(storage.take("state").unwrap(), None);
        assert!(!storage.has("state").unwrap());
    }

    #[test]
    fn test_take_is_exclusive_across_handles() {
        use std::sync::{Arc, Barrier};
        use std::thread;

        let dir = tempdir().unwrap();
        let path = dir.path().join("session.json");
        FileStorage::open(&path).unwrap().set("state", "s-1").unwrap();

        let contenders = 8;
        let barrier = Arc::new(Barrier::new(contenders));
        let handles: Vec<_> = (0..contenders)
            .map(|_| {
                // Separate handles share nothing but the file, like separate processes.
                let storage = FileStorage::open(&path).unwrap();
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    storage.take("state").unwrap()
                })
            })
            .collect();

        let won: Vec<String> = handles
            .into_iter()
            .filter_map(|handle| handle.join().unwrap())
            .collect();
        assert_eq!(won, vec!["s-1".to_string()]);
    }
}
