//! Persistent session storage for the Habitat client.
//!
//! This crate provides:
//! - A minimal key/value trait ([`SessionStorage`]) for origin-scoped storage
//! - A JSON file backend that survives restarts and an in-memory backend
//! - [`SessionStore`], the typed API over the `handle`, `token` and `state` keys

mod file;
mod keys;
mod memory;
mod session;
mod traits;

pub use file::FileStorage;
pub use keys::StorageKeys;
pub use memory::MemoryStorage;
pub use session::{PersistedSession, SessionStore};
pub use traits::SessionStorage;

use habitat_config_and_utils::Paths;
use thiserror::Error;

/// Error type for storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Stored data could not be encoded or decoded
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Open the default file-backed storage under the given paths.
pub fn create_storage(paths: &Paths) -> StorageResult<Box<dyn SessionStorage>> {
    let storage = FileStorage::open(paths.session_file())?;
    Ok(Box::new(storage))
}

/// Create a SessionStore with the default file storage.
pub fn create_session_store(paths: &Paths) -> StorageResult<SessionStore> {
    Ok(SessionStore::new(create_storage(paths)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_store() -> (MemoryStorage, SessionStore) {
        let storage = MemoryStorage::new();
        let store = SessionStore::new(Box::new(storage.clone()));
        (storage, store)
    }

    #[test]
    fn test_session_store_roundtrip() {
        let (_, store) = memory_store();
        assert!(store.snapshot().unwrap().is_empty());

        store.set_handle("alice.example").unwrap();
        store.set_token("tok").unwrap();

        let snapshot = store.snapshot().unwrap();
        assert_eq!(snapshot.handle.as_deref(), Some("alice.example"));
        assert_eq!(snapshot.token.as_deref(), Some("tok"));
        assert_eq!(snapshot.state, None);
        assert!(store.has_token().unwrap());
    }

    #[test]
    fn test_take_state_consumes_once() {
        let (storage, store) = memory_store();
        store.set_state("state-1").unwrap();

        assert_eq!(store.take_state().unwrap(), Some("state-1".to_string()));
        assert!(!storage.has(StorageKeys::STATE).unwrap());
        assert_eq!(store.take_state().unwrap(), None);
    }

    /// Backend whose state disappears between the read and the remove, as
    /// when another process sharing the store consumes it first.
    struct RacingStorage {
        inner: MemoryStorage,
        rival: SessionStore,
    }

    impl SessionStorage for RacingStorage {
        fn set(&self, key: &str, value: &str) -> StorageResult<()> {
            self.inner.set(key, value)
        }

        fn get(&self, key: &str) -> StorageResult<Option<String>> {
            let value = self.inner.get(key)?;
            if key == StorageKeys::STATE {
                assert_eq!(self.rival.take_state().unwrap(), value);
            }
            Ok(value)
        }

        fn remove(&self, key: &str) -> StorageResult<bool> {
            self.inner.remove(key)
        }
    }

    #[test]
    fn test_take_state_loses_race_to_other_reader() {
        let inner = MemoryStorage::new();
        let rival = SessionStore::new(Box::new(inner.clone()));
        let store = SessionStore::new(Box::new(RacingStorage {
            inner: inner.clone(),
            rival,
        }));
        store.set_state("s-1").unwrap();

        assert_eq!(store.take_state().unwrap(), None);
        assert!(inner.is_empty());
    }

    #[test]
    fn test_take_state_once_across_file_handles() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());
        let first = create_session_store(&paths).unwrap();
        let second = create_session_store(&paths).unwrap();

        first.set_state("s-1").unwrap();

        assert_eq!(second.take_state().unwrap(), Some("s-1".to_string()));
        assert_eq!(first.take_state().unwrap(), None);
    }

    #[test]
    fn test_set_state_overwrites_previous() {
        let (_, store) = memory_store();
        store.set_state("first").unwrap();
        store.set_state("second").unwrap();

        assert_eq!(store.pending_state().unwrap(), Some("second".to_string()));
    }

    #[test]
    fn test_clear_removes_all_keys() {
        let (storage, store) = memory_store();
        store.set_handle("alice.example").unwrap();
        store.set_token("tok").unwrap();
        store.set_state("s").unwrap();

        store.clear().unwrap();
        assert!(storage.is_empty());

        // Clearing an empty store is fine.
        store.clear().unwrap();
        assert!(store.snapshot().unwrap().is_empty());
    }

    #[test]
    fn test_storage_keys_constants() {
        assert_eq!(StorageKeys::HANDLE, "handle");
        assert_eq!(StorageKeys::TOKEN, "token");
        assert_eq!(StorageKeys::STATE, "state");

        let unique: std::collections::HashSet<_> = StorageKeys::ALL.iter().collect();
        assert_eq!(unique.len(), StorageKeys::ALL.len(), "Storage keys must be unique");
    }

    #[test]
    fn test_create_session_store_uses_session_file() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());

        let store = create_session_store(&paths).unwrap();
        store.set_token("tok").unwrap();

        assert!(paths.session_file().exists());
        let reopened = create_session_store(&paths).unwrap();
        assert_eq!(reopened.token().unwrap(), Some("tok".to_string()));
    }
}
