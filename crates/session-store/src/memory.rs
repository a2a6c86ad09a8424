//! Process-local storage backend.

use crate::{SessionStorage, StorageResult};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// In-memory storage.
///
/// Clones share the same map, so a clone behaves like a second reader of the
/// same origin. Nothing survives the process.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    data: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStorage {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.data.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SessionStorage for MemoryStorage {
    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let mut data = self.data.lock().unwrap_or_else(PoisonError::into_inner);
        data.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let data = self.data.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(data.get(key).cloned())
    }

    fn remove(&self, key: &str) -> StorageResult<bool> {
        let mut data = self.data.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(data.remove(key).is_some())
    }

    fn take(&self, key: &str) -> StorageResult<Option<String>> {
        let mut data = self.data.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(data.remove(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_storage() {
        let storage = MemoryStorage::new();

        storage.set("test_key", "test_value").unwrap();
        assert_eq!(storage.get("test_key").unwrap(), Some("test_value".to_string()));

        assert!(storage.has("test_key").unwrap());
        assert!(!storage.has("nonexistent").unwrap());

        assert!(storage.remove("test_key").unwrap());
        assert!(!storage.remove("test_key").unwrap());
        assert_eq!(storage.get("test_key").unwrap(), None);
        assert!(storage.is_empty());
    }

    #[test]
    fn test_take_removes_value() {
        let storage = MemoryStorage::new();
        let other = storage.clone();
        storage.set("state", "s-1").unwrap();

        assert_eq!(other.take("state").unwrap(), Some("s-1".to_string()));
        assert_eq!(storage.take("state").unwrap(), None);
        assert!(storage.is_empty());
    }

    #[test]
    fn test_clones_share_data() {
        let first = MemoryStorage::new();
        let second = first.clone();

        first.set("token", "abc").unwrap();
        assert_eq!(second.get("token").unwrap(), Some("abc".to_string()));

        second.remove("token").unwrap();
        assert!(!first.has("token").unwrap());
    }
}
