//! Storage trait definitions.

use crate::StorageResult;

/// Durable string key/value storage scoped to one origin.
///
/// Implementations perform no validation of keys or values. A write must be
/// visible to every subsequent reader of the same backing store as soon as
/// the call returns.
pub trait SessionStorage: Send + Sync {
    /// Store a value
    fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Retrieve a value
    fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Remove a value. Returns whether the key was present.
    fn remove(&self, key: &str) -> StorageResult<bool>;

    /// Read and remove a value in one step.
    ///
    /// Only the caller that actually removed the key gets the value back, so
    /// two consumers racing on the same store never both see it. Backends
    /// should override this to hold one lock across the read and the remove.
    fn take(&self, key: &str) -> StorageResult<Option<String>> {
        let value = self.get(key)?;
        if value.is_some() && self.remove(key)? {
            Ok(value)
        } else {
            Ok(None)
        }
    }

    /// Check if a key exists
    fn has(&self, key: &str) -> StorageResult<bool> {
        Ok(self.get(key)?.is_some())
    }
}
