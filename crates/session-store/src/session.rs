//! Typed API over the raw key/value backend.

use crate::{SessionStorage, StorageKeys, StorageResult};
use tracing::debug;

/// Everything persisted for the session, read in one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersistedSession {
    /// Handle claimed at the last login attempt.
    pub handle: Option<String>,
    /// Access token of an established session.
    pub token: Option<String>,
    /// CSRF state of an in-flight login.
    pub state: Option<String>,
}

impl PersistedSession {
    /// Whether nothing at all is persisted.
    pub fn is_empty(&self) -> bool {
        self.handle.is_none() && self.token.is_none() && self.state.is_none()
    }
}

/// High-level API for the three session keys.
pub struct SessionStore {
    storage: Box<dyn SessionStorage>,
}

impl SessionStore {
    /// Create a session store over the given backend
    pub fn new(storage: Box<dyn SessionStorage>) -> Self {
        Self { storage }
    }

    /// Read all keys.
    pub fn snapshot(&self) -> StorageResult<PersistedSession> {
        Ok(PersistedSession {
            handle: self.storage.get(StorageKeys::HANDLE)?,
            token: self.storage.get(StorageKeys::TOKEN)?,
            state: self.storage.get(StorageKeys::STATE)?,
        })
    }

    // ==========================================
    // Identity
    // ==========================================

    pub fn handle(&self) -> StorageResult<Option<String>> {
        self.storage.get(StorageKeys::HANDLE)
    }

    pub fn set_handle(&self, handle: &str) -> StorageResult<()> {
        self.storage.set(StorageKeys::HANDLE, handle)
    }

    // ==========================================
    // Access token
    // ==========================================

    pub fn token(&self) -> StorageResult<Option<String>> {
        self.storage.get(StorageKeys::TOKEN)
    }

    pub fn set_token(&self, token: &str) -> StorageResult<()> {
        self.storage.set(StorageKeys::TOKEN, token)
    }

    pub fn has_token(&self) -> StorageResult<bool> {
        self.storage.has(StorageKeys::TOKEN)
    }

    /// Drop the access token. Returns whether one existed.
    pub fn remove_token(&self) -> StorageResult<bool> {
        self.storage.remove(StorageKeys::TOKEN)
    }

    // ==========================================
    // Pending CSRF state
    // ==========================================

    /// Persist the state of a new login attempt, replacing any previous one.
    pub fn set_state(&self, state: &str) -> StorageResult<()> {
        self.storage.set(StorageKeys::STATE, state)
    }

    /// Peek at the pending state without consuming it.
    pub fn pending_state(&self) -> StorageResult<Option<String>> {
        self.storage.get(StorageKeys::STATE)
    }

    /// Read and remove the pending state. A second call returns `None`, as
    /// does a call that loses the race against another reader of the store.
    pub fn take_state(&self) -> StorageResult<Option<String>> {
        let state = self.storage.take(StorageKeys::STATE)?;
        if state.is_some() {
            debug!("Consumed pending login state");
        }
        Ok(state)
    }

    /// Drop the pending state. Returns whether one existed.
    pub fn remove_state(&self) -> StorageResult<bool> {
        self.storage.remove(StorageKeys::STATE)
    }

    // ==========================================
    // Cleanup
    // ==========================================

    /// Remove every session key.
    pub fn clear(&self) -> StorageResult<()> {
        for key in StorageKeys::ALL {
            self.storage.remove(key)?;
        }
        debug!("Cleared persisted session");
        Ok(())
    }
}
