//! Storage key constants.

/// Keys persisted for the session.
pub struct StorageKeys;

impl StorageKeys {
    /// Handle the user last claimed at login
    pub const HANDLE: &'static str = "handle";

    /// Access token
    pub const TOKEN: &'static str = "token";

    /// Pending CSRF state of an in-flight login
    pub const STATE: &'static str = "state";

    /// Every key owned by the session.
    pub const ALL: [&'static str; 3] = [Self::HANDLE, Self::TOKEN, Self::STATE];
}
