//! CLI command implementations.

mod auth;
mod fetch;
mod metadata;

pub use auth::{callback, login, logout, status};
pub use fetch::fetch;
pub use metadata::client_metadata;

use crate::output::OutputFormat;
use anyhow::Result;
use habitat_auth::{AuthConfig, DeauthReason, HttpOAuthClient, SessionManager};
use habitat_config_and_utils::{Config, Paths};
use session_store::{create_session_store, MemoryStorage, SessionStore};
use std::sync::Arc;

/// Everything a command needs.
pub struct Context {
    pub config: Config,
    pub paths: Paths,
    pub format: OutputFormat,
    pub ephemeral: bool,
}

impl Context {
    fn session_store(&self) -> Result<SessionStore> {
        if self.ephemeral {
            return Ok(SessionStore::new(Box::new(MemoryStorage::new())));
        }
        Ok(create_session_store(&self.paths)?)
    }

    /// Build the session manager over the configured store.
    pub fn session_manager(&self) -> Result<SessionManager> {
        let auth_config = AuthConfig::from_config(&self.config)?;
        let store = self.session_store()?;
        let client = Arc::new(HttpOAuthClient::new());

        let manager = SessionManager::new(auth_config, store, client, notify_deauthenticated)?;
        Ok(manager)
    }
}

fn notify_deauthenticated(reason: DeauthReason) {
    let message = match reason {
        DeauthReason::Logout => return,
        DeauthReason::MissingToken => "Not logged in.",
        DeauthReason::Rejected => "Session expired or was revoked.",
    };
    eprintln!("{} Run 'habitat login <handle>' to sign in again.", message);
}
