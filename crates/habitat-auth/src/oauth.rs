//! OAuth authorization-code flow.
//!
//! Builds the login URL with a fresh CSRF state and validates the redirect
//! that comes back. The pending state is consumed before anything else is
//! looked at, so a callback can never be replayed.

use crate::client::{OAuthClient, TokenRequest, TokenResponse};
use crate::config::AuthConfig;
use crate::{AuthError, AuthResult};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use session_store::SessionStore;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

/// Random bytes behind each state value.
const STATE_BYTES: usize = 32;

/// Generate an unpredictable CSRF state token (base64url, no padding).
pub fn generate_state() -> String {
    let mut bytes = [0u8; STATE_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Compare two secrets without short-circuiting on the first differing byte.
fn constant_time_eq(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Query parameters of an authorization redirect.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub iss: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl CallbackParams {
    pub fn from_url(url: &Url) -> Self {
        let mut params = Self::default();
        for (key, value) in url.query_pairs() {
            let slot = match key.as_ref() {
                "code" => &mut params.code,
                "state" => &mut params.state,
                "iss" => &mut params.iss,
                "error" => &mut params.error,
                "error_description" => &mut params.error_description,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value.into_owned());
            }
        }
        params
    }
}

/// The callback URL with query and fragment stripped, as sent to the token endpoint.
pub fn redirect_uri_for(callback: &Url) -> String {
    let mut redirect = callback.clone();
    redirect.set_query(None);
    redirect.set_fragment(None);
    redirect.to_string()
}

/// Authorization-code flow against one node.
pub struct AuthorizationFlow {
    config: AuthConfig,
    client: Arc<dyn OAuthClient>,
}

impl AuthorizationFlow {
    pub fn new(config: AuthConfig, client: Arc<dyn OAuthClient>) -> Self {
        Self { config, client }
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Persist a fresh state for `handle` and return the authorization URL.
    ///
    /// Any previously pending state is overwritten.
    pub fn build_login_url(
        &self,
        store: &SessionStore,
        handle: &str,
        redirect_uri: &Url,
    ) -> AuthResult<Url> {
        let state = generate_state();
        store.set_handle(handle)?;
        store.set_state(&state)?;

        let mut url = self.config.authorization_endpoint().clone();
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("redirect_uri", redirect_uri.as_str())
            .append_pair("handle", handle)
            .append_pair("state", &state)
            .append_pair("client_id", self.config.client_id());

        info!(handle = %handle, "Issued login URL");
        Ok(url)
    }

    /// Consume the pending state and validate the callback.
    ///
    /// Returns the token request to send. No network call happens here.
    pub fn prepare_exchange(&self, store: &SessionStore, callback_url: &str) -> AuthResult<TokenRequest> {
        let expected = store.take_state()?.ok_or(AuthError::MissingState)?;

        let callback = Url::parse(callback_url)?;
        let params = CallbackParams::from_url(&callback);

        if let Some(error) = params.error {
            warn!(error = %error, "Authorization server returned an error");
            return Err(AuthError::AuthorizationDenied {
                error,
                description: params.error_description,
            });
        }

        let state = params.state.unwrap_or_default();
        if !constant_time_eq(&state, &expected) {
            warn!("Callback state does not match the pending login");
            return Err(AuthError::StateMismatch);
        }

        if let Some(iss) = params.iss {
            if iss != self.config.issuer() {
                return Err(AuthError::IssuerMismatch {
                    expected: self.config.issuer().to_string(),
                    actual: iss,
                });
            }
        }

        let code = params
            .code
            .filter(|c| !c.is_empty())
            .ok_or(AuthError::MissingCode)?;

        debug!("Callback validated");
        Ok(TokenRequest {
            token_endpoint: self.config.token_endpoint().clone(),
            code,
            redirect_uri: redirect_uri_for(&callback),
            client_id: self.config.client_id().to_string(),
        })
    }

    /// Validate the callback and exchange its code for a token. Single attempt.
    pub async fn exchange_code(
        &self,
        store: &SessionStore,
        callback_url: &str,
    ) -> AuthResult<TokenResponse> {
        let request = self.prepare_exchange(store, callback_url)?;
        self.client.authorization_code_grant(&request).await
    }
}
