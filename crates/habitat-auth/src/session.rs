//! Session manager with FSM-based state tracking.
//!
//! `SessionManager` owns the session: the handle, the access token and the
//! pending login, mirrored in a [`SessionStore`] so they survive restarts.
//! State changes only happen through login URL issuance, code exchange and
//! de-authentication. The internal FSM tracks which of the three states the
//! session is in.

use crate::auth_fsm::{AuthState, DeauthReason, SessionMachine, SessionMachineInput, SessionState};
use crate::client::OAuthClient;
use crate::config::AuthConfig;
use crate::gateway::{GatewayRequest, GatewayResponse, RequestGateway};
use crate::oauth::AuthorizationFlow;
use crate::{AuthError, AuthResult};
use chrono::Utc;
use session_store::SessionStore;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};
use url::Url;

/// Callback invoked whenever the session is torn down.
pub type DeauthCallback = Box<dyn Fn(DeauthReason) + Send + Sync>;

struct Inner {
    store: SessionStore,
    fsm: SessionMachine,
    handle: Option<String>,
    token: Option<String>,
    /// Bumped on every login URL and de-authentication.
    epoch: u64,
    /// Whether a code exchange is on the network.
    exchanging: bool,
}

impl Inner {
    fn status(&self) -> AuthState {
        AuthState::from(self.fsm.state())
    }

    fn transition(&mut self, input: &SessionMachineInput) -> AuthResult<AuthState> {
        let old_state = self.status();

        self.fsm.consume(input).map_err(|_| {
            AuthError::InvalidStateTransition(format!(
                "Cannot apply {:?} in state {:?}",
                input,
                self.fsm.state()
            ))
        })?;

        let new_state = self.status();
        if old_state != new_state {
            debug!(
                old_state = ?old_state,
                new_state = ?new_state,
                "Session state transition"
            );
        }
        Ok(new_state)
    }

    /// Mark a failed exchange if a login is still pending.
    fn fail_exchange(&mut self) {
        if self.status().is_pending() {
            // LoginPending always accepts ExchangeFailed
            let _ = self.transition(&SessionMachineInput::ExchangeFailed);
        }
    }
}

/// Owner of the authenticated session.
pub struct SessionManager {
    config: AuthConfig,
    flow: AuthorizationFlow,
    gateway: RequestGateway,
    client: Arc<dyn OAuthClient>,
    inner: Mutex<Inner>,
    on_deauthenticated: DeauthCallback,
}

impl SessionManager {
    /// Create a session manager and rehydrate it from `store`.
    ///
    /// - token and handle: `Authenticated` (a stale pending state is dropped)
    /// - pending state only: `LoginPending`
    /// - token without handle: inconsistent, storage is cleared
    pub fn new<F>(
        config: AuthConfig,
        store: SessionStore,
        client: Arc<dyn OAuthClient>,
        on_deauthenticated: F,
    ) -> AuthResult<Self>
    where
        F: Fn(DeauthReason) + Send + Sync + 'static,
    {
        let persisted = store.snapshot()?;
        let mut inner = Inner {
            store,
            fsm: SessionMachine::new(),
            handle: persisted.handle,
            token: None,
            epoch: 0,
            exchanging: false,
        };

        match (persisted.token, inner.handle.is_some()) {
            (Some(token), true) => {
                if persisted.state.is_some() {
                    debug!("Dropping pending login state of an authenticated session");
                    inner.store.remove_state()?;
                }
                inner.token = Some(token);
                inner.transition(&SessionMachineInput::SessionRestored)?;
                info!(handle = ?inner.handle, "Restored authenticated session");
            }
            (Some(_), false) => {
                warn!("Stored token has no handle, clearing session");
                inner.store.clear()?;
                inner.handle = None;
            }
            (None, _) => {
                if persisted.state.is_some() {
                    inner.transition(&SessionMachineInput::LoginUrlIssued)?;
                    debug!("Restored pending login");
                }
            }
        }

        Ok(Self {
            flow: AuthorizationFlow::new(config.clone(), client.clone()),
            gateway: RequestGateway::new(config.server_origin().clone(), client.clone()),
            config,
            client,
            inner: Mutex::new(inner),
            on_deauthenticated: Box::new(on_deauthenticated),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Whether an access token is held.
    pub fn is_authenticated(&self) -> bool {
        self.lock().status().is_authenticated()
    }

    /// Plain status of the session.
    pub fn auth_state(&self) -> AuthState {
        self.lock().status()
    }

    /// Typed view of the session.
    pub fn state(&self) -> SessionState {
        let inner = self.lock();
        match inner.status() {
            AuthState::Unauthenticated => SessionState::Unauthenticated {
                handle: inner.handle.clone(),
            },
            AuthState::LoginPending => SessionState::LoginPending {
                handle: inner.handle.clone(),
            },
            AuthState::Authenticated => SessionState::Authenticated {
                handle: inner.handle.clone().unwrap_or_default(),
            },
        }
    }

    /// Handle of the current or last attempted session.
    pub fn handle(&self) -> Option<String> {
        self.lock().handle.clone()
    }

    /// Start a login for `handle`.
    ///
    /// Invalidates any earlier pending login. When already authenticated the
    /// held token is dropped without notifying the de-authentication callback.
    pub fn login_url(&self, handle: &str, redirect_uri: &Url) -> AuthResult<Url> {
        let mut inner = self.lock();

        if inner.token.take().is_some() {
            info!("Starting a new login, dropping the current session token");
            inner.store.remove_token()?;
        }

        let url = self.flow.build_login_url(&inner.store, handle, redirect_uri)?;
        inner.handle = Some(handle.to_string());
        inner.epoch += 1;
        inner.transition(&SessionMachineInput::LoginUrlIssued)?;
        Ok(url)
    }

    /// Exchange the authorization code in `callback_url` and establish the session.
    ///
    /// Returns the access token.
    pub async fn exchange_code(&self, callback_url: &str) -> AuthResult<String> {
        let (request, epoch) = {
            let mut inner = self.lock();

            // Another process sharing the store may have issued the login URL
            if !inner.status().is_pending() && inner.store.pending_state()?.is_some() {
                inner.token = None;
                inner.handle = inner.store.handle()?;
                inner.epoch += 1;
                inner.transition(&SessionMachineInput::LoginUrlIssued)?;
            }

            let request = match self.flow.prepare_exchange(&inner.store, callback_url) {
                Ok(request) => request,
                Err(e) => {
                    if !inner.exchanging {
                        inner.fail_exchange();
                    }
                    warn!(error = %e, "Code exchange rejected");
                    return Err(e);
                }
            };
            inner.exchanging = true;
            (request, inner.epoch)
        };

        let result = self.client.authorization_code_grant(&request).await;

        let mut inner = self.lock();
        inner.exchanging = false;

        if inner.epoch != epoch {
            warn!("Session changed while exchanging the code, discarding token");
            return Err(AuthError::LoginSuperseded);
        }

        let token = match result {
            Ok(token) => token,
            Err(e) => {
                inner.fail_exchange();
                warn!(error = %e, "Code exchange failed");
                return Err(e);
            }
        };

        let handle = match inner.handle.clone().or_else(|| token.sub.clone()) {
            Some(handle) => handle,
            None => {
                inner.fail_exchange();
                return Err(AuthError::MissingHandle);
            }
        };

        let persisted = inner
            .store
            .set_handle(&handle)
            .and_then(|_| inner.store.set_token(&token.access_token));
        if let Err(e) = persisted {
            inner.fail_exchange();
            return Err(e.into());
        }

        inner.handle = Some(handle.clone());
        inner.token = Some(token.access_token.clone());
        inner.transition(&SessionMachineInput::ExchangeSucceeded)?;
        info!(
            handle = %handle,
            expires_at = ?token.expires_at(Utc::now()),
            "Login complete"
        );

        Ok(token.access_token)
    }

    /// Perform an authenticated request.
    ///
    /// Without a token, or on a 401, the session is torn down and
    /// [`AuthError::Unauthenticated`] is returned. Every other response is
    /// handed back as-is.
    pub async fn fetch(&self, request: GatewayRequest) -> AuthResult<GatewayResponse> {
        let (token, epoch) = {
            let inner = self.lock();
            (inner.token.clone(), inner.epoch)
        };

        let Some(token) = token else {
            debug!(target = %request.target(), "Request without a session");
            if let Err(e) = self.deauthenticate(DeauthReason::MissingToken, None) {
                warn!(error = %e, "Failed to clear persisted session");
            }
            return Err(AuthError::Unauthenticated);
        };

        match self.gateway.dispatch(&token, request).await {
            Err(AuthError::Unauthenticated) => {
                if let Err(e) = self.deauthenticate(DeauthReason::Rejected, Some(epoch)) {
                    warn!(error = %e, "Failed to clear persisted session");
                }
                Err(AuthError::Unauthenticated)
            }
            other => other,
        }
    }

    /// Log out. Always notifies the de-authentication callback.
    pub fn logout(&self) -> AuthResult<()> {
        self.deauthenticate(DeauthReason::Logout, None)
    }

    /// Tear down the session and notify the callback.
    ///
    /// With `expected_epoch`, nothing happens if the session changed since
    /// the epoch was read, so a late 401 cannot kill a newer session.
    fn deauthenticate(&self, reason: DeauthReason, expected_epoch: Option<u64>) -> AuthResult<()> {
        let cleared = {
            let mut inner = self.lock();
            if expected_epoch.is_some_and(|epoch| epoch != inner.epoch) {
                debug!(reason = ?reason, "Ignoring rejection of a superseded session");
                return Ok(());
            }

            inner.handle = None;
            inner.token = None;
            inner.epoch += 1;
            // SessionLost is accepted in every state
            let _ = inner.transition(&SessionMachineInput::SessionLost);
            inner.store.clear()
        };

        info!(reason = ?reason, "Session de-authenticated");
        (self.on_deauthenticated)(reason);

        cleared.map_err(AuthError::from)
    }
}
