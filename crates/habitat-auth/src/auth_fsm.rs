//! Session state machine using rust-fsm.
//!
//! ## State Diagram
//!
//! ```text
//!                   LoginUrlIssued
//! ┌─────────────────┐ ───────────────► ┌─────────────────┐
//! │ Unauthenticated │                  │  LoginPending   │ ◄─┐ LoginUrlIssued
//! │    (initial)    │ ◄─────────────── │                 │ ──┘
//! └────────┬────────┘  ExchangeFailed  └────────┬────────┘
//!          │           / SessionLost            │ ExchangeSucceeded
//!          │ SessionRestored                    ▼
//!          │                           ┌─────────────────┐
//!          └─────────────────────────► │  Authenticated  │
//!                                      └────────┬────────┘
//!                SessionLost                    │ LoginUrlIssued ──► LoginPending
//!          Unauthenticated ◄────────────────────┘
//! ```
//!
//! `SessionLost` is accepted in every state so de-authentication can run any
//! number of times.

use rust_fsm::*;
use serde::{Deserialize, Serialize};

state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub session_machine(Unauthenticated)

    Unauthenticated => {
        LoginUrlIssued => LoginPending,
        SessionRestored => Authenticated,
        SessionLost => Unauthenticated
    },
    LoginPending => {
        // A fresh login URL replaces the pending attempt
        LoginUrlIssued => LoginPending,
        ExchangeSucceeded => Authenticated,
        ExchangeFailed => Unauthenticated,
        SessionLost => Unauthenticated
    },
    Authenticated => {
        // Re-login drops the held token
        LoginUrlIssued => LoginPending,
        SessionLost => Unauthenticated
    }
}

pub use session_machine::Input as SessionMachineInput;
pub use session_machine::State as SessionMachineState;
pub use session_machine::StateMachine as SessionMachine;

/// Plain authentication status, suitable for serialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthState {
    /// No session and no login in flight.
    Unauthenticated,
    /// A login URL was issued and its code has not been exchanged yet.
    LoginPending,
    /// An access token is held.
    Authenticated,
}

impl AuthState {
    /// Returns true only when an access token is held.
    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthState::Authenticated)
    }

    /// Returns true while a login round trip is in flight.
    pub fn is_pending(&self) -> bool {
        matches!(self, AuthState::LoginPending)
    }
}

impl From<&SessionMachineState> for AuthState {
    fn from(state: &SessionMachineState) -> Self {
        match state {
            SessionMachineState::Unauthenticated => AuthState::Unauthenticated,
            SessionMachineState::LoginPending => AuthState::LoginPending,
            SessionMachineState::Authenticated => AuthState::Authenticated,
        }
    }
}

/// Session as seen by consumers of the session manager.
///
/// Every variant has to be handled explicitly; there is no "maybe logged in".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionState {
    /// No token. `handle` is the identity of the last login attempt, if any.
    Unauthenticated { handle: Option<String> },
    /// Waiting for the authorization server to redirect back.
    LoginPending { handle: Option<String> },
    /// Holding a token for `handle`.
    Authenticated { handle: String },
}

impl SessionState {
    /// The plain status of this session.
    pub fn status(&self) -> AuthState {
        match self {
            SessionState::Unauthenticated { .. } => AuthState::Unauthenticated,
            SessionState::LoginPending { .. } => AuthState::LoginPending,
            SessionState::Authenticated { .. } => AuthState::Authenticated,
        }
    }

    /// The handle attached to this session, if any.
    pub fn handle(&self) -> Option<&str> {
        match self {
            SessionState::Unauthenticated { handle } | SessionState::LoginPending { handle } => {
                handle.as_deref()
            }
            SessionState::Authenticated { handle } => Some(handle),
        }
    }
}

/// Why the session was torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeauthReason {
    /// The user logged out.
    Logout,
    /// An authenticated request was attempted without a token.
    MissingToken,
    /// The server answered 401.
    Rejected,
}
