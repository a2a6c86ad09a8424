//! OAuth session management for Habitat clients.
//!
//! This crate provides:
//! - Authorization-code login with CSRF state and DPoP-bound tokens
//! - A persistent session that survives restarts
//! - An authenticated request gateway that de-authenticates on any 401
//! - Explicit FSM-based session state

mod auth_fsm;
mod client;
mod config;
mod error;
mod gateway;
mod metadata;
mod oauth;
mod session;

pub use auth_fsm::session_machine;
pub use auth_fsm::{
    AuthState, DeauthReason, SessionMachine, SessionMachineInput, SessionMachineState,
    SessionState,
};
pub use client::{
    DpopProver, HttpOAuthClient, OAuthClient, ProtectedRequest, TokenRequest, TokenResponse,
    DPOP_HEADER, DPOP_NONCE_HEADER,
};
pub use config::AuthConfig;
pub use error::{AuthError, AuthResult};
pub use gateway::{
    GatewayRequest, GatewayResponse, RequestGateway, AUTH_METHOD_HEADER, AUTH_METHOD_OAUTH,
};
pub use metadata::{ClientMetadata, CLIENT_SCOPE, METADATA_PATH, REDIRECT_PATH};
pub use oauth::{generate_state, redirect_uri_for, AuthorizationFlow, CallbackParams};
pub use session::{DeauthCallback, SessionManager};

// HTTP vocabulary used by `GatewayRequest` and `GatewayResponse`
pub use reqwest::{Method, StatusCode};
