//! OAuth client capability.
//!
//! The session manager never speaks HTTP itself. It hands token requests and
//! protected resource requests to an [`OAuthClient`], which owns transport and
//! proof-of-possession. [`HttpOAuthClient`] is the reqwest implementation.

use crate::gateway::GatewayResponse;
use crate::{AuthError, AuthResult};
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use reqwest::header::{HeaderMap, AUTHORIZATION};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, warn};
use url::Url;

/// Header carrying the proof JWT.
pub const DPOP_HEADER: &str = "DPoP";

/// Header the server uses to hand out a fresh proof nonce.
pub const DPOP_NONCE_HEADER: &str = "DPoP-Nonce";

/// Authorization-code grant sent to the token endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRequest {
    pub token_endpoint: Url,
    pub code: String,
    pub redirect_uri: String,
    pub client_id: String,
}

/// Token endpoint response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Account identifier the token was issued for.
    #[serde(default)]
    pub sub: Option<String>,
}

fn default_token_type() -> String {
    "DPoP".to_string()
}

impl TokenResponse {
    /// When the token expires, counted from `issued_at`.
    ///
    /// `None` when the server sent no lifetime or one too large to represent.
    pub fn expires_at(&self, issued_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let lifetime = TimeDelta::try_seconds(self.expires_in?)?;
        issued_at.checked_add_signed(lifetime)
    }
}

/// A fully resolved request against a protected resource.
#[derive(Debug, Clone)]
pub struct ProtectedRequest {
    pub method: Method,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

/// OAuth capability used by the session manager.
#[async_trait]
pub trait OAuthClient: Send + Sync {
    /// Exchange an authorization code. One attempt, no retries.
    async fn authorization_code_grant(&self, request: &TokenRequest) -> AuthResult<TokenResponse>;

    /// Dispatch a request with the access token attached.
    ///
    /// Every status code is returned as-is; interpreting 401 is the gateway's job.
    async fn fetch_protected_resource(
        &self,
        access_token: &str,
        request: ProtectedRequest,
    ) -> AuthResult<GatewayResponse>;
}

/// Produces DPoP proofs bound to the client's key pair.
pub trait DpopProver: Send + Sync {
    /// Proof for one request. `access_token` is set for resource requests so
    /// the proof can carry the token hash.
    fn proof(
        &self,
        method: &Method,
        url: &Url,
        nonce: Option<&str>,
        access_token: Option<&str>,
    ) -> AuthResult<String>;
}

/// reqwest-backed OAuth client.
pub struct HttpOAuthClient {
    http: Client,
    prover: Option<Arc<dyn DpopProver>>,
    nonce: Mutex<Option<String>>,
}

impl HttpOAuthClient {
    /// Client sending plain bearer tokens.
    pub fn new() -> Self {
        Self::with_http_client(Client::new())
    }

    pub fn with_http_client(http: Client) -> Self {
        Self {
            http,
            prover: None,
            nonce: Mutex::new(None),
        }
    }

    /// Bind tokens to the prover's key.
    pub fn with_prover(mut self, prover: Arc<dyn DpopProver>) -> Self {
        self.prover = Some(prover);
        self
    }

    /// Last nonce handed out by the server.
    pub fn current_nonce(&self) -> Option<String> {
        self.nonce
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Remember the nonce from `response`. Returns it if it differs from the previous one.
    fn remember_nonce(&self, response: &Response) -> Option<String> {
        let fresh = response
            .headers()
            .get(DPOP_NONCE_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)?;

        let mut nonce = self.nonce.lock().unwrap_or_else(PoisonError::into_inner);
        if nonce.as_deref() == Some(fresh.as_str()) {
            return None;
        }
        *nonce = Some(fresh.clone());
        Some(fresh)
    }

    fn attach_proof(
        &self,
        builder: RequestBuilder,
        method: &Method,
        url: &Url,
        nonce: Option<&str>,
        access_token: Option<&str>,
    ) -> AuthResult<RequestBuilder> {
        match &self.prover {
            Some(prover) => {
                let proof = prover.proof(method, url, nonce, access_token)?;
                Ok(builder.header(DPOP_HEADER, proof))
            }
            None => Ok(builder),
        }
    }

    /// Send a request, retrying once if the server rejects it with a new nonce.
    async fn send_with_nonce_retry<F>(&self, build: F) -> AuthResult<Response>
    where
        F: Fn(Option<&str>) -> AuthResult<RequestBuilder>,
    {
        let nonce = self.current_nonce();
        let response = build(nonce.as_deref())?.send().await?;
        let fresh = self.remember_nonce(&response);

        let rejected = matches!(
            response.status(),
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED
        );
        match fresh {
            Some(fresh) if rejected && self.prover.is_some() => {
                debug!(status = %response.status(), "Retrying with fresh DPoP nonce");
                let response = build(Some(&fresh))?.send().await?;
                self.remember_nonce(&response);
                Ok(response)
            }
            _ => Ok(response),
        }
    }

    fn authorization_value(&self, access_token: &str) -> String {
        if self.prover.is_some() {
            format!("DPoP {}", access_token)
        } else {
            format!("Bearer {}", access_token)
        }
    }
}

impl Default for HttpOAuthClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OAuthClient for HttpOAuthClient {
    async fn authorization_code_grant(&self, request: &TokenRequest) -> AuthResult<TokenResponse> {
        let form = [
            ("grant_type", "authorization_code"),
            ("code", request.code.as_str()),
            ("redirect_uri", request.redirect_uri.as_str()),
            ("client_id", request.client_id.as_str()),
        ];

        debug!(url = %request.token_endpoint, "Exchanging authorization code");

        let response = self
            .send_with_nonce_retry(|nonce| {
                let builder = self
                    .http
                    .post(request.token_endpoint.clone())
                    .form(&form);
                self.attach_proof(builder, &Method::POST, &request.token_endpoint, nonce, None)
            })
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, "Token endpoint rejected authorization code");
            return Err(AuthError::TokenEndpoint {
                status: status.as_u16(),
                body,
            });
        }

        let token: TokenResponse = response.json().await?;
        debug!(
            token_type = %token.token_type,
            expires_in = ?token.expires_in,
            "Token issued"
        );
        Ok(token)
    }

    async fn fetch_protected_resource(
        &self,
        access_token: &str,
        request: ProtectedRequest,
    ) -> AuthResult<GatewayResponse> {
        let authorization = self.authorization_value(access_token);

        let response = self
            .send_with_nonce_retry(|nonce| {
                let mut builder = self
                    .http
                    .request(request.method.clone(), request.url.clone())
                    .header(AUTHORIZATION, authorization.as_str());
                for (name, value) in &request.headers {
                    builder = builder.header(name.as_str(), value.as_str());
                }
                if let Some(body) = &request.body {
                    builder = builder.body(body.clone());
                }
                self.attach_proof(
                    builder,
                    &request.method,
                    &request.url,
                    nonce,
                    Some(access_token),
                )
            })
            .await?;

        let status = response.status();
        let headers: HeaderMap = response.headers().clone();
        let body = response.bytes().await?.to_vec();

        debug!(
            method = %request.method,
            path = %request.url.path(),
            status = %status,
            "Protected resource responded"
        );

        Ok(GatewayResponse {
            status,
            headers,
            body,
        })
    }
}
