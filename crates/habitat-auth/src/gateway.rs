//! Authenticated request gateway.
//!
//! Resolves request targets against the node origin, tags every request with
//! the auth method marker and hands it to the OAuth client. A 401 becomes
//! [`AuthError::Unauthenticated`]; everything else comes back untouched.

use crate::client::{OAuthClient, ProtectedRequest};
use crate::{AuthError, AuthResult};
use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::borrow::Cow;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

/// Marker header naming the authentication method.
pub const AUTH_METHOD_HEADER: &str = "Habitat-Auth-Method";

/// Value of [`AUTH_METHOD_HEADER`].
pub const AUTH_METHOD_OAUTH: &str = "oauth";

/// Request built by application code. `target` may be a path or an absolute
/// URL on the node origin.
#[derive(Debug, Clone)]
pub struct GatewayRequest {
    method: Method,
    target: String,
    headers: Vec<(String, String)>,
    body: Option<Vec<u8>>,
}

impl GatewayRequest {
    pub fn new(method: Method, target: impl Into<String>) -> Self {
        Self {
            method,
            target: target.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn get(target: impl Into<String>) -> Self {
        Self::new(Method::GET, target)
    }

    pub fn post(target: impl Into<String>) -> Self {
        Self::new(Method::POST, target)
    }

    /// Raw request body.
    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// JSON body with a matching content type.
    pub fn json<T: Serialize>(self, value: &T) -> AuthResult<Self> {
        let body = serde_json::to_vec(value)?;
        Ok(self.header("Content-Type", "application/json").body(body))
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn target(&self) -> &str {
        &self.target
    }
}

/// Response of an authenticated request, exactly as the server sent it.
#[derive(Debug, Clone)]
pub struct GatewayResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl GatewayResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Body decoded as UTF-8, lossily.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    pub fn json<T: DeserializeOwned>(&self) -> AuthResult<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

/// Dispatches requests on behalf of the session manager.
pub struct RequestGateway {
    origin: Url,
    client: Arc<dyn OAuthClient>,
}

impl RequestGateway {
    pub fn new(origin: Url, client: Arc<dyn OAuthClient>) -> Self {
        Self { origin, client }
    }

    /// Resolve `target` against the node origin.
    ///
    /// Absolute and scheme-relative targets are accepted only when they land
    /// on the same origin; anything else fails with
    /// [`AuthError::ForeignOrigin`] before a request is built.
    pub fn resolve(&self, target: &str) -> AuthResult<Url> {
        let url = self.origin.join(target)?;
        if url.origin() != self.origin.origin() {
            let foreign = url.origin().ascii_serialization();
            warn!(origin = %foreign, "Rejected request target outside the node origin");
            return Err(AuthError::ForeignOrigin(foreign));
        }
        Ok(url)
    }

    /// Turn an application request into a fully resolved protected request.
    pub fn prepare(&self, request: GatewayRequest) -> AuthResult<ProtectedRequest> {
        let url = self.resolve(&request.target)?;

        let mut headers: Vec<(String, String)> = request
            .headers
            .into_iter()
            .filter(|(name, _)| !name.eq_ignore_ascii_case(AUTH_METHOD_HEADER))
            .collect();
        headers.push((AUTH_METHOD_HEADER.to_string(), AUTH_METHOD_OAUTH.to_string()));

        Ok(ProtectedRequest {
            method: request.method,
            url,
            headers,
            body: request.body,
        })
    }

    /// Send `request` with `access_token`.
    ///
    /// Returns [`AuthError::Unauthenticated`] on 401. Transport errors pass through.
    pub async fn dispatch(
        &self,
        access_token: &str,
        request: GatewayRequest,
    ) -> AuthResult<GatewayResponse> {
        let request = self.prepare(request)?;
        debug!(method = %request.method, path = %request.url.path(), "Dispatching authenticated request");

        let response = self
            .client
            .fetch_protected_resource(access_token, request)
            .await?;

        if response.status == StatusCode::UNAUTHORIZED {
            info!("Server rejected access token");
            return Err(AuthError::Unauthenticated);
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{TokenRequest, TokenResponse};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FixedStatusClient {
        status: StatusCode,
        seen: Mutex<Vec<(String, ProtectedRequest)>>,
    }

    impl FixedStatusClient {
        fn new(status: StatusCode) -> Arc<Self> {
            Arc::new(Self {
                status,
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl OAuthClient for FixedStatusClient {
        async fn authorization_code_grant(&self, _: &TokenRequest) -> AuthResult<TokenResponse> {
            unreachable!("gateway never exchanges codes")
        }

        async fn fetch_protected_resource(
            &self,
            access_token: &str,
            request: ProtectedRequest,
        ) -> AuthResult<GatewayResponse> {
            self.seen
                .lock()
                .unwrap()
                .push((access_token.to_string(), request));
            Ok(GatewayResponse {
                status: self.status,
                headers: HeaderMap::new(),
                body: b"{\"ok\":true}".to_vec(),
            })
        }
    }

    fn gateway(client: Arc<FixedStatusClient>) -> RequestGateway {
        RequestGateway::new(Url::parse("https://node.example/").unwrap(), client)
    }

    #[test]
    fn test_relative_targets_resolve_against_origin() {
        let gw = gateway(FixedStatusClient::new(StatusCode::OK));

        assert_eq!(
            gw.resolve("/habitat/api/node").unwrap().as_str(),
            "https://node.example/habitat/api/node"
        );
        assert_eq!(
            gw.resolve("xrpc/com.atproto.repo.getRecord?repo=alice").unwrap().as_str(),
            "https://node.example/xrpc/com.atproto.repo.getRecord?repo=alice"
        );
        assert_eq!(
            gw.resolve("https://node.example/api?x=1").unwrap().as_str(),
            "https://node.example/api?x=1"
        );
    }

    #[test]
    fn test_foreign_targets_are_rejected() {
        let gw = gateway(FixedStatusClient::new(StatusCode::OK));

        for target in [
            "https://other.example/x",
            "//evil.example/steal",
            "http://node.example/downgrade",
            "https://node.example:8443/other-port",
        ] {
            match gw.resolve(target) {
                Err(AuthError::ForeignOrigin(_)) => {}
                other => panic!("{} resolved to {:?}", target, other),
            }
        }
    }

    #[tokio::test]
    async fn test_dispatch_to_foreign_origin_sends_nothing() {
        let client = FixedStatusClient::new(StatusCode::OK);
        let gw = gateway(client.clone());

        let err = gw
            .dispatch("tok-1", GatewayRequest::get("//evil.example/steal"))
            .await
            .unwrap_err();

        assert!(matches!(err, AuthError::ForeignOrigin(ref origin) if origin == "https://evil.example"));
        assert!(client.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_prepare_injects_marker_header_once() {
        let gw = gateway(FixedStatusClient::new(StatusCode::OK));
        let request = GatewayRequest::post("/api")
            .header("habitat-auth-method", "spoofed")
            .header("X-Custom", "1")
            .body("payload");

        let prepared = gw.prepare(request).unwrap();

        let markers: Vec<_> = prepared
            .headers
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case(AUTH_METHOD_HEADER))
            .collect();
        assert_eq!(markers.len(), 1);
        assert_eq!(markers[0].1, "oauth");
        assert!(prepared.headers.iter().any(|(n, v)| n == "X-Custom" && v == "1"));
        assert_eq!(prepared.method, Method::POST);
        assert_eq!(prepared.body.as_deref(), Some(&b"payload"[..]));
    }

    #[test]
    fn test_json_body_sets_content_type() {
        let request = GatewayRequest::post("/api")
            .json(&serde_json::json!({"name": "notes"}))
            .unwrap();

        assert!(request
            .headers
            .iter()
            .any(|(n, v)| n == "Content-Type" && v == "application/json"));
        assert_eq!(request.body.as_deref(), Some(&br#"{"name":"notes"}"#[..]));
    }

    #[tokio::test]
    async fn test_dispatch_passes_token_and_response() {
        let client = FixedStatusClient::new(StatusCode::FORBIDDEN);
        let gw = gateway(client.clone());

        let response = gw
            .dispatch("tok-1", GatewayRequest::get("/api/node"))
            .await
            .unwrap();

        assert_eq!(response.status, StatusCode::FORBIDDEN);
        assert!(!response.is_success());
        assert_eq!(response.text(), "{\"ok\":true}");
        let body: serde_json::Value = response.json().unwrap();
        assert_eq!(body["ok"], true);

        let seen = client.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, "tok-1");
        assert_eq!(seen[0].1.url.as_str(), "https://node.example/api/node");
    }

    #[tokio::test]
    async fn test_dispatch_maps_401_to_unauthenticated() {
        let gw = gateway(FixedStatusClient::new(StatusCode::UNAUTHORIZED));

        let err = gw
            .dispatch("tok-1", GatewayRequest::get("/api/node"))
            .await
            .unwrap_err();

        assert!(err.is_unauthenticated());
    }
}
