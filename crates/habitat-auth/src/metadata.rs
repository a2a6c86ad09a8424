//! OAuth client metadata document.
//!
//! The authorization server fetches this document from `client_id` to
//! validate login requests. It is published at
//! `https://{domain}/client-metadata.json`.

use serde::{Deserialize, Serialize};

/// Path of the callback route under the deploying domain.
pub const REDIRECT_PATH: &str = "/oauth-login";

/// Path the metadata document is served from.
pub const METADATA_PATH: &str = "/client-metadata.json";

/// Scope requested by the client.
pub const CLIENT_SCOPE: &str = "atproto transition:generic";

/// Client metadata as published for the authorization server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientMetadata {
    pub client_id: String,
    pub client_name: String,
    pub client_uri: String,
    pub redirect_uris: Vec<String>,
    pub scope: String,
    pub grant_types: Vec<String>,
    pub response_types: Vec<String>,
    pub token_endpoint_auth_method: String,
    pub application_type: String,
    pub dpop_bound_access_tokens: bool,
}

impl ClientMetadata {
    /// Metadata for a client deployed under `domain` (host[:port], no scheme).
    pub fn for_domain(domain: &str) -> Self {
        let origin = format!("https://{}", domain);
        Self {
            client_id: format!("{}{}", origin, METADATA_PATH),
            client_name: "Habitat".to_string(),
            client_uri: origin.clone(),
            redirect_uris: vec![format!("{}{}", origin, REDIRECT_PATH)],
            scope: CLIENT_SCOPE.to_string(),
            grant_types: vec!["authorization_code".to_string(), "refresh_token".to_string()],
            response_types: vec!["code".to_string()],
            token_endpoint_auth_method: "none".to_string(),
            application_type: "web".to_string(),
            dpop_bound_access_tokens: true,
        }
    }

    /// The first registered redirect URI.
    pub fn redirect_uri(&self) -> Option<&str> {
        self.redirect_uris.first().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_for_domain() {
        let metadata = ClientMetadata::for_domain("app.example");

        assert_eq!(metadata.client_id, "https://app.example/client-metadata.json");
        assert_eq!(metadata.client_uri, "https://app.example");
        assert_eq!(metadata.redirect_uri(), Some("https://app.example/oauth-login"));
        assert_eq!(metadata.scope, "atproto transition:generic");
        assert_eq!(metadata.token_endpoint_auth_method, "none");
        assert!(metadata.dpop_bound_access_tokens);
    }

    #[test]
    fn test_metadata_json_shape() {
        let json = serde_json::to_value(ClientMetadata::for_domain("app.example")).unwrap();

        assert_eq!(
            json["grant_types"],
            serde_json::json!(["authorization_code", "refresh_token"])
        );
        assert_eq!(json["response_types"], serde_json::json!(["code"]));
        assert_eq!(json["application_type"], "web");
        assert_eq!(json["dpop_bound_access_tokens"], true);
    }
}
