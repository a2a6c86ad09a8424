//! OAuth endpoint configuration, fixed once the session manager is built.

use crate::metadata::ClientMetadata;
use crate::AuthResult;
use habitat_config_and_utils::Config;
use url::Url;

/// Authorization endpoint path on the node.
pub const AUTHORIZE_PATH: &str = "oauth/authorize";

/// Token endpoint path on the node.
pub const TOKEN_PATH: &str = "oauth/token";

/// Endpoints and client identity used by the authorization flow and gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthConfig {
    server_origin: Url,
    issuer: String,
    authorization_endpoint: Url,
    token_endpoint: Url,
    client_id: String,
}

impl AuthConfig {
    /// Derive every endpoint from the node origin.
    ///
    /// The node identifies itself with its authorization endpoint as issuer.
    pub fn new(server_origin: Url, client_id: impl Into<String>) -> AuthResult<Self> {
        let authorization_endpoint = server_origin.join(AUTHORIZE_PATH)?;
        let token_endpoint = server_origin.join(TOKEN_PATH)?;
        Ok(Self {
            issuer: authorization_endpoint.to_string(),
            server_origin,
            authorization_endpoint,
            token_endpoint,
            client_id: client_id.into(),
        })
    }

    /// Configuration for a node at `server_domain` used by a client deployed
    /// under `app_domain`.
    pub fn for_domains(server_domain: &str, app_domain: &str) -> AuthResult<Self> {
        let config = Config {
            server_domain: server_domain.to_string(),
            app_domain: app_domain.to_string(),
            ..Config::default()
        };
        Self::from_config(&config)
    }

    /// Configuration derived from the loaded client config.
    pub fn from_config(config: &Config) -> AuthResult<Self> {
        config.validate()?;
        let metadata = ClientMetadata::for_domain(&config.app_domain);
        Self::new(config.server_origin()?, metadata.client_id)
    }

    /// Origin relative request targets are resolved against.
    pub fn server_origin(&self) -> &Url {
        &self.server_origin
    }

    /// Expected `iss` of authorization responses.
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn authorization_endpoint(&self) -> &Url {
        &self.authorization_endpoint
    }

    pub fn token_endpoint(&self) -> &Url {
        &self.token_endpoint
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }
}
