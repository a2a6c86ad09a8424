//! Configuration management for the Habitat client.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

/// Default node the client authenticates against.
pub const DEFAULT_SERVER_DOMAIN: &str = "habitat-new.onrender.com";

/// Default domain the client itself is deployed under (hosts the client metadata document).
pub const DEFAULT_APP_DOMAIN: &str = "localhost:5173";

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Main client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Domain of the node that issues tokens and serves the application API.
    #[serde(default = "default_server_domain")]
    pub server_domain: String,
    /// Domain the client is deployed under.
    #[serde(default = "default_app_domain")]
    pub app_domain: String,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_server_domain() -> String {
    DEFAULT_SERVER_DOMAIN.to_string()
}

fn default_app_domain() -> String {
    DEFAULT_APP_DOMAIN.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            server_domain: default_server_domain(),
            app_domain: default_app_domain(),
        }
    }
}

impl Config {
    /// Load configuration from the config file if it exists, falling back to
    /// defaults. Environment variables are applied last.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.load_from_env();
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|source| CoreError::ConfigFile {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Save configuration to a file.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let config_path = paths.config_file();
        let content =
            serde_json::to_string_pretty(self).map_err(|source| CoreError::ConfigFile {
                path: config_path.clone(),
                source,
            })?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    /// Override configuration from environment variables.
    fn load_from_env(&mut self) {
        if let Some(level) = non_empty_env("HABITAT_LOG_LEVEL") {
            self.log_level = level;
        }
        if let Some(domain) = non_empty_env("HABITAT_SERVER_DOMAIN") {
            self.server_domain = domain;
        }
        if let Some(domain) = non_empty_env("HABITAT_DOMAIN") {
            self.app_domain = domain;
        }
    }

    /// Check that both domains form valid https origins.
    pub fn validate(&self) -> CoreResult<()> {
        self.server_origin()?;
        self.app_origin()?;
        Ok(())
    }

    /// Origin of the node, e.g. `https://habitat-new.onrender.com/`.
    pub fn server_origin(&self) -> CoreResult<Url> {
        origin_for_domain(&self.server_domain)
    }

    /// Origin the client is deployed under.
    pub fn app_origin(&self) -> CoreResult<Url> {
        origin_for_domain(&self.app_domain)
    }
}

/// Build `https://{domain}/` and reject anything that is more than a bare host[:port].
fn origin_for_domain(domain: &str) -> CoreResult<Url> {
    let domain = domain.trim();
    if domain.is_empty() {
        return Err(CoreError::invalid_domain(domain, "empty"));
    }
    if domain.contains(['/', '?', '#']) {
        return Err(CoreError::invalid_domain(domain, "expected a bare host[:port]"));
    }
    let url = Url::parse(&format!("https://{}", domain))
        .map_err(|e| CoreError::invalid_domain(domain, e))?;
    if url.host_str().is_none() {
        return Err(CoreError::invalid_domain(domain, "no host"));
    }
    Ok(url)
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|raw| raw.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.log_level, DEFAULT_LOG_LEVEL);
        assert_eq!(config.server_domain, DEFAULT_SERVER_DOMAIN);
        assert_eq!(config.app_domain, DEFAULT_APP_DOMAIN);
    }

    #[test]
    fn test_config_load_from_file_fills_missing_fields() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.json");

        std::fs::write(&config_path, r#"{ "server_domain": "node.example" }"#).unwrap();

        let config = Config::load_from_file(&config_path).unwrap();
        assert_eq!(config.server_domain, "node.example");
        assert_eq!(config.log_level, DEFAULT_LOG_LEVEL);
        assert_eq!(config.app_domain, DEFAULT_APP_DOMAIN);
    }

    #[test]
    fn test_config_save_and_load_from_file() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());

        let config = Config {
            log_level: "trace".to_string(),
            server_domain: "node.example".to_string(),
            app_domain: "app.example".to_string(),
        };
        config.save(&paths).unwrap();

        let loaded = Config::load_from_file(&paths.config_file()).unwrap();
        assert_eq!(loaded.log_level, "trace");
        assert_eq!(loaded.server_domain, "node.example");
        assert_eq!(loaded.app_domain, "app.example");
    }

    #[test]
    fn test_server_origin() {
        let config = Config {
            server_domain: "node.example:8443".to_string(),
            ..Config::default()
        };
        let origin = config.server_origin().unwrap();
        assert_eq!(origin.as_str(), "https://node.example:8443/");
    }

    #[test]
    fn test_domain_with_path_is_rejected() {
        let config = Config {
            server_domain: "node.example/oauth".to_string(),
            ..Config::default()
        };
        assert!(matches!(
            config.server_origin(),
            Err(CoreError::InvalidDomain { ref domain, .. }) if domain == "node.example/oauth"
        ));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unparseable_domain_is_rejected() {
        let config = Config {
            server_domain: "node example".to_string(),
            ..Config::default()
        };
        assert!(matches!(
            config.server_origin(),
            Err(CoreError::InvalidDomain { .. })
        ));

        let config = Config {
            server_domain: "node.example:notaport".to_string(),
            ..Config::default()
        };
        assert!(matches!(
            config.server_origin(),
            Err(CoreError::InvalidDomain { .. })
        ));
    }

    #[test]
    fn test_malformed_config_file_names_the_file() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.json");
        std::fs::write(&config_path, "{ not json").unwrap();

        let err = Config::load_from_file(&config_path).unwrap_err();
        match &err {
            CoreError::ConfigFile { path, .. } => assert_eq!(path, &config_path),
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(err.to_string().contains("config.json"));
    }

    #[test]
    fn test_missing_config_file_is_io_error() {
        let dir = tempdir().unwrap();
        let result = Config::load_from_file(&dir.path().join("absent.json"));
        assert!(matches!(result, Err(CoreError::Io(_))));
    }

    #[test]
    fn test_empty_domain_is_rejected() {
        let config = Config {
            app_domain: "  ".to_string(),
            ..Config::default()
        };
        assert!(config.app_origin().is_err());
    }
}
