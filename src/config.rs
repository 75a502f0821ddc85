//! Configuration management

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use jsonwebtoken::Algorithm;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{Error, Result};

/// Cookie the token is read from unless configured otherwise
pub const DEFAULT_COOKIE_NAME: &str = "CLOUDFRONT_GOOGLE_TOKEN";

/// Google's PEM certificate endpoint
pub const DEFAULT_KEY_SET_URL: &str = "https://www.googleapis.com/oauth2/v1/certs";

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Token policy
    pub authorizer: AuthorizerConfig,
    /// Remote key set
    pub key_set: KeySetConfig,
    /// Local edge simulator
    pub server: ServerConfig,
}

/// Token policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthorizerConfig {
    /// Expected `aud` (OAuth client id); required
    pub audience: String,
    /// Expected `iss`
    pub issuer: String,
    /// Cookie holding the token
    pub cookie_name: String,
    /// Permitted signing algorithms
    pub algorithms: Vec<String>,
    /// Require `hd` to equal this domain
    pub hosted_domain: Option<String>,
    /// Require `email` to be one of these
    pub email_allow_list: Option<Vec<String>>,
}

impl Default for AuthorizerConfig {
    fn default() -> Self {
        Self {
            audience: String::new(),
            issuer: "accounts.google.com".to_string(),
            cookie_name: DEFAULT_COOKIE_NAME.to_string(),
            algorithms: vec!["RS256".to_string()],
            hosted_domain: None,
            email_allow_list: None,
        }
    }
}

impl AuthorizerConfig {
    /// Parse `algorithms`; `none` and unknown names are errors
    pub fn parsed_algorithms(&self) -> Result<Vec<Algorithm>> {
        if self.algorithms.is_empty() {
            return Err(Error::Config(
                "authorizer.algorithms must not be empty".to_string(),
            ));
        }
        self.algorithms
            .iter()
            .map(|name| {
                Algorithm::from_str(name).map_err(|_| {
                    Error::Config(format!("authorizer.algorithms: unsupported '{name}'"))
                })
            })
            .collect()
    }
}

/// Remote key-set endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeySetConfig {
    /// Endpoint URL
    pub url: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Retry a failed fetch once
    pub retry: bool,
    /// Delay before the retry, in milliseconds
    pub retry_backoff_ms: u64,
    /// Permit `http://` endpoints (local testing only)
    pub allow_insecure_http: bool,
}

impl Default for KeySetConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_KEY_SET_URL.to_string(),
            timeout_secs: 5,
            retry: false,
            retry_backoff_ms: 200,
            allow_insecure_http: false,
        }
    }
}

impl KeySetConfig {
    /// Parsed endpoint URL
    pub fn parsed_url(&self) -> Result<Url> {
        Url::parse(&self.url)
            .map_err(|e| Error::Config(format!("key_set.url '{}': {e}", self.url)))
    }

    /// Request timeout
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Retry delay, when retry is enabled
    #[must_use]
    pub fn retry_backoff(&self) -> Option<Duration> {
        self.retry
            .then(|| Duration::from_millis(self.retry_backoff_ms))
    }
}

/// Local edge simulator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind
    pub host: String,
    /// Port to bind
    pub port: u16,
    /// Directory served to authorized requests
    pub root: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            root: PathBuf::from("website-dist"),
        }
    }
}

impl Config {
    /// Load configuration from an optional YAML file, then `EDGE_AUTH_*`
    /// environment variables (`__` separates nested keys).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        figment = figment.merge(Env::prefixed("EDGE_AUTH_").split("__"));

        let config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the authorizer cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.authorizer.audience.trim().is_empty() {
            return Err(Error::Config(
                "authorizer.audience (client id) is required".to_string(),
            ));
        }
        if self.authorizer.issuer.trim().is_empty() {
            return Err(Error::Config("authorizer.issuer must not be empty".to_string()));
        }
        if self.authorizer.cookie_name.trim().is_empty() {
            return Err(Error::Config(
                "authorizer.cookie_name must not be empty".to_string(),
            ));
        }
        self.authorizer.parsed_algorithms()?;
        self.key_set.parsed_url()?;
        if self.key_set.timeout_secs == 0 {
            return Err(Error::Config("key_set.timeout_secs must be > 0".to_string()));
        }
        Ok(())
    }
}
