use govbroker_types::{BrokerError, CertificateId, EndpointPolicy, PolicyTable};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt, path::PathBuf, time::Duration};

/// Prefix for environment-variable overrides.
pub const ENV_PREFIX: &str = "GOVBROKER_";

fn default_timeout_secs() -> u64 {
    30
}
fn default_token_path() -> String {
    "/oauth/token".to_string()
}
fn default_refresh_margin_secs() -> u64 {
    60
}

/// Where the upstream API lives and how long a single exchange may take.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Base URL of the upstream API (one fixed host per environment).
    #[serde(default)]
    pub base_url: String,
    /// Per-exchange timeout in seconds (defaults to 30).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Path of the OAuth token endpoint, relative to `base_url`.
    #[serde(default = "default_token_path")]
    pub token_path: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            timeout_secs: default_timeout_secs(),
            token_path: default_token_path(),
        }
    }
}

/// OAuth client-credentials configuration.
///
/// Both fields are optional at load time; their absence surfaces as a
/// configuration error the first time a token is needed.
#[derive(Clone, Serialize, Deserialize)]
pub struct OAuthConfig {
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing)]
    pub client_secret: Option<String>,
    /// Tokens are renewed this many seconds before they expire.
    #[serde(default = "default_refresh_margin_secs")]
    pub refresh_margin_secs: u64,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            refresh_margin_secs: default_refresh_margin_secs(),
        }
    }
}

impl fmt::Debug for OAuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthConfig")
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("refresh_margin_secs", &self.refresh_margin_secs)
            .finish()
    }
}

/// One client-certificate identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertificateConfig {
    pub id: CertificateId,
    /// PEM file with the certificate chain (and the key, if `key_path` is unset).
    pub cert_path: PathBuf,
    /// PEM file with the PKCS#8 private key.
    #[serde(default)]
    pub key_path: Option<PathBuf>,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Default filter directive; `RUST_LOG` takes precedence when set.
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
    /// Append logs to this file instead of stderr.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            file: None,
        }
    }
}

fn default_port() -> u16 {
    8020
}
fn default_host() -> String {
    "127.0.0.1".to_string()
}

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Listen port (defaults to 8020).
    #[serde(default = "default_port")]
    pub port: u16,
    /// Listen address (defaults to `127.0.0.1`).
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub oauth: OAuthConfig,
    /// Available client-certificate identities.
    #[serde(default)]
    pub certificates: Vec<CertificateConfig>,
    /// Identity used when a call carries no certificate hint.
    #[serde(default)]
    pub default_certificate: Option<CertificateId>,
    /// Endpoint policy table, keyed by policy id.
    #[serde(default)]
    pub policies: BTreeMap<String, EndpointPolicy>,
    #[serde(default)]
    pub log: LogConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            upstream: UpstreamConfig::default(),
            oauth: OAuthConfig::default(),
            certificates: Vec::new(),
            default_certificate: None,
            policies: BTreeMap::new(),
            log: LogConfig::default(),
        }
    }
}

impl Config {
    /// Parses configuration from a YAML string, merged with defaults.
    ///
    /// # Errors
    ///
    /// Returns a [`figment::Error`] if the YAML is invalid or extraction fails.
    #[allow(clippy::result_large_err)]
    pub fn from_yaml(yaml: &str) -> Result<Self, figment::Error> {
        use figment::{
            Figment,
            providers::{Format as _, Serialized, Yaml},
        };
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Yaml::string(yaml))
            .extract()
    }

    /// Loads configuration from defaults, an optional YAML file, and
    /// `GOVBROKER_*` environment variables, in increasing precedence.
    ///
    /// # Errors
    ///
    /// Returns a [`figment::Error`] if the file cannot be read or parsed.
    #[allow(clippy::result_large_err)]
    pub fn load(path: Option<&std::path::Path>) -> Result<Self, figment::Error> {
        use figment::{
            Figment,
            providers::{Env, Format as _, Serialized, Yaml},
        };
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file_exact(path));
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__")).extract()
    }

    /// Validates and returns the endpoint policy table.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::Configuration`] if any policy is malformed.
    pub fn policy_table(&self) -> Result<PolicyTable, BrokerError> {
        PolicyTable::new(self.policies.clone())
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.upstream.timeout_secs)
    }

    #[must_use]
    pub fn refresh_margin(&self) -> Duration {
        Duration::from_secs(self.oauth.refresh_margin_secs)
    }

    /// Full URL of the OAuth token endpoint.
    #[must_use]
    pub fn token_url(&self) -> String {
        format!(
            "{}/{}",
            self.upstream.base_url.trim_end_matches('/'),
            self.upstream.token_path.trim_start_matches('/')
        )
    }
}
