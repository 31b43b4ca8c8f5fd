//! Provider configuration
//!
//! Mirrors the provider block: endpoint, token, project and TLS settings.
//! `from_env` reads the same values from `KKP_*` environment variables.

use kkp_client::ClientConfig;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub const ENV_ENDPOINT: &str = "KKP_ENDPOINT";
pub const ENV_TOKEN: &str = "KKP_TOKEN";
pub const ENV_PROJECT_ID: &str = "KKP_PROJECT_ID";
pub const ENV_INSECURE_SKIP_VERIFY: &str = "KKP_INSECURE_SKIP_VERIFY";
pub const ENV_CA_FILE: &str = "KKP_CA_FILE";
pub const ENV_TIMEOUT_SECONDS: &str = "KKP_TIMEOUT_SECONDS";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),

    #[error("invalid endpoint {0:?}")]
    InvalidEndpoint(String),

    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: &'static str, value: String },

    #[error("read CA file {path}: {source}")]
    CaFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Provider-level settings shared by every resource
#[derive(Clone)]
pub struct ProviderConfig {
    /// Normalized base URL, no trailing `/api`
    pub endpoint: String,
    pub token: String,
    /// Project every resource lives in
    pub project_id: String,
    pub insecure_skip_verify: bool,
    pub ca_file: Option<PathBuf>,
    pub timeout: Duration,
    pub user_agent: String,
    pub extra_headers: Vec<(String, String)>,
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("endpoint", &self.endpoint)
            .field("token", &"<redacted>")
            .field("project_id", &self.project_id)
            .field("insecure_skip_verify", &self.insecure_skip_verify)
            .field("ca_file", &self.ca_file)
            .field("timeout", &self.timeout)
            .field("user_agent", &self.user_agent)
            .field("extra_headers", &self.extra_headers.len())
            .finish()
    }
}

impl ProviderConfig {
    /// Build a configuration with defaults for everything but the required
    /// settings. The endpoint is normalized.
    pub fn new(
        endpoint: &str,
        token: impl Into<String>,
        project_id: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let token = token.into();
        let project_id = project_id.into();
        if token.trim().is_empty() {
            return Err(ConfigError::Missing("token"));
        }
        if project_id.trim().is_empty() {
            return Err(ConfigError::Missing("project_id"));
        }

        Ok(Self {
            endpoint: normalize_endpoint(endpoint)?,
            token,
            project_id: project_id.trim().to_string(),
            insecure_skip_verify: false,
            ca_file: None,
            timeout: kkp_client::client::DEFAULT_TIMEOUT,
            user_agent: format!("terraform-provider-kkp/{}", env!("CARGO_PKG_VERSION")),
            extra_headers: Vec::new(),
        })
    }

    /// Load configuration from `KKP_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let endpoint = get(ENV_ENDPOINT).ok_or(ConfigError::Missing(ENV_ENDPOINT))?;
        let token = get(ENV_TOKEN).ok_or(ConfigError::Missing(ENV_TOKEN))?;
        let project_id = get(ENV_PROJECT_ID).ok_or(ConfigError::Missing(ENV_PROJECT_ID))?;
        let mut config = Self::new(&endpoint, token, project_id)?;

        if let Some(raw) = get(ENV_INSECURE_SKIP_VERIFY) {
            config.insecure_skip_verify = parse_bool(ENV_INSECURE_SKIP_VERIFY, &raw)?;
        }
        if let Some(path) = get(ENV_CA_FILE) {
            config.ca_file = Some(PathBuf::from(path.trim()));
        }
        if let Some(raw) = get(ENV_TIMEOUT_SECONDS) {
            let seconds: u64 = raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: ENV_TIMEOUT_SECONDS,
                value: raw.clone(),
            })?;
            if seconds > 0 {
                config.timeout = Duration::from_secs(seconds);
            }
        }
        Ok(config)
    }

    /// Client settings, reading the CA bundle if one is configured
    pub fn client_config(&self) -> Result<ClientConfig, ConfigError> {
        let ca_pem = match &self.ca_file {
            Some(path) => Some(std::fs::read(path).map_err(|source| ConfigError::CaFile {
                path: path.clone(),
                source,
            })?),
            None => None,
        };

        let mut client = ClientConfig::new(self.endpoint.clone(), self.token.clone());
        client.timeout = self.timeout;
        client.user_agent = self.user_agent.clone();
        client.insecure_skip_verify = self.insecure_skip_verify;
        client.ca_pem = ca_pem;
        client.extra_headers = self.extra_headers.clone();
        Ok(client)
    }
}

fn parse_bool(key: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key,
            value: raw.to_string(),
        }),
    }
}

/// Normalize a user supplied endpoint.
///
/// A missing scheme defaults to `https`, and a trailing `/api` path segment
/// is dropped while any prefix before it is kept:
/// `kkp.example.com/kkp/api/` becomes `https://kkp.example.com/kkp`.
pub fn normalize_endpoint(raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Missing("endpoint"));
    }

    let (scheme, rest) = match trimmed.split_once("://") {
        Some((scheme, rest)) => (scheme.to_ascii_lowercase(), rest),
        None => ("https".to_string(), trimmed),
    };
    if !matches!(scheme.as_str(), "http" | "https") {
        return Err(ConfigError::InvalidEndpoint(raw.to_string()));
    }

    let (host, path) = match rest.find('/') {
        Some(idx) => rest.split_at(idx),
        None => (rest, ""),
    };
    if host.is_empty() || host.contains(char::is_whitespace) {
        return Err(ConfigError::InvalidEndpoint(raw.to_string()));
    }

    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let kept = match segments.split_last() {
        Some((last, prefix)) if *last == "api" => prefix,
        _ => segments.as_slice(),
    };

    if kept.is_empty() {
        Ok(format!("{}://{}", scheme, host))
    } else {
        Ok(format!("{}://{}/{}", scheme, host, kept.join("/")))
    }
}
