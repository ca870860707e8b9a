//! Provider configuration
//!
//! Loaded once, validated, then handed explicitly to `OtcProvider::new`.
//! Sources are a JSON file or the `OS_*` environment variables used by
//! OpenStack tooling.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while loading or validating the provider configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required setting: {0}")]
    Missing(&'static str),

    #[error("Invalid auth_url '{0}': must start with http:// or https://")]
    InvalidAuthUrl(String),

    #[error("No credentials configured: set a token, an access/secret key pair, or user_name/password")]
    NoCredentials,

    #[error("Incomplete credentials: {0}")]
    IncompleteCredentials(&'static str),

    #[error("Conflicting credentials: {0}")]
    ConflictingCredentials(&'static str),

    #[error("Invalid value '{value}' for {name}")]
    InvalidValue { name: &'static str, value: String },

    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Settings of the Open Telekom Cloud provider
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    /// Default region for resources that do not set their own
    #[serde(default)]
    pub region: String,
    /// Identity endpoint (e.g., "https://iam.eu-de.otc.t-systems.com/v3")
    #[serde(default)]
    pub auth_url: String,
    #[serde(default)]
    pub domain_name: Option<String>,
    #[serde(default)]
    pub tenant_name: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub access_key: Option<String>,
    #[serde(default)]
    pub secret_key: Option<String>,
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Skip TLS verification
    #[serde(default)]
    pub insecure: bool,
    /// Per-service endpoint overrides (e.g., "dns" -> "https://dns.example.test")
    #[serde(default)]
    pub endpoints: HashMap<String, String>,
}

impl ProviderConfig {
    /// Load from a JSON file and validate
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ProviderConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from the process environment and validate
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load from any variable source (used with the real environment or a map)
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> ConfigResult<Self> {
        let get = |names: &[&str]| {
            names
                .iter()
                .find_map(|name| lookup(name).filter(|v| !v.is_empty()))
        };

        let insecure = match get(&["OS_INSECURE"]) {
            None => false,
            Some(v) => parse_bool(&v).ok_or(ConfigError::InvalidValue {
                name: "OS_INSECURE",
                value: v,
            })?,
        };

        let config = Self {
            region: get(&["OS_REGION_NAME"]).unwrap_or_default(),
            auth_url: get(&["OS_AUTH_URL"]).unwrap_or_default(),
            domain_name: get(&["OS_DOMAIN_NAME", "OS_USER_DOMAIN_NAME"]),
            tenant_name: get(&["OS_TENANT_NAME", "OS_PROJECT_NAME"]),
            token: get(&["OS_TOKEN", "OS_AUTH_TOKEN"]),
            access_key: get(&["OS_ACCESS_KEY"]),
            secret_key: get(&["OS_SECRET_KEY"]),
            user_name: get(&["OS_USERNAME"]),
            password: get(&["OS_PASSWORD"]),
            insecure,
            endpoints: HashMap::new(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Check that the configuration is complete and consistent
    pub fn validate(&self) -> ConfigResult<()> {
        if self.region.trim().is_empty() {
            return Err(ConfigError::Missing("region"));
        }
        if self.auth_url.trim().is_empty() {
            return Err(ConfigError::Missing("auth_url"));
        }
        if !(self.auth_url.starts_with("https://") || self.auth_url.starts_with("http://")) {
            return Err(ConfigError::InvalidAuthUrl(self.auth_url.clone()));
        }

        let has_token = self.token.is_some();
        let has_aksk = match (&self.access_key, &self.secret_key) {
            (Some(_), Some(_)) => true,
            (None, None) => false,
            _ => {
                return Err(ConfigError::IncompleteCredentials(
                    "access_key and secret_key must be set together",
                ));
            }
        };
        let has_password = match (&self.user_name, &self.password) {
            (Some(_), Some(_)) => true,
            (None, None) => false,
            _ => {
                return Err(ConfigError::IncompleteCredentials(
                    "user_name and password must be set together",
                ));
            }
        };

        match [has_token, has_aksk, has_password].iter().filter(|b| **b).count() {
            0 => Err(ConfigError::NoCredentials),
            1 => {
                if has_password && self.domain_name.is_none() {
                    return Err(ConfigError::IncompleteCredentials(
                        "domain_name is required for password authentication",
                    ));
                }
                Ok(())
            }
            _ => Err(ConfigError::ConflictingCredentials(
                "use only one of token, access/secret key, or user_name/password",
            )),
        }
    }

    /// Endpoint of a service in a region, honouring overrides
    pub fn endpoint_for(&self, service: &str, region: &str) -> String {
        self.endpoints
            .get(service)
            .cloned()
            .unwrap_or_else(|| format!("https://{}.{}.otc.t-systems.com", service, region))
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    }
}
