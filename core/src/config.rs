//! Environment-backed configuration for the backend client.

use std::env;

use url::Url;

use crate::error::ConfigError;

const DEFAULT_ORIGIN: &str = "http://127.0.0.1:3000";
const DEFAULT_API_PREFIX: &str = "api";

/// Where the backend lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Scheme, host and port of the page serving the backend.
    pub origin: Url,
    /// First path segment of every endpoint.
    pub api_prefix: String,
}

impl ClientConfig {
    /// Configuration for `origin` with the default `api` prefix.
    pub fn new(origin: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            origin: parse_origin(origin)?,
            api_prefix: DEFAULT_API_PREFIX.to_string(),
        })
    }

    pub fn with_api_prefix(mut self, prefix: &str) -> Self {
        self.api_prefix = prefix.trim_matches('/').to_string();
        self
    }

    /// Parse configuration from environment variables.
    ///
    /// - `BACKEND_LINK_ORIGIN` (default `http://127.0.0.1:3000`)
    /// - `BACKEND_LINK_API_PREFIX` (default `api`)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(mut lookup: F) -> Result<Self, ConfigError>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let origin = optional_trimmed_env("BACKEND_LINK_ORIGIN", &mut lookup)
            .unwrap_or_else(|| DEFAULT_ORIGIN.to_string());
        let config = Self::new(&origin)?;

        match optional_trimmed_env("BACKEND_LINK_API_PREFIX", &mut lookup) {
            Some(prefix) if prefix.contains(['?', '#']) => Err(ConfigError::InvalidValue {
                key: "BACKEND_LINK_API_PREFIX",
                value: prefix,
            }),
            Some(prefix) => Ok(config.with_api_prefix(&prefix)),
            None => Ok(config),
        }
    }
}

fn optional_trimmed_env<F>(key: &str, lookup: &mut F) -> Option<String>
where
    F: FnMut(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_origin(raw: &str) -> Result<Url, ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidOrigin {
        value: raw.to_string(),
        reason: reason.to_string(),
    };
    let parsed = Url::parse(raw.trim()).map_err(|err| invalid(&err.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(invalid("scheme must be http or https"));
    }
    if parsed.host_str().is_none() {
        return Err(invalid("missing host"));
    }
    Ok(parsed)
}
