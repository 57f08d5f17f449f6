//! Configuration for fileharbor-client

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{ClientError, Result};

/// API endpoint used when no host is configured
pub const DEFAULT_API_URL: &str = "http://localhost:8000";

/// Prefix of environment variables overriding file settings
pub const ENV_PREFIX: &str = "FILEHARBOR";

/// Client configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    /// API host, with or without scheme (e.g. "search.example.com")
    pub api: Option<String>,
    /// Overall request timeout in seconds
    pub timeout_seconds: u64,
    /// Delay between job status polls in milliseconds
    pub poll_interval_ms: u64,
    /// Cookie holding the CSRF token
    pub csrf_cookie_name: String,
    /// Header the CSRF token is echoed in
    pub csrf_header_name: String,
}

impl ClientConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ClientError::Config(format!("Failed to read config file: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| ClientError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Load configuration from an optional file, overridden by
    /// `FILEHARBOR_*` environment variables (e.g. `FILEHARBOR_API`).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let settings = builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()
            .map_err(|e| ClientError::Config(format!("Failed to load config: {}", e)))?;

        settings
            .try_deserialize()
            .map_err(|e| ClientError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Create a default development configuration
    pub fn development() -> Self {
        Self {
            api: None,
            timeout_seconds: 30,
            poll_interval_ms: 500,
            csrf_cookie_name: "csrftoken".to_string(),
            csrf_header_name: "X-CSRFToken".to_string(),
        }
    }

    /// Point the client at another API host
    pub fn with_api(mut self, api: impl Into<String>) -> Self {
        self.api = Some(api.into());
        self
    }

    /// Resolved base URL: the configured host, `https://` assumed when it has
    /// no scheme, or the local development endpoint when nothing is set.
    pub fn base_url(&self) -> String {
        resolve_base_url(self.api.as_deref())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let base_url = self.base_url();
        url::Url::parse(&base_url).map_err(|e| {
            ClientError::Config(format!("Invalid API URL '{}': {}", base_url, e))
        })?;

        if self.timeout_seconds == 0 {
            return Err(ClientError::Config("Request timeout must be positive".to_string()));
        }

        reqwest::header::HeaderName::from_bytes(self.csrf_header_name.as_bytes()).map_err(|e| {
            ClientError::Config(format!(
                "Invalid CSRF header name '{}': {}",
                self.csrf_header_name, e
            ))
        })?;

        if self.csrf_cookie_name.is_empty() {
            return Err(ClientError::Config("CSRF cookie name is empty".to_string()));
        }

        Ok(())
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::development()
    }
}

fn resolve_base_url(api: Option<&str>) -> String {
    let api = match api.map(str::trim) {
        Some(api) if !api.is_empty() => api,
        _ => return DEFAULT_API_URL.to_string(),
    };

    let lower = api.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        api.to_string()
    } else {
        format!("https://{}", api)
    }
}
