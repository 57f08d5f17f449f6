//! Configuration for the mock backend

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Mock backend configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MockConfig {
    /// Listen address (e.g. "127.0.0.1:8000")
    pub listen_addr: String,
    /// Replies carrying `{job_id}` (the initial one included) before a
    /// search's result is delivered. Zero answers searches immediately.
    pub pending_polls: u32,
    /// Shorter queries are rejected with a validation error
    pub min_query_len: usize,
    /// Value set in the `csrftoken` cookie
    pub csrf_token: String,
    /// Entries generated per dataset
    pub entries_per_dataset: usize,
    /// Jobs not polled for this long are forgotten
    pub job_ttl_ms: u64,
}

impl MockConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        toml::from_str(&content).context("Failed to parse config")
    }

    /// Create a default development configuration
    pub fn development() -> Self {
        Self {
            listen_addr: "127.0.0.1:8000".to_string(),
            pending_polls: 2,
            min_query_len: 2,
            csrf_token: "fileharbor-dev-token".to_string(),
            entries_per_dataset: 3,
            job_ttl_ms: 300_000,
        }
    }

    pub fn job_ttl(&self) -> Duration {
        Duration::from_millis(self.job_ttl_ms)
    }

    /// Apply `FILEHARBOR_MOCK_*` environment overrides
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(addr) = std::env::var("FILEHARBOR_MOCK_ADDR") {
            self.listen_addr = addr;
        }
        if let Some(polls) = std::env::var("FILEHARBOR_MOCK_PENDING_POLLS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.pending_polls = polls;
        }
        self
    }
}

impl Default for MockConfig {
    fn default() -> Self {
        Self::development()
    }
}
