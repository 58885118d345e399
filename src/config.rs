//! Deployment configuration.
//!
//! Non-secret settings (endpoints, names, sampling constants, limits) live in a
//! TOML file. Keys and connection strings are read from the environment, the
//! same way they were in the `.env`-driven deployment:
//!
//! | Variable | Used by |
//! |----------|---------|
//! | `AZURE_OAI_KEY` | completion gateway |
//! | `AZURE_SEARCH_KEY` | retrieval binding |
//! | `AZURE_BLOB_CONNECTION_STRING` | object store (account name, key, endpoint) |
//! | `AZURE_BLOB_KEY` | optional override for the connection string's `AccountKey` |
//! | `AZURE_DOC_INTELLIGENCE_KEY` | extraction adapter |
//!
//! Everything is validated once at start-up so a misconfigured deployment
//! fails before it accepts a request.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub completion: CompletionConfig,
    pub search: SearchConfig,
    pub storage: StorageConfig,
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub conversation: ConversationConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

fn default_max_upload_bytes() -> usize {
    20 * 1024 * 1024
}

#[derive(Debug, Deserialize, Clone)]
pub struct CompletionConfig {
    pub endpoint: String,
    pub deployment: String,
    #[serde(default = "default_oai_api_version")]
    pub api_version: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_oai_api_version() -> String {
    "2023-09-01-preview".to_string()
}
fn default_temperature() -> f64 {
    0.5
}
fn default_max_tokens() -> u32 {
    1000
}
fn default_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    pub endpoint: String,
    pub index: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub container: String,
    #[serde(default = "default_grant_ttl_secs")]
    pub grant_ttl_secs: i64,
    /// Overrides the blob endpoint from the connection string (Azurite, private link).
    #[serde(default)]
    pub endpoint_url: Option<String>,
}

/// Grants are short-lived; a day is the longest accepted lifetime.
pub const MAX_GRANT_TTL_SECS: i64 = 24 * 60 * 60;

fn default_grant_ttl_secs() -> i64 {
    600
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExtractionConfig {
    pub endpoint: String,
    #[serde(default = "default_extraction_model")]
    pub model: String,
    #[serde(default = "default_extraction_api_version")]
    pub api_version: String,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_extraction_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_extraction_model() -> String {
    "prebuilt-document".to_string()
}
fn default_extraction_api_version() -> String {
    "2023-07-31".to_string()
}
fn default_poll_interval_ms() -> u64 {
    1000
}
fn default_extraction_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct ConversationConfig {
    /// Most recent turns replayed on a follow-up call. `0` replays everything.
    #[serde(default = "default_max_history_turns")]
    pub max_history_turns: usize,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            max_history_turns: default_max_history_turns(),
        }
    }
}

fn default_max_history_turns() -> usize {
    40
}

/// Credentials for the external services, read from the environment.
#[derive(Clone)]
pub struct Secrets {
    pub completion_key: String,
    pub search_key: String,
    pub blob_connection_string: String,
    pub blob_key_override: Option<String>,
    pub extraction_key: String,
}

impl Secrets {
    /// Load all service credentials. A `.env` file in the working directory is
    /// honoured if present.
    pub fn from_env() -> Result<Self> {
        match dotenvy::dotenv() {
            Ok(path) => tracing::debug!(path = %path.display(), "loaded .env"),
            Err(e) if e.not_found() => {}
            Err(e) => tracing::warn!(error = %e, "ignoring unreadable .env file"),
        }
        Ok(Self {
            completion_key: required_env("AZURE_OAI_KEY")?,
            search_key: required_env("AZURE_SEARCH_KEY")?,
            blob_connection_string: required_env("AZURE_BLOB_CONNECTION_STRING")?,
            blob_key_override: std::env::var("AZURE_BLOB_KEY")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            extraction_key: required_env("AZURE_DOC_INTELLIGENCE_KEY")?,
        })
    }
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secrets").finish_non_exhaustive()
    }
}

fn required_env(name: &str) -> Result<String> {
    let value = std::env::var(name)
        .with_context(|| format!("{} environment variable not set", name))?;
    if value.trim().is_empty() {
        bail!("{} environment variable is empty", name);
    }
    Ok(value)
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    for (field, value) in [
        ("server.bind", &config.server.bind),
        ("completion.endpoint", &config.completion.endpoint),
        ("completion.deployment", &config.completion.deployment),
        ("search.endpoint", &config.search.endpoint),
        ("search.index", &config.search.index),
        ("storage.container", &config.storage.container),
        ("extraction.endpoint", &config.extraction.endpoint),
        ("extraction.model", &config.extraction.model),
    ] {
        if value.trim().is_empty() {
            bail!("{} must not be empty", field);
        }
    }

    if !(config.completion.temperature > 0.0 && config.completion.temperature <= 2.0) {
        bail!("completion.temperature must be in (0.0, 2.0]");
    }
    if config.completion.max_tokens == 0 {
        bail!("completion.max_tokens must be > 0");
    }
    if config.storage.grant_ttl_secs <= 0 || config.storage.grant_ttl_secs > MAX_GRANT_TTL_SECS {
        bail!(
            "storage.grant_ttl_secs must be in 1..={} (got {})",
            MAX_GRANT_TTL_SECS,
            config.storage.grant_ttl_secs
        );
    }
    if config.extraction.poll_interval_ms == 0 {
        bail!("extraction.poll_interval_ms must be > 0");
    }
    if config.extraction.timeout_secs == 0 {
        bail!("extraction.timeout_secs must be > 0");
    }
    if config.server.max_upload_bytes == 0 {
        bail!("server.max_upload_bytes must be > 0");
    }

    Ok(())
}
