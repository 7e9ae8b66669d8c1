//! Configuration loading and management

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use mirror_core::layout::{ExportLayout, DEFAULT_LEDGER_FILE, DEFAULT_QUARANTINE_DIR};
use serde::{Deserialize, Serialize};

/// Main configuration, read from `config.yaml`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Zotero API key (can be supplied via `ZOTERO_API_KEY` instead)
    #[serde(default)]
    pub zotero_api_key: String,

    /// Numeric Zotero user ID owning the library
    pub zotero_user_id: String,

    /// Key of the collection to mirror
    pub zotero_collection_id: String,

    /// Repository to clone, commit to and push
    pub git_repository_url: String,

    /// Committer name
    pub git_name: String,

    /// Committer email
    pub git_email: String,

    /// Export directory inside the repository
    pub export_path: String,

    /// Commit message used for every sync commit
    pub commit_message: String,

    /// Quarantine subdirectory inside the export directory
    #[serde(default = "default_quarantine_dir")]
    pub quarantine_dir: String,

    /// Ledger filename inside the export directory
    #[serde(default = "default_ledger_file")]
    pub ledger_file: String,

    /// Zotero API base URL
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Download rate limit
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Retries for failed API requests (5xx, 429, transport errors)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Push attempts after the first one when the remote tip does not match
    #[serde(default = "default_push_retries")]
    pub push_retries: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitConfig {
    /// Calls allowed per window
    #[serde(default = "default_quota")]
    pub quota: usize,

    /// Window length in seconds
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            quota: default_quota(),
            window_secs: default_window_secs(),
        }
    }
}

fn default_quarantine_dir() -> String {
    DEFAULT_QUARANTINE_DIR.to_string()
}

fn default_ledger_file() -> String {
    DEFAULT_LEDGER_FILE.to_string()
}

fn default_api_base() -> String {
    "https://api.zotero.org".to_string()
}

fn default_quota() -> usize {
    10
}

fn default_window_secs() -> u64 {
    60
}

fn default_max_retries() -> u32 {
    5
}

fn default_push_retries() -> u32 {
    3
}

impl Config {
    /// Load configuration from a YAML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config = Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;
        tracing::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(content)?;
        Ok(config)
    }

    /// Replace the API key (e.g. from the environment) when one is given
    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        if let Some(key) = api_key.filter(|k| !k.is_empty()) {
            self.zotero_api_key = key;
        }
        self
    }

    /// Check required values are present
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("zoteroApiKey", &self.zotero_api_key),
            ("zoteroUserId", &self.zotero_user_id),
            ("zoteroCollectionId", &self.zotero_collection_id),
            ("gitRepositoryUrl", &self.git_repository_url),
            ("gitName", &self.git_name),
            ("gitEmail", &self.git_email),
            ("commitMessage", &self.commit_message),
            ("quarantineDir", &self.quarantine_dir),
            ("ledgerFile", &self.ledger_file),
        ];
        for (key, value) in required {
            if value.trim().is_empty() {
                bail!("Missing required config value: {}", key);
            }
        }
        if self.quarantine_dir.contains('/') || self.ledger_file.contains('/') {
            bail!("quarantineDir and ledgerFile must be plain names inside exportPath");
        }
        if self.rate_limit.quota == 0 || self.rate_limit.window_secs == 0 {
            bail!("rateLimit quota and windowSecs must be greater than zero");
        }
        Ok(())
    }

    /// Export layout described by this configuration
    pub fn layout(&self) -> ExportLayout {
        ExportLayout::new(self.export_path.as_str())
            .with_quarantine_dir(self.quarantine_dir.as_str())
            .with_ledger_file(self.ledger_file.as_str())
    }
}
