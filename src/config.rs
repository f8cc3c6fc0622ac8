use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::ai::Provider;
use crate::error::{AppError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,

    pub perplexity_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub claude_api_key: Option<String>,
    pub unsplash_access_key: Option<String>,

    #[serde(default)]
    pub preferred_llm: Provider,

    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    #[serde(default)]
    pub auto_process: bool,

    #[serde(default = "default_true")]
    pub email_notifications: bool,

    pub notification_webhook: Option<String>,

    #[serde(default)]
    pub notification_recipients: Vec<String>,

    #[serde(default = "default_pacing_seconds")]
    pub pacing_seconds: u64,

    #[serde(default = "default_retry_backoff_hours")]
    pub retry_backoff_hours: i64,

    #[serde(default = "default_retention_days")]
    pub retention_days: i64,

    #[serde(default = "default_rejected_retention_days")]
    pub rejected_retention_days: i64,

    pub wordpress: Option<WordPressConfig>,
}

/// Publish target credentials. `app_password` is a WordPress application
/// password, not the account password.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WordPressConfig {
    pub base_url: String,
    pub username: String,
    pub app_password: String,
    pub author_id: Option<i64>,
}

fn default_db_path() -> String {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mednews");
    std::fs::create_dir_all(&data_dir).ok();
    data_dir.join("mednews.db").to_string_lossy().to_string()
}

fn default_batch_size() -> u32 {
    5
}

fn default_true() -> bool {
    true
}

fn default_pacing_seconds() -> u64 {
    2
}

fn default_retry_backoff_hours() -> i64 {
    24
}

fn default_retention_days() -> i64 {
    30
}

fn default_rejected_retention_days() -> i64 {
    60
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            perplexity_api_key: None,
            openai_api_key: None,
            claude_api_key: None,
            unsplash_access_key: None,
            preferred_llm: Provider::default(),
            batch_size: default_batch_size(),
            auto_process: false,
            email_notifications: true,
            notification_webhook: None,
            notification_recipients: Vec::new(),
            pacing_seconds: default_pacing_seconds(),
            retry_backoff_hours: default_retry_backoff_hours(),
            retention_days: default_retention_days(),
            rejected_retention_days: default_rejected_retention_days(),
            wordpress: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Reads the config at `path`, writing defaults there first if it is missing.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = toml::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("mednews")
            .join("config.toml")
    }

    fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(AppError::Config("batch_size must be at least 1".to_string()));
        }
        if self.retry_backoff_hours < 0 || self.retention_days < 0 || self.rejected_retention_days < 0 {
            return Err(AppError::Config(
                "retry and retention windows cannot be negative".to_string(),
            ));
        }
        Ok(())
    }

    /// Notifications go out only when enabled, a webhook is set and someone
    /// is listening.
    pub fn notifications_enabled(&self) -> bool {
        self.email_notifications
            && self.notification_webhook.as_deref().is_some_and(|u| !u.trim().is_empty())
            && !self.notification_recipients.is_empty()
    }
}
