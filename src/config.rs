use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Result, TriageError};
use crate::models::Category;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub poll: PollConfig,
    #[serde(default)]
    pub classification: ClassificationConfig,
    #[serde(default)]
    pub replies: ReplyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    #[serde(default)]
    pub allow_overlap: bool,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_requests: usize,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            batch_size: default_batch_size(),
            allow_overlap: false,
            max_concurrent_requests: default_max_concurrent(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ClassifierMode {
    Gemini,
    Keywords,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationConfig {
    #[serde(default = "default_mode")]
    pub mode: ClassifierMode,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Upper bound for one classification request
    #[serde(default = "default_classification_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            endpoint: default_endpoint(),
            timeout_secs: default_classification_timeout_secs(),
        }
    }
}

/// Reply text per category
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReplyConfig {
    #[serde(default = "default_reply_interested")]
    pub interested: String,
    #[serde(default = "default_reply_not_interested")]
    pub not_interested: String,
    #[serde(default = "default_reply_more_information")]
    pub more_information: String,
    #[serde(default = "default_reply_fallback")]
    pub default: String,
}

impl Default for ReplyConfig {
    fn default() -> Self {
        Self {
            interested: default_reply_interested(),
            not_interested: default_reply_not_interested(),
            more_information: default_reply_more_information(),
            default: default_reply_fallback(),
        }
    }
}

impl ReplyConfig {
    /// Configured text for a category, `None` when the category has no dedicated reply
    pub fn text_for(&self, category: Category) -> Option<&str> {
        match category {
            Category::Interested => Some(&self.interested),
            Category::NotInterested => Some(&self.not_interested),
            Category::MoreInformation => Some(&self.more_information),
            Category::Other => None,
        }
    }
}

fn default_interval_ms() -> u64 {
    10_000
}

fn default_batch_size() -> u32 {
    10
}

fn default_max_concurrent() -> usize {
    10
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_mode() -> ClassifierMode {
    ClassifierMode::Gemini
}

fn default_model() -> String {
    "gemini-1.5-flash".to_string()
}

fn default_api_key_env() -> String {
    "GEMINI_API_KEY".to_string()
}

fn default_endpoint() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_classification_timeout_secs() -> u64 {
    30
}

fn default_reply_interested() -> String {
    "Thank you for the opportunity. What are the next steps?".to_string()
}

fn default_reply_not_interested() -> String {
    "Thanks for your response :) ".to_string()
}

fn default_reply_more_information() -> String {
    "Thanks for your response. What else could I help you with?".to_string()
}

fn default_reply_fallback() -> String {
    "Thank you for your email.".to_string()
}

impl Config {
    pub async fn load(path: &Path) -> Result<Self> {
        // If file doesn't exist, return default config with warning
        if !path.exists() {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| TriageError::ConfigError(format!("Failed to read config file: {}", e)))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| TriageError::ConfigError(format!("Failed to parse config file: {}", e)))?;

        config.validate()?;

        tracing::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                TriageError::ConfigError(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| TriageError::ConfigError(format!("Failed to serialize config: {}", e)))?;

        tokio::fs::write(path, content)
            .await
            .map_err(|e| TriageError::ConfigError(format!("Failed to write config file: {}", e)))?;

        tracing::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.poll.interval_ms < 100 {
            return Err(TriageError::ConfigError(
                "poll.interval_ms must be at least 100".to_string(),
            ));
        }

        // 1..=50
        if self.poll.batch_size == 0 {
            return Err(TriageError::ConfigError(
                "poll.batch_size must be at least 1".to_string(),
            ));
        }
        if self.poll.batch_size > 50 {
            return Err(TriageError::ConfigError(
                "poll.batch_size cannot exceed 50".to_string(),
            ));
        }

        if self.poll.max_concurrent_requests == 0 {
            return Err(TriageError::ConfigError(
                "poll.max_concurrent_requests must be at least 1".to_string(),
            ));
        }
        if self.poll.max_concurrent_requests > 50 {
            return Err(TriageError::ConfigError(
                "poll.max_concurrent_requests cannot exceed 50".to_string(),
            ));
        }

        if self.poll.request_timeout_secs == 0 {
            return Err(TriageError::ConfigError(
                "poll.request_timeout_secs must be at least 1".to_string(),
            ));
        }

        if self.classification.mode == ClassifierMode::Gemini {
            if self.classification.model.trim().is_empty() {
                return Err(TriageError::ConfigError(
                    "classification.model cannot be empty".to_string(),
                ));
            }
            if self.classification.api_key_env.trim().is_empty() {
                return Err(TriageError::ConfigError(
                    "classification.api_key_env cannot be empty".to_string(),
                ));
            }
            if self.classification.timeout_secs == 0 {
                return Err(TriageError::ConfigError(
                    "classification.timeout_secs must be at least 1".to_string(),
                ));
            }
            if !self.classification.endpoint.starts_with("http") {
                return Err(TriageError::ConfigError(format!(
                    "classification.endpoint must be an http(s) URL, got '{}'",
                    self.classification.endpoint
                )));
            }
        }

        let replies = [
            ("replies.interested", &self.replies.interested),
            ("replies.not_interested", &self.replies.not_interested),
            ("replies.more_information", &self.replies.more_information),
            ("replies.default", &self.replies.default),
        ];
        for (key, text) in replies {
            if text.trim().is_empty() {
                return Err(TriageError::ConfigError(format!("{} cannot be empty", key)));
            }
        }

        tracing::debug!("Configuration validation passed");
        Ok(())
    }

    /// Create an example configuration file
    pub async fn create_example(path: &Path) -> Result<()> {
        Self::default().save(path).await
    }
}
