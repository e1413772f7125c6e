use std::env;
use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "gpt-4o";
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Connection settings for the chat-completion backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LlmSettings {
    pub model: String,
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            token: String::new(),
            base_url: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl LlmSettings {
    /// Saved settings (or defaults) with environment overrides applied.
    pub fn load() -> Result<Self, ConfigError> {
        let mut settings = match fs::read_to_string(config_path()) {
            Ok(raw) => toml::from_str(&raw)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(e) => return Err(e.into()),
        };
        settings.apply_env();
        Ok(settings)
    }

    fn apply_env(&mut self) {
        if let Some(token) = env::var("TESTSMITH_TOKEN")
            .ok()
            .or_else(|| env::var("OPENAI_API_KEY").ok())
            .filter(|t| !t.trim().is_empty())
        {
            self.token = token;
        }

        if let Ok(model) = env::var("TESTSMITH_MODEL") {
            self.model = model;
        }

        if let Ok(url) = env::var("TESTSMITH_BASE_URL") {
            self.base_url = Some(url);
        }
    }

    /// Validates and persists new connection settings.
    pub fn configure(
        token: String,
        model: Option<String>,
        base_url: Option<String>,
    ) -> Result<Self, ConfigError> {
        if token.trim().is_empty() {
            return Err(ConfigError::EmptyToken);
        }

        let settings = Self {
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            token: token.trim().to_string(),
            base_url,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        };
        settings.save()?;
        Ok(settings)
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        let path = config_path();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn endpoint(&self) -> &str {
        self.base_url.as_deref().unwrap_or(DEFAULT_ENDPOINT)
    }

    pub fn is_configured(&self) -> bool {
        !self.token.trim().is_empty()
    }
}

/// What happens when a job is requested for a target that already has one
/// in flight.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum JobPolicy {
    #[default]
    Reject,
    /// Cancel the running job and start the new one.
    Replace,
}

/// Everything one pipeline run needs, passed in explicitly.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub llm: LlmSettings,
    pub result_dir: PathBuf,
    pub job_policy: JobPolicy,
}

impl PipelineConfig {
    pub fn new(llm: LlmSettings) -> Self {
        Self {
            llm,
            result_dir: default_result_dir(),
            job_policy: JobPolicy::default(),
        }
    }
}

pub fn default_result_dir() -> PathBuf {
    env::temp_dir().join("testsmithResults")
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("testsmith")
        .join("llm.toml")
}
