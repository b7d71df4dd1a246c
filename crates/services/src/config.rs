use std::env;
use std::time::Duration;

use crate::error::ConfigError;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Knobs for the pipeline driver.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Total attempts per agent stage, including the first one. At least 1.
    pub max_attempts: u32,
    /// How long a presented question may wait for its answer.
    pub answer_timeout: Option<Duration>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            answer_timeout: None,
        }
    }
}

impl PipelineConfig {
    /// Read `STUDY_MAX_ATTEMPTS` and `STUDY_ANSWER_TIMEOUT_SECS`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if a variable is set but not a positive integer.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Same as [`PipelineConfig::from_env`] with a custom variable source.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if a variable is set but not a positive integer.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let max_attempts = match lookup("STUDY_MAX_ATTEMPTS") {
            Some(raw) => positive("STUDY_MAX_ATTEMPTS", &raw)?,
            None => DEFAULT_MAX_ATTEMPTS,
        };
        let answer_timeout = lookup("STUDY_ANSWER_TIMEOUT_SECS")
            .map(|raw| positive("STUDY_ANSWER_TIMEOUT_SECS", &raw))
            .transpose()?
            .map(|secs| Duration::from_secs(u64::from(secs)));
        Ok(Self {
            max_attempts,
            answer_timeout,
        })
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    #[must_use]
    pub fn with_answer_timeout(mut self, timeout: Duration) -> Self {
        self.answer_timeout = Some(timeout);
        self
    }
}

fn positive(name: &'static str, raw: &str) -> Result<u32, ConfigError> {
    match raw.trim().parse::<u32>() {
        Ok(value) if value > 0 => Ok(value),
        _ => Err(ConfigError::Invalid {
            name,
            value: raw.to_owned(),
        }),
    }
}

/// Connection settings for an OpenAI-compatible chat completions endpoint.
#[derive(Clone, Debug)]
pub struct BackendConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
}

impl BackendConfig {
    /// Read `STUDY_AI_API_KEY`, `STUDY_AI_BASE_URL` and `STUDY_AI_MODEL`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if no API key is configured.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Same as [`BackendConfig::from_env`] with a custom variable source.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if no API key is configured.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let api_key = lookup("STUDY_AI_API_KEY")
            .filter(|key| !key.trim().is_empty())
            .ok_or(ConfigError::Missing("STUDY_AI_API_KEY"))?;
        let base_url = lookup("STUDY_AI_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.into());
        let model = lookup("STUDY_AI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.into());
        Ok(Self {
            base_url,
            api_key,
            model,
        })
    }
}
