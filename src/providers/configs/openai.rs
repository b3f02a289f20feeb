use super::base::ProviderConfig;
use anyhow::Result;
use std::time::Duration;

pub const DEFAULT_HOST: &str = "https://openrouter.ai/api";
pub const DEFAULT_MODEL: &str = "google/gemini-2.0-flash-001";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

/// Settings for any OpenAI-compatible chat-completions endpoint
#[derive(Debug, Clone)]
pub struct OpenAiProviderConfig {
    pub api_key: String,
    pub host: String,
    pub model: String,
    pub temperature: Option<f32>,
    pub timeout: Duration,
}

impl OpenAiProviderConfig {
    pub fn new(api_key: String, host: String, model: String) -> Self {
        Self {
            api_key,
            host,
            model,
            temperature: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Full URL of the chat-completions route
    pub fn completions_url(&self) -> String {
        format!("{}/v1/chat/completions", self.host.trim_end_matches('/'))
    }
}

impl ProviderConfig for OpenAiProviderConfig {
    fn from_env() -> Result<Self> {
        let api_key = match Self::get_env("OPENROUTER_API_KEY", false, None)? {
            Some(key) => key,
            None => Self::get_env("OPENAI_API_KEY", true, None)?
                .ok_or_else(|| anyhow::anyhow!("API key should be present"))?,
        };

        let host = Self::get_env("OPENROUTER_HOST", false, Some(DEFAULT_HOST.to_string()))?
            .unwrap_or_else(|| DEFAULT_HOST.to_string());

        let model = Self::get_env("OPENROUTER_MODEL", false, Some(DEFAULT_MODEL.to_string()))?
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        Ok(Self::new(api_key, host, model))
    }
}
