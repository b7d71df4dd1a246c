use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::BackendConfig;
use crate::error::BackendError;

const SYSTEM_PROMPT: &str =
    "You are one stage of a study companion. Reply with a single JSON object and nothing else.";

/// Text-in, text-out access to a reasoning service.
#[async_trait]
pub trait ReasoningBackend: Send + Sync {
    /// Send a prompt and return the raw reply text.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` when the request fails or the reply is empty.
    async fn complete(&self, prompt: &str) -> Result<String, BackendError>;
}

/// Backend speaking the OpenAI-compatible `/chat/completions` protocol.
#[derive(Clone)]
pub struct ChatCompletionsBackend {
    client: Client,
    config: BackendConfig,
}

impl ChatCompletionsBackend {
    #[must_use]
    pub fn new(config: BackendConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.config.model
    }
}

#[async_trait]
impl ReasoningBackend for ChatCompletionsBackend {
    async fn complete(&self, prompt: &str) -> Result<String, BackendError> {
        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );
        let payload = ChatRequest {
            model: self.config.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: prompt.to_string(),
                },
            ],
            temperature: 0.2,
        };

        let response = self
            .client
            .post(url)
            .bearer_auth(&self.config.api_key)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(BackendError::HttpStatus(response.status()));
        }

        let body: ChatResponse = response.json().await?;
        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(BackendError::EmptyResponse)?;

        Ok(content.trim().to_string())
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Debug, Deserialize)]
struct ChatMessageResponse {
    content: Option<String>,
}
