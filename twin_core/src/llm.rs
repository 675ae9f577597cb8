use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::router::ModelChoice;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("OPENAI_API_KEY is not set")]
    MissingApiKey,

    #[error("chat request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("model returned no choices")]
    EmptyResponse,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u16,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: String,
}

/// Blocking OpenAI-style chat client. Call sites run it inside
/// `spawn_blocking`; see the server's chat handler.
pub struct LlmClient {
    api_key: String,
    base_url: String,
    http: Client,
}

impl LlmClient {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: base_url.into(),
            http: Client::new(),
        }
    }

    /// Build from `OPENAI_API_KEY`, with `LLM_BASE_URL` overriding the
    /// endpoint for proxies and tests.
    pub fn from_env() -> Result<Self, LlmError> {
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| LlmError::MissingApiKey)?;
        if api_key.trim().is_empty() {
            return Err(LlmError::MissingApiKey);
        }
        let base_url =
            std::env::var("LLM_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        Ok(Self::new(api_key, base_url))
    }

    /// Send `prompt` as a single system message and return the reply text.
    pub fn complete(&self, prompt: &str, choice: &ModelChoice) -> Result<String, LlmError> {
        let body = ChatRequest {
            model: choice.model,
            messages: vec![ChatMessage {
                role: "system",
                content: prompt,
            }],
            max_tokens: choice.max_tokens,
        };
        let response = self
            .http
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()?
            .error_for_status()?
            .json::<ChatResponse>()?;
        response
            .choices
            .first()
            .map(|first| first.message.content.trim().to_string())
            .ok_or(LlmError::EmptyResponse)
    }
}
