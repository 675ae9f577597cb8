use serde::{Deserialize, Serialize};
use thiserror::Error;
use twin_core::Mode;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server error: {0}")]
    Server(String),
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    message: &'a str,
    mode: &'a str,
}

#[derive(Serialize)]
struct SwitchRequest<'a> {
    agent: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct ChatReply {
    pub agent: String,
    pub response: String,
}

#[derive(Debug, Deserialize)]
pub struct SwitchReply {
    pub current_agent: String,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct SaveReply {
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct AgentList {
    pub agents: Vec<String>,
    pub current_agent: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

/// HTTP client for the twin server's chat endpoints. Speech goes over the
/// session's WebSocket, not through here.
pub struct TwinApi {
    base: String,
    http: reqwest::Client,
}

impl TwinApi {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            http: reqwest::Client::new(),
        }
    }

    pub async fn chat(&self, message: &str, mode: Mode) -> Result<ChatReply, ApiError> {
        let response = self
            .http
            .post(format!("{}/chat", self.base))
            .json(&ChatRequest {
                message,
                mode: mode.as_str(),
            })
            .send()
            .await?;
        Self::read(response).await
    }

    pub async fn switch_agent(&self, agent: &str) -> Result<SwitchReply, ApiError> {
        let response = self
            .http
            .post(format!("{}/switch-agent", self.base))
            .json(&SwitchRequest { agent })
            .send()
            .await?;
        Self::read(response).await
    }

    pub async fn save_conversation(&self) -> Result<SaveReply, ApiError> {
        let response = self
            .http
            .post(format!("{}/save-conversation", self.base))
            .send()
            .await?;
        Self::read(response).await
    }

    pub async fn agents(&self) -> Result<AgentList, ApiError> {
        let response = self
            .http
            .get(format!("{}/agents", self.base))
            .send()
            .await?;
        Self::read(response).await
    }

    /// Successful responses decode into `T`; failures surface the server's
    /// error message when it sent one.
    async fn read<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ApiError> {
        if response.status().is_success() {
            Ok(response.json().await?)
        } else {
            let status = response.status();
            let message = response
                .json::<ErrorBody>()
                .await
                .map(|body| body.error)
                .unwrap_or_else(|_| format!("status {status}"));
            Err(ApiError::Server(message))
        }
    }
}
