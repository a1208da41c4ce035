use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use url::Url;

use crate::{
    config::RunnerConfig,
    error::{RunnerError, RunnerResult},
    model_client::ModelClient,
};

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

#[derive(Clone)]
pub struct OllamaClient {
    http: reqwest::Client,
    base_url: Url,
}

impl OllamaClient {
    pub fn from_config(config: &RunnerConfig) -> RunnerResult<Self> {
        Self::new(config.ollama_base_url.clone(), config.request_timeout)
    }

    pub fn new(mut base_url: Url, timeout: Option<Duration>) -> RunnerResult<Self> {
        // Relative joins keep the base path only when it ends in `/`.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let mut builder = reqwest::Client::builder().default_headers(headers);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            http: builder.build()?,
            base_url,
        })
    }

    #[instrument(name = "ollama.chat", skip(self, request), fields(model = %request.model))]
    pub async fn post_chat(&self, request: &ChatRequest) -> RunnerResult<ChatResponse> {
        let url = self.base_url.join("api/chat")?;
        let response = self
            .http
            .post(url)
            .json(request)
            .send()
            .await
            .map_err(|err| RunnerError::Llm(format!("send error: {err}")))?
            .error_for_status()
            .map_err(|err| RunnerError::Llm(format!("Ollama HTTP error: {err}")))?;

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|err| RunnerError::Llm(format!("decode error: {err}")))?;
        debug!(served_by = ?body.model, done = ?body.done, "chat response received");
        Ok(body)
    }
}

#[async_trait]
impl ModelClient for OllamaClient {
    async fn chat(&self, model: &str, prompt: &str) -> RunnerResult<String> {
        let request = ChatRequest::user(model, prompt);
        let response = self.post_chat(&request).await?;
        response
            .message
            .map(|message| message.content)
            .ok_or_else(|| RunnerError::Llm(format!("response from {model} has no message")))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
}

impl ChatRequest {
    pub fn user(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            messages: vec![ChatMessage {
                role: "user".into(),
                content: prompt.into(),
            }],
            stream: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub message: Option<ChatMessage>,
    #[serde(default)]
    pub done: Option<bool>,
}
