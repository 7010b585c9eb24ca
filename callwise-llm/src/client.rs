//! HTTP transport for OpenAI-compatible chat-completion APIs.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use callwise_core::CallwiseConfig;
use reqwest::{Client, Response};
use secrecy::{ExposeSecret, SecretString};
use url::Url;

use crate::error::LlmError;
use crate::wire::{ChatRequest, ChatResponse, ModelInfo};

/// Something that can carry a chat request to a model and back.
///
/// One call is one attempt: retries belong to the executor.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a chat-completion request.
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError>;

    /// Look up a model's metadata.
    async fn retrieve_model(&self, model: &str) -> Result<ModelInfo, LlmError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        (**self).chat(request).await
    }

    async fn retrieve_model(&self, model: &str) -> Result<ModelInfo, LlmError> {
        (**self).retrieve_model(model).await
    }
}

/// [`Transport`] over `reqwest`, speaking the OpenAI chat-completion protocol.
#[derive(Clone)]
pub struct OpenAiTransport {
    http: Client,
    base_url: Url,
    api_key: Option<SecretString>,
}

impl std::fmt::Debug for OpenAiTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiTransport")
            .field("base_url", &self.base_url.as_str())
            .field("api_key", &self.api_key.as_ref().map(|_| "[redacted]"))
            .finish_non_exhaustive()
    }
}

impl OpenAiTransport {
    /// Build a transport from configuration.
    ///
    /// # Errors
    /// Returns `LlmError::Transport` if the HTTP client cannot be built.
    pub fn new(config: &CallwiseConfig) -> Result<Self, LlmError> {
        let http = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()?;
        Ok(Self {
            http,
            base_url: config.api_base.clone(),
            api_key: config.api_key.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        let base = self.base_url.as_str().trim_end_matches('/');
        format!("{base}/{path}")
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key.expose_secret()),
            None => builder,
        }
    }
}

#[async_trait]
impl Transport for OpenAiTransport {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        let builder = self.http.post(self.endpoint("chat/completions")).json(request);
        let response = self.authorize(builder).send().await?;
        let response = check_status(response).await?;
        response
            .json::<ChatResponse>()
            .await
            .map_err(|e| LlmError::Decode(e.to_string()))
    }

    async fn retrieve_model(&self, model: &str) -> Result<ModelInfo, LlmError> {
        let builder = self.http.get(self.endpoint(&format!("models/{model}")));
        let response = self.authorize(builder).send().await?;
        let response = check_status(response).await?;
        response
            .json::<ModelInfo>()
            .await
            .map_err(|e| LlmError::Decode(e.to_string()))
    }
}

/// Turn a non-success status into `LlmError::Api`, preferring the
/// provider's `error.message` over the raw body.
async fn check_status(response: Response) -> Result<Response, LlmError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|value| value["error"]["message"].as_str().map(str::to_string))
        .unwrap_or(body);

    tracing::warn!(target: "callwise", status = %status, "provider returned error");
    Err(LlmError::Api {
        status: status.as_u16(),
        message,
    })
}
