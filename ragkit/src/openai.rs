//! OpenAI embeddings and chat completions over the REST API.
//!
//! This module is only available when the `openai` feature is enabled.
//!
//! - [`OpenAIEmbeddingProvider`]: `/v1/embeddings`, implements [`EmbeddingProvider`]
//! - [`OpenAIChatModel`]: `/v1/chat/completions`, implements [`LanguageModel`]

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::llm::LanguageModel;

const PROVIDER: &str = "OpenAI";
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";
/// Output size of `text-embedding-3-small`.
const DEFAULT_DIMENSIONS: usize = 1536;

/// Connection and model settings shared by both OpenAI adapters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIConfig {
    #[serde(default, skip_serializing)]
    pub api_key: String,
    /// API root, without a trailing slash. Override for compatible gateways.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    /// Requested embedding size. `None` uses the model's native size.
    #[serde(default)]
    pub dimensions: Option<usize>,
    #[serde(default = "default_chat_model")]
    pub chat_model: String,
    #[serde(default)]
    pub temperature: Option<f32>,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_embedding_model() -> String {
    DEFAULT_EMBEDDING_MODEL.to_string()
}

fn default_chat_model() -> String {
    DEFAULT_CHAT_MODEL.to_string()
}

impl OpenAIConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: default_base_url(),
            embedding_model: default_embedding_model(),
            dimensions: None,
            chat_model: default_chat_model(),
            temperature: None,
        }
    }

    /// Read the API key from `OPENAI_API_KEY`.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| {
            RagError::InvalidConfig("OPENAI_API_KEY environment variable not set".into())
        })?;
        Ok(Self::new(api_key))
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the embedding model (e.g. `text-embedding-3-large`).
    pub fn with_embedding_model(mut self, model: impl Into<String>) -> Self {
        self.embedding_model = model.into();
        self
    }

    /// Request truncated embeddings of this size.
    pub fn with_dimensions(mut self, dims: usize) -> Self {
        self.dimensions = Some(dims);
        self
    }

    pub fn with_chat_model(mut self, model: impl Into<String>) -> Self {
        self.chat_model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    fn validate(&self) -> Result<()> {
        if self.api_key.is_empty() {
            return Err(RagError::InvalidConfig("OpenAI API key must not be empty".into()));
        }
        if self.dimensions == Some(0) {
            return Err(RagError::InvalidConfig(
                "OpenAI dimensions must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }
}

// ── OpenAI API request/response types ──────────────────────────────

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

/// POST `body` to `url` and decode a JSON reply, mapping failures with `wrap`.
async fn post_json<B: Serialize, R: DeserializeOwned>(
    client: &reqwest::Client,
    api_key: &str,
    url: &str,
    body: &B,
    wrap: fn(String) -> RagError,
) -> Result<R> {
    let response = client.post(url).bearer_auth(api_key).json(body).send().await.map_err(|e| {
        error!(provider = PROVIDER, error = %e, "request failed");
        wrap(format!("request failed: {e}"))
    })?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let detail =
            serde_json::from_str::<ErrorResponse>(&body).map(|e| e.error.message).unwrap_or(body);
        error!(provider = PROVIDER, %status, "API error");
        return Err(wrap(format!("API returned {status}: {detail}")));
    }

    response.json().await.map_err(|e| {
        error!(provider = PROVIDER, error = %e, "failed to parse response");
        wrap(format!("failed to parse response: {e}"))
    })
}

fn embedding_error(message: String) -> RagError {
    RagError::EmbeddingError { provider: PROVIDER.into(), message }
}

fn generation_error(message: String) -> RagError {
    RagError::GenerationError { provider: PROVIDER.into(), message }
}

/// An [`EmbeddingProvider`] backed by the OpenAI embeddings API.
///
/// # Example
///
/// ```rust,ignore
/// use ragkit::openai::{OpenAIConfig, OpenAIEmbeddingProvider};
///
/// let provider = OpenAIEmbeddingProvider::new(OpenAIConfig::from_env()?)?;
/// let embedding = provider.embed("hello world").await?;
/// ```
pub struct OpenAIEmbeddingProvider {
    client: reqwest::Client,
    config: OpenAIConfig,
}

impl OpenAIEmbeddingProvider {
    /// # Errors
    ///
    /// Returns [`RagError::InvalidConfig`] for an empty API key or zero dimensions.
    pub fn new(config: OpenAIConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { client: reqwest::Client::new(), config })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        debug!(provider = PROVIDER, text_len = text.len(), "embedding single text");

        let results = self.embed_batch(&[text]).await?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| embedding_error("API returned empty response".into()))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(
            provider = PROVIDER,
            batch_size = texts.len(),
            model = %self.config.embedding_model,
            "embedding batch"
        );

        let request = EmbeddingRequest {
            model: &self.config.embedding_model,
            input: texts,
            dimensions: self.config.dimensions,
        };
        let mut response: EmbeddingResponse = post_json(
            &self.client,
            &self.config.api_key,
            &self.config.endpoint("embeddings"),
            &request,
            embedding_error,
        )
        .await?;

        // The API documents input order but tags each item with its index.
        response.data.sort_by_key(|d| d.index);
        Ok(response.data.into_iter().map(|d| d.embedding).collect())
    }

    fn dimensions(&self) -> usize {
        self.config.dimensions.unwrap_or(DEFAULT_DIMENSIONS)
    }

    fn name(&self) -> &str {
        PROVIDER
    }
}

/// A [`LanguageModel`] backed by OpenAI chat completions.
///
/// Each prompt is sent as a single user message; the first choice's content
/// is returned.
pub struct OpenAIChatModel {
    client: reqwest::Client,
    config: OpenAIConfig,
}

impl OpenAIChatModel {
    /// # Errors
    ///
    /// Returns [`RagError::InvalidConfig`] for an empty API key.
    pub fn new(config: OpenAIConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { client: reqwest::Client::new(), config })
    }
}

#[async_trait]
impl LanguageModel for OpenAIChatModel {
    fn name(&self) -> &str {
        &self.config.chat_model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        debug!(
            provider = PROVIDER,
            model = %self.config.chat_model,
            prompt_len = prompt.len(),
            "chat completion"
        );

        let request = ChatRequest {
            model: &self.config.chat_model,
            messages: [ChatMessage { role: "user", content: prompt }],
            temperature: self.config.temperature,
        };
        let response: ChatResponse = post_json(
            &self.client,
            &self.config.api_key,
            &self.config.endpoint("chat/completions"),
            &request,
            generation_error,
        )
        .await?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| generation_error("API returned no message content".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_key_is_rejected() {
        assert!(matches!(
            OpenAIEmbeddingProvider::new(OpenAIConfig::new("")),
            Err(RagError::InvalidConfig(_))
        ));
        assert!(OpenAIChatModel::new(OpenAIConfig::new("")).is_err());
    }

    #[test]
    fn dimensions_follow_config() {
        let provider = OpenAIEmbeddingProvider::new(OpenAIConfig::new("sk-test")).unwrap();
        assert_eq!(provider.dimensions(), 1536);
        let config = OpenAIConfig::new("sk-test").with_dimensions(256);
        let provider = OpenAIEmbeddingProvider::new(config).unwrap();
        assert_eq!(provider.dimensions(), 256);
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let config = OpenAIConfig::new("k").with_base_url("http://localhost:8080/v1/");
        assert_eq!(config.endpoint("embeddings"), "http://localhost:8080/v1/embeddings");
    }

    #[test]
    fn chat_request_shape() {
        let request = ChatRequest {
            model: "m",
            messages: [ChatMessage { role: "user", content: "hi" }],
            temperature: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"model": "m", "messages": [{"role": "user", "content": "hi"}]})
        );
    }
}
