//! LLM and embedding API clients.
//!
//! Both services sit behind small async traits so the pipeline, indexer and
//! answerer can be driven by scripted fakes in tests:
//! - [`Generate`]: prompt in, text out
//! - [`Embed`]: texts in, vectors out, with a [`Purpose`] hint
//!
//! The production implementations, [`ChatClient`] and [`EmbeddingClient`],
//! speak the OpenAI-compatible `/chat/completions` and `/embeddings` wire
//! formats, so any compatible server (OpenAI, Ollama, vLLM, LM Studio) works.
//!
//! Calls are never retried. A failure aborts the current action and the user
//! decides whether to try again.

use crate::config::{AppConfig, EmbeddingConfig, LlmConfig};
use crate::error::ProviderError;
use reqwest::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

/// Trait for async text generation.
pub trait Generate {
    /// Send `prompt` to the model and return its reply.
    async fn generate(&self, prompt: &str) -> Result<String, ProviderError>;
}

/// What an embedding will be used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Purpose {
    /// Stored in the knowledge base.
    Document,
    /// Compared against stored documents.
    Query,
}

/// Trait for async text embedding.
pub trait Embed {
    /// Embed every text in `texts`, returning one vector per input in order.
    async fn embed_batch(
        &self,
        texts: &[String],
        purpose: Purpose,
    ) -> Result<Vec<Vec<f32>>, ProviderError>;

    /// Embed a single text.
    async fn embed_one(&self, text: &str, purpose: Purpose) -> Result<Vec<f32>, ProviderError> {
        let mut vectors = self.embed_batch(&[text.to_string()], purpose).await?;
        vectors
            .pop()
            .ok_or_else(|| ProviderError::Decode("empty embedding response".to_string()))
    }
}

fn auth_headers(api_key: &str) -> Result<HeaderMap, ProviderError> {
    let mut headers = HeaderMap::new();
    let auth = format!("Bearer {}", api_key.trim());
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&auth).map_err(|_| ProviderError::MissingApiKey)?,
    );
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    Ok(headers)
}

/// Chat-completions client for an OpenAI-compatible endpoint.
#[derive(Debug, Clone)]
pub struct ChatClient {
    client: Client,
    endpoint: String,
    config: LlmConfig,
}

impl ChatClient {
    pub fn new(config: &LlmConfig, api_key: &str) -> Result<Self, ProviderError> {
        if api_key.trim().is_empty() {
            return Err(ProviderError::MissingApiKey);
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(auth_headers(api_key)?)
            .build()?;
        let endpoint = format!("{}/chat/completions", config.api_base.trim_end_matches('/'));
        Ok(Self {
            client,
            endpoint,
            config: config.clone(),
        })
    }
}

impl Generate for ChatClient {
    #[instrument(level = "info", skip_all, fields(model = %self.config.model))]
    async fn generate(&self, prompt: &str) -> Result<String, ProviderError> {
        let t0 = Instant::now();
        let body = ChatRequest {
            model: &self.config.model,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        let resp = self.client.post(&self.endpoint).json(&body).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            warn!(elapsed_ms = t0.elapsed().as_millis(), %status, "Chat completion failed");
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))?;
        let answer = parsed
            .choices
            .into_iter()
            .find_map(|choice| choice.message.content)
            .ok_or_else(|| ProviderError::Decode("response had no message content".to_string()))?;

        info!(
            elapsed_ms = t0.elapsed().as_millis(),
            prompt_bytes = prompt.len(),
            reply_bytes = answer.len(),
            "Chat completion succeeded"
        );
        Ok(answer)
    }
}

/// Embeddings client for an OpenAI-compatible endpoint.
#[derive(Debug, Clone)]
pub struct EmbeddingClient {
    client: Client,
    endpoint: String,
    config: EmbeddingConfig,
}

impl EmbeddingClient {
    pub fn new(app: &AppConfig, api_key: &str) -> Result<Self, ProviderError> {
        if api_key.trim().is_empty() {
            return Err(ProviderError::MissingApiKey);
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(app.embedding.timeout_secs))
            .default_headers(auth_headers(api_key)?)
            .build()?;
        let endpoint = format!("{}/embeddings", app.embedding_api_base().trim_end_matches('/'));
        Ok(Self {
            client,
            endpoint,
            config: app.embedding.clone(),
        })
    }

    fn prefix(&self, purpose: Purpose) -> &str {
        match purpose {
            Purpose::Document => &self.config.document_prefix,
            Purpose::Query => &self.config.query_prefix,
        }
    }
}

impl Embed for EmbeddingClient {
    #[instrument(level = "info", skip_all, fields(model = %self.config.model, count = texts.len(), ?purpose))]
    async fn embed_batch(
        &self,
        texts: &[String],
        purpose: Purpose,
    ) -> Result<Vec<Vec<f32>>, ProviderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let t0 = Instant::now();
        let prefix = self.prefix(purpose);
        let input: Vec<String> = texts.iter().map(|t| format!("{prefix}{t}")).collect();
        let request = EmbeddingRequest {
            model: &self.config.model,
            input: &input,
            dimensions: self.config.dimensions,
        };

        let resp = self.client.post(&self.endpoint).json(&request).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let mut parsed: EmbeddingResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))?;
        parsed.data.sort_by_key(|entry| entry.index);
        debug!(elapsed_ms = t0.elapsed().as_millis(), returned = parsed.data.len(), "Embedding batch returned");
        Ok(parsed.data.into_iter().map(|entry| entry.embedding).collect())
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    max_tokens: usize,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    content: Option<String>,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}
