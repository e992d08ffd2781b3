//! Consumed external collaborators: embedder, LLM, reranker (spec §5).
//!
//! Unlike the in-process model loading this crate's ancestor did, embedding,
//! generation, and reranking are all owned by whatever system configures this
//! crate — these traits describe the boundary, not an implementation of
//! inference itself. A `reqwest`-backed OpenAI-compatible implementation is
//! provided for each since that is the lowest common denominator most
//! providers speak.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

use crate::error::{RagError, Result};

/// Turns text into vectors. Implementations own batching, truncation, and
/// provider-specific prefixing.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let mut v = self.embed(std::slice::from_ref(&text.to_string())).await?;
        v.pop().ok_or_else(|| RagError::StoreError("embedder returned no vectors".into()))
    }

    fn dimension(&self) -> usize;
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".into(), content: content.into() }
    }
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".into(), content: content.into() }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ChatParams {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub stop: Vec<String>,
}

/// Chat-completion collaborator used by query decomposition (spec §4.7.4).
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn chat(&self, messages: &[ChatMessage], params: &ChatParams) -> Result<String>;
}

/// Cross-encoder-style relevance scorer (spec §4.7.3).
#[async_trait]
pub trait Reranker: Send + Sync {
    /// Returns one score per input document, in the same order.
    async fn score(&self, query: &str, documents: &[String]) -> Result<Vec<f32>>;
}

/// Default OpenAI-compatible HTTP implementation shared by the three traits.
pub struct HttpCollaborator {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    /// Embedding vector width this collaborator's `model` produces, supplied
    /// by the caller (spec §4.6 store dimension must match the embedder's
    /// output, and there's no portable way to ask an OpenAI-compatible
    /// `/embeddings` endpoint for it up front).
    dimension: usize,
}

impl HttpCollaborator {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, api_key: Option<String>, dimension: usize) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(60))
            .build()
            .expect("building the http client with static config cannot fail");
        Self { client, base_url: base_url.into(), api_key, model: model.into(), dimension }
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    /// Parse a response body as JSON, surfacing a clear error if the server
    /// returned HTML (proxy/gateway error page) instead.
    async fn parse_json<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
        endpoint: &str,
    ) -> Result<T> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| RagError::StoreError(format!("reading response body from {endpoint}: {e}")))?;
        let trimmed = body.trim_start();
        if trimmed.starts_with('<') {
            let preview: String = trimmed.chars().take(200).collect();
            return Err(RagError::StoreError(format!(
                "{endpoint} returned HTML instead of JSON (HTTP {status}): {preview}"
            )));
        }
        serde_json::from_str(&body).map_err(|e| {
            let preview: String = body.chars().take(300).collect();
            RagError::StoreError(format!("parsing JSON from {endpoint} (HTTP {status}): {e}. Body: {preview}"))
        })
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

#[async_trait]
impl Embedder for HttpCollaborator {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let endpoint = format!("{}/embeddings", self.base_url);
        let body = EmbeddingRequest { model: &self.model, input: texts };
        let response = self
            .authed(self.client.post(&endpoint).json(&body))
            .send()
            .await
            .map_err(|e| RagError::StoreError(format!("embedding request to {endpoint}: {e}")))?;
        let parsed: EmbeddingResponse = Self::parse_json(response, &endpoint).await?;
        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    stop: Vec<String>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

#[async_trait]
impl LlmClient for HttpCollaborator {
    async fn chat(&self, messages: &[ChatMessage], params: &ChatParams) -> Result<String> {
        let endpoint = format!("{}/chat/completions", self.base_url);
        let body = ChatRequest {
            model: &self.model,
            messages,
            temperature: params.temperature,
            max_tokens: params.max_tokens,
            stop: params.stop.clone(),
        };
        let response = self
            .authed(self.client.post(&endpoint).json(&body))
            .send()
            .await
            .map_err(|e| RagError::StoreError(format!("chat request to {endpoint}: {e}")))?;
        let parsed: ChatResponse = Self::parse_json(response, &endpoint).await?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| RagError::StoreError("chat response had no choices".into()))
    }
}

/// Generic cross-encoder rerank endpoint: `{"query": ..., "documents": [...]}`
/// returning `{"scores": [...]}` — the shape most reranker servers expose.
#[async_trait]
impl Reranker for HttpCollaborator {
    async fn score(&self, query: &str, documents: &[String]) -> Result<Vec<f32>> {
        let endpoint = format!("{}/rerank", self.base_url);
        let body = json!({ "model": self.model, "query": query, "documents": documents });
        let response = self
            .authed(self.client.post(&endpoint).json(&body))
            .send()
            .await
            .map_err(|e| RagError::StoreError(format!("rerank request to {endpoint}: {e}")))?;
        #[derive(Deserialize)]
        struct RerankResponse {
            scores: Vec<f32>,
        }
        let parsed: RerankResponse = Self::parse_json(response, &endpoint).await?;
        Ok(parsed.scores)
    }
}
