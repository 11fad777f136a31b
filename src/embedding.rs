//! Embedding providers.
//!
//! Concrete [`Embedder`] implementations used to embed search queries:
//! - **[`DisabledEmbedder`]**: fails every call; used when `embedding.provider = "disabled"`.
//! - **[`OpenAIEmbedder`]**: `POST {url}/embeddings` on an OpenAI-compatible API.
//!   Requires `OPENAI_API_KEY`.
//! - **[`OllamaEmbedder`]**: `POST {url}/api/embed` on a local Ollama instance.
//!
//! All providers share the HTTP client built by
//! [`Services`](crate::services::Services). Nothing is retried: a failed
//! embedding call surfaces immediately as a backend outage.
//!
//! ```rust,no_run
//! # use chunkseek::config::EmbeddingConfig;
//! # use chunkseek::embedding::create_embedder;
//! let config = EmbeddingConfig::default(); // provider = "disabled"
//! let embedder = create_embedder(reqwest::Client::new(), &config).unwrap();
//! assert_eq!(embedder.model_name(), "disabled");
//! ```

use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::Value;

use chunkseek_core::embedding::Embedder;
use chunkseek_core::error::{Result as RetrievalResult, RetrievalError};

use crate::config::EmbeddingConfig;

/// Instantiate the provider named by `config.provider`.
pub fn create_embedder(client: reqwest::Client, config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledEmbedder)),
        "openai" => Ok(Arc::new(OpenAIEmbedder::new(client, config)?)),
        "ollama" => Ok(Arc::new(OllamaEmbedder::new(client, config)?)),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

fn required_model_and_dims(config: &EmbeddingConfig, provider: &str) -> Result<(String, usize)> {
    let model = config
        .model
        .clone()
        .ok_or_else(|| anyhow::anyhow!("embedding.model required for {} provider", provider))?;
    let dims = config
        .dims
        .ok_or_else(|| anyhow::anyhow!("embedding.dims required for {} provider", provider))?;
    Ok((model, dims))
}

// ============ Disabled Provider ============

/// Placeholder provider. Semantic search fails with a clear error.
pub struct DisabledEmbedder;

#[async_trait]
impl Embedder for DisabledEmbedder {
    fn model_name(&self) -> &str {
        "disabled"
    }

    fn dims(&self) -> usize {
        0
    }

    async fn embed(&self, _text: &str) -> RetrievalResult<Vec<f32>> {
        Err(RetrievalError::embedding_unavailable(
            "embeddings are disabled; set [embedding].provider to use semantic search",
        ))
    }
}

// ============ OpenAI Provider ============

pub struct OpenAIEmbedder {
    client: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
    dims: usize,
}

impl OpenAIEmbedder {
    /// # Errors
    ///
    /// Fails if `model` or `dims` is missing, or if `OPENAI_API_KEY` is not
    /// set.
    pub fn new(client: reqwest::Client, config: &EmbeddingConfig) -> Result<Self> {
        let (model, dims) = required_model_and_dims(config, "OpenAI")?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string());
        Ok(Self {
            client,
            url: url.trim_end_matches('/').to_string(),
            api_key,
            model,
            dims,
        })
    }
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> RetrievalResult<Vec<f32>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": [text],
        });
        let request = self
            .client
            .post(format!("{}/embeddings", self.url))
            .bearer_auth(&self.api_key)
            .json(&body);
        let json = send_json(request, "OpenAI").await?;
        let vector = json
            .pointer("/data/0/embedding")
            .ok_or_else(|| {
                RetrievalError::embedding_unavailable("invalid OpenAI response: missing embedding")
            })
            .and_then(parse_vector)?;
        check_dims(vector, self.dims)
    }
}

// ============ Ollama Provider ============

pub struct OllamaEmbedder {
    client: reqwest::Client,
    url: String,
    model: String,
    dims: usize,
}

impl OllamaEmbedder {
    pub fn new(client: reqwest::Client, config: &EmbeddingConfig) -> Result<Self> {
        let (model, dims) = required_model_and_dims(config, "Ollama")?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434".to_string());
        Ok(Self {
            client,
            url: url.trim_end_matches('/').to_string(),
            model,
            dims,
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> RetrievalResult<Vec<f32>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": [text],
        });
        let request = self
            .client
            .post(format!("{}/api/embed", self.url))
            .json(&body);
        let json = send_json(request, "Ollama").await?;
        let vector = json
            .pointer("/embeddings/0")
            .ok_or_else(|| {
                RetrievalError::embedding_unavailable("invalid Ollama response: missing embeddings")
            })
            .and_then(parse_vector)?;
        check_dims(vector, self.dims)
    }
}

// ============ Shared helpers ============

async fn send_json(request: reqwest::RequestBuilder, provider: &str) -> RetrievalResult<Value> {
    let response = request.send().await.map_err(|e| {
        RetrievalError::embedding_unavailable(format!("{} connection error: {}", provider, e))
    })?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(RetrievalError::embedding_unavailable(format!(
            "{} API error {}: {}",
            provider, status, body
        )));
    }
    response.json().await.map_err(|e| {
        RetrievalError::embedding_unavailable(format!("invalid {} response: {}", provider, e))
    })
}

fn parse_vector(value: &Value) -> RetrievalResult<Vec<f32>> {
    let items = value
        .as_array()
        .ok_or_else(|| RetrievalError::embedding_unavailable("embedding is not an array"))?;
    items
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| RetrievalError::embedding_unavailable("embedding has non-numeric entry"))
        })
        .collect()
}

fn check_dims(vector: Vec<f32>, dims: usize) -> RetrievalResult<Vec<f32>> {
    if vector.len() != dims {
        return Err(RetrievalError::embedding_unavailable(format!(
            "provider returned {} dimensions, configured {}",
            vector.len(),
            dims
        )));
    }
    Ok(vector)
}
