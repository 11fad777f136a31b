//! Composition root.
//!
//! [`Services`] owns the configured chunk store and embedder and exposes
//! the four retrieval operations with configuration defaults applied. The
//! CLI, the tool registry, and the HTTP server all go through it.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use chunkseek_core::accessor::ChunkStoreAccessor;
use chunkseek_core::cancel::CancellationToken;
use chunkseek_core::embedding::{validate_dimensions, Embedder};
use chunkseek_core::error::Result as RetrievalResult;
use chunkseek_core::format::{
    ContentResponse, LexicalSearchResponse, RegexSearchResponse, SemanticSearchResponse,
};
use chunkseek_core::search::{
    self, ContentParams, LexicalParams, RegexParams, SemanticParams,
};
use chunkseek_core::store::ChunkStore;

use crate::config::Config;
use crate::embedding::create_embedder;
use crate::opensearch::OpenSearchStore;

pub struct Services {
    config: Arc<Config>,
    store: Arc<dyn ChunkStore>,
    embedder: Arc<dyn Embedder>,
}

impl Services {
    /// Build the OpenSearch store and the configured embedder over one
    /// shared HTTP client.
    pub fn from_config(config: Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.store.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;
        let store: Arc<dyn ChunkStore> =
            Arc::new(OpenSearchStore::new(client.clone(), &config.store));

        let embedding_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.embedding.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;
        let embedder = create_embedder(embedding_client, &config.embedding)?;

        Self::new(config, store, embedder)
    }

    /// Assemble from explicit parts.
    ///
    /// Fails if embeddings are enabled and the embedder's dimensionality
    /// disagrees with the index.
    pub fn new(
        config: Config,
        store: Arc<dyn ChunkStore>,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self> {
        if config.embedding.is_enabled() {
            validate_dimensions(embedder.dims(), store.vector_dims())?;
        }
        Ok(Self {
            config: Arc::new(config),
            store,
            embedder,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn accessor(&self) -> ChunkStoreAccessor<'_, dyn ChunkStore> {
        ChunkStoreAccessor::new(self.store.as_ref()).with_page_size(self.config.store.page_size)
    }

    /// Semantic parameters with `[retrieval]` defaults.
    pub fn semantic_params(&self, query: &str) -> SemanticParams {
        let retrieval = &self.config.retrieval;
        SemanticParams {
            top_k: retrieval.default_top_k,
            min_score: retrieval.default_min_score,
            max_top_k: retrieval.max_top_k,
            ..SemanticParams::new(query)
        }
    }

    /// Lexical parameters with `[retrieval]` defaults.
    pub fn lexical_params(&self, query: &str) -> LexicalParams {
        let retrieval = &self.config.retrieval;
        LexicalParams {
            fields: retrieval.lexical_fields.clone(),
            operator: retrieval.operator(),
            top_k: retrieval.default_top_k,
            max_top_k: retrieval.max_top_k,
            ..LexicalParams::new(query)
        }
    }

    /// Regex parameters with `[retrieval]` defaults.
    pub fn regex_params(&self, pattern: &str) -> RegexParams {
        let retrieval = &self.config.retrieval;
        RegexParams {
            max_matches_per_file: retrieval.max_matches_per_file,
            context_lines: retrieval.context_lines,
            candidate_limit: retrieval.regex_candidate_limit,
            ..RegexParams::new(pattern)
        }
    }

    pub async fn semantic(&self, params: &SemanticParams) -> RetrievalResult<SemanticSearchResponse> {
        search::semantic_search(&self.accessor(), self.embedder.as_ref(), params).await
    }

    pub async fn lexical(&self, params: &LexicalParams) -> RetrievalResult<LexicalSearchResponse> {
        search::lexical_search(&self.accessor(), params).await
    }

    pub async fn regex(&self, params: &RegexParams) -> RetrievalResult<RegexSearchResponse> {
        search::regex_search(&self.accessor(), params).await
    }

    /// Reconstruct one file, cancelled once `retrieval.content_timeout_secs`
    /// elapses. The scroll is released either way.
    pub async fn content(&self, params: &ContentParams) -> RetrievalResult<ContentResponse> {
        let cancel = CancellationToken::new();
        let deadline = match self.config.retrieval.content_timeout_secs {
            0 => None,
            secs => {
                let token = cancel.clone();
                Some(tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_secs(secs)).await;
                    token.cancel();
                }))
            }
        };

        let result = search::get_content(
            &self.accessor(),
            params,
            &self.config.reconstruction,
            &cancel,
        )
        .await;

        if let Some(handle) = deadline {
            handle.abort();
        }
        result
    }
}
