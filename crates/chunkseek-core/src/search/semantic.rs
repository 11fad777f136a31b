use tracing::debug;

use super::{check_top_k, normalize_file_types, require_non_empty, DEFAULT_MAX_TOP_K, DEFAULT_TOP_K};
use crate::accessor::ChunkStoreAccessor;
use crate::embedding::Embedder;
use crate::error::{Result, RetrievalError};
use crate::format::SemanticSearchResponse;
use crate::store::ChunkStore;

/// Parameters for [`semantic_search`].
#[derive(Debug, Clone)]
pub struct SemanticParams {
    pub query: String,
    /// Signed so that out-of-range caller input is reported, not wrapped.
    pub top_k: i64,
    /// Backend score floor in `[0, 1]`.
    pub min_score: f64,
    pub file_types: Vec<String>,
    pub max_top_k: usize,
}

impl SemanticParams {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            top_k: DEFAULT_TOP_K,
            min_score: 0.0,
            file_types: Vec::new(),
            max_top_k: DEFAULT_MAX_TOP_K,
        }
    }

    /// Validated `top_k` and normalized file types.
    fn validate(&self) -> Result<(usize, Vec<String>)> {
        require_non_empty("query", &self.query)?;
        let top_k = check_top_k(self.top_k, self.max_top_k)?;
        if !self.min_score.is_finite() || !(0.0..=1.0).contains(&self.min_score) {
            return Err(RetrievalError::invalid(
                "min_score",
                format!("must be within [0, 1], got {}", self.min_score),
            ));
        }
        let file_types = normalize_file_types(&self.file_types)?;
        Ok((top_k, file_types))
    }
}

/// Embed the query and return its nearest chunks, in backend order.
///
/// `min_score` is enforced by the backend; results are not re-filtered here.
pub async fn semantic_search<S, E>(
    accessor: &ChunkStoreAccessor<'_, S>,
    embedder: &E,
    params: &SemanticParams,
) -> Result<SemanticSearchResponse>
where
    S: ChunkStore + ?Sized,
    E: Embedder + ?Sized,
{
    let (top_k, file_types) = params.validate()?;

    let vector = embedder.embed(&params.query).await?;
    if let Some(store_dims) = accessor.vector_dims() {
        if vector.len() != store_dims {
            return Err(RetrievalError::DimensionMismatch {
                embedder: vector.len(),
                store: store_dims,
            });
        }
    }

    let hits = accessor
        .find_by_vector_similarity(&vector, top_k, params.min_score, &file_types)
        .await?;
    debug!(
        model = embedder.model_name(),
        hits = hits.len(),
        "semantic search complete"
    );

    Ok(SemanticSearchResponse::new(
        &params.query,
        top_k,
        params.min_score,
        file_types,
        hits,
    ))
}
