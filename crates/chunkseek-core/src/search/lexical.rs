use super::{check_top_k, require_non_empty, DEFAULT_MAX_TOP_K, DEFAULT_TOP_K};
use crate::accessor::ChunkStoreAccessor;
use crate::error::{Result, RetrievalError};
use crate::format::LexicalSearchResponse;
use crate::store::{parse_field_spec, ChunkStore, Operator};

/// Fields searched when the caller names none.
pub const DEFAULT_LEXICAL_FIELDS: [&str; 2] = ["content^2", "file_name"];

/// Parameters for [`lexical_search`].
#[derive(Debug, Clone)]
pub struct LexicalParams {
    /// Space-delimited terms.
    pub query: String,
    /// Field specs, optionally boosted: `"content^2"`.
    pub fields: Vec<String>,
    pub operator: Operator,
    pub top_k: i64,
    pub fuzzy: bool,
    pub max_top_k: usize,
}

impl LexicalParams {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            fields: DEFAULT_LEXICAL_FIELDS.iter().map(|f| f.to_string()).collect(),
            operator: Operator::Or,
            top_k: DEFAULT_TOP_K,
            fuzzy: false,
            max_top_k: DEFAULT_MAX_TOP_K,
        }
    }

    fn validate(&self) -> Result<usize> {
        require_non_empty("query", &self.query)?;
        if self.fields.is_empty() {
            return Err(RetrievalError::invalid("fields", "must name at least one field"));
        }
        if let Some(bad) = self.fields.iter().find(|f| parse_field_spec(f).is_none()) {
            return Err(RetrievalError::invalid(
                "fields",
                format!("malformed field spec '{}', expected name or name^boost", bad),
            ));
        }
        check_top_k(self.top_k, self.max_top_k)
    }
}

/// Term search. Matching, scoring, and highlighting are the backend's; the
/// raw query is split on whitespace only to echo `query_terms`.
pub async fn lexical_search<S: ChunkStore + ?Sized>(
    accessor: &ChunkStoreAccessor<'_, S>,
    params: &LexicalParams,
) -> Result<LexicalSearchResponse> {
    let top_k = params.validate()?;
    let hits = accessor
        .find_by_terms(
            &params.query,
            &params.fields,
            params.operator,
            params.fuzzy,
            top_k,
        )
        .await?;
    Ok(LexicalSearchResponse::new(
        &params.query,
        params.fields.clone(),
        params.operator,
        params.fuzzy,
        hits,
    ))
}
