//! Chunk store abstraction.
//!
//! The [`ChunkStore`] trait is the only place backend-specific query
//! construction happens. Each method corresponds to one query shape the
//! retrieval core needs; swapping the backend means implementing this trait
//! and nothing else.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.
//!
//! | Method | Query shape |
//! |--------|-------------|
//! | [`vector_search`](ChunkStore::vector_search) | k-NN over `embedding_vector` with a score floor |
//! | [`term_search`](ChunkStore::term_search) | Multi-field weighted term match with highlighting |
//! | [`pattern_search`](ChunkStore::pattern_search) | Regular expression over `content` |
//! | [`scan_file`](ChunkStore::scan_file) | Exact `file_name` lookup, first page |
//! | [`scan_next`](ChunkStore::scan_next) | Next page of a scan |
//! | [`release_scan`](ChunkStore::release_scan) | Free the scan cursor |

pub mod memory;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::{Result, RetrievalError};
use crate::models::{ChunkHit, ChunkPage, ScanCursor};

/// How query terms combine in a term search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operator {
    /// Every term must match.
    And,
    /// Any term may match.
    Or,
}

impl Operator {
    /// Lowercase form used in backend query bodies.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::And => "and",
            Operator::Or => "or",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operator::And => f.write_str("AND"),
            Operator::Or => f.write_str("OR"),
        }
    }
}

impl FromStr for Operator {
    type Err = RetrievalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "AND" => Ok(Operator::And),
            "OR" => Ok(Operator::Or),
            _ => Err(RetrievalError::invalid(
                "operator",
                format!("unknown operator '{}', expected AND or OR", s),
            )),
        }
    }
}

/// Split a field spec like `"content^2"` into its name and boost.
///
/// A bare name has boost `1.0`. Returns `None` for an empty name or a boost
/// that is not a positive finite number.
pub fn parse_field_spec(spec: &str) -> Option<(&str, f64)> {
    let (name, boost) = match spec.split_once('^') {
        Some((name, boost)) => (name.trim(), boost.trim().parse::<f64>().ok()?),
        None => (spec.trim(), 1.0),
    };
    if name.is_empty() || !boost.is_finite() || boost <= 0.0 {
        return None;
    }
    Some((name, boost))
}

/// Vector similarity request.
#[derive(Debug, Clone)]
pub struct VectorQuery<'a> {
    pub vector: &'a [f32],
    pub k: usize,
    /// Hits scoring below this are dropped by the backend.
    pub score_floor: f64,
    /// Normalized file types; empty means no filter.
    pub file_types: &'a [String],
}

/// Term match request.
#[derive(Debug, Clone)]
pub struct TermQuery<'a> {
    /// Raw space-delimited query text.
    pub query: &'a str,
    /// Field specs, optionally boosted (`"content^2"`).
    pub fields: &'a [String],
    pub operator: Operator,
    pub fuzzy: bool,
    pub top_k: usize,
}

/// Pattern match request.
#[derive(Debug, Clone)]
pub struct PatternQuery<'a> {
    pub pattern: &'a str,
    pub file_types: &'a [String],
    pub case_sensitive: bool,
    /// Maximum number of candidate chunks to return.
    pub limit: usize,
}

/// Abstract chunk store backend.
///
/// All operations are async (via `async-trait`). None of them retries;
/// connectivity failures surface as
/// [`RetrievalError::BackendUnavailable`] and refused queries as
/// [`RetrievalError::QueryRejected`].
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Dimensionality of the indexed vectors, if known.
    fn vector_dims(&self) -> Option<usize>;

    /// Nearest neighbours of `query.vector`, best first.
    async fn vector_search(&self, query: &VectorQuery<'_>) -> Result<Vec<ChunkHit>>;

    /// Scored term matches with highlight fragments, best first.
    async fn term_search(&self, query: &TermQuery<'_>) -> Result<Vec<ChunkHit>>;

    /// Chunks whose content matches `query.pattern`.
    async fn pattern_search(&self, query: &PatternQuery<'_>) -> Result<Vec<ChunkHit>>;

    /// Start a scan over every chunk of `file_name`.
    async fn scan_file(&self, file_name: &str, page_size: usize) -> Result<ChunkPage>;

    /// Fetch the page after `cursor`.
    async fn scan_next(&self, cursor: &ScanCursor) -> Result<ChunkPage>;

    /// Release server-side state held by `cursor`.
    async fn release_scan(&self, cursor: &ScanCursor) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operator_parses_case_insensitively() {
        assert_eq!("and".parse::<Operator>().unwrap(), Operator::And);
        assert_eq!(" OR ".parse::<Operator>().unwrap(), Operator::Or);
        let err = "XOR".parse::<Operator>().unwrap_err();
        assert!(err.to_string().contains("`operator`"));
    }

    #[test]
    fn field_spec_boosts() {
        assert_eq!(parse_field_spec("content"), Some(("content", 1.0)));
        assert_eq!(parse_field_spec("file_name^2.5"), Some(("file_name", 2.5)));
        assert_eq!(parse_field_spec("content^abc"), None);
        assert_eq!(parse_field_spec("^2"), None);
        assert_eq!(parse_field_spec("content^0"), None);
    }
}
