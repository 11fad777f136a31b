//! Retrieval operations.
//!
//! Four request-scoped operations, each taking a typed parameter struct that
//! is validated before anything leaves the process:
//!
//! | Operation | Parameters | Envelope |
//! |-----------|------------|----------|
//! | [`semantic_search`] | [`SemanticParams`] | `SemanticSearchResponse` |
//! | [`lexical_search`] | [`LexicalParams`] | `LexicalSearchResponse` |
//! | [`regex_search`] | [`RegexParams`] | `RegexSearchResponse` |
//! | [`get_content`] | [`ContentParams`] | `ContentResponse` |
//!
//! Ranking always comes from the backend. The operations never re-rank,
//! never re-filter on score, and never cache.

mod content;
mod lexical;
mod pattern;
mod semantic;

pub use content::{get_content, ContentParams};
pub use lexical::{lexical_search, LexicalParams, DEFAULT_LEXICAL_FIELDS};
pub use pattern::{regex_search, scan_chunk_lines, RegexParams};
pub use semantic::{semantic_search, SemanticParams};

use crate::error::{Result, RetrievalError};
use crate::models::normalize_file_type;

pub const DEFAULT_TOP_K: i64 = 10;
pub const DEFAULT_MAX_TOP_K: usize = 100;

fn require_non_empty(param: &'static str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(RetrievalError::invalid(param, "must not be empty"));
    }
    Ok(())
}

fn check_top_k(top_k: i64, max_top_k: usize) -> Result<usize> {
    match usize::try_from(top_k) {
        Ok(k) if (1..=max_top_k).contains(&k) => Ok(k),
        _ => Err(RetrievalError::invalid(
            "top_k",
            format!("must be between 1 and {}, got {}", max_top_k, top_k),
        )),
    }
}

/// Lowercase, strip leading dots, and reject empty entries.
fn normalize_file_types(file_types: &[String]) -> Result<Vec<String>> {
    let mut normalized = Vec::with_capacity(file_types.len());
    for raw in file_types {
        let t = normalize_file_type(raw);
        if t.is_empty() {
            return Err(RetrievalError::invalid(
                "file_types",
                "entries must not be empty",
            ));
        }
        if !normalized.contains(&t) {
            normalized.push(t);
        }
    }
    Ok(normalized)
}
