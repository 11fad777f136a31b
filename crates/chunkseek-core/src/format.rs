//! Response envelopes.
//!
//! One envelope per retrieval operation. Each echoes the request, carries a
//! total, and lists per-hit records in the order the operation produced
//! them. Nothing here filters or re-ranks; these are shape transformations
//! from [`ChunkHit`]s and reconstructions into serializable output.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::models::ChunkHit;
use crate::reconstruct::{AmbiguousBoundary, Reconstruction, ReconstructionMethod};
use crate::store::Operator;

/// Characters of chunk content included as a hit snippet.
pub const SNIPPET_CHARS: usize = 240;

/// First [`SNIPPET_CHARS`] characters of `content`.
pub fn snippet(content: &str) -> String {
    content.chars().take(SNIPPET_CHARS).collect()
}

/// One semantic search hit.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub file_name: String,
    pub chunk_id: i64,
    pub score: f64,
    pub snippet: String,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl From<ChunkHit> for SearchHit {
    fn from(hit: ChunkHit) -> Self {
        Self {
            snippet: snippet(&hit.chunk.content),
            file_name: hit.chunk.file_name,
            chunk_id: hit.chunk.chunk_id,
            score: hit.score,
            metadata: hit.chunk.metadata,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SemanticSearchResponse {
    pub query: String,
    pub top_k: usize,
    pub min_score: f64,
    pub file_types: Vec<String>,
    pub total: usize,
    pub results: Vec<SearchHit>,
}

impl SemanticSearchResponse {
    pub fn new(
        query: &str,
        top_k: usize,
        min_score: f64,
        file_types: Vec<String>,
        hits: Vec<ChunkHit>,
    ) -> Self {
        let results: Vec<SearchHit> = hits.into_iter().map(SearchHit::from).collect();
        Self {
            query: query.to_string(),
            top_k,
            min_score,
            file_types,
            total: results.len(),
            results,
        }
    }
}

/// One lexical search hit, with backend highlight fragments as returned.
#[derive(Debug, Clone, Serialize)]
pub struct LexicalHit {
    pub file_name: String,
    pub chunk_id: i64,
    pub score: f64,
    pub highlights: Vec<String>,
    pub snippet: String,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl From<ChunkHit> for LexicalHit {
    fn from(hit: ChunkHit) -> Self {
        Self {
            snippet: snippet(&hit.chunk.content),
            file_name: hit.chunk.file_name,
            chunk_id: hit.chunk.chunk_id,
            score: hit.score,
            highlights: hit.highlights,
            metadata: hit.chunk.metadata,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LexicalSearchResponse {
    pub query: String,
    pub query_terms: Vec<String>,
    pub fields: Vec<String>,
    pub operator: Operator,
    pub fuzzy: bool,
    pub total: usize,
    pub results: Vec<LexicalHit>,
}

impl LexicalSearchResponse {
    pub fn new(
        query: &str,
        fields: Vec<String>,
        operator: Operator,
        fuzzy: bool,
        hits: Vec<ChunkHit>,
    ) -> Self {
        let results: Vec<LexicalHit> = hits.into_iter().map(LexicalHit::from).collect();
        Self {
            query: query.to_string(),
            query_terms: query.split_whitespace().map(str::to_string).collect(),
            fields,
            operator,
            fuzzy,
            total: results.len(),
            results,
        }
    }
}

/// One matching line inside a chunk.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineMatch {
    pub chunk_id: i64,
    /// 1-based, relative to the start of the chunk.
    pub line_number: usize,
    pub matched_text: String,
    pub line: String,
    pub context_before: Vec<String>,
    pub context_after: Vec<String>,
}

/// All matches found in one file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileMatches {
    pub file_name: String,
    pub match_count: usize,
    /// Scanning stopped at the per-file match cap.
    pub truncated: bool,
    pub matches: Vec<LineMatch>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegexSearchResponse {
    pub pattern: String,
    pub case_sensitive: bool,
    pub file_types: Vec<String>,
    pub total_matches: usize,
    pub files_matched: usize,
    pub results: Vec<FileMatches>,
}

impl RegexSearchResponse {
    pub fn new(
        pattern: &str,
        case_sensitive: bool,
        file_types: Vec<String>,
        results: Vec<FileMatches>,
    ) -> Self {
        Self {
            pattern: pattern.to_string(),
            case_sensitive,
            file_types,
            total_matches: results.iter().map(|f| f.match_count).sum(),
            files_matched: results.len(),
            results,
        }
    }
}

/// A reconstructed file.
#[derive(Debug, Clone, Serialize)]
pub struct ContentResponse {
    pub file_name: String,
    pub content: String,
    pub chunk_count: usize,
    pub total_chars: usize,
    pub method: ReconstructionMethod,
    /// Some adjacent chunks were joined without a detected overlap; the
    /// content may repeat text at those boundaries.
    pub reconstruction_ambiguous: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ambiguous_boundaries: Vec<AmbiguousBoundary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

impl ContentResponse {
    pub fn new(
        file_name: &str,
        reconstruction: Reconstruction,
        metadata: Option<Map<String, Value>>,
    ) -> Self {
        Self {
            file_name: file_name.to_string(),
            total_chars: reconstruction.content.chars().count(),
            reconstruction_ambiguous: reconstruction.is_ambiguous(),
            content: reconstruction.content,
            chunk_count: reconstruction.chunk_count,
            method: reconstruction.method,
            ambiguous_boundaries: reconstruction.ambiguous_boundaries,
            metadata,
        }
    }
}
