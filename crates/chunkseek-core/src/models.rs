//! Core data models for the chunk store.
//!
//! A [`Chunk`] is the atomic indexed unit: one slice of a logical file.
//! Many chunks share a `file_name`; their `chunk_id` values define the
//! order in which the file is read back.

use serde::{Deserialize, Serialize};

/// A stored slice of a larger document.
///
/// Field names match the document shape in the chunk index, so a backend
/// hit's `_source` deserializes directly into this type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Logical document this chunk belongs to.
    pub file_name: String,
    /// Ordinal within the file. Defines reconstruction order.
    pub chunk_id: i64,
    /// Text payload of this slice.
    pub content: String,
    /// Absolute character offset where this chunk starts in the original file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_start: Option<usize>,
    /// Absolute character offset (exclusive) where this chunk ends.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_end: Option<usize>,
    /// Embedding vector produced upstream. Opaque to the core.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_vector: Option<Vec<f32>>,
    /// Upstream metadata (extension, size, processing timestamp, ...).
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Chunk {
    /// Create a chunk with no position data, vector, or metadata.
    pub fn new(file_name: impl Into<String>, chunk_id: i64, content: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            chunk_id,
            content: content.into(),
            chunk_start: None,
            chunk_end: None,
            embedding_vector: None,
            metadata: serde_json::Map::new(),
        }
    }

    /// Attach absolute `[start, end)` character offsets.
    pub fn with_span(mut self, start: usize, end: usize) -> Self {
        self.chunk_start = Some(start);
        self.chunk_end = Some(end);
        self
    }

    /// Attach an embedding vector.
    pub fn with_vector(mut self, vector: Vec<f32>) -> Self {
        self.embedding_vector = Some(vector);
        self
    }

    /// Insert one metadata entry.
    pub fn with_metadata(mut self, key: &str, value: serde_json::Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }

    /// Both offsets, if present.
    pub fn span(&self) -> Option<(usize, usize)> {
        match (self.chunk_start, self.chunk_end) {
            (Some(start), Some(end)) => Some((start, end)),
            _ => None,
        }
    }

    /// File type used by file-type filters.
    ///
    /// Reads `metadata.file_type`, then `metadata.extension`, then falls back
    /// to the extension of `file_name`. Always normalized by
    /// [`normalize_file_type`].
    pub fn file_type(&self) -> Option<String> {
        ["file_type", "extension"]
            .iter()
            .find_map(|key| self.metadata.get(*key).and_then(|v| v.as_str()))
            .map(normalize_file_type)
            .or_else(|| {
                self.file_name
                    .rsplit(|c| c == '/' || c == '\\')
                    .next()
                    .and_then(|base| base.rsplit_once('.'))
                    .map(|(_, ext)| normalize_file_type(ext))
            })
            .filter(|t| !t.is_empty())
    }
}

/// Lowercase and strip a leading dot: `".RS"` → `"rs"`.
pub fn normalize_file_type(raw: &str) -> String {
    raw.trim().trim_start_matches('.').to_lowercase()
}

/// A raw hit returned by a [`ChunkStore`](crate::store::ChunkStore) query.
#[derive(Debug, Clone)]
pub struct ChunkHit {
    /// The matching chunk record.
    pub chunk: Chunk,
    /// Backend relevance score (cosine-derived for k-NN, BM25 for terms).
    pub score: f64,
    /// Backend highlight fragments, if the query requested them.
    pub highlights: Vec<String>,
}

/// Opaque pagination handle for a filename scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanCursor(pub String);

/// One page of a filename scan.
#[derive(Debug, Clone)]
pub struct ChunkPage {
    pub chunks: Vec<Chunk>,
    /// Cursor to continue from, and to release once the scan is over.
    pub cursor: Option<ScanCursor>,
    /// Whether another page may follow.
    pub has_more: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn file_type_prefers_metadata() {
        let chunk = Chunk::new("notes.txt", 0, "x").with_metadata("file_type", json!(".MD"));
        assert_eq!(chunk.file_type().as_deref(), Some("md"));
    }

    #[test]
    fn file_type_falls_back_to_extension() {
        let chunk = Chunk::new("src/lib.RS", 0, "x");
        assert_eq!(chunk.file_type().as_deref(), Some("rs"));
        assert_eq!(Chunk::new("Makefile", 0, "x").file_type(), None);
        assert_eq!(Chunk::new("build.d/Makefile", 0, "x").file_type(), None);
    }

    #[test]
    fn deserializes_index_source() {
        let chunk: Chunk = serde_json::from_value(json!({
            "file_name": "a.py",
            "chunk_id": 3,
            "content": "def f(): pass",
            "chunk_start": 10,
            "chunk_end": 23,
            "metadata": { "file_size": 512 }
        }))
        .unwrap();
        assert_eq!(chunk.span(), Some((10, 23)));
        assert_eq!(chunk.metadata["file_size"], json!(512));
        assert!(chunk.embedding_vector.is_none());
    }
}
