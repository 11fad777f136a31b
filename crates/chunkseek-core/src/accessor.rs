//! Chunk store accessor.
//!
//! [`ChunkStoreAccessor`] is the thin query-issuing layer the retrieval
//! operations talk to. It exposes the four logical request shapes, checks
//! what must be checked before a request leaves the process (regex syntax,
//! empty file names), and hides scan pagination entirely: callers of
//! [`find_all_chunks_for_file`](ChunkStoreAccessor::find_all_chunks_for_file)
//! get one `Vec` and never see a cursor.
//!
//! The accessor holds no state between calls. Scan cursors live only for the
//! duration of one fetch and are released on every exit path.

use regex::{Regex, RegexBuilder};
use tracing::{debug, warn};

use crate::cancel::CancellationToken;
use crate::error::{Result, RetrievalError};
use crate::models::{Chunk, ChunkHit, ChunkPage, ScanCursor};
use crate::store::{ChunkStore, Operator, PatternQuery, TermQuery, VectorQuery};

/// Default number of chunks requested per scan page.
pub const DEFAULT_PAGE_SIZE: usize = 500;

/// Compile `pattern` with the requested case sensitivity.
///
/// Used both to validate a pattern before it is sent to the backend and to
/// re-scan candidate chunks locally, so both passes apply the same regex.
pub fn compile_pattern(pattern: &str, case_sensitive: bool) -> Result<Regex> {
    Ok(RegexBuilder::new(pattern)
        .case_insensitive(!case_sensitive)
        .build()?)
}

/// Query-issuing layer over a [`ChunkStore`].
pub struct ChunkStoreAccessor<'a, S: ChunkStore + ?Sized> {
    store: &'a S,
    page_size: usize,
}

impl<'a, S: ChunkStore + ?Sized> ChunkStoreAccessor<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Override the scan page size (minimum 1).
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn store(&self) -> &S {
        self.store
    }

    /// Dimensionality of the indexed vectors, if the backend reports it.
    pub fn vector_dims(&self) -> Option<usize> {
        self.store.vector_dims()
    }

    /// k-NN search: up to `k` hits scoring at least `score_floor`, best first.
    pub async fn find_by_vector_similarity(
        &self,
        vector: &[f32],
        k: usize,
        score_floor: f64,
        file_types: &[String],
    ) -> Result<Vec<ChunkHit>> {
        debug!(k, score_floor, dims = vector.len(), "vector similarity query");
        self.store
            .vector_search(&VectorQuery {
                vector,
                k,
                score_floor,
                file_types,
            })
            .await
    }

    /// Term search over `fields` combining terms with `operator`.
    pub async fn find_by_terms(
        &self,
        query: &str,
        fields: &[String],
        operator: Operator,
        fuzzy: bool,
        top_k: usize,
    ) -> Result<Vec<ChunkHit>> {
        debug!(%operator, fuzzy, top_k, "term query");
        self.store
            .term_search(&TermQuery {
                query,
                fields,
                operator,
                fuzzy,
                top_k,
            })
            .await
    }

    /// Chunks containing at least one match of `pattern`.
    ///
    /// Fails with [`RetrievalError::InvalidPattern`] before any backend call
    /// if the pattern does not compile.
    pub async fn find_by_pattern(
        &self,
        pattern: &str,
        file_types: &[String],
        case_sensitive: bool,
        limit: usize,
    ) -> Result<Vec<ChunkHit>> {
        compile_pattern(pattern, case_sensitive)?;
        debug!(pattern, case_sensitive, limit, "pattern query");
        self.store
            .pattern_search(&PatternQuery {
                pattern,
                file_types,
                case_sensitive,
                limit,
            })
            .await
    }

    /// Every chunk of `file_name`, in the order the backend delivered them.
    ///
    /// Pages through the backend until exhausted. The scan cursor is released
    /// whether the fetch succeeds, fails, or is cancelled; a failed release is
    /// logged, not returned, since the cursor also expires server-side.
    /// Cancellation is checked between pages and yields
    /// [`RetrievalError::Cancelled`] with no partial result.
    pub async fn find_all_chunks_for_file(
        &self,
        file_name: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<Chunk>> {
        if file_name.trim().is_empty() {
            return Err(RetrievalError::invalid("file_name", "must not be empty"));
        }
        if cancel.is_cancelled() {
            return Err(RetrievalError::Cancelled);
        }

        let first = self.store.scan_file(file_name, self.page_size).await?;
        let mut cursor: Option<ScanCursor> = None;
        let result = self.drain_scan(first, &mut cursor, cancel).await;

        if let Some(cursor) = cursor {
            if let Err(e) = self.store.release_scan(&cursor).await {
                warn!(file_name, error = %e, "failed to release scan cursor");
            }
        }

        match &result {
            Ok(chunks) => debug!(file_name, chunks = chunks.len(), "file scan complete"),
            Err(e) => debug!(file_name, error = %e, "file scan aborted"),
        }
        result
    }

    async fn drain_scan(
        &self,
        mut page: ChunkPage,
        cursor: &mut Option<ScanCursor>,
        cancel: &CancellationToken,
    ) -> Result<Vec<Chunk>> {
        let mut chunks = Vec::new();
        loop {
            if let Some(next) = page.cursor.take() {
                *cursor = Some(next);
            }
            chunks.extend(page.chunks);
            if !page.has_more {
                return Ok(chunks);
            }
            if cancel.is_cancelled() {
                return Err(RetrievalError::Cancelled);
            }
            let Some(current) = cursor.as_ref() else {
                warn!("backend reported more pages without a cursor; stopping scan");
                return Ok(chunks);
            };
            page = self.store.scan_next(current).await?;
        }
    }
}
