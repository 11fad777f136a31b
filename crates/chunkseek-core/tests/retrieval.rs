//! Retrieval and reconstruction behaviour over the in-memory store.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chunkseek_core::accessor::ChunkStoreAccessor;
use chunkseek_core::cancel::CancellationToken;
use chunkseek_core::embedding::Embedder;
use chunkseek_core::error::{Result, RetrievalError};
use chunkseek_core::models::{Chunk, ChunkHit, ChunkPage, ScanCursor};
use chunkseek_core::reconstruct::{reconstruct, ReconstructConfig, ReconstructionMethod};
use chunkseek_core::search::{
    get_content, lexical_search, regex_search, semantic_search, ContentParams, LexicalParams,
    RegexParams, SemanticParams,
};
use chunkseek_core::store::memory::InMemoryChunkStore;
use chunkseek_core::store::{ChunkStore, Operator, PatternQuery, TermQuery, VectorQuery};
use chunkseek_core::ErrorKind;
use serde_json::json;

// ═══════════════════════════════════════════════════════════════════════
// Helpers
// ═══════════════════════════════════════════════════════════════════════

/// Maps a query to one of three axis-aligned vectors by keyword.
struct KeywordEmbedder {
    calls: AtomicUsize,
}

impl KeywordEmbedder {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for KeywordEmbedder {
    fn model_name(&self) -> &str {
        "keyword-test"
    }

    fn dims(&self) -> usize {
        3
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(if text.contains("auth") {
            vec![1.0, 0.0, 0.0]
        } else if text.contains("cache") {
            vec![0.0, 1.0, 0.0]
        } else {
            vec![0.0, 0.0, 1.0]
        })
    }
}

struct DownEmbedder;

#[async_trait]
impl Embedder for DownEmbedder {
    fn model_name(&self) -> &str {
        "down"
    }

    fn dims(&self) -> usize {
        3
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(RetrievalError::embedding_unavailable("connection refused"))
    }
}

/// Delegates to an in-memory store, failing `scan_next` or cancelling a
/// token after the first page.
struct ScanHook<'a> {
    inner: &'a InMemoryChunkStore,
    fail_next_page: bool,
    cancel_after_first: Option<CancellationToken>,
}

#[async_trait]
impl ChunkStore for ScanHook<'_> {
    fn vector_dims(&self) -> Option<usize> {
        self.inner.vector_dims()
    }

    async fn vector_search(&self, query: &VectorQuery<'_>) -> Result<Vec<ChunkHit>> {
        self.inner.vector_search(query).await
    }

    async fn term_search(&self, query: &TermQuery<'_>) -> Result<Vec<ChunkHit>> {
        self.inner.term_search(query).await
    }

    async fn pattern_search(&self, query: &PatternQuery<'_>) -> Result<Vec<ChunkHit>> {
        self.inner.pattern_search(query).await
    }

    async fn scan_file(&self, file_name: &str, page_size: usize) -> Result<ChunkPage> {
        let page = self.inner.scan_file(file_name, page_size).await?;
        if let Some(token) = &self.cancel_after_first {
            token.cancel();
        }
        Ok(page)
    }

    async fn scan_next(&self, cursor: &ScanCursor) -> Result<ChunkPage> {
        if self.fail_next_page {
            return Err(RetrievalError::store_unavailable("connection reset"));
        }
        self.inner.scan_next(cursor).await
    }

    async fn release_scan(&self, cursor: &ScanCursor) -> Result<()> {
        self.inner.release_scan(cursor).await
    }
}

fn cfg() -> ReconstructConfig {
    ReconstructConfig::default()
}

const TEXT: &str = "The quick brown fox jumps over the lazy dog. \
Pack my box with five dozen liquor jugs. How vexingly quick daft zebras jump!";

/// Cut `text` into windows of `size` chars advancing by `stride`.
fn windows(text: &str, size: usize, stride: usize) -> Vec<(usize, usize, String)> {
    let chars: Vec<char> = text.chars().collect();
    let mut out = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let end = (start + size).min(chars.len());
        out.push((start, end, chars[start..end].iter().collect()));
        if end == chars.len() {
            break;
        }
        start += stride;
    }
    out
}

fn positional_chunks(text: &str, size: usize, stride: usize) -> Vec<Chunk> {
    windows(text, size, stride)
        .into_iter()
        .enumerate()
        .map(|(i, (s, e, content))| Chunk::new("doc.txt", i as i64, content).with_span(s, e))
        .collect()
}

fn end_to_end_chunks() -> Vec<Chunk> {
    vec![
        Chunk::new("guide.md", 2, "jumps. End of section."),
        Chunk::new("guide.md", 0, "Section 1 intro. The "),
        Chunk::new("guide.md", 1, "The quick brown fox jumps."),
    ]
}

// ═══════════════════════════════════════════════════════════════════════
// Reconstruction properties
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn reconstruction_is_idempotent() {
    let chunks = end_to_end_chunks();
    let first = reconstruct(&chunks, &cfg());
    let second = reconstruct(&chunks, &cfg());
    assert_eq!(first, second);
}

#[test]
fn reconstruction_ignores_input_order() {
    let mut chunks = end_to_end_chunks();
    let expected = reconstruct(&chunks, &cfg()).content;
    for _ in 0..chunks.len() {
        chunks.rotate_left(1);
        assert_eq!(reconstruct(&chunks, &cfg()).content, expected);
    }
    chunks.reverse();
    assert_eq!(reconstruct(&chunks, &cfg()).content, expected);

    let mut positional = positional_chunks(TEXT, 30, 20);
    positional.reverse();
    assert_eq!(reconstruct(&positional, &cfg()).content, TEXT);
}

#[test]
fn positional_reconstruction_is_exact() {
    for (size, stride) in [(30, 20), (25, 25), (40, 10)] {
        let chunks = positional_chunks(TEXT, size, stride);
        let doc = reconstruct(&chunks, &cfg());
        assert_eq!(doc.method, ReconstructionMethod::Positional);
        assert_eq!(doc.content, TEXT, "size={} stride={}", size, stride);
        assert!(!doc.is_ambiguous());
    }
}

#[test]
fn positional_first_writer_wins() {
    let chunks = vec![
        Chunk::new("f", 1, "XXabc").with_span(3, 8),
        Chunk::new("f", 0, "hello").with_span(0, 5),
    ];
    assert_eq!(reconstruct(&chunks, &cfg()).content, "helloabc");
}

#[test]
fn overlap_is_collapsed_once() {
    let doc = reconstruct(
        &[
            Chunk::new("f", 0, "the quick brown fox"),
            Chunk::new("f", 1, "brown fox jumps over"),
        ],
        &cfg(),
    );
    assert_eq!(doc.content, "the quick brown fox jumps over");
    assert_eq!(doc.method, ReconstructionMethod::Overlap);
    assert!(!doc.is_ambiguous());
}

#[test]
fn long_overlaps_without_positions() {
    let chunks: Vec<Chunk> = windows(&TEXT.repeat(3), 120, 60)
        .into_iter()
        .enumerate()
        .map(|(i, (_, _, content))| Chunk::new("f", i as i64, content))
        .collect();
    let strict = ReconstructConfig {
        allow_short_overlaps: false,
        ..cfg()
    };
    let doc = reconstruct(&chunks, &strict);
    assert_eq!(doc.content, TEXT.repeat(3));
    assert!(!doc.is_ambiguous());
}

#[test]
fn overlap_tolerates_whitespace_differences() {
    let doc = reconstruct(
        &[
            Chunk::new("f", 0, "the quick brown  fox"),
            Chunk::new("f", 1, "brown fox jumps over"),
        ],
        &cfg(),
    );
    assert_eq!(doc.content, "the quick brown  fox jumps over");
    assert!(!doc.is_ambiguous());
}

#[test]
fn no_overlap_appends_with_separator() {
    let doc = reconstruct(
        &[Chunk::new("f", 0, "alpha"), Chunk::new("f", 1, "omega")],
        &cfg(),
    );
    assert_eq!(doc.content, "alpha\nomega");
    assert!(doc.is_ambiguous());
    assert_eq!(doc.ambiguous_boundaries[0].previous_chunk_id, 0);
    assert_eq!(doc.ambiguous_boundaries[0].next_chunk_id, 1);

    let doc = reconstruct(
        &[Chunk::new("f", 0, "line one\n"), Chunk::new("f", 1, "zzz")],
        &cfg(),
    );
    assert_eq!(doc.content, "line one\nzzz");
}

#[test]
fn single_and_empty_inputs() {
    let doc = reconstruct(&[Chunk::new("f", 9, " raw\ttext \n")], &cfg());
    assert_eq!(doc.content, " raw\ttext \n");
    assert_eq!(reconstruct(&[], &cfg()).content, "");
}

#[test]
fn three_chunk_scenario() {
    let doc = reconstruct(&end_to_end_chunks(), &cfg());
    assert_eq!(
        doc.content,
        "Section 1 intro. The quick brown fox jumps. End of section."
    );
    assert_eq!(doc.chunk_count, 3);
}

// ═══════════════════════════════════════════════════════════════════════
// Content retrieval
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn get_content_end_to_end() {
    let store = InMemoryChunkStore::new();
    store.extend(
        end_to_end_chunks()
            .into_iter()
            .map(|c| c.with_metadata("file_type", json!("md"))),
    );
    store.insert(Chunk::new("other.md", 0, "unrelated"));

    let mut params = ContentParams::new("guide.md");
    params.include_metadata = true;
    let resp = get_content(
        &ChunkStoreAccessor::new(&store).with_page_size(1),
        &params,
        &cfg(),
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(
        resp.content,
        "Section 1 intro. The quick brown fox jumps. End of section."
    );
    assert_eq!(resp.chunk_count, 3);
    assert_eq!(resp.total_chars, resp.content.chars().count());
    assert!(!resp.reconstruction_ambiguous);
    assert_eq!(resp.metadata.unwrap()["file_type"], json!("md"));
    assert_eq!(store.open_scans(), 0);
}

#[tokio::test]
async fn get_content_missing_file_is_not_found() {
    let store = InMemoryChunkStore::new();
    store.extend(end_to_end_chunks());
    let err = get_content(
        &ChunkStoreAccessor::new(&store),
        &ContentParams::new("nope.md"),
        &cfg(),
        &CancellationToken::new(),
    )
    .await
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(store.open_scans(), 0);
}

#[tokio::test]
async fn get_content_flags_ambiguous_joins() {
    let store = InMemoryChunkStore::new();
    store.extend([Chunk::new("a.txt", 0, "alpha"), Chunk::new("a.txt", 1, "omega")]);
    let resp = get_content(
        &ChunkStoreAccessor::new(&store),
        &ContentParams::new("a.txt"),
        &cfg(),
        &CancellationToken::new(),
    )
    .await
    .unwrap();
    assert!(resp.reconstruction_ambiguous);
    assert_eq!(resp.ambiguous_boundaries.len(), 1);
    assert!(resp.metadata.is_none());
}

#[tokio::test]
async fn failed_page_releases_cursor_and_returns_no_partial() {
    let store = InMemoryChunkStore::new();
    store.extend(positional_chunks(TEXT, 10, 10));
    let hook = ScanHook {
        inner: &store,
        fail_next_page: true,
        cancel_after_first: None,
    };
    let err = get_content(
        &ChunkStoreAccessor::new(&hook).with_page_size(2),
        &ContentParams::new("doc.txt"),
        &cfg(),
        &CancellationToken::new(),
    )
    .await
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BackendUnavailable);
    assert_eq!(store.open_scans(), 0);
}

#[tokio::test]
async fn cancellation_mid_scan_stops_paging() {
    let store = InMemoryChunkStore::new();
    store.extend(positional_chunks(TEXT, 10, 10));
    let token = CancellationToken::new();
    let hook = ScanHook {
        inner: &store,
        fail_next_page: false,
        cancel_after_first: Some(token.clone()),
    };
    let err = get_content(
        &ChunkStoreAccessor::new(&hook).with_page_size(2),
        &ContentParams::new("doc.txt"),
        &cfg(),
        &token,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, RetrievalError::Cancelled));
    // scan_file + release only
    assert_eq!(store.call_count(), 2);
    assert_eq!(store.open_scans(), 0);
}

// ═══════════════════════════════════════════════════════════════════════
// Search operations
// ═══════════════════════════════════════════════════════════════════════

fn search_store() -> InMemoryChunkStore {
    let store = InMemoryChunkStore::new().with_vector_dims(3);
    store.extend([
        Chunk::new("src/auth.rs", 0, "fn login(user: &str) -> Token {\n    verify(user)\n}")
            .with_vector(vec![0.9, 0.1, 0.0]),
        Chunk::new("docs/auth.md", 0, "Authentication uses short-lived tokens.")
            .with_vector(vec![0.8, 0.0, 0.2]),
        Chunk::new("src/cache.rs", 0, "fn evict(&mut self) {\n    self.lru.pop();\n}")
            .with_vector(vec![0.0, 1.0, 0.0]),
        Chunk::new("src/cache.rs", 1, "// TODO: size limit\nfn insert() {}\n// todo: metrics")
            .with_vector(vec![0.1, 0.9, 0.0]),
    ]);
    store
}

#[tokio::test]
async fn semantic_search_returns_backend_order() {
    let store = search_store();
    let embedder = KeywordEmbedder::new();
    let mut params = SemanticParams::new("where is auth handled");
    params.top_k = 2;
    let resp = semantic_search(&ChunkStoreAccessor::new(&store), &embedder, &params)
        .await
        .unwrap();
    assert_eq!(resp.total, 2);
    assert_eq!(resp.results[0].file_name, "src/auth.rs");
    assert_eq!(resp.results[1].file_name, "docs/auth.md");
    assert!(resp.results[0].score >= resp.results[1].score);
}

#[tokio::test]
async fn semantic_search_filters_file_types_and_score() {
    let store = search_store();
    let embedder = KeywordEmbedder::new();
    let mut params = SemanticParams::new("auth");
    params.file_types = vec![".MD".into()];
    let resp = semantic_search(&ChunkStoreAccessor::new(&store), &embedder, &params)
        .await
        .unwrap();
    assert_eq!(resp.file_types, vec!["md"]);
    assert_eq!(resp.total, 1);
    assert_eq!(resp.results[0].file_name, "docs/auth.md");

    let mut params = SemanticParams::new("auth");
    params.min_score = 0.99;
    let resp = semantic_search(&ChunkStoreAccessor::new(&store), &embedder, &params)
        .await
        .unwrap();
    assert!(resp.results.iter().all(|h| h.score >= 0.99));
}

#[tokio::test]
async fn semantic_validation_happens_before_embedding() {
    let store = search_store();
    let embedder = KeywordEmbedder::new();
    let accessor = ChunkStoreAccessor::new(&store);

    let mut bad_k = SemanticParams::new("auth");
    bad_k.top_k = 0;
    let mut bad_score = SemanticParams::new("auth");
    bad_score.min_score = f64::NAN;
    let mut bad_types = SemanticParams::new("auth");
    bad_types.file_types = vec!["".into()];

    for params in [SemanticParams::new("   "), bad_k, bad_score, bad_types] {
        let err = semantic_search(&accessor, &embedder, &params)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }
    assert_eq!(embedder.calls(), 0);
    assert_eq!(store.call_count(), 0);
}

#[tokio::test]
async fn semantic_surfaces_backend_outages() {
    let store = search_store();
    let err = semantic_search(
        &ChunkStoreAccessor::new(&store),
        &DownEmbedder,
        &SemanticParams::new("auth"),
    )
    .await
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BackendUnavailable);
    assert_eq!(store.call_count(), 0);

    store.set_offline(true);
    let err = semantic_search(
        &ChunkStoreAccessor::new(&store),
        &KeywordEmbedder::new(),
        &SemanticParams::new("auth"),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, RetrievalError::BackendUnavailable { .. }));
}

#[tokio::test]
async fn lexical_search_splits_terms_and_passes_highlights() {
    let store = search_store();
    let mut params = LexicalParams::new("  fn   evict ");
    params.operator = Operator::And;
    let resp = lexical_search(&ChunkStoreAccessor::new(&store), &params)
        .await
        .unwrap();
    assert_eq!(resp.query_terms, vec!["fn", "evict"]);
    assert_eq!(resp.operator, Operator::And);
    assert_eq!(resp.total, 1);
    assert_eq!(resp.results[0].file_name, "src/cache.rs");
    assert!(resp.results[0]
        .highlights
        .iter()
        .any(|h| h.contains("<em>evict</em>")));
}

#[tokio::test]
async fn lexical_or_and_fuzzy() {
    let store = search_store();
    let accessor = ChunkStoreAccessor::new(&store);

    let resp = lexical_search(&accessor, &LexicalParams::new("login evict"))
        .await
        .unwrap();
    assert_eq!(resp.total, 2);

    let mut params = LexicalParams::new("evikt");
    assert_eq!(lexical_search(&accessor, &params).await.unwrap().total, 0);
    params.fuzzy = true;
    assert_eq!(lexical_search(&accessor, &params).await.unwrap().total, 1);
}

#[tokio::test]
async fn lexical_rejects_bad_fields() {
    let store = search_store();
    let mut params = LexicalParams::new("evict");
    params.fields = vec!["content^high".into()];
    let err = lexical_search(&ChunkStoreAccessor::new(&store), &params)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("`fields`"));
    assert_eq!(store.call_count(), 0);
}

#[tokio::test]
async fn regex_invalid_pattern_issues_no_query() {
    let store = search_store();
    let err = regex_search(&ChunkStoreAccessor::new(&store), &RegexParams::new("fn ("))
        .await
        .unwrap_err();
    assert!(matches!(err, RetrievalError::InvalidPattern(_)));
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert_eq!(store.call_count(), 0);
}

#[tokio::test]
async fn regex_search_reports_lines() {
    let store = search_store();
    let mut params = RegexParams::new(r"fn \w+");
    params.file_types = vec!["rs".into()];
    params.context_lines = 1;
    let resp = regex_search(&ChunkStoreAccessor::new(&store), &params)
        .await
        .unwrap();

    assert_eq!(resp.files_matched, 2);
    assert_eq!(resp.total_matches, 3);
    let cache = resp
        .results
        .iter()
        .find(|f| f.file_name == "src/cache.rs")
        .unwrap();
    assert_eq!(cache.match_count, 2);
    assert_eq!(cache.matches[0].chunk_id, 0);
    assert_eq!(cache.matches[0].matched_text, "fn evict");
    assert_eq!(cache.matches[1].chunk_id, 1);
    assert_eq!(cache.matches[1].line_number, 2);
    assert_eq!(cache.matches[1].context_before, vec!["// TODO: size limit"]);
    assert_eq!(cache.matches[1].context_after, vec!["// todo: metrics"]);
}

#[tokio::test]
async fn regex_case_sensitivity_and_cap() {
    let store = search_store();
    let accessor = ChunkStoreAccessor::new(&store);

    let sensitive = regex_search(&accessor, &RegexParams::new("TODO")).await.unwrap();
    assert_eq!(sensitive.total_matches, 1);

    let mut params = RegexParams::new("TODO");
    params.case_sensitive = false;
    let insensitive = regex_search(&accessor, &params).await.unwrap();
    assert_eq!(insensitive.total_matches, 2);
    assert!(!insensitive.results[0].truncated);

    params.max_matches_per_file = 1;
    let capped = regex_search(&accessor, &params).await.unwrap();
    assert_eq!(capped.total_matches, 1);
    assert!(capped.results[0].truncated);
}

#[tokio::test]
async fn regex_counts_overlapping_lines_once() {
    let store = InMemoryChunkStore::new();
    store.extend([
        Chunk::new("src/job.rs", 0, "fn run() {\n    step();\n// TODO: fix"),
        Chunk::new("src/job.rs", 1, "// TODO: fix\n    retry();\n}"),
    ]);

    let resp = regex_search(&ChunkStoreAccessor::new(&store), &RegexParams::new("TODO"))
        .await
        .unwrap();
    assert_eq!(resp.total_matches, 1);
    let file = &resp.results[0];
    assert_eq!(file.match_count, 1);
    assert_eq!(file.matches[0].chunk_id, 0);
    assert_eq!(file.matches[0].line_number, 3);
}
