//! In-memory [`ChunkStore`] implementation for tests and embedding in
//! small tools.
//!
//! Uses `Vec` and `HashMap` behind `std::sync` locks for thread safety.
//! Vector search is brute-force cosine similarity, reported on the same
//! `[0, 1]` scale as an OpenSearch `cosinesimil` k-NN score. Term search is a
//! boosted term-frequency score with `AUTO`-style fuzziness and `<em>`
//! highlighting. Scans hand out real cursors so callers can be checked for
//! releasing them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError, RwLock};

use async_trait::async_trait;
use regex::RegexBuilder;
use uuid::Uuid;

use crate::embedding::cosine_similarity;
use crate::error::{Result, RetrievalError};
use crate::models::{Chunk, ChunkHit, ChunkPage, ScanCursor};

use super::{parse_field_spec, ChunkStore, Operator, PatternQuery, TermQuery, VectorQuery};

/// Bytes of context kept before the first highlighted term.
const HIGHLIGHT_LEAD: usize = 60;
/// Maximum highlight fragment length in bytes.
const HIGHLIGHT_WINDOW: usize = 200;

struct ScanState {
    page_size: usize,
    remaining: Vec<Chunk>,
}

/// In-memory chunk store.
pub struct InMemoryChunkStore {
    chunks: RwLock<Vec<Chunk>>,
    scans: Mutex<HashMap<String, ScanState>>,
    calls: AtomicUsize,
    offline: AtomicBool,
    dims: Option<usize>,
}

impl InMemoryChunkStore {
    pub fn new() -> Self {
        Self {
            chunks: RwLock::new(Vec::new()),
            scans: Mutex::new(HashMap::new()),
            calls: AtomicUsize::new(0),
            offline: AtomicBool::new(false),
            dims: None,
        }
    }

    /// Declare the dimensionality of the stored vectors.
    pub fn with_vector_dims(mut self, dims: usize) -> Self {
        self.dims = Some(dims);
        self
    }

    pub fn insert(&self, chunk: Chunk) {
        self.chunks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(chunk);
    }

    pub fn extend(&self, chunks: impl IntoIterator<Item = Chunk>) {
        self.chunks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(chunks);
    }

    /// Number of backend calls received so far (including failed ones).
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of scan cursors handed out and not yet released.
    pub fn open_scans(&self) -> usize {
        self.scans.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Simulate an unreachable store: every call fails with
    /// [`RetrievalError::BackendUnavailable`].
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn begin_call(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(RetrievalError::store_unavailable("connection refused"));
        }
        Ok(())
    }

    fn open_scan(&self, mut matching: Vec<Chunk>, page_size: usize) -> ChunkPage {
        let page_size = page_size.max(1);
        let remaining = if matching.len() > page_size {
            matching.split_off(page_size)
        } else {
            Vec::new()
        };
        let has_more = !remaining.is_empty();
        let id = Uuid::new_v4().to_string();
        self.scans
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                id.clone(),
                ScanState {
                    page_size,
                    remaining,
                },
            );
        ChunkPage {
            chunks: matching,
            cursor: Some(ScanCursor(id)),
            has_more,
        }
    }
}

impl Default for InMemoryChunkStore {
    fn default() -> Self {
        Self::new()
    }
}

fn matches_file_types(chunk: &Chunk, file_types: &[String]) -> bool {
    if file_types.is_empty() {
        return true;
    }
    chunk
        .file_type()
        .map(|t| file_types.iter().any(|f| *f == t))
        .unwrap_or(false)
}

fn sort_by_score(hits: &mut [ChunkHit]) {
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk.file_name.cmp(&b.chunk.file_name))
            .then_with(|| a.chunk.chunk_id.cmp(&b.chunk.chunk_id))
    });
}

struct Token {
    start: usize,
    end: usize,
    text: String,
}

/// Split text into lowercase word tokens (alphanumerics and `_`), keeping
/// byte offsets into the original string.
fn tokenize(text: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut start: Option<usize> = None;
    for (i, ch) in text.char_indices() {
        let is_word = ch.is_alphanumeric() || ch == '_';
        match (is_word, start) {
            (true, None) => start = Some(i),
            (false, Some(s)) => {
                tokens.push(Token {
                    start: s,
                    end: i,
                    text: text[s..i].to_lowercase(),
                });
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        tokens.push(Token {
            start: s,
            end: text.len(),
            text: text[s..].to_lowercase(),
        });
    }
    tokens
}

/// Allowed edit distance for a term, mirroring `fuzziness: AUTO`.
fn auto_fuzziness(term: &str) -> usize {
    match term.chars().count() {
        0..=2 => 0,
        3..=5 => 1,
        _ => 2,
    }
}

fn levenshtein(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b_chars.len()).collect();
    let mut curr = vec![0; b_chars.len() + 1];
    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b_chars.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b_chars.len()]
}

fn term_matches(term: &str, token: &str, fuzzy: bool) -> bool {
    token == term || (fuzzy && levenshtein(term, token) <= auto_fuzziness(term))
}

/// Snap a byte index back to the nearest valid UTF-8 char boundary.
fn snap_to_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// Build one highlight fragment around the first matching token.
fn highlight(content: &str, terms: &[String], fuzzy: bool) -> Vec<String> {
    let spans: Vec<(usize, usize)> = tokenize(content)
        .into_iter()
        .filter(|t| terms.iter().any(|term| term_matches(term, &t.text, fuzzy)))
        .map(|t| (t.start, t.end))
        .collect();
    let Some(&(first_start, first_end)) = spans.first() else {
        return Vec::new();
    };

    let start = snap_to_char_boundary(content, first_start.saturating_sub(HIGHLIGHT_LEAD));
    let end = snap_to_char_boundary(content, (start + HIGHLIGHT_WINDOW).max(first_end));

    let mut fragment = String::new();
    let mut pos = start;
    for &(s, e) in spans.iter().filter(|(s, e)| *s >= start && *e <= end) {
        fragment.push_str(&content[pos..s]);
        fragment.push_str("<em>");
        fragment.push_str(&content[s..e]);
        fragment.push_str("</em>");
        pos = e;
    }
    fragment.push_str(&content[pos..end]);
    vec![fragment]
}

#[async_trait]
impl ChunkStore for InMemoryChunkStore {
    fn vector_dims(&self) -> Option<usize> {
        self.dims
    }

    async fn vector_search(&self, query: &VectorQuery<'_>) -> Result<Vec<ChunkHit>> {
        self.begin_call()?;
        let chunks = self.chunks.read().unwrap_or_else(PoisonError::into_inner);
        let mut hits: Vec<ChunkHit> = chunks
            .iter()
            .filter(|c| matches_file_types(c, query.file_types))
            .filter_map(|c| {
                let vector = c.embedding_vector.as_ref()?;
                if vector.len() != query.vector.len() {
                    return None;
                }
                let score = (1.0 + cosine_similarity(query.vector, vector) as f64) / 2.0;
                (score >= query.score_floor).then(|| ChunkHit {
                    chunk: c.clone(),
                    score,
                    highlights: Vec::new(),
                })
            })
            .collect();
        sort_by_score(&mut hits);
        hits.truncate(query.k);
        Ok(hits)
    }

    async fn term_search(&self, query: &TermQuery<'_>) -> Result<Vec<ChunkHit>> {
        self.begin_call()?;
        let terms: Vec<String> = query
            .query
            .split_whitespace()
            .map(str::to_lowercase)
            .collect();
        if terms.is_empty() {
            return Ok(Vec::new());
        }
        let fields: Vec<(&str, f64)> = query
            .fields
            .iter()
            .filter_map(|f| parse_field_spec(f))
            .collect();

        let chunks = self.chunks.read().unwrap_or_else(PoisonError::into_inner);
        let mut hits: Vec<ChunkHit> = Vec::new();
        for chunk in chunks.iter() {
            let mut score = 0.0;
            let mut matched = vec![false; terms.len()];
            for &(field, boost) in &fields {
                let text = match field {
                    "content" => chunk.content.as_str(),
                    "file_name" => chunk.file_name.as_str(),
                    _ => continue,
                };
                let tokens = tokenize(text);
                for (i, term) in terms.iter().enumerate() {
                    let tf = tokens
                        .iter()
                        .filter(|t| term_matches(term, &t.text, query.fuzzy))
                        .count();
                    if tf > 0 {
                        matched[i] = true;
                        score += boost * (1.0 + (tf as f64).ln());
                    }
                }
            }
            let keep = match query.operator {
                Operator::And => matched.iter().all(|m| *m),
                Operator::Or => matched.iter().any(|m| *m),
            };
            if keep {
                hits.push(ChunkHit {
                    chunk: chunk.clone(),
                    score,
                    highlights: highlight(&chunk.content, &terms, query.fuzzy),
                });
            }
        }
        sort_by_score(&mut hits);
        hits.truncate(query.top_k);
        Ok(hits)
    }

    async fn pattern_search(&self, query: &PatternQuery<'_>) -> Result<Vec<ChunkHit>> {
        self.begin_call()?;
        let regex = RegexBuilder::new(query.pattern)
            .case_insensitive(!query.case_sensitive)
            .build()?;
        let chunks = self.chunks.read().unwrap_or_else(PoisonError::into_inner);
        Ok(chunks
            .iter()
            .filter(|c| matches_file_types(c, query.file_types))
            .filter(|c| regex.is_match(&c.content))
            .take(query.limit)
            .map(|c| ChunkHit {
                chunk: c.clone(),
                score: 1.0,
                highlights: Vec::new(),
            })
            .collect())
    }

    async fn scan_file(&self, file_name: &str, page_size: usize) -> Result<ChunkPage> {
        self.begin_call()?;
        let matching: Vec<Chunk> = self
            .chunks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|c| c.file_name == file_name)
            .cloned()
            .collect();
        Ok(self.open_scan(matching, page_size))
    }

    async fn scan_next(&self, cursor: &ScanCursor) -> Result<ChunkPage> {
        self.begin_call()?;
        let mut scans = self.scans.lock().unwrap_or_else(PoisonError::into_inner);
        let state = scans
            .get_mut(&cursor.0)
            .ok_or_else(|| RetrievalError::QueryRejected {
                status: 404,
                message: format!("no scan context for cursor {}", cursor.0),
            })?;
        let take = state.page_size.min(state.remaining.len());
        let chunks: Vec<Chunk> = state.remaining.drain(..take).collect();
        Ok(ChunkPage {
            chunks,
            cursor: Some(cursor.clone()),
            has_more: !state.remaining.is_empty(),
        })
    }

    async fn release_scan(&self, cursor: &ScanCursor) -> Result<()> {
        self.begin_call()?;
        self.scans
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&cursor.0);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> InMemoryChunkStore {
        let store = InMemoryChunkStore::new().with_vector_dims(2);
        store.extend(vec![
            Chunk::new("auth.py", 0, "def authenticateUser(name): return validateToken(name)")
                .with_vector(vec![1.0, 0.0]),
            Chunk::new("auth.py", 1, "def validateToken(token): ...").with_vector(vec![0.8, 0.2]),
            Chunk::new("README.md", 0, "Install the package and run it.")
                .with_vector(vec![0.0, 1.0])
                .with_metadata("file_type", json!("md")),
        ]);
        store
    }

    #[test]
    fn levenshtein_distances() {
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("token", "token"), 0);
    }

    #[test]
    fn tokenize_keeps_offsets() {
        let tokens = tokenize("héllo, wörld_1!");
        let words: Vec<&str> = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(words, vec!["héllo", "wörld_1"]);
        assert_eq!(&"héllo, wörld_1!"[tokens[1].start..tokens[1].end], "wörld_1");
    }

    #[test]
    fn highlight_wraps_terms() {
        let frags = highlight("call validateToken now", &["validatetoken".into()], false);
        assert_eq!(frags, vec!["call <em>validateToken</em> now".to_string()]);
        assert!(highlight("nothing here", &["absent".into()], false).is_empty());
    }

    #[tokio::test]
    async fn vector_search_ranks_and_filters() {
        let store = store();
        let hits = store
            .vector_search(&VectorQuery {
                vector: &[1.0, 0.0],
                k: 10,
                score_floor: 0.6,
                file_types: &[],
            })
            .await
            .unwrap();
        let ids: Vec<(&str, i64)> = hits
            .iter()
            .map(|h| (h.chunk.file_name.as_str(), h.chunk.chunk_id))
            .collect();
        assert_eq!(ids, vec![("auth.py", 0), ("auth.py", 1)]);
        assert!((hits[0].score - 1.0).abs() < 1e-9);

        let md_only = store
            .vector_search(&VectorQuery {
                vector: &[1.0, 0.0],
                k: 10,
                score_floor: 0.0,
                file_types: &["md".to_string()],
            })
            .await
            .unwrap();
        assert_eq!(md_only.len(), 1);
        assert_eq!(md_only[0].chunk.file_name, "README.md");
    }

    #[tokio::test]
    async fn term_search_operators() {
        let store = store();
        let fields = vec!["content".to_string()];
        let and_hits = store
            .term_search(&TermQuery {
                query: "authenticateUser validateToken",
                fields: &fields,
                operator: Operator::And,
                fuzzy: false,
                top_k: 10,
            })
            .await
            .unwrap();
        assert_eq!(and_hits.len(), 1);
        assert_eq!(and_hits[0].chunk.chunk_id, 0);
        assert!(and_hits[0].highlights[0].contains("<em>authenticateUser</em>"));

        let or_hits = store
            .term_search(&TermQuery {
                query: "authenticateUser validateToken",
                fields: &fields,
                operator: Operator::Or,
                fuzzy: false,
                top_k: 10,
            })
            .await
            .unwrap();
        assert_eq!(or_hits.len(), 2);
        assert_eq!(or_hits[0].chunk.chunk_id, 0, "chunk matching both terms ranks first");
    }

    #[tokio::test]
    async fn term_search_fuzzy() {
        let store = store();
        let fields = vec!["content".to_string()];
        let query = TermQuery {
            query: "instal",
            fields: &fields,
            operator: Operator::Or,
            fuzzy: false,
            top_k: 10,
        };
        assert!(store.term_search(&query).await.unwrap().is_empty());
        let fuzzy = TermQuery { fuzzy: true, ..query };
        assert_eq!(store.term_search(&fuzzy).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn scan_pages_and_releases() {
        let store = InMemoryChunkStore::new();
        store.extend((0..5).map(|i| Chunk::new("big.txt", i, format!("part {}", i))));

        let first = store.scan_file("big.txt", 2).await.unwrap();
        assert_eq!(first.chunks.len(), 2);
        assert!(first.has_more);
        assert_eq!(store.open_scans(), 1);

        let cursor = first.cursor.unwrap();
        let second = store.scan_next(&cursor).await.unwrap();
        let third = store.scan_next(&cursor).await.unwrap();
        assert_eq!(second.chunks.len(), 2);
        assert_eq!(third.chunks.len(), 1);
        assert!(!third.has_more);

        store.release_scan(&cursor).await.unwrap();
        assert_eq!(store.open_scans(), 0);
        assert!(store.scan_next(&cursor).await.is_err());
    }

    #[tokio::test]
    async fn offline_store_fails_every_call() {
        let store = store();
        store.set_offline(true);
        let err = store.scan_file("auth.py", 10).await.unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::BackendUnavailable);
        assert_eq!(store.call_count(), 1);
    }
}
