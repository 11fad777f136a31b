//! Full-text reconstruction from overlapping chunks.
//!
//! Given every chunk record of one file, in any order and possibly with
//! duplicates, [`reconstruct`] produces the single reading of that file.
//!
//! # Algorithm
//!
//! 1. Order chunks by `chunk_id` (ties by `chunk_start`, `chunk_end`, then
//!    content) and drop exact duplicate records.
//! 2. Zero chunks → empty string. One chunk → its content, verbatim.
//! 3. If every chunk carries a valid `[chunk_start, chunk_end)` span, write
//!    each chunk's characters into a sparse position map in that order. A
//!    position keeps the first character written to it. Emit positions in
//!    ascending order; unwritten positions are skipped.
//! 4. Otherwise join chunks pairwise by overlap detection: find the longest
//!    suffix of the text so far that resembles a prefix of the next chunk
//!    (whitespace-normalized positional similarity above the threshold) and
//!    append only what follows it. With no acceptable overlap, append a
//!    newline separator and the whole chunk, and record the boundary as
//!    ambiguous.
//!
//! Overlap lengths are searched from `max_overlap` down to `min_overlap`.
//! When `allow_short_overlaps` is set and nothing in that range qualifies,
//! shorter lengths down to one character are tried too. A short overlap
//! only counts when it starts and ends on a word boundary and both sides
//! carry the same words; the similarity threshold does not apply to it.
//!
//! # Example
//!
//! ```rust
//! use chunkseek_core::models::Chunk;
//! use chunkseek_core::reconstruct::{reconstruct, ReconstructConfig};
//!
//! let chunks = vec![
//!     Chunk::new("doc.txt", 1, "brown fox jumps over"),
//!     Chunk::new("doc.txt", 0, "the quick brown fox"),
//! ];
//! let doc = reconstruct(&chunks, &ReconstructConfig::default());
//! assert_eq!(doc.content, "the quick brown fox jumps over");
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, RetrievalError};
use crate::models::Chunk;

/// Tuning for overlap detection.
///
/// The defaults (50 / 500 / 0.85) are starting points, not derived values;
/// re-tune them against the target corpus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconstructConfig {
    /// Shortest overlap, in characters, accepted on similarity alone.
    pub min_overlap: usize,
    /// Longest overlap, in characters, considered.
    pub max_overlap: usize,
    /// Normalized similarity a candidate must exceed.
    pub similarity_threshold: f64,
    /// Also accept word-aligned overlaps shorter than `min_overlap`.
    pub allow_short_overlaps: bool,
}

impl Default for ReconstructConfig {
    fn default() -> Self {
        Self {
            min_overlap: 50,
            max_overlap: 500,
            similarity_threshold: 0.85,
            allow_short_overlaps: true,
        }
    }
}

impl ReconstructConfig {
    pub fn validate(&self) -> Result<()> {
        if self.min_overlap == 0 {
            return Err(RetrievalError::invalid("min_overlap", "must be >= 1"));
        }
        if self.max_overlap < self.min_overlap {
            return Err(RetrievalError::invalid(
                "max_overlap",
                format!(
                    "must be >= min_overlap ({}), got {}",
                    self.min_overlap, self.max_overlap
                ),
            ));
        }
        if !(self.similarity_threshold > 0.0 && self.similarity_threshold <= 1.0) {
            return Err(RetrievalError::invalid(
                "similarity_threshold",
                format!("must be in (0, 1], got {}", self.similarity_threshold),
            ));
        }
        Ok(())
    }
}

/// Which path produced a [`Reconstruction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconstructionMethod {
    Empty,
    SingleChunk,
    Positional,
    Overlap,
}

/// A pair of adjacent chunks joined without a detected overlap.
///
/// The output may contain duplicated text at this boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AmbiguousBoundary {
    pub previous_chunk_id: i64,
    pub next_chunk_id: i64,
}

/// Result of reconstructing one file.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconstruction {
    pub content: String,
    pub method: ReconstructionMethod,
    /// Distinct chunk records used, after duplicate removal.
    pub chunk_count: usize,
    pub ambiguous_boundaries: Vec<AmbiguousBoundary>,
}

impl Reconstruction {
    pub fn is_ambiguous(&self) -> bool {
        !self.ambiguous_boundaries.is_empty()
    }
}

/// Reconstruct the full text of one file from its chunks.
///
/// Never fails: an empty input yields an empty string, and chunks that
/// cannot be merged are joined with a separator and reported in
/// [`Reconstruction::ambiguous_boundaries`].
pub fn reconstruct(chunks: &[Chunk], config: &ReconstructConfig) -> Reconstruction {
    let ordered = order_chunks(chunks);
    let chunk_count = ordered.len();

    let (content, method, ambiguous_boundaries) = match ordered.as_slice() {
        [] => (String::new(), ReconstructionMethod::Empty, Vec::new()),
        [only] => (
            only.content.clone(),
            ReconstructionMethod::SingleChunk,
            Vec::new(),
        ),
        _ if has_complete_positions(&ordered) => (
            reconstruct_by_position(&ordered),
            ReconstructionMethod::Positional,
            Vec::new(),
        ),
        _ => {
            let (content, ambiguous) = reconstruct_by_overlap(&ordered, config);
            (content, ReconstructionMethod::Overlap, ambiguous)
        }
    };

    Reconstruction {
        content,
        method,
        chunk_count,
        ambiguous_boundaries,
    }
}

fn order_chunks(chunks: &[Chunk]) -> Vec<&Chunk> {
    let mut ordered: Vec<&Chunk> = chunks.iter().collect();
    ordered.sort_by(|a, b| {
        a.chunk_id
            .cmp(&b.chunk_id)
            .then_with(|| a.chunk_start.cmp(&b.chunk_start))
            .then_with(|| a.chunk_end.cmp(&b.chunk_end))
            .then_with(|| a.content.cmp(&b.content))
    });
    ordered.dedup_by(|a, b| {
        a.chunk_id == b.chunk_id
            && a.chunk_start == b.chunk_start
            && a.chunk_end == b.chunk_end
            && a.content == b.content
    });
    ordered
}

fn has_complete_positions(chunks: &[&Chunk]) -> bool {
    chunks
        .iter()
        .all(|c| matches!(c.span(), Some((start, end)) if start <= end))
}

fn reconstruct_by_position(chunks: &[&Chunk]) -> String {
    let mut positions: BTreeMap<usize, char> = BTreeMap::new();
    for chunk in chunks {
        let Some((start, end)) = chunk.span() else {
            continue;
        };
        for (pos, ch) in (start..end).zip(chunk.content.chars()) {
            positions.entry(pos).or_insert(ch);
        }
    }
    positions.into_values().collect()
}

fn reconstruct_by_overlap(
    chunks: &[&Chunk],
    config: &ReconstructConfig,
) -> (String, Vec<AmbiguousBoundary>) {
    let mut text = chunks[0].content.clone();
    let mut ambiguous = Vec::new();

    for pair in chunks.windows(2) {
        let (prev, next) = (pair[0], pair[1]);
        if next.content.is_empty() {
            continue;
        }
        match find_overlap(&text, &next.content, config) {
            Some(cut) => text.push_str(&next.content[cut..]),
            None => {
                debug!(
                    file_name = %next.file_name,
                    previous_chunk_id = prev.chunk_id,
                    next_chunk_id = next.chunk_id,
                    "no overlap detected, joining with separator"
                );
                if !text.is_empty() && !text.ends_with('\n') {
                    text.push('\n');
                }
                text.push_str(&next.content);
                ambiguous.push(AmbiguousBoundary {
                    previous_chunk_id: prev.chunk_id,
                    next_chunk_id: next.chunk_id,
                });
            }
        }
    }
    (text, ambiguous)
}

fn is_word_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_'
}

/// Byte offset into `next` from which to append, or `None` if no overlap
/// qualifies.
fn find_overlap(text: &str, next: &str, config: &ReconstructConfig) -> Option<usize> {
    let max = config.max_overlap;
    // One extra character on each side for the word-boundary checks.
    let mut tail: Vec<char> = text.chars().rev().take(max + 1).collect();
    tail.reverse();
    let head: Vec<char> = next.chars().take(max + 1).collect();

    let upper = tail.len().min(head.len()).min(max);
    let floor = if config.allow_short_overlaps {
        1
    } else {
        config.min_overlap.max(1)
    };
    if upper < floor {
        return None;
    }

    for len in (floor..=upper).rev() {
        let suffix = &tail[tail.len() - len..];
        let prefix = &head[..len];
        let accepted = if len < config.min_overlap {
            same_words(suffix, prefix) && is_word_aligned(&tail, &head, len)
        } else {
            char_similarity(suffix, prefix) > config.similarity_threshold
        };
        if accepted {
            return Some(append_offset(next, suffix, prefix));
        }
    }
    None
}

/// Short overlaps get no similarity slack: both sides must hold the same
/// words, differing at most in whitespace, and at least one word character.
fn same_words(a: &[char], b: &[char]) -> bool {
    let a = collapse_whitespace(a);
    let b = collapse_whitespace(b);
    let (a, b) = (trim_whitespace(&a), trim_whitespace(&b));
    a == b && a.iter().any(|&c| is_word_char(c))
}

fn trim_whitespace(chars: &[char]) -> &[char] {
    let start = chars
        .iter()
        .position(|c| !c.is_whitespace())
        .unwrap_or(chars.len());
    let end = chars
        .iter()
        .rposition(|c| !c.is_whitespace())
        .map_or(start, |i| i + 1);
    &chars[start..end]
}

/// A short overlap must begin at a word boundary in the accumulated text
/// and end at a word boundary in the next chunk.
fn is_word_aligned(tail: &[char], head: &[char], len: usize) -> bool {
    let start = tail.len() - len;
    let starts_clean = start == 0 || !is_word_char(tail[start - 1]) || !is_word_char(tail[start]);
    let ends_clean = head
        .get(len)
        .map_or(true, |after| !is_word_char(head[len - 1]) || !is_word_char(*after));
    starts_clean && ends_clean
}

/// Where to resume in `next` once `prefix` has been matched against `suffix`.
///
/// Trailing whitespace in the prefix that the suffix lacks is kept, so the
/// join does not fuse two words.
fn append_offset(next: &str, suffix: &[char], prefix: &[char]) -> usize {
    let suffix_ends_ws = suffix.last().is_some_and(|c| c.is_whitespace());
    let trailing_ws = if suffix_ends_ws {
        0
    } else {
        prefix.iter().rev().take_while(|c| c.is_whitespace()).count()
    };
    let skip = prefix.len() - trailing_ws;
    next.char_indices()
        .nth(skip)
        .map(|(i, _)| i)
        .unwrap_or(next.len())
}

fn collapse_whitespace(chars: &[char]) -> Vec<char> {
    let mut out = Vec::with_capacity(chars.len());
    let mut in_whitespace = false;
    for &ch in chars {
        if ch.is_whitespace() {
            if !in_whitespace {
                out.push(' ');
            }
            in_whitespace = true;
        } else {
            out.push(ch);
            in_whitespace = false;
        }
    }
    out
}

fn char_similarity(a: &[char], b: &[char]) -> f64 {
    let a = collapse_whitespace(a);
    let b = collapse_whitespace(b);
    let longest = a.len().max(b.len());
    if longest == 0 {
        return 0.0;
    }
    let same = a.iter().zip(b.iter()).filter(|(x, y)| x == y).count();
    same as f64 / longest as f64
}

/// Whitespace-normalized positional similarity of two strings, in `[0, 1]`.
///
/// Whitespace runs collapse to one space, characters are compared position
/// by position up to the shorter string, and the match count is divided by
/// the longer normalized length.
pub fn normalized_similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    char_similarity(&a, &b)
}
