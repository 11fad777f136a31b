use std::collections::HashMap;

use regex::Regex;
use tracing::debug;

use super::{normalize_file_types, require_non_empty};
use crate::accessor::{compile_pattern, ChunkStoreAccessor};
use crate::error::{Result, RetrievalError};
use crate::format::{FileMatches, LineMatch, RegexSearchResponse};
use crate::models::Chunk;
use crate::store::ChunkStore;

/// Parameters for [`regex_search`].
#[derive(Debug, Clone)]
pub struct RegexParams {
    pub pattern: String,
    pub file_types: Vec<String>,
    pub case_sensitive: bool,
    /// `1..=1000`.
    pub max_matches_per_file: usize,
    /// Lines of context on each side, at most 20.
    pub context_lines: usize,
    /// Candidate chunks requested from the backend.
    pub candidate_limit: usize,
}

impl RegexParams {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            file_types: Vec::new(),
            case_sensitive: true,
            max_matches_per_file: 10,
            context_lines: 2,
            candidate_limit: 100,
        }
    }

    fn validate(&self) -> Result<(Regex, Vec<String>)> {
        require_non_empty("pattern", &self.pattern)?;
        if !(1..=1000).contains(&self.max_matches_per_file) {
            return Err(RetrievalError::invalid(
                "max_matches_per_file",
                format!("must be between 1 and 1000, got {}", self.max_matches_per_file),
            ));
        }
        if self.context_lines > 20 {
            return Err(RetrievalError::invalid(
                "context_lines",
                format!("must be at most 20, got {}", self.context_lines),
            ));
        }
        if self.candidate_limit == 0 {
            return Err(RetrievalError::invalid("candidate_limit", "must be >= 1"));
        }
        let file_types = normalize_file_types(&self.file_types)?;
        let regex = compile_pattern(&self.pattern, self.case_sensitive)?;
        Ok((regex, file_types))
    }
}

/// Regex search with line-level results.
///
/// The backend narrows the corpus to candidate chunks; each candidate is
/// then re-scanned line by line with the same compiled pattern. Files keep
/// the backend's rank order and chunks within a file are scanned in
/// `chunk_id` order. Candidates the local scan finds no match in are
/// dropped.
pub async fn regex_search<S: ChunkStore + ?Sized>(
    accessor: &ChunkStoreAccessor<'_, S>,
    params: &RegexParams,
) -> Result<RegexSearchResponse> {
    let (regex, file_types) = params.validate()?;

    let hits = accessor
        .find_by_pattern(
            &params.pattern,
            &file_types,
            params.case_sensitive,
            params.candidate_limit,
        )
        .await?;
    let candidates = hits.len();

    let mut files: Vec<(String, Vec<Chunk>)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for hit in hits {
        let slot = *index.entry(hit.chunk.file_name.clone()).or_insert_with(|| {
            files.push((hit.chunk.file_name.clone(), Vec::new()));
            files.len() - 1
        });
        files[slot].1.push(hit.chunk);
    }

    let mut results = Vec::new();
    for (file_name, mut chunks) in files {
        chunks.sort_by_key(|c| c.chunk_id);
        chunks.dedup_by_key(|c| c.chunk_id);
        let found = scan_file(
            &regex,
            file_name,
            &chunks,
            params.max_matches_per_file,
            params.context_lines,
        );
        if found.match_count > 0 {
            results.push(found);
        }
    }
    debug!(
        candidates,
        files = results.len(),
        "regex search complete"
    );

    Ok(RegexSearchResponse::new(
        &params.pattern,
        params.case_sensitive,
        file_types,
        results,
    ))
}

fn scan_file(
    regex: &Regex,
    file_name: String,
    chunks: &[Chunk],
    max_matches: usize,
    context_lines: usize,
) -> FileMatches {
    let mut matches = Vec::new();
    let mut truncated = false;
    let mut prev: Option<&Chunk> = None;
    for chunk in chunks {
        let skip = prev.map_or(0, |p| covered_lines(regex, p, chunk));
        let remaining = max_matches - matches.len();
        let (found, more) = scan_lines(regex, chunk, skip, remaining, context_lines);
        matches.extend(found);
        if more {
            truncated = true;
            break;
        }
        prev = Some(chunk);
    }
    FileMatches {
        file_name,
        match_count: matches.len(),
        truncated,
        matches,
    }
}

/// Number of leading lines of `next` whose text `prev` already holds.
///
/// With spans on both chunks, a line is covered when it ends inside the
/// overlapping range. A line that only starts there is covered when the
/// regex already matched the last line of `prev`. Without spans, only
/// adjacent chunk ids are compared, and the covered lines are the longest
/// run where the tail of `prev` lines up with the head of `next`.
fn covered_lines(regex: &Regex, prev: &Chunk, next: &Chunk) -> usize {
    match (prev.span(), next.span()) {
        (Some((prev_start, prev_end)), Some((next_start, _))) => {
            if next_start < prev_start || next_start >= prev_end {
                return 0;
            }
            let overlap = prev_end - next_start;
            let tail_matched = prev.content.lines().last().is_some_and(|l| regex.is_match(l));
            let mut start = 0;
            let mut covered = 0;
            for line in next.content.split('\n') {
                let line = line.strip_suffix('\r').unwrap_or(line);
                if start >= overlap {
                    break;
                }
                let end = start + line.chars().count();
                if end <= overlap || tail_matched {
                    covered += 1;
                }
                if end > overlap {
                    break;
                }
                start = end + 1;
            }
            covered.min(next.content.lines().count())
        }
        _ if next.chunk_id == prev.chunk_id + 1 => {
            let tail: Vec<&str> = prev.content.lines().collect();
            let head: Vec<&str> = next.content.lines().collect();
            (1..=tail.len().min(head.len()))
                .rev()
                .find(|&k| lines_line_up(&tail[tail.len() - k..], &head[..k]))
                .unwrap_or(0)
        }
        _ => 0,
    }
}

/// `next` may start mid-line and `prev` may end mid-line; inner lines must
/// be identical. Runs of blank lines never count.
fn lines_line_up(tail: &[&str], head: &[&str]) -> bool {
    let k = tail.len();
    if head.iter().all(|l| l.trim().is_empty()) {
        return false;
    }
    if !tail[0].ends_with(head[0]) || !head[k - 1].starts_with(tail[k - 1]) {
        return false;
    }
    if k == 1 {
        return true;
    }
    tail[1..k - 1] == head[1..k - 1]
}

/// Scan one chunk line by line, recording the first match on each line.
///
/// Line numbers are 1-based within the chunk and context never crosses a
/// chunk boundary. Stops after `limit` matches; the returned flag is set if
/// a further match was seen past the limit.
pub fn scan_chunk_lines(
    regex: &Regex,
    chunk: &Chunk,
    limit: usize,
    context_lines: usize,
) -> (Vec<LineMatch>, bool) {
    scan_lines(regex, chunk, 0, limit, context_lines)
}

/// Like [`scan_chunk_lines`], ignoring matches on the first `skip` lines.
fn scan_lines(
    regex: &Regex,
    chunk: &Chunk,
    skip: usize,
    limit: usize,
    context_lines: usize,
) -> (Vec<LineMatch>, bool) {
    let lines: Vec<&str> = chunk.content.lines().collect();
    let mut found = Vec::new();
    for (idx, line) in lines.iter().enumerate().skip(skip) {
        let Some(m) = regex.find(line) else {
            continue;
        };
        if found.len() == limit {
            return (found, true);
        }
        let before = idx.saturating_sub(context_lines);
        let after = (idx + 1 + context_lines).min(lines.len());
        found.push(LineMatch {
            chunk_id: chunk.chunk_id,
            line_number: idx + 1,
            matched_text: m.as_str().to_string(),
            line: line.to_string(),
            context_before: lines[before..idx].iter().map(|l| l.to_string()).collect(),
            context_after: lines[idx + 1..after].iter().map(|l| l.to_string()).collect(),
        });
    }
    (found, false)
}
