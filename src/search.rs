//! `chunkseek semantic | lexical | regex` command runners.
//!
//! Each runner builds parameters from `[retrieval]` defaults, applies the
//! command-line overrides, and prints either a human-readable listing or
//! the JSON response used by the tool server.

use anyhow::Result;
use serde::Serialize;

use chunkseek_core::format::{
    LexicalSearchResponse, RegexSearchResponse, SemanticSearchResponse,
};
use chunkseek_core::store::Operator;

use crate::services::Services;

/// Command-line overrides for `chunkseek semantic`.
#[derive(Debug, Default)]
pub struct SemanticArgs {
    pub top_k: Option<i64>,
    pub min_score: Option<f64>,
    pub file_types: Vec<String>,
}

/// Command-line overrides for `chunkseek lexical`.
#[derive(Debug, Default)]
pub struct LexicalArgs {
    pub fields: Vec<String>,
    pub operator: Option<Operator>,
    pub top_k: Option<i64>,
    pub fuzzy: bool,
}

/// Command-line overrides for `chunkseek regex`.
#[derive(Debug, Default)]
pub struct RegexArgs {
    pub file_types: Vec<String>,
    pub ignore_case: bool,
    pub max_matches: Option<usize>,
    pub context: Option<usize>,
}

pub async fn run_semantic(services: &Services, query: &str, args: SemanticArgs, json: bool) -> Result<()> {
    let mut params = services.semantic_params(query);
    if let Some(top_k) = args.top_k {
        params.top_k = top_k;
    }
    if let Some(min_score) = args.min_score {
        params.min_score = min_score;
    }
    params.file_types = args.file_types;

    let response = services.semantic(&params).await?;
    if json {
        return print_json(&response);
    }
    print_semantic(&response);
    Ok(())
}

pub async fn run_lexical(services: &Services, query: &str, args: LexicalArgs, json: bool) -> Result<()> {
    let mut params = services.lexical_params(query);
    if !args.fields.is_empty() {
        params.fields = args.fields;
    }
    if let Some(operator) = args.operator {
        params.operator = operator;
    }
    if let Some(top_k) = args.top_k {
        params.top_k = top_k;
    }
    params.fuzzy = args.fuzzy;

    let response = services.lexical(&params).await?;
    if json {
        return print_json(&response);
    }
    print_lexical(&response);
    Ok(())
}

pub async fn run_regex(services: &Services, pattern: &str, args: RegexArgs, json: bool) -> Result<()> {
    let mut params = services.regex_params(pattern);
    params.file_types = args.file_types;
    params.case_sensitive = !args.ignore_case;
    if let Some(max) = args.max_matches {
        params.max_matches_per_file = max;
    }
    if let Some(context) = args.context {
        params.context_lines = context;
    }

    let response = services.regex(&params).await?;
    if json {
        return print_json(&response);
    }
    print_regex(&response);
    Ok(())
}

pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_semantic(response: &SemanticSearchResponse) {
    if response.results.is_empty() {
        println!("No results.");
        return;
    }
    for (i, hit) in response.results.iter().enumerate() {
        println!(
            "{}. [{:.3}] {} (chunk {})",
            i + 1,
            hit.score,
            hit.file_name,
            hit.chunk_id
        );
        println!("    {}", one_line(&hit.snippet));
        println!();
    }
}

fn print_lexical(response: &LexicalSearchResponse) {
    if response.results.is_empty() {
        println!("No results.");
        return;
    }
    for (i, hit) in response.results.iter().enumerate() {
        println!(
            "{}. [{:.3}] {} (chunk {})",
            i + 1,
            hit.score,
            hit.file_name,
            hit.chunk_id
        );
        if hit.highlights.is_empty() {
            println!("    {}", one_line(&hit.snippet));
        }
        for fragment in &hit.highlights {
            println!("    … {}", one_line(fragment));
        }
        println!();
    }
}

fn print_regex(response: &RegexSearchResponse) {
    if response.results.is_empty() {
        println!("No matches.");
        return;
    }
    for file in &response.results {
        let more = if file.truncated { "+" } else { "" };
        println!("{} ({}{} matches)", file.file_name, file.match_count, more);
        for m in &file.matches {
            for line in &m.context_before {
                println!("  chunk {}    | {}", m.chunk_id, line);
            }
            println!("  chunk {}:{:<3}> {}", m.chunk_id, m.line_number, m.line);
            for line in &m.context_after {
                println!("  chunk {}    | {}", m.chunk_id, line);
            }
        }
        println!();
    }
    println!(
        "{} matches in {} files",
        response.total_matches, response.files_matched
    );
}

fn one_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
