//! `chunkseek get` command runner.
//!
//! Reconstructs a file from its chunks and prints it. Ambiguous joins are
//! reported on stderr so that stdout carries only the file text.

use anyhow::Result;

use chunkseek_core::search::ContentParams;

use crate::search::print_json;
use crate::services::Services;

pub async fn run_get(services: &Services, file_name: &str, include_metadata: bool, json: bool) -> Result<()> {
    let params = ContentParams {
        include_metadata,
        ..ContentParams::new(file_name)
    };
    let response = services.content(&params).await?;

    if json {
        return print_json(&response);
    }

    if let Some(metadata) = &response.metadata {
        eprintln!("metadata: {}", serde_json::Value::Object(metadata.clone()));
    }
    if response.reconstruction_ambiguous {
        eprintln!(
            "warning: {} chunk boundaries joined without a detected overlap",
            response.ambiguous_boundaries.len()
        );
        for b in &response.ambiguous_boundaries {
            eprintln!("  chunk {} -> chunk {}", b.previous_chunk_id, b.next_chunk_id);
        }
    }
    print!("{}", response.content);
    if !response.content.ends_with('\n') {
        println!();
    }
    Ok(())
}
