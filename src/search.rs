use std::sync::Arc;

use anyhow::{bail, Result};

use crate::config::Config;
use crate::embedding::OllamaEmbedder;
use crate::models::ScoredChunk;
use crate::retrieval::RetrievalGateway;

const SNIPPET_CHARS: usize = 240;

/// Gateway over the configured store directory and Ollama embedder.
pub fn gateway(config: &Config) -> Result<RetrievalGateway> {
    Ok(RetrievalGateway::new(
        config.storage.vector_store_dir(),
        Arc::new(OllamaEmbedder::new(&config.ollama)?),
    ))
}

/// Reject a `--collection` that no configured source produces.
pub fn check_collection(config: &Config, collection: Option<&str>) -> Result<()> {
    if let Some(name) = collection {
        if config.source_by_name(name).is_none() {
            bail!(
                "Unknown collection '{}'. Configured: {}",
                name,
                config
                    .sources
                    .iter()
                    .map(|s| s.collection_name())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }
    }
    Ok(())
}

pub async fn run_search(
    config: &Config,
    query: &str,
    collection: Option<&str>,
    limit: Option<usize>,
) -> Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }
    check_collection(config, collection)?;

    let gateway = gateway(config)?;
    let k = limit.unwrap_or(config.retrieval.k);
    let results = gateway
        .similarity_search_scored(query, collection, k)
        .await?;
    gateway.close().await;

    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }
    for (i, r) in results.iter().enumerate() {
        print_result(i + 1, r);
    }
    Ok(())
}

fn print_result(rank: usize, result: &ScoredChunk) {
    let meta = &result.chunk.metadata;
    println!(
        "{}. [{:.3}] {} (page {}, collection {})",
        rank, result.score, meta.source, meta.page, meta.collection
    );
    let snippet: String = result
        .chunk
        .text
        .chars()
        .take(SNIPPET_CHARS)
        .collect::<String>()
        .replace('\n', " ");
    println!("    {}", snippet);
}
