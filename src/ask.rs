use anyhow::Result;

use crate::citation::format_citations;
use crate::config::Config;
use crate::llm::{generate_answer, OllamaChat};
use crate::search::{check_collection, gateway};

/// Answer one question and print it with formatted citations.
pub async fn run_ask(config: &Config, question: &str, collection: Option<&str>) -> Result<()> {
    check_collection(config, collection)?;

    let gateway = gateway(config)?;
    let chunks = gateway
        .similarity_search(question, collection, config.retrieval.k)
        .await?;
    gateway.close().await;
    tracing::info!(chunks = chunks.len(), "retrieved context");

    let model = OllamaChat::new(&config.ollama)?;
    let raw = generate_answer(&model, question, &chunks).await?;
    println!("{}", format_citations(&raw));
    Ok(())
}
