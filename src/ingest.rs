//! Indexing pass orchestration.
//!
//! For each configured source: scan → change check → load and split the
//! new or modified files → [`CollectionIndexer::build_or_update`] →
//! rewrite the cache records of every changed file. The directories of the
//! sources being indexed are validated before any work starts; any later
//! failure aborts the pass.

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::chunk::chunk_sections;
use crate::config::{Config, SourceConfig};
use crate::embedding::{EmbeddingProvider, OllamaEmbedder};
use crate::error::DocuChatError;
use crate::extract::load_document;
use crate::hash_cache::HashCache;
use crate::indexer::{CollectionIndexer, IndexReport};
use crate::progress::{IndexProgressEvent, IndexProgressReporter};
use crate::scanner::scan_directory;
use crate::store::{SqliteVectorStore, VectorStore};

/// Outcome for one collection.
#[derive(Debug, Clone, Default)]
pub struct CollectionSummary {
    pub collection: String,
    pub files_found: usize,
    pub files_changed: usize,
    pub chunks: usize,
    pub up_to_date: bool,
    pub report: IndexReport,
}

/// Build an indexer over the configured cache, SQLite store, and Ollama
/// embedder. Creates the store on disk if it does not exist yet.
pub async fn open_indexer(config: &Config) -> Result<CollectionIndexer> {
    let store = SqliteVectorStore::create(&config.storage.vector_store_dir()).await?;
    let embedder = OllamaEmbedder::new(&config.ollama)?;
    Ok(CollectionIndexer::new(
        HashCache::new(config.storage.cache_file()),
        Arc::new(store) as Arc<dyn VectorStore>,
        Arc::new(embedder) as Arc<dyn EmbeddingProvider>,
        config.indexing.dedup,
    ))
}

/// Index every configured source, or only the one named `only`.
pub async fn run_index(
    config: &Config,
    only: Option<&str>,
    indexer: &mut CollectionIndexer,
    progress: &dyn IndexProgressReporter,
) -> Result<Vec<CollectionSummary>> {
    let sources: Vec<&SourceConfig> = match only {
        Some(name) => {
            let source = config.source_by_name(name).ok_or_else(|| {
                DocuChatError::config(format!("Unknown source '{}'. See `docuchat sources`.", name))
            })?;
            source.check()?;
            vec![source]
        }
        None => {
            config.check_sources()?;
            config.sources.iter().collect()
        }
    };

    let mut summaries = Vec::with_capacity(sources.len());
    for source in sources {
        let summary = index_source(config, source, indexer, progress)
            .await
            .with_context(|| format!("Indexing failed for source '{}'", source.collection_name()))?;
        summaries.push(summary);
    }
    Ok(summaries)
}

async fn index_source(
    config: &Config,
    source: &SourceConfig,
    indexer: &mut CollectionIndexer,
    progress: &dyn IndexProgressReporter,
) -> Result<CollectionSummary> {
    let collection = source.collection_name();
    progress.report(IndexProgressEvent::Scanning {
        collection: collection.clone(),
    });

    let scan = scan_directory(&source.path, &config.indexing)?;
    let mut summary = CollectionSummary {
        collection: collection.clone(),
        files_found: scan.files.len(),
        ..CollectionSummary::default()
    };

    let changes = indexer.cache().detect_changes(&scan.files, &collection)?;
    if changes.is_up_to_date() {
        tracing::info!(collection = %collection, "no changes detected, using existing index");
        progress.report(IndexProgressEvent::UpToDate {
            collection: collection.clone(),
            files: scan.files.len() as u64,
        });
        summary.up_to_date = true;
        return Ok(summary);
    }

    let changed = changes.changed;
    tracing::info!(
        collection = %collection,
        changed = changed.len(),
        "changes detected, reprocessing"
    );
    summary.files_changed = changed.len();

    let mut chunks = Vec::new();
    for (i, file) in changed.iter().enumerate() {
        let sections = load_document(&file.path);
        chunks.extend(chunk_sections(
            &file.path,
            &collection,
            &sections,
            &config.chunking,
        ));
        progress.report(IndexProgressEvent::Loading {
            collection: collection.clone(),
            n: i as u64 + 1,
            total: changed.len() as u64,
        });
    }
    summary.chunks = chunks.len();

    progress.report(IndexProgressEvent::Embedding {
        collection: collection.clone(),
        chunks: chunks.len() as u64,
    });
    summary.report = indexer
        .build_or_update(&chunks, &collection, &changed)
        .await?;

    // Files that produced no chunks are recorded too, so they are not
    // reloaded on every run.
    indexer.cache().record_all(&changed, &collection)?;
    Ok(summary)
}

/// Print the per-collection summary to stdout.
pub fn print_summary(summaries: &[CollectionSummary]) {
    for s in summaries {
        println!("index {}", s.collection);
        println!("  files found: {}", s.files_found);
        if s.up_to_date {
            println!("  up to date");
            continue;
        }
        println!("  files changed: {}", s.files_changed);
        println!("  chunks: {}", s.chunks);
        println!("  vectors written: {}", s.report.inserted);
        println!("  chunks skipped: {}", s.report.skipped);
        if s.report.replaced_files > 0 {
            println!("  files replaced: {}", s.report.replaced_files);
        }
    }
    println!("ok");
}
