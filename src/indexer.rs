//! Per-collection indexing into the vector store.
//!
//! [`CollectionIndexer`] turns chunks into vector records and keeps the
//! hash cache in step with what was actually written. It remembers what it
//! has inserted for as long as it lives, so the same file (or chunk) is
//! never embedded twice in one process.
//!
//! # Dedup modes
//!
//! - [`DedupMode::File`]: a file counts as processed after its first chunk
//!   is stored, so later chunks of that file are skipped for the rest of
//!   the run. Only the first chunk of a document ends up searchable.
//! - [`DedupMode::Chunk`]: every distinct `(source, page, text)` is stored.
//!
//! # Cache consistency
//!
//! A file's cache record is appended only after its vectors were written
//! (after the first insert in `File` mode, after its last chunk in `Chunk`
//! mode). A failing embed or insert aborts the batch before that point, so
//! the cache never claims a file whose write failed.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use uuid::Uuid;

use crate::config::DedupMode;
use crate::embedding::EmbeddingProvider;
use crate::hash_cache::{self, HashCache};
use crate::models::{Chunk, SourceFile, VectorRecord};
use crate::store::VectorStore;

/// Counts from one [`CollectionIndexer::build_or_update`] call.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IndexReport {
    /// Vector records written.
    pub inserted: usize,
    /// Chunks skipped because their key was already processed.
    pub skipped: usize,
    /// Files whose stale records were removed before re-insertion.
    pub replaced_files: usize,
    /// Files whose cache record was appended.
    pub files_recorded: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ProcessedKey {
    File {
        collection: String,
        source: String,
    },
    Chunk {
        collection: String,
        source: String,
        page: u32,
        text: String,
    },
}

pub struct CollectionIndexer {
    cache: HashCache,
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    dedup: DedupMode,
    processed: HashSet<ProcessedKey>,
    // (collection, source) pairs whose old records were already cleared.
    cleared: HashSet<(String, String)>,
}

impl CollectionIndexer {
    pub fn new(
        cache: HashCache,
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        dedup: DedupMode,
    ) -> Self {
        Self {
            cache,
            store,
            embedder,
            dedup,
            processed: HashSet::new(),
            cleared: HashSet::new(),
        }
    }

    pub fn cache(&self) -> &HashCache {
        &self.cache
    }

    pub fn store(&self) -> Arc<dyn VectorStore> {
        Arc::clone(&self.store)
    }

    /// True if `collection` has never been indexed or any of `files` is new
    /// or modified.
    pub fn needs_reindex(&self, files: &[PathBuf], collection: &str) -> Result<bool> {
        self.cache.has_changed(files, collection)
    }

    fn key_for(&self, chunk: &Chunk, collection: &str) -> ProcessedKey {
        match self.dedup {
            DedupMode::File => ProcessedKey::File {
                collection: collection.to_string(),
                source: chunk.metadata.source.clone(),
            },
            DedupMode::Chunk => ProcessedKey::Chunk {
                collection: collection.to_string(),
                source: chunk.metadata.source.clone(),
                page: chunk.metadata.page,
                text: chunk.text.clone(),
            },
        }
    }

    /// Embed and store every chunk not yet processed in this run.
    ///
    /// `files` supplies the fingerprints recorded in the cache; a chunk
    /// whose source is not among them is fingerprinted from disk. The
    /// first error from the embedder or the store aborts the batch; records
    /// written before it stay in the store.
    pub async fn build_or_update(
        &mut self,
        chunks: &[Chunk],
        collection: &str,
        files: &[SourceFile],
    ) -> Result<IndexReport> {
        let fingerprints: HashMap<String, &SourceFile> = files
            .iter()
            .map(|f| (f.path.to_string_lossy().to_string(), f))
            .collect();
        let mut last_chunk: HashMap<&str, usize> = HashMap::new();
        for (i, chunk) in chunks.iter().enumerate() {
            last_chunk.insert(chunk.metadata.source.as_str(), i);
        }

        let mut report = IndexReport::default();
        let mut written: HashSet<&str> = HashSet::new();

        for (i, chunk) in chunks.iter().enumerate() {
            let source = chunk.metadata.source.as_str();
            let key = self.key_for(chunk, collection);

            if self.processed.contains(&key) {
                report.skipped += 1;
            } else {
                self.clear_stale(collection, source, &mut report).await?;
                self.insert_chunk(chunk, collection).await?;
                self.processed.insert(key);
                report.inserted += 1;
                written.insert(source);

                if self.dedup == DedupMode::File {
                    self.record_file(source, collection, &fingerprints)?;
                    report.files_recorded += 1;
                }
            }

            if self.dedup == DedupMode::Chunk
                && last_chunk.get(source) == Some(&i)
                && written.contains(source)
            {
                self.record_file(source, collection, &fingerprints)?;
                report.files_recorded += 1;
            }
        }

        if self.dedup == DedupMode::File && report.skipped > 0 {
            tracing::warn!(
                collection,
                skipped = report.skipped,
                "file-level dedup stored only the first chunk of each file; set indexing.dedup = \"chunk\" to store all chunks"
            );
        }
        tracing::info!(
            collection,
            inserted = report.inserted,
            skipped = report.skipped,
            replaced = report.replaced_files,
            "collection indexed"
        );
        Ok(report)
    }

    async fn clear_stale(
        &mut self,
        collection: &str,
        source: &str,
        report: &mut IndexReport,
    ) -> Result<()> {
        let pair = (collection.to_string(), source.to_string());
        if self.cleared.contains(&pair) {
            return Ok(());
        }
        if self.store.has_source(collection, source).await? {
            let removed = self.store.delete_source(collection, source).await?;
            tracing::debug!(collection, source, removed, "removed stale vectors");
            report.replaced_files += 1;
        }
        self.cleared.insert(pair);
        Ok(())
    }

    async fn insert_chunk(&self, chunk: &Chunk, collection: &str) -> Result<()> {
        let embedding = self
            .embedder
            .embed(&chunk.text)
            .await
            .with_context(|| format!("Failed to embed chunk of {}", chunk.metadata.source))?;

        let mut metadata = chunk.metadata.clone();
        metadata.collection = collection.to_string();
        let record = VectorRecord {
            id: Uuid::new_v4().to_string(),
            embedding,
            document: chunk.text.clone(),
            metadata,
        };
        self.store
            .insert(&record, self.embedder.model_name())
            .await
            .with_context(|| format!("Failed to store chunk of {}", chunk.metadata.source))
    }

    fn record_file(
        &self,
        source: &str,
        collection: &str,
        fingerprints: &HashMap<String, &SourceFile>,
    ) -> Result<()> {
        let file = match fingerprints.get(source) {
            Some(f) => (*f).clone(),
            None => {
                let path = Path::new(source);
                SourceFile {
                    path: path.to_path_buf(),
                    fingerprint: hash_cache::fingerprint(path)?,
                }
            }
        };
        self.cache.append_one(&file, collection)
    }
}
