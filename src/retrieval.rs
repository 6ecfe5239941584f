//! Query path: lazy attach to the persisted vector store, then search.
//!
//! The gateway opens the SQLite store the first time a query needs it and
//! keeps that handle for the rest of the process. A store built during the
//! current run can be handed over with [`RetrievalGateway::attach`] so a
//! fresh index is searchable without reopening it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::OnceCell;

use crate::embedding::EmbeddingProvider;
use crate::models::{Chunk, ScoredChunk};
use crate::store::{SqliteVectorStore, VectorStore};

pub struct RetrievalGateway {
    store_dir: PathBuf,
    embedder: Arc<dyn EmbeddingProvider>,
    store: OnceCell<Arc<dyn VectorStore>>,
}

impl RetrievalGateway {
    pub fn new(store_dir: impl Into<PathBuf>, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            store_dir: store_dir.into(),
            embedder,
            store: OnceCell::new(),
        }
    }

    pub fn store_dir(&self) -> &Path {
        &self.store_dir
    }

    /// Use `store` for all further queries. Returns `false` (and keeps the
    /// current handle) if a store is already attached.
    pub fn attach(&self, store: Arc<dyn VectorStore>) -> bool {
        self.store.set(store).is_ok()
    }

    pub fn is_attached(&self) -> bool {
        self.store.initialized()
    }

    async fn store(&self) -> Result<&Arc<dyn VectorStore>> {
        self.store
            .get_or_try_init(|| async {
                let store = SqliteVectorStore::open_existing(&self.store_dir).await?;
                tracing::info!(path = %store.path().display(), "attached to vector store");
                Ok::<Arc<dyn VectorStore>, anyhow::Error>(Arc::new(store))
            })
            .await
    }

    /// Up to `k` chunks most similar to `query`, best first. With a
    /// `collection`, only chunks of that collection are returned.
    ///
    /// Fails with [`DocuChatError::NotInitialized`](crate::error::DocuChatError)
    /// if no store exists on disk and none was attached.
    pub async fn similarity_search(
        &self,
        query: &str,
        collection: Option<&str>,
        k: usize,
    ) -> Result<Vec<Chunk>> {
        Ok(self
            .similarity_search_scored(query, collection, k)
            .await?
            .into_iter()
            .map(|s| s.chunk)
            .collect())
    }

    pub async fn similarity_search_scored(
        &self,
        query: &str,
        collection: Option<&str>,
        k: usize,
    ) -> Result<Vec<ScoredChunk>> {
        let store = self.store().await?;
        let query_vec = self
            .embedder
            .embed(query)
            .await
            .context("Failed to embed query")?;
        let results = store.similarity_search(&query_vec, collection, k).await?;
        tracing::debug!(
            collection = collection.unwrap_or("*"),
            k,
            hits = results.len(),
            "similarity search"
        );
        Ok(results)
    }

    pub async fn close(&self) {
        if let Some(store) = self.store.get() {
            store.close().await;
        }
    }
}
