//! Vector storage for DocuChat.
//!
//! The [`VectorStore`] trait is the seam between the indexer/retriever and
//! the persisted vectors. Two backends exist:
//!
//! - [`SqliteVectorStore`]: one SQLite file under the storage root, used by
//!   the CLI.
//! - [`InMemoryVectorStore`]: a `Vec` behind a `RwLock`, used in tests.
//!
//! Search is brute-force cosine similarity over every record in scope. Both
//! backends rank with [`rank`], so ties keep insertion order.

pub mod memory;
pub mod sqlite;

pub use memory::InMemoryVectorStore;
pub use sqlite::SqliteVectorStore;

use anyhow::Result;
use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::models::{Chunk, ScoredChunk, VectorRecord};

/// Persisted vectors partitioned by collection.
///
/// Implementations must be `Send + Sync`; the indexer and the retrieval
/// gateway hold them behind an `Arc`.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert one record. `model` is the embedding model that produced it.
    async fn insert(&self, record: &VectorRecord, model: &str) -> Result<()>;

    /// Delete every record of `source` in `collection`; returns the number
    /// of records removed.
    async fn delete_source(&self, collection: &str, source: &str) -> Result<u64>;

    async fn has_source(&self, collection: &str, source: &str) -> Result<bool>;

    /// Top `k` records by cosine similarity to `query`, best first. With a
    /// `collection`, only records tagged with it are considered.
    async fn similarity_search(
        &self,
        query: &[f32],
        collection: Option<&str>,
        k: usize,
    ) -> Result<Vec<ScoredChunk>>;

    async fn count(&self, collection: Option<&str>) -> Result<u64>;

    /// Release backend resources. Further calls may fail.
    async fn close(&self) {}
}

/// Score `candidates` against `query` and keep the best `k`. Candidates
/// must be in insertion order; the sort is stable.
pub(crate) fn rank<I>(candidates: I, query: &[f32], k: usize) -> Vec<ScoredChunk>
where
    I: IntoIterator<Item = (Chunk, Vec<f32>)>,
{
    let mut scored: Vec<ScoredChunk> = candidates
        .into_iter()
        .map(|(chunk, vector)| ScoredChunk {
            score: cosine_similarity(query, &vector),
            chunk,
        })
        .collect();
    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    scored.truncate(k);
    scored
}
