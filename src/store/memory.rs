//! In-memory [`VectorStore`] for tests.

use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::models::{Chunk, ScoredChunk, VectorRecord};

use super::{rank, VectorStore};

struct StoredVector {
    record: VectorRecord,
    model: String,
}

#[derive(Default)]
pub struct InMemoryVectorStore {
    vectors: RwLock<Vec<StoredVector>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Models recorded for every stored vector, in insertion order.
    pub fn models(&self) -> Vec<String> {
        match self.vectors.read() {
            Ok(vecs) => vecs.iter().map(|sv| sv.model.clone()).collect(),
            Err(_) => Vec::new(),
        }
    }
}

fn poisoned() -> anyhow::Error {
    anyhow!("in-memory vector store lock poisoned")
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn insert(&self, record: &VectorRecord, model: &str) -> Result<()> {
        let mut vecs = self.vectors.write().map_err(|_| poisoned())?;
        vecs.push(StoredVector {
            record: record.clone(),
            model: model.to_string(),
        });
        Ok(())
    }

    async fn delete_source(&self, collection: &str, source: &str) -> Result<u64> {
        let mut vecs = self.vectors.write().map_err(|_| poisoned())?;
        let before = vecs.len();
        vecs.retain(|sv| {
            sv.record.metadata.collection != collection || sv.record.metadata.source != source
        });
        Ok((before - vecs.len()) as u64)
    }

    async fn has_source(&self, collection: &str, source: &str) -> Result<bool> {
        let vecs = self.vectors.read().map_err(|_| poisoned())?;
        Ok(vecs.iter().any(|sv| {
            sv.record.metadata.collection == collection && sv.record.metadata.source == source
        }))
    }

    async fn similarity_search(
        &self,
        query: &[f32],
        collection: Option<&str>,
        k: usize,
    ) -> Result<Vec<ScoredChunk>> {
        let vecs = self.vectors.read().map_err(|_| poisoned())?;
        let candidates = vecs
            .iter()
            .filter(|sv| collection.map_or(true, |c| sv.record.metadata.collection == c))
            .map(|sv| {
                (
                    Chunk {
                        text: sv.record.document.clone(),
                        metadata: sv.record.metadata.clone(),
                    },
                    sv.record.embedding.clone(),
                )
            });
        Ok(rank(candidates, query, k))
    }

    async fn count(&self, collection: Option<&str>) -> Result<u64> {
        let vecs = self.vectors.read().map_err(|_| poisoned())?;
        Ok(vecs
            .iter()
            .filter(|sv| collection.map_or(true, |c| sv.record.metadata.collection == c))
            .count() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChunkMetadata;

    fn record(collection: &str, source: &str, embedding: Vec<f32>) -> VectorRecord {
        VectorRecord {
            id: uuid::Uuid::new_v4().to_string(),
            embedding,
            document: format!("text of {}", source),
            metadata: ChunkMetadata {
                source: source.to_string(),
                page: 1,
                collection: collection.to_string(),
            },
        }
    }

    #[tokio::test]
    async fn filter_and_delete() {
        let store = InMemoryVectorStore::new();
        store.insert(&record("a", "/a/1.txt", vec![1.0, 0.0]), "m").await.unwrap();
        store.insert(&record("b", "/b/1.txt", vec![1.0, 0.0]), "m").await.unwrap();
        store.insert(&record("a", "/a/2.txt", vec![0.0, 1.0]), "m").await.unwrap();

        assert_eq!(store.count(None).await.unwrap(), 3);
        assert_eq!(store.count(Some("a")).await.unwrap(), 2);

        let hits = store.similarity_search(&[1.0, 0.0], Some("b"), 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.metadata.collection, "b");

        assert!(store.has_source("a", "/a/1.txt").await.unwrap());
        assert!(!store.has_source("b", "/a/1.txt").await.unwrap());
        assert_eq!(store.delete_source("a", "/a/1.txt").await.unwrap(), 1);
        assert!(!store.has_source("a", "/a/1.txt").await.unwrap());
        assert_eq!(store.count(None).await.unwrap(), 2);
        assert_eq!(store.models(), vec!["m".to_string(), "m".to_string()]);
    }
}
