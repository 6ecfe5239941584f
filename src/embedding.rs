//! Embedding provider abstraction and vector utilities.
//!
//! - [`EmbeddingProvider`]: the seam between the indexer/retriever and the
//!   embedding service. [`OllamaEmbedder`] implements it against
//!   `POST /api/embeddings`.
//! - [`vec_to_blob`] / [`blob_to_vec`]: little-endian `f32` BLOB encoding
//!   used by the SQLite vector store.
//! - [`cosine_similarity`]: the store's ranking metric.

use anyhow::Result;
use async_trait::async_trait;

use crate::config::OllamaConfig;
use crate::error::DocuChatError;
use crate::ollama::OllamaClient;

/// Turns text into a fixed-length vector.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Model identifier, stored next to every vector.
    fn model_name(&self) -> &str;

    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Ollama embeddings: `{model, prompt}` → `{embedding: [...]}`.
pub struct OllamaEmbedder {
    client: OllamaClient,
}

impl OllamaEmbedder {
    pub fn new(config: &OllamaConfig) -> Result<Self> {
        Ok(Self {
            client: OllamaClient::new(config)?,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.client.config().embed_model
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let body = serde_json::json!({
            "model": self.model_name(),
            "prompt": text,
        });
        let json = self
            .client
            .post_json("embedding", "/api/embeddings", &body)
            .await?;
        parse_embedding_response(&json)
    }
}

fn parse_embedding_response(json: &serde_json::Value) -> Result<Vec<f32>> {
    let values = json
        .get("embedding")
        .and_then(|e| e.as_array())
        .ok_or_else(|| {
            DocuChatError::collaborator("embedding", "invalid response: missing embedding array")
        })?;
    if values.is_empty() {
        return Err(DocuChatError::collaborator("embedding", "empty embedding returned").into());
    }
    Ok(values
        .iter()
        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
        .collect())
}

/// Encode a float vector as little-endian `f32` bytes.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    vec.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Reverse of [`vec_to_blob`]. Trailing bytes that do not form a whole
/// `f32` are ignored.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity in `[-1.0, 1.0]`; `0.0` for empty, zero, or
/// mismatched-length vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }
    dot / denom
}
