//! Core data types that flow through indexing and retrieval.

use std::path::PathBuf;

/// A file discovered in a source directory, with its content fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    pub fingerprint: String,
}

/// Metadata attached to every chunk and stored alongside every vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkMetadata {
    /// Absolute path of the file the chunk came from.
    pub source: String,
    /// 1-based page (PDF) or position within the file.
    pub page: u32,
    pub collection: String,
}

/// A span of extracted text, the unit of embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub text: String,
    pub metadata: ChunkMetadata,
}

/// A stored vector with its text and metadata.
#[derive(Debug, Clone)]
pub struct VectorRecord {
    pub id: String,
    pub embedding: Vec<f32>,
    pub document: String,
    pub metadata: ChunkMetadata,
}

/// A chunk returned from a similarity search, best match first.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}
