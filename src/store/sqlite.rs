//! SQLite-backed [`VectorStore`].
//!
//! Vectors live in the `vector_records` table as little-endian `f32`
//! BLOBs next to their text and metadata. Search loads the rows in scope
//! and ranks them in process.

use std::path::{Path, PathBuf};

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use crate::db;
use crate::embedding::{blob_to_vec, vec_to_blob};
use crate::error::DocuChatError;
use crate::migrate;
use crate::models::{Chunk, ChunkMetadata, ScoredChunk, VectorRecord};

use super::{rank, VectorStore};

const SERVICE: &str = "vector store";

fn store_err(e: impl std::fmt::Display) -> anyhow::Error {
    DocuChatError::collaborator(SERVICE, e.to_string()).into()
}

pub struct SqliteVectorStore {
    pool: SqlitePool,
    path: PathBuf,
}

impl SqliteVectorStore {
    /// Open the store in `store_dir`, creating the directory, database
    /// file, and schema if needed.
    pub async fn create(store_dir: &Path) -> Result<Self> {
        let path = db::db_path(store_dir);
        let pool = db::connect(&path, true).await.map_err(store_err)?;
        migrate::run_migrations(&pool).await.map_err(store_err)?;
        tracing::debug!(path = %path.display(), "vector store opened");
        Ok(Self { pool, path })
    }

    /// Open an existing store. Fails with [`DocuChatError::NotInitialized`]
    /// when `store_dir` holds no database.
    pub async fn open_existing(store_dir: &Path) -> Result<Self> {
        let path = db::db_path(store_dir);
        if !path.is_file() {
            return Err(DocuChatError::NotInitialized {
                path: store_dir.to_path_buf(),
            }
            .into());
        }
        let pool = db::connect(&path, false).await.map_err(store_err)?;
        migrate::run_migrations(&pool).await.map_err(store_err)?;
        tracing::debug!(path = %path.display(), "vector store attached");
        Ok(Self { pool, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn insert(&self, record: &VectorRecord, model: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO vector_records (id, collection, source, page, document,
                                        embedding, model, dims, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.id)
        .bind(&record.metadata.collection)
        .bind(&record.metadata.source)
        .bind(record.metadata.page as i64)
        .bind(&record.document)
        .bind(vec_to_blob(&record.embedding))
        .bind(model)
        .bind(record.embedding.len() as i64)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(())
    }

    async fn delete_source(&self, collection: &str, source: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM vector_records WHERE collection = ? AND source = ?")
            .bind(collection)
            .bind(source)
            .execute(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(result.rows_affected())
    }

    async fn has_source(&self, collection: &str, source: &str) -> Result<bool> {
        let row = sqlx::query(
            "SELECT EXISTS(SELECT 1 FROM vector_records WHERE collection = ? AND source = ?)",
        )
        .bind(collection)
        .bind(source)
        .fetch_one(&self.pool)
        .await
        .map_err(store_err)?;
        let exists: i64 = row.get(0);
        Ok(exists != 0)
    }

    async fn similarity_search(
        &self,
        query: &[f32],
        collection: Option<&str>,
        k: usize,
    ) -> Result<Vec<ScoredChunk>> {
        let rows = match collection {
            Some(c) => {
                sqlx::query(
                    "SELECT collection, source, page, document, embedding FROM vector_records \
                     WHERE collection = ? ORDER BY rowid",
                )
                .bind(c)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query(
                    "SELECT collection, source, page, document, embedding FROM vector_records \
                     ORDER BY rowid",
                )
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(store_err)?;

        let candidates = rows.iter().map(|row| {
            let page: i64 = row.get("page");
            let blob: Vec<u8> = row.get("embedding");
            (
                Chunk {
                    text: row.get("document"),
                    metadata: ChunkMetadata {
                        source: row.get("source"),
                        page: page.max(0) as u32,
                        collection: row.get("collection"),
                    },
                },
                blob_to_vec(&blob),
            )
        });
        Ok(rank(candidates, query, k))
    }

    async fn count(&self, collection: Option<&str>) -> Result<u64> {
        let row = match collection {
            Some(c) => {
                sqlx::query("SELECT COUNT(*) FROM vector_records WHERE collection = ?")
                    .bind(c)
                    .fetch_one(&self.pool)
                    .await
            }
            None => {
                sqlx::query("SELECT COUNT(*) FROM vector_records")
                    .fetch_one(&self.pool)
                    .await
            }
        }
        .map_err(store_err)?;
        let n: i64 = row.get(0);
        Ok(n.max(0) as u64)
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
