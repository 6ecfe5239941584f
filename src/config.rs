//! TOML configuration with environment overrides.
//!
//! ```toml
//! [storage]
//! root = "~/.local/share/docuchat"
//! transcript_dir = "~/Documents/docuchat-transcripts"
//!
//! [[sources]]
//! path = "~/Documents/papers"
//!
//! [ollama]
//! base_url = "http://localhost:11434"
//! chat_model = "llama3.1:latest"
//! embed_model = "mxbai-embed-large"
//!
//! [chunking]
//! chunk_size = 1000
//! chunk_overlap = 200
//!
//! [retrieval]
//! k = 4
//!
//! [indexing]
//! dedup = "file"
//! ```
//!
//! After parsing, [`Config::apply_env`] lets the environment win for the
//! handful of settings that are commonly changed per shell:
//! `OLLAMA_BASE_URL`, `OLLAMA_MODEL`, `OLLAMA_EMBED_MODEL`,
//! `DOCUMENT_SOURCE_DIR` (colon-separated), `DB_STORAGE_DIR` and
//! `TRANSCRIPT_DIR`.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::DocuChatError;

/// File name of the hash cache under the storage root.
pub const CACHE_FILE_NAME: &str = "document_cache.txt";
/// Subdirectory of the storage root that holds the vector store.
pub const VECTOR_STORE_DIR: &str = "vector_store";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub storage: StorageConfig,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
    #[serde(default)]
    pub ollama: OllamaConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub indexing: IndexingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub root: PathBuf,
    #[serde(default)]
    pub transcript_dir: Option<PathBuf>,
}

impl StorageConfig {
    pub fn cache_file(&self) -> PathBuf {
        self.root.join(CACHE_FILE_NAME)
    }

    pub fn vector_store_dir(&self) -> PathBuf {
        self.root.join(VECTOR_STORE_DIR)
    }
}

/// One source directory. Its collection name defaults to the directory name.
#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    pub path: PathBuf,
    #[serde(default)]
    pub name: Option<String>,
}

impl SourceConfig {
    /// The source path must be an existing directory.
    pub fn check(&self) -> Result<(), DocuChatError> {
        if !self.path.is_dir() {
            return Err(DocuChatError::config(format!(
                "Invalid source directory: {}. Please check your configuration.",
                self.path.display()
            )));
        }
        Ok(())
    }

    pub fn collection_name(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| self.path.to_string_lossy().to_string())
    }
}

/// Connection settings for the Ollama service. Passed explicitly to the
/// embedding and chat clients.
#[derive(Debug, Deserialize, Clone)]
pub struct OllamaConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_chat_model")]
    pub chat_model: String,
    #[serde(default = "default_embed_model")]
    pub embed_model: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            chat_model: default_chat_model(),
            embed_model: default_embed_model(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_chat_model() -> String {
    "llama3.1:latest".to_string()
}
fn default_embed_model() -> String {
    "mxbai-embed-large".to_string()
}
fn default_timeout_secs() -> u64 {
    120
}
fn default_max_retries() -> u32 {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    1000
}
fn default_chunk_overlap() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_k")]
    pub k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { k: default_k() }
    }
}

fn default_k() -> usize {
    4
}

/// How the indexer decides that a chunk was already written in this run.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DedupMode {
    /// One insert per source file per run: only the first chunk of a
    /// multi-chunk file is persisted.
    #[default]
    File,
    /// One insert per distinct `(source, page, text)`: every chunk is
    /// persisted.
    Chunk,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexingConfig {
    #[serde(default)]
    pub dedup: DedupMode,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            dedup: DedupMode::default(),
            include_globs: default_include_globs(),
            follow_symlinks: false,
        }
    }
}

fn default_include_globs() -> Vec<String> {
    vec![
        "**/*.pdf".to_string(),
        "**/*.txt".to_string(),
        "**/*.docx".to_string(),
    ]
}

impl Config {
    /// Read, parse, apply environment overrides, and validate.
    pub fn load(path: &Path) -> Result<Config> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let mut config = Config::from_toml(&content)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Config> {
        toml::from_str(content).with_context(|| "Failed to parse config file")
    }

    /// Override settings from the environment. `lookup` is `std::env::var`
    /// in production and a map in tests.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("OLLAMA_BASE_URL") {
            self.ollama.base_url = v;
        }
        if let Some(v) = lookup("OLLAMA_MODEL") {
            self.ollama.chat_model = v;
        }
        if let Some(v) = lookup("OLLAMA_EMBED_MODEL") {
            self.ollama.embed_model = v;
        }
        if let Some(v) = lookup("DOCUMENT_SOURCE_DIR") {
            self.sources = v
                .split(':')
                .filter(|p| !p.trim().is_empty())
                .map(|p| SourceConfig {
                    path: PathBuf::from(p.trim()),
                    name: None,
                })
                .collect();
        }
        if let Some(v) = lookup("DB_STORAGE_DIR") {
            self.storage.root = PathBuf::from(v);
        }
        if let Some(v) = lookup("TRANSCRIPT_DIR") {
            self.storage.transcript_dir = if v.is_empty() {
                None
            } else {
                Some(PathBuf::from(v))
            };
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunking.chunk_size == 0 {
            bail!("chunking.chunk_size must be > 0");
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            bail!(
                "chunking.chunk_overlap ({}) must be smaller than chunking.chunk_size ({})",
                self.chunking.chunk_overlap,
                self.chunking.chunk_size
            );
        }
        if self.retrieval.k == 0 {
            bail!("retrieval.k must be >= 1");
        }
        if self.ollama.base_url.trim().is_empty() {
            bail!("ollama.base_url must not be empty");
        }

        let mut seen = std::collections::HashSet::new();
        for source in &self.sources {
            let name = source.collection_name();
            if name.contains(':') {
                bail!(
                    "collection name '{}' must not contain ':' (it is the cache field separator)",
                    name
                );
            }
            if !seen.insert(name.clone()) {
                bail!("duplicate collection name '{}' in [[sources]]", name);
            }
        }
        Ok(())
    }

    /// Fails with [`DocuChatError::Configuration`] if any source directory
    /// is missing. Called before any indexing work starts.
    pub fn check_sources(&self) -> Result<(), DocuChatError> {
        if self.sources.is_empty() {
            return Err(DocuChatError::config(
                "no [[sources]] configured and DOCUMENT_SOURCE_DIR is not set",
            ));
        }
        self.sources.iter().try_for_each(SourceConfig::check)
    }

    pub fn source_by_name(&self, name: &str) -> Option<&SourceConfig> {
        self.sources.iter().find(|s| s.collection_name() == name)
    }
}
