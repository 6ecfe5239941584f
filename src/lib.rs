//! # DocuChat
//!
//! Chat with a personal document corpus. Source directories are indexed
//! incrementally into a local vector store, questions are answered by a
//! language model from the most similar passages, and the model's inline
//! citation markers are turned into a numbered reference list.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌────────────┐   ┌──────────────────┐   ┌────────────┐
//! │ Sources  │──▶│ Hash Cache │──▶│ Collection       │──▶│  SQLite    │
//! │ pdf/txt/ │   │ (changed?) │   │ Indexer          │   │  vectors   │
//! │ docx     │   └────────────┘   │ extract → split  │   └─────┬──────┘
//! └──────────┘                    │ → embed → insert │         │
//!                                 └──────────────────┘         ▼
//!            ┌──────────────┐   ┌──────────────┐   ┌──────────────────┐
//!            │  Citations   │◀──│  Chat model  │◀──│ Retrieval        │
//!            │  [1], [2] …  │   │  (Ollama)    │   │ Gateway          │
//!            └──────────────┘   └──────────────┘   └──────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! docuchat index                        # index every configured source
//! docuchat search "tax deadlines"       # top passages
//! docuchat ask "When is the deadline?"  # one cited answer
//! docuchat chat --collection papers     # interactive session
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and environment overrides |
//! | [`hash_cache`] | Content fingerprints for change detection |
//! | [`scanner`] | Source directory walk |
//! | [`extract`] | PDF / text / DOCX loading |
//! | [`chunk`] | Overlapping text splitter |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`store`] | Vector store trait, SQLite and in-memory backends |
//! | [`indexer`] | Per-collection indexing |
//! | [`ingest`] | Indexing pass over all sources |
//! | [`retrieval`] | Lazy-attach similarity search |
//! | [`llm`] | Chat model abstraction and prompt |
//! | [`citation`] | Citation marker formatting |
//! | [`chat`] | Interactive session |

pub mod ask;
pub mod chat;
pub mod chunk;
pub mod citation;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod hash_cache;
pub mod indexer;
pub mod ingest;
pub mod llm;
pub mod migrate;
pub mod models;
pub mod ollama;
pub mod progress;
pub mod retrieval;
pub mod scanner;
pub mod search;
pub mod sources;
pub mod store;
pub mod transcript;
