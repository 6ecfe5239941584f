//! # DocuChat CLI (`docuchat`)
//!
//! ## Usage
//!
//! ```bash
//! docuchat --config ./config/docuchat.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docuchat index` | Index new and modified documents of every source |
//! | `docuchat search "<query>"` | Print the most similar passages |
//! | `docuchat ask "<question>"` | Answer one question with citations |
//! | `docuchat chat` | Index, then start an interactive session |
//! | `docuchat sources` | List sources and how many files are cached |
//! | `docuchat cite` | Format citation markers in text read from stdin |
//! | `docuchat cache compact` | Drop superseded hash cache records |
//!
//! Logs go to stderr. `-v` shows info, `-vv` debug; `RUST_LOG` overrides both.

use std::io::Read;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use docuchat::config::Config;
use docuchat::hash_cache::HashCache;
use docuchat::progress::ProgressMode;
use docuchat::{ask, chat, citation, ingest, search, sources};

/// DocuChat: ask questions about your documents and get cited answers.
///
/// All commands except `cite` read a TOML configuration file. See
/// `config/docuchat.example.toml` for every option.
#[derive(Parser)]
#[command(name = "docuchat", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docuchat.toml")]
    config: PathBuf,

    /// More log output on stderr (-v info, -vv debug).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index new and modified documents.
    ///
    /// Each source directory is a collection. A collection whose files are
    /// all unchanged since the last run is skipped entirely.
    Index {
        /// Only index the collection with this name.
        #[arg(long)]
        source: Option<String>,
    },

    /// Print the passages most similar to a query.
    Search {
        query: String,

        /// Restrict results to one collection.
        #[arg(long)]
        collection: Option<String>,

        /// Maximum number of results (defaults to `retrieval.k`).
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Answer a single question with citations.
    Ask {
        question: String,

        #[arg(long)]
        collection: Option<String>,
    },

    /// Index, then chat interactively.
    ///
    /// Commands: /sources, /source NAME|all, /quit. Ctrl-C saves the
    /// transcript and exits.
    Chat {
        /// Start with retrieval restricted to this collection.
        #[arg(long)]
        collection: Option<String>,

        /// Skip the indexing pass and use the existing store.
        #[arg(long)]
        no_index: bool,
    },

    /// List configured sources.
    Sources,

    /// Format `[¶ ...]` citation markers in text read from stdin.
    Cite,

    /// Hash cache maintenance.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Rewrite the cache keeping only the latest record per file.
    Compact,
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // Commands that don't need a config
    if let Commands::Cite = cli.command {
        let mut input = String::new();
        std::io::stdin()
            .read_to_string(&mut input)
            .context("Failed to read stdin")?;
        let formatted = citation::format_citations(&input);
        if formatted.ends_with('\n') {
            print!("{}", formatted);
        } else {
            println!("{}", formatted);
        }
        return Ok(());
    }

    let cfg = Config::load(&cli.config)?;

    match cli.command {
        Commands::Index { source } => {
            let mut indexer = ingest::open_indexer(&cfg).await?;
            let progress = ProgressMode::default_for_tty().reporter();
            let result =
                ingest::run_index(&cfg, source.as_deref(), &mut indexer, progress.as_ref()).await;
            indexer.store().close().await;
            ingest::print_summary(&result?);
        }
        Commands::Search {
            query,
            collection,
            limit,
        } => {
            search::run_search(&cfg, &query, collection.as_deref(), limit).await?;
        }
        Commands::Ask {
            question,
            collection,
        } => {
            ask::run_ask(&cfg, &question, collection.as_deref()).await?;
        }
        Commands::Chat {
            collection,
            no_index,
        } => {
            let (cancel_tx, cancel_rx) = tokio::sync::watch::channel(false);
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    let _ = cancel_tx.send(true);
                }
            });
            chat::run_chat(&cfg, collection, no_index, cancel_rx).await?;
        }
        Commands::Sources => {
            sources::list_sources(&cfg)?;
        }
        Commands::Cache { action } => match action {
            CacheAction::Compact => {
                let cache = HashCache::new(cfg.storage.cache_file());
                let (before, after) = cache.compact()?;
                println!(
                    "compacted {}: {} -> {} records",
                    cache.path().display(),
                    before,
                    after
                );
            }
        },
        Commands::Cite => {
            // Handled above (before config loading)
            unreachable!()
        }
    }

    Ok(())
}
