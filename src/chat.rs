//! Interactive question/answer session.
//!
//! Each question runs retrieval → chat model → citation formatting. A
//! failing question is logged and reported, and the session goes on.
//! Cancellation arrives as a `watch` signal (the binary wires it to
//! Ctrl-C); on every exit path the thinking indicator is stopped, the
//! transcript is saved, and the store is closed, in that order. The signal
//! is also honoured during the indexing pass that precedes the session.
//!
//! Input lines come from [`spawn_line_reader`], which reads on a plain OS
//! thread. A pending `tokio::io::stdin` read would hold up runtime shutdown
//! after cancellation.

use std::collections::HashMap;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::citation::format_citations;
use crate::config::Config;
use crate::indexer::CollectionIndexer;
use crate::ingest::{self, CollectionSummary};
use crate::llm::{generate_answer, ChatModel, OllamaChat};
use crate::progress::ProgressMode;
use crate::retrieval::RetrievalGateway;
use crate::search::{check_collection, gateway};
use crate::transcript::Transcript;

/// Parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Quit,
    Sources,
    /// `None` selects all collections.
    Select(Option<String>),
    Ask(String),
    Empty,
    Unknown(String),
}

pub fn parse_command(line: &str) -> Command {
    let line = line.trim();
    if line.is_empty() {
        return Command::Empty;
    }
    if !line.starts_with('/') {
        return Command::Ask(line.to_string());
    }
    let (cmd, arg) = match line.split_once(char::is_whitespace) {
        Some((c, a)) => (c, a.trim()),
        None => (line, ""),
    };
    match cmd.to_lowercase().as_str() {
        "/quit" | "/exit" => Command::Quit,
        "/sources" => Command::Sources,
        "/source" if arg.is_empty() || arg.eq_ignore_ascii_case("all") => Command::Select(None),
        "/source" => Command::Select(Some(arg.to_string())),
        _ => Command::Unknown(cmd.to_string()),
    }
}

/// Why [`ChatSession::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    Quit,
    EndOfInput,
    Cancelled,
}

/// "Assistant is thinking..." on stderr while a question is in flight.
struct Spinner {
    stop: Option<watch::Sender<bool>>,
    handle: Option<JoinHandle<()>>,
}

impl Spinner {
    fn start(enabled: bool) -> Self {
        if !enabled {
            return Self {
                stop: None,
                handle: None,
            };
        }
        let (tx, mut rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            let frames = ['|', '/', '-', '\\'];
            let mut i = 0usize;
            loop {
                {
                    let mut err = std::io::stderr().lock();
                    let _ = write!(err, "\rAssistant is thinking... {}", frames[i % frames.len()]);
                    let _ = err.flush();
                }
                i += 1;
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_millis(100)) => {}
                    _ = rx.changed() => break,
                }
            }
            let mut err = std::io::stderr().lock();
            let _ = write!(err, "\r\x1b[K");
            let _ = err.flush();
        });
        Self {
            stop: Some(tx),
            handle: Some(handle),
        }
    }

    async fn stop(mut self) {
        if let Some(tx) = self.stop.take() {
            let _ = tx.send(true);
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

/// Read lines from `reader` on a dedicated thread. The channel closes at
/// end of input or after the first read error, which is forwarded.
pub fn spawn_line_reader<R>(reader: R) -> mpsc::Receiver<std::io::Result<String>>
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = mpsc::channel(16);
    std::thread::spawn(move || {
        for line in reader.lines() {
            let failed = line.is_err();
            if tx.blocking_send(line).is_err() || failed {
                break;
            }
        }
    });
    rx
}

/// Resolves once `cancel` carries `true`. A dropped sender never cancels.
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    loop {
        if *cancel.borrow_and_update() {
            return;
        }
        if cancel.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

pub struct ChatSession {
    gateway: Arc<RetrievalGateway>,
    model: Arc<dyn ChatModel>,
    k: usize,
    collections: Vec<String>,
    selected: Option<String>,
    transcript: Transcript,
    transcript_dir: Option<PathBuf>,
    response_cache: HashMap<String, String>,
    spinner_enabled: bool,
}

impl ChatSession {
    pub fn new(
        gateway: Arc<RetrievalGateway>,
        model: Arc<dyn ChatModel>,
        k: usize,
        collections: Vec<String>,
    ) -> Self {
        Self {
            gateway,
            model,
            k,
            collections,
            selected: None,
            transcript: Transcript::new(),
            transcript_dir: None,
            response_cache: HashMap::new(),
            spinner_enabled: atty::is(atty::Stream::Stderr),
        }
    }

    pub fn with_transcript_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.transcript_dir = dir;
        self
    }

    pub fn with_spinner(mut self, enabled: bool) -> Self {
        self.spinner_enabled = enabled;
        self
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    /// Restrict retrieval to `collection`, or search everything with
    /// `None`. Unknown names are rejected.
    pub fn select(&mut self, collection: Option<String>) -> Result<()> {
        if let Some(name) = &collection {
            if !self.collections.iter().any(|c| c == name) {
                anyhow::bail!(
                    "Unknown source '{}'. Available: {}",
                    name,
                    self.collections.join(", ")
                );
            }
        }
        self.selected = collection;
        Ok(())
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Retrieve, generate, and format an answer to `question`. The
    /// exchange is added to the transcript on success.
    pub async fn answer(&mut self, question: &str) -> Result<String> {
        self.transcript.push_user(question);

        let chunks = self
            .gateway
            .similarity_search(question, self.selected.as_deref(), self.k)
            .await?;
        tracing::info!(chunks = chunks.len(), "retrieved context");
        for (i, c) in chunks.iter().enumerate() {
            tracing::debug!(
                n = i + 1,
                source = %c.metadata.source,
                page = c.metadata.page,
                "context chunk"
            );
        }

        let raw = generate_answer(self.model.as_ref(), question, &chunks).await?;
        tracing::debug!(raw = %raw, "raw model response");
        let formatted = format_citations(&raw);

        if let Some(previous) = self.response_cache.get(question) {
            if previous != &formatted {
                tracing::warn!(
                    question,
                    previous = %previous,
                    current = %formatted,
                    "inconsistent responses for the same question"
                );
            }
        }
        self.response_cache
            .insert(question.to_string(), formatted.clone());
        self.transcript.push_assistant(&formatted);
        Ok(formatted)
    }

    fn print_sources(&self) {
        let current = self.selected.as_deref();
        let mark = |on: bool| if on { "*" } else { " " };
        println!("{} all", mark(current.is_none()));
        for c in &self.collections {
            println!("{} {}", mark(current == Some(c.as_str())), c);
        }
    }

    /// Read lines from `lines` until `/quit`, end of input, or
    /// cancellation, then save the transcript and close the store.
    pub async fn run(
        &mut self,
        mut lines: mpsc::Receiver<std::io::Result<String>>,
        mut cancel: watch::Receiver<bool>,
    ) -> Result<SessionEnd> {
        println!("Welcome to DocuChat!");
        println!("Type your questions, /sources, /source NAME|all, or /quit to exit.\n");

        let end = loop {
            print!("You: ");
            let _ = std::io::stdout().flush();

            let line = tokio::select! {
                line = lines.recv() => line,
                _ = cancelled(&mut cancel) => break SessionEnd::Cancelled,
            };
            let line = match line {
                Some(Ok(line)) => line,
                Some(Err(e)) => {
                    tracing::error!(error = %e, "failed to read input");
                    break SessionEnd::EndOfInput;
                }
                None => break SessionEnd::EndOfInput,
            };

            match parse_command(&line) {
                Command::Empty => continue,
                Command::Quit => break SessionEnd::Quit,
                Command::Sources => self.print_sources(),
                Command::Select(choice) => match self.select(choice) {
                    Ok(()) => println!(
                        "Searching: {}",
                        self.selected.as_deref().unwrap_or("all sources")
                    ),
                    Err(e) => println!("{}", e),
                },
                Command::Unknown(cmd) => println!("Unknown command: {}", cmd),
                Command::Ask(question) => {
                    let spinner = Spinner::start(self.spinner_enabled);
                    let outcome = tokio::select! {
                        res = self.answer(&question) => Some(res),
                        _ = cancelled(&mut cancel) => None,
                    };
                    spinner.stop().await;
                    match outcome {
                        None => break SessionEnd::Cancelled,
                        Some(Ok(response)) => println!("\nAssistant:\n\n{}\n", response),
                        Some(Err(e)) => {
                            tracing::error!(error = %format!("{:#}", e), "query failed");
                            println!("\nAn error occurred: {:#}\n", e);
                        }
                    }
                }
            }
        };

        match end {
            SessionEnd::Cancelled => println!("\nInterrupt received. Saving transcript and exiting..."),
            _ => println!("\nSaving transcript and exiting..."),
        }
        self.finish().await;
        Ok(end)
    }

    async fn finish(&mut self) {
        match &self.transcript_dir {
            Some(dir) => match self.transcript.save(dir) {
                Ok(Some(path)) => println!("Transcript saved to: {}", path.display()),
                Ok(None) => println!("No transcript saved: no conversation."),
                Err(e) => {
                    tracing::error!(error = %format!("{:#}", e), "failed to save transcript");
                    println!("Failed to save transcript: {:#}", e);
                }
            },
            None => println!("No transcript saved: no transcript directory configured."),
        }
        self.gateway.close().await;
        println!("Goodbye!");
    }
}

/// `docuchat chat`: index (unless `skip_index`), then run a session on
/// stdin until `/quit`, end of input, or `cancel`.
pub async fn run_chat(
    config: &Config,
    collection: Option<String>,
    skip_index: bool,
    mut cancel: watch::Receiver<bool>,
) -> Result<SessionEnd> {
    check_collection(config, collection.as_deref())?;
    let gateway = Arc::new(gateway(config)?);

    if !skip_index {
        let mut indexer = ingest::open_indexer(config).await?;
        let indexed = index_or_cancel(config, &mut indexer, &mut cancel).await;
        let store = indexer.store();
        let summaries = match indexed {
            Ok(Some(summaries)) => summaries,
            Ok(None) => {
                println!("\nInterrupt received during indexing. Exiting...");
                store.close().await;
                return Ok(SessionEnd::Cancelled);
            }
            Err(e) => {
                store.close().await;
                return Err(e);
            }
        };
        let files: usize = summaries.iter().map(|s| s.files_found).sum();
        println!("Setup complete. Processed {} files.\n", files);
        gateway.attach(store);
    }

    let model: Arc<dyn ChatModel> = Arc::new(OllamaChat::new(&config.ollama)?);
    let collections = config.sources.iter().map(|s| s.collection_name()).collect();
    let mut session = ChatSession::new(gateway, model, config.retrieval.k, collections)
        .with_transcript_dir(config.storage.transcript_dir.clone());
    session.select(collection)?;

    let lines = spawn_line_reader(std::io::BufReader::new(std::io::stdin()));
    session.run(lines, cancel).await
}

/// Run the indexing pass for every source unless `cancel` fires first.
/// `None` means cancelled; files whose vectors were fully written by then
/// keep their cache records.
pub async fn index_or_cancel(
    config: &Config,
    indexer: &mut CollectionIndexer,
    cancel: &mut watch::Receiver<bool>,
) -> Result<Option<Vec<CollectionSummary>>> {
    let progress = ProgressMode::default_for_tty().reporter();
    tokio::select! {
        res = ingest::run_index(config, None, indexer, progress.as_ref()) => res.map(Some),
        _ = cancelled(cancel) => {
            tracing::warn!("indexing cancelled");
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::EmbeddingProvider;
    use crate::llm::ChatMessage;
    use crate::models::{ChunkMetadata, VectorRecord};
    use crate::store::{InMemoryVectorStore, VectorStore};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct ConstEmbedder;

    #[async_trait]
    impl EmbeddingProvider for ConstEmbedder {
        fn model_name(&self) -> &str {
            "const"
        }
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![1.0, 0.0])
        }
    }

    /// Cites the first context excerpt; alternates wording per call.
    struct CitingModel {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ChatModel for CitingModel {
        fn model_name(&self) -> &str {
            "citing"
        }
        async fn chat(&self, messages: &[ChatMessage]) -> Result<String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if messages[1].content.contains("Question: fail") {
                anyhow::bail!("model exploded");
            }
            let source = messages[1]
                .content
                .lines()
                .find_map(|l| l.strip_prefix("Excerpt 1 from "))
                .and_then(|l| l.split(" (Page").next())
                .unwrap_or("none")
                .to_string();
            Ok(format!("Answer {} [¶ {}, Page: 1]", n % 2, source))
        }
    }

    async fn session(tmp: &TempDir) -> ChatSession {
        let store = Arc::new(InMemoryVectorStore::new());
        for (collection, source) in [("papers", "/p/a.pdf"), ("notes", "/n/b.txt")] {
            store
                .insert(
                    &VectorRecord {
                        id: uuid::Uuid::new_v4().to_string(),
                        embedding: vec![1.0, 0.0],
                        document: format!("content of {}", source),
                        metadata: ChunkMetadata {
                            source: source.to_string(),
                            page: 1,
                            collection: collection.to_string(),
                        },
                    },
                    "const",
                )
                .await
                .unwrap();
        }
        let gateway = Arc::new(RetrievalGateway::new(
            tmp.path().join("vector_store"),
            Arc::new(ConstEmbedder),
        ));
        gateway.attach(store as Arc<dyn VectorStore>);
        ChatSession::new(
            gateway,
            Arc::new(CitingModel {
                calls: AtomicUsize::new(0),
            }),
            4,
            vec!["papers".to_string(), "notes".to_string()],
        )
        .with_transcript_dir(Some(tmp.path().join("transcripts")))
        .with_spinner(false)
    }

    #[test]
    fn parses_commands() {
        assert_eq!(parse_command("  /quit "), Command::Quit);
        assert_eq!(parse_command("/QUIT"), Command::Quit);
        assert_eq!(parse_command("/sources"), Command::Sources);
        assert_eq!(parse_command("/source all"), Command::Select(None));
        assert_eq!(parse_command("/source"), Command::Select(None));
        assert_eq!(
            parse_command("/source papers"),
            Command::Select(Some("papers".to_string()))
        );
        assert_eq!(parse_command("   "), Command::Empty);
        assert_eq!(parse_command("/nope x"), Command::Unknown("/nope".to_string()));
        assert_eq!(
            parse_command("what is it?"),
            Command::Ask("what is it?".to_string())
        );
    }

    #[tokio::test]
    async fn answer_formats_citations_and_respects_selection() {
        let tmp = TempDir::new().unwrap();
        let mut s = session(&tmp).await;

        s.select(Some("notes".to_string())).unwrap();
        let out = s.answer("where?").await.unwrap();
        assert_eq!(out, "Answer 0 [1]\n\nReferences:\n\n1. /n/b.txt, Page: 1");

        assert!(s.select(Some("unknown".to_string())).is_err());
        assert_eq!(s.selected(), Some("notes"));
        s.select(None).unwrap();
        assert_eq!(s.selected(), None);
    }

    #[tokio::test]
    async fn failed_question_does_not_end_session() {
        let tmp = TempDir::new().unwrap();
        let mut s = session(&tmp).await;
        assert!(s.answer("fail").await.is_err());
        assert!(!s.transcript().has_exchange());
        assert!(s.answer("ok").await.is_ok());
        assert!(s.transcript().has_exchange());
    }

    #[tokio::test]
    async fn run_until_quit_saves_transcript() {
        let tmp = TempDir::new().unwrap();
        let mut s = session(&tmp).await;
        let (_tx, rx) = watch::channel(false);
        let input = std::io::Cursor::new(
            b"/source papers\nwhat is in a?\nfail\n/quit\nnever read\n".to_vec(),
        );

        let end = s.run(spawn_line_reader(input), rx).await.unwrap();
        assert_eq!(end, SessionEnd::Quit);

        let saved: Vec<_> = std::fs::read_dir(tmp.path().join("transcripts"))
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        assert_eq!(saved.len(), 1);
        let body = std::fs::read_to_string(&saved[0]).unwrap();
        assert!(body.contains("**User**: what is in a?"));
        assert!(body.contains("1. /p/a.pdf, Page: 1"));
        assert!(!body.contains("never read"));
    }

    #[tokio::test]
    async fn cancellation_ends_session() {
        let tmp = TempDir::new().unwrap();
        let mut s = session(&tmp).await;
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();

        // An input that never yields a line.
        let (_lines_tx, lines_rx) = mpsc::channel(1);
        let end = s.run(lines_rx, rx).await.unwrap();
        assert_eq!(end, SessionEnd::Cancelled);
        assert!(!tmp.path().join("transcripts").exists());
    }

    /// Never finishes an embedding within a test's lifetime.
    struct StalledEmbedder;

    #[async_trait]
    impl EmbeddingProvider for StalledEmbedder {
        fn model_name(&self) -> &str {
            "stalled"
        }
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            tokio::time::sleep(Duration::from_secs(600)).await;
            Ok(vec![1.0])
        }
    }

    #[tokio::test]
    async fn cancellation_interrupts_indexing() {
        let tmp = TempDir::new().unwrap();
        let docs = tmp.path().join("docs");
        std::fs::create_dir_all(&docs).unwrap();
        std::fs::write(docs.join("a.txt"), "some text to embed").unwrap();
        let config = Config::from_toml(&format!(
            "[storage]\nroot = \"{}\"\n\n[[sources]]\npath = \"{}\"\n",
            tmp.path().join("db").display(),
            docs.display()
        ))
        .unwrap();

        let store = Arc::new(InMemoryVectorStore::new());
        let mut indexer = CollectionIndexer::new(
            crate::hash_cache::HashCache::new(config.storage.cache_file()),
            store.clone(),
            Arc::new(StalledEmbedder),
            config.indexing.dedup,
        );
        let (tx, mut rx) = watch::channel(false);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let _ = tx.send(true);
        });

        let outcome = tokio::time::timeout(
            Duration::from_secs(10),
            index_or_cancel(&config, &mut indexer, &mut rx),
        )
        .await
        .expect("indexing did not stop on cancellation")
        .unwrap();
        assert!(outcome.is_none());
        assert_eq!(store.count(None).await.unwrap(), 0);
        assert!(!config.storage.cache_file().exists());
    }

    #[tokio::test]
    async fn dropped_sender_never_cancels() {
        let tmp = TempDir::new().unwrap();
        let mut s = session(&tmp).await;
        let (tx, rx) = watch::channel(false);
        drop(tx);
        let input = std::io::Cursor::new(b"/quit\n".to_vec());
        let end = s.run(spawn_line_reader(input), rx).await.unwrap();
        assert_eq!(end, SessionEnd::Quit);
    }
}
