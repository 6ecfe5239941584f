//! Shared helpers for the CLI integration tests: a mock Ollama server and
//! a runner for the `docuchat` binary.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::io::AsyncWriteExt;

/// Words that get their own embedding dimension.
const VOCABULARY: [&str; 8] = [
    "rust",
    "cargo",
    "python",
    "learning",
    "kubernetes",
    "docker",
    "tax",
    "deadline",
];

#[derive(Clone, Default)]
pub struct MockState {
    pub embed_calls: Arc<AtomicUsize>,
    pub chat_calls: Arc<AtomicUsize>,
}

impl MockState {
    pub fn embed_calls(&self) -> usize {
        self.embed_calls.load(Ordering::SeqCst)
    }
}

pub struct MockOllama {
    pub base_url: String,
    pub state: MockState,
}

/// Bag-of-words over [`VOCABULARY`] plus a small constant dimension so no
/// vector is all zeros.
pub fn embed_text(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; VOCABULARY.len() + 1];
    v[VOCABULARY.len()] = 0.1;
    for word in text
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        if let Some(i) = VOCABULARY.iter().position(|v| *v == word) {
            v[i] += 1.0;
        }
    }
    v
}

async fn embeddings(State(state): State<MockState>, Json(body): Json<Value>) -> Json<Value> {
    state.embed_calls.fetch_add(1, Ordering::SeqCst);
    let prompt = body["prompt"].as_str().unwrap_or_default();
    Json(json!({ "embedding": embed_text(prompt) }))
}

/// Cites the first excerpt of the prompt twice.
async fn chat(State(state): State<MockState>, Json(body): Json<Value>) -> Json<Value> {
    state.chat_calls.fetch_add(1, Ordering::SeqCst);
    let user = body["messages"][1]["content"].as_str().unwrap_or_default();
    let first = user
        .lines()
        .find_map(|l| l.strip_prefix("Excerpt 1 from "))
        .and_then(|l| l.strip_suffix("):"))
        .and_then(|l| l.rsplit_once(" (Page "));
    let content = match first {
        Some((source, page)) => format!(
            "Answer from the documents [¶ {source}, Page: {page}]. Confirmed again [¶ {source}, Page: {page}]."
        ),
        None => "I don't know.".to_string(),
    };
    Json(json!({
        "model": body["model"],
        "message": { "role": "assistant", "content": content },
        "done": true,
    }))
}

pub async fn start_mock_ollama() -> MockOllama {
    let state = MockState::default();
    let app = Router::new()
        .route("/api/embeddings", post(embeddings))
        .route("/api/chat", post(chat))
        .with_state(state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    MockOllama {
        base_url: format!("http://{}", addr),
        state,
    }
}

/// Write `config/docuchat.toml` under `root` with one source per entry of
/// `sources` (directories under `root`, created if missing).
pub fn write_config(root: &Path, base_url: &str, sources: &[&str], extra: &str) -> PathBuf {
    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let mut content = format!(
        r#"[storage]
root = "{root}/db"
transcript_dir = "{root}/transcripts"

[ollama]
base_url = "{base_url}"
chat_model = "mock-chat"
embed_model = "mock-embed"
timeout_secs = 10
max_retries = 0

[chunking]
chunk_size = 200
chunk_overlap = 20
"#,
        root = root.display(),
        base_url = base_url,
    );
    for source in sources {
        let dir = root.join(source);
        fs::create_dir_all(&dir).unwrap();
        content.push_str(&format!("\n[[sources]]\npath = \"{}\"\n", dir.display()));
    }
    content.push_str(extra);

    let path = config_dir.join("docuchat.toml");
    fs::write(&path, content).unwrap();
    path
}

pub fn docuchat_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_docuchat"))
}

/// Start the binary with `--config config` (when given) and piped stdio,
/// with the environment overrides cleared.
pub fn spawn_docuchat(config: Option<&Path>, args: &[&str]) -> tokio::process::Child {
    let mut cmd = tokio::process::Command::new(docuchat_binary());
    if let Some(config) = config {
        cmd.arg("--config").arg(config);
    }
    for var in [
        "OLLAMA_BASE_URL",
        "OLLAMA_MODEL",
        "OLLAMA_EMBED_MODEL",
        "DOCUMENT_SOURCE_DIR",
        "DB_STORAGE_DIR",
        "TRANSCRIPT_DIR",
        "RUST_LOG",
    ] {
        cmd.env_remove(var);
    }
    cmd.args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .unwrap_or_else(|e| panic!("Failed to run docuchat: {}", e))
}

/// Run the binary with `--config config` (when given), feeding `stdin`.
/// Returns `(stdout, stderr, success)`.
pub async fn run_docuchat_with_stdin(
    config: Option<&Path>,
    args: &[&str],
    stdin: &str,
) -> (String, String, bool) {
    let mut child = spawn_docuchat(config, args);

    let mut input = child.stdin.take().unwrap();
    input.write_all(stdin.as_bytes()).await.unwrap();
    drop(input);

    let output = child.wait_with_output().await.unwrap();
    (
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
        output.status.success(),
    )
}

pub async fn run_docuchat(config: &Path, args: &[&str]) -> (String, String, bool) {
    run_docuchat_with_stdin(Some(config), args, "").await
}

/// Minimal `.docx`: a ZIP holding `word/document.xml` with one paragraph
/// per entry of `paragraphs`.
pub fn minimal_docx(paragraphs: &[&str]) -> Vec<u8> {
    use std::io::Write;
    let body: String = paragraphs
        .iter()
        .map(|p| format!("<w:p><w:r><w:t>{}</w:t></w:r></w:p>", p))
        .collect();
    let mut buf = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
        zip.start_file("word/document.xml", zip::write::SimpleFileOptions::default())
            .unwrap();
        let xml = format!(
            "<?xml version=\"1.0\"?><w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"><w:body>{}</w:body></w:document>",
            body
        );
        zip.write_all(xml.as_bytes()).unwrap();
        zip.finish().unwrap();
    }
    buf
}
