//! Integration tests for document formats and chunk storage modes.

mod common;

use std::fs;

use common::{minimal_docx, run_docuchat, start_mock_ollama, write_config};
use tempfile::TempDir;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn docx_is_indexed_and_searchable() {
    let mock = start_mock_ollama().await;
    let tmp = TempDir::new().unwrap();
    let config = write_config(tmp.path(), &mock.base_url, &["files"], "");
    fs::write(
        tmp.path().join("files/deploy.docx"),
        minimal_docx(&["Kubernetes runbook.", "Docker images are rebuilt nightly."]),
    )
    .unwrap();
    fs::write(tmp.path().join("files/notes.txt"), "Tax deadline is in April.").unwrap();

    let (stdout, stderr, success) = run_docuchat(&config, &["index"]).await;
    assert!(success, "index failed: {}", stderr);
    assert!(stdout.contains("vectors written: 2"), "stdout: {}", stdout);

    let (stdout, _, success) =
        run_docuchat(&config, &["search", "kubernetes docker", "--limit", "1"]).await;
    assert!(success);
    assert!(stdout.contains("deploy.docx (page 1"), "stdout: {}", stdout);
    assert!(stdout.contains("Kubernetes runbook."));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unreadable_documents_do_not_fail_the_pass() {
    let mock = start_mock_ollama().await;
    let tmp = TempDir::new().unwrap();
    let config = write_config(tmp.path(), &mock.base_url, &["files"], "");
    fs::write(tmp.path().join("files/bad.pdf"), b"not a valid pdf").unwrap();
    fs::write(tmp.path().join("files/bad.docx"), b"not a zip").unwrap();
    fs::write(tmp.path().join("files/good.txt"), "Rust and cargo.").unwrap();

    let (stdout, stderr, success) = run_docuchat(&config, &["index"]).await;
    assert!(success, "index failed: {}", stderr);
    assert!(stdout.contains("files found: 3"));
    assert!(stdout.contains("vectors written: 1"), "stdout: {}", stdout);

    // Files without text are still cached, so the next pass is a no-op.
    let (stdout, _, success) = run_docuchat(&config, &["index"]).await;
    assert!(success);
    assert!(stdout.contains("up to date"), "stdout: {}", stdout);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn extensions_match_case_insensitively() {
    let mock = start_mock_ollama().await;
    let tmp = TempDir::new().unwrap();
    let config = write_config(tmp.path(), &mock.base_url, &["files"], "");
    fs::write(tmp.path().join("files/LOUD.TXT"), "Python shouting.").unwrap();
    fs::write(tmp.path().join("files/data.csv"), "python,csv").unwrap();

    let (stdout, stderr, success) = run_docuchat(&config, &["index"]).await;
    assert!(success, "{}", stderr);
    assert!(stdout.contains("files found: 1"), "stdout: {}", stdout);
}

fn long_document() -> String {
    (1..=12)
        .map(|i| format!("Paragraph {} talks about rust and cargo at some length.", i))
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn file_dedup_stores_first_chunk_only() {
    let mock = start_mock_ollama().await;
    let tmp = TempDir::new().unwrap();
    let config = write_config(tmp.path(), &mock.base_url, &["files"], "");
    fs::write(tmp.path().join("files/long.txt"), long_document()).unwrap();

    let (stdout, stderr, success) = run_docuchat(&config, &["index"]).await;
    assert!(success, "{}", stderr);
    assert!(stdout.contains("vectors written: 1"), "stdout: {}", stdout);
    assert!(!stdout.contains("chunks skipped: 0"), "stdout: {}", stdout);

    let (stdout, _, _) = run_docuchat(&config, &["search", "rust", "--limit", "10"]).await;
    assert_eq!(stdout.lines().filter(|l| l.starts_with(char::is_numeric)).count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn chunk_dedup_stores_every_chunk() {
    let mock = start_mock_ollama().await;
    let tmp = TempDir::new().unwrap();
    let config = write_config(
        tmp.path(),
        &mock.base_url,
        &["files"],
        "\n[indexing]\ndedup = \"chunk\"\n",
    );
    fs::write(tmp.path().join("files/long.txt"), long_document()).unwrap();

    let (stdout, stderr, success) = run_docuchat(&config, &["index"]).await;
    assert!(success, "{}", stderr);
    assert!(stdout.contains("chunks skipped: 0"), "stdout: {}", stdout);

    let (stdout, _, _) = run_docuchat(&config, &["search", "rust", "--limit", "50"]).await;
    let hits = stdout.lines().filter(|l| l.starts_with(char::is_numeric)).count();
    assert!(hits > 1, "stdout: {}", stdout);
    let pages: Vec<String> = (1..=hits).map(|p| format!("(page {},", p)).collect();
    assert!(pages.iter().all(|p| stdout.contains(p.as_str())), "stdout: {}", stdout);
}
