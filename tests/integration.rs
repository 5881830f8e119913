mod common;

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

use common::{answer, index_scenario, unreachable_base_url, FakeBackend, Reply, Script};

fn mnemora_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_mnemora"))
}

fn setup_test_env(base_url: &str) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let notes_dir = root.join("notes");
    fs::create_dir_all(&notes_dir).unwrap();
    fs::write(notes_dir.join("a.txt"), "tokio is an async runtime").unwrap();

    let config_content = format!(
        r#"[backend]
base_url = "{}"
request_timeout_secs = 5
connect_timeout_secs = 2

[monitor]
health_interval_secs = 1

[storage]
state_path = "{}/data/state.json"
"#,
        base_url,
        root.display()
    );

    let config_path = config_dir.join("mnemora.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_mnemora(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = mnemora_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .arg("--progress")
        .arg("off")
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run mnemora binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

/// Run the binary off the async runtime so the fake backend keeps serving.
async fn run_async(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let config_path = config_path.to_path_buf();
    let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
    tokio::task::spawn_blocking(move || {
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        run_mnemora(&config_path, &args)
    })
    .await
    .unwrap()
}

#[test]
fn test_status_with_backend_down() {
    let (_tmp, config_path) = setup_test_env(&unreachable_base_url());

    let (stdout, stderr, success) = run_mnemora(&config_path, &["status"]);
    assert!(success, "status failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("backend:  disconnected"));
    assert!(stdout.contains("ollama:   disconnected"));
    assert!(stdout.contains("model:    llama3.2:3b"));
}

#[test]
fn test_missing_config_uses_defaults() {
    let tmp = TempDir::new().unwrap();
    let config_path = tmp.path().join("absent.toml");

    let (stdout, stderr, success) = run_mnemora(&config_path, &["--help"]);
    assert!(success, "help failed: {}", stderr);
    assert!(stdout.contains("folders"));
}

#[test]
fn test_invalid_config_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let config_path = tmp.path().join("bad.toml");
    fs::write(&config_path, "[backend]\nbase_url = \"localhost:8000\"\n").unwrap();

    let (_, stderr, success) = run_mnemora(&config_path, &["folders", "list"]);
    assert!(!success);
    assert!(stderr.contains("base_url"), "stderr: {}", stderr);
}

#[test]
fn test_folders_list_empty() {
    let (_tmp, config_path) = setup_test_env(&unreachable_base_url());

    let (stdout, _, success) = run_mnemora(&config_path, &["folders", "list"]);
    assert!(success);
    assert!(stdout.contains("No folders indexed."));
}

#[test]
fn test_ask_requires_backend() {
    let (_tmp, config_path) = setup_test_env(&unreachable_base_url());

    let (_, stderr, success) = run_mnemora(&config_path, &["ask", "anything?"]);
    assert!(!success);
    assert!(stderr.contains("backend is disconnected"), "stderr: {}", stderr);
}

#[test]
fn test_index_with_backend_down_saves_nothing() {
    let (tmp, config_path) = setup_test_env(&unreachable_base_url());

    let (_, _, success) = run_mnemora(&config_path, &["index", "/docs"]);
    assert!(!success);
    assert!(!tmp.path().join("data").join("state.json").exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_index_then_list_then_remove() {
    let backend = FakeBackend::start(Script::default()).await;
    let (tmp, config_path) = setup_test_env(&backend.base_url);
    let notes = fs::canonicalize(tmp.path().join("notes")).unwrap();
    let notes = notes.to_str().unwrap().to_string();
    backend.script().index = Reply::sse(&index_scenario(&notes), 17);

    let (stdout, stderr, success) = run_async(&config_path, &["index", &notes]).await;
    assert!(success, "index failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("documents indexed: 1"));
    assert!(stdout.contains("files with errors: 1"));
    assert!(stdout.contains("b.pdf: encrypted"));
    assert!(stdout.contains("ok"));

    let (stdout, _, success) = run_async(&config_path, &["folders", "list"]).await;
    assert!(success);
    assert!(stdout.contains(&notes));

    let (stdout, stderr, success) = run_async(&config_path, &["folders", "remove", &notes]).await;
    assert!(success, "remove failed: {}", stderr);
    assert!(stdout.contains("removed"));
    assert_eq!(backend.recorded().deleted, vec![notes.clone()]);

    let (stdout, _, _) = run_async(&config_path, &["folders", "list"]).await;
    assert!(stdout.contains("No folders indexed."));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_remove_keeps_folder_when_backend_refuses() {
    let backend = FakeBackend::start(Script::default()).await;
    let (_tmp, config_path) = setup_test_env(&backend.base_url);
    backend.script().index = Reply::sse(&index_scenario("/docs"), 64);
    backend.script().delete_status = 500;

    let (_, _, success) = run_async(&config_path, &["index", "/docs"]).await;
    assert!(success);

    let (_, _, success) = run_async(&config_path, &["folders", "remove", "/docs"]).await;
    assert!(!success);

    let (stdout, _, _) = run_async(&config_path, &["folders", "list"]).await;
    assert!(stdout.contains("/docs"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_ask_streams_answer_and_sources() {
    let backend = FakeBackend::start(Script::default()).await;
    let (_tmp, config_path) = setup_test_env(&backend.base_url);
    backend.script().query = Reply::sse(&answer(&["Tokio ", "is an ", "async runtime."], true), 9);

    let (stdout, stderr, success) =
        run_async(&config_path, &["ask", "what is tokio?", "--model", "qwen2.5:7b"]).await;
    assert!(success, "ask failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Tokio is an async runtime."));
    assert!(stdout.contains("Sources:"));
    assert!(stdout.contains("[1] a.txt (87%)"));
    assert_eq!(backend.recorded().query_requests[0]["model"], "qwen2.5:7b");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_ask_reports_backend_error() {
    let backend = FakeBackend::start(Script::default()).await;
    let (_tmp, config_path) = setup_test_env(&backend.base_url);
    backend.script().query = Reply::sse(
        &[serde_json::json!({"type": "error", "message": "model not found"})],
        64,
    );

    let (_, stderr, success) = run_async(&config_path, &["ask", "hi"]).await;
    assert!(!success);
    assert!(stderr.contains("model not found"), "stderr: {}", stderr);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_status_and_models_with_backend_up() {
    let backend = FakeBackend::start(Script::default()).await;
    let (_tmp, config_path) = setup_test_env(&backend.base_url);

    let (stdout, _, success) = run_async(&config_path, &["status"]).await;
    assert!(success);
    assert!(stdout.contains("backend:  connected"));
    assert!(stdout.contains("ready:    true"));

    let (stdout, _, success) =
        run_async(&config_path, &["models", "--select", "nomic-embed-text:latest"]).await;
    assert!(success);
    assert!(stdout.contains("* nomic-embed-text:latest"));
    assert!(stdout.contains("2.0 GB"));

    let (_, stderr, success) = run_async(&config_path, &["models", "--select", "missing:1b"]).await;
    assert!(!success);
    assert!(stderr.contains("not installed"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_setup_pull() {
    let backend = FakeBackend::start(Script::default()).await;
    let (_tmp, config_path) = setup_test_env(&backend.base_url);
    backend.script().pull = Reply::sse(
        &[
            serde_json::json!({"status": "pulling manifest"}),
            serde_json::json!({"status": "success"}),
        ],
        7,
    );

    let (stdout, stderr, success) =
        run_async(&config_path, &["setup", "--pull", "llama3.2:3b"]).await;
    assert!(success, "setup failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("ready:            true"));
    assert!(stdout.contains("pulled llama3.2:3b"));
}
