//! In-process fake backend for integration tests.
//!
//! Serves the same routes as the real backend. Streaming replies are sent
//! as a chunked body cut at fixed byte offsets, so records routinely
//! straddle chunk boundaries. A reply can also hang open after its last
//! chunk to exercise cancellation.
#![allow(dead_code)]

use std::convert::Infallible;
use std::sync::{Arc, Mutex, MutexGuard};

use axum::body::{Body, Bytes};
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use futures::stream::{self, StreamExt};
use mnemora::client::BackendClient;
use mnemora::config::BackendConfig;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// A scripted streaming reply.
#[derive(Clone, Default)]
pub struct Reply {
    pub chunks: Vec<Vec<u8>>,
    /// Keep the body open after the last chunk.
    pub hang: bool,
    /// Fail the request with this status instead of streaming.
    pub status: Option<u16>,
}

impl Reply {
    /// `records` framed as `data: <json>\n\n`, cut every `chunk_size` bytes.
    pub fn sse(records: &[Value], chunk_size: usize) -> Self {
        Self {
            chunks: chunked(&sse_body(records), chunk_size),
            ..Self::default()
        }
    }

    pub fn status(code: u16) -> Self {
        Self {
            status: Some(code),
            ..Self::default()
        }
    }

    pub fn hanging(mut self) -> Self {
        self.hang = true;
        self
    }
}

pub fn sse_body(records: &[Value]) -> String {
    records
        .iter()
        .map(|r| format!("data: {}\n\n", r))
        .collect()
}

pub fn chunked(body: &str, chunk_size: usize) -> Vec<Vec<u8>> {
    body.as_bytes()
        .chunks(chunk_size.max(1))
        .map(<[u8]>::to_vec)
        .collect()
}

pub struct Script {
    /// `None` answers `/health` with a 500.
    pub health: Option<Value>,
    pub setup: Value,
    pub models: Value,
    pub index: Reply,
    pub query: Reply,
    pub pull: Reply,
    pub delete_status: u16,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            health: Some(json!({"status": "healthy", "ollama_status": "connected"})),
            setup: json!({
                "ready": true,
                "ollama_installed": true,
                "ollama_running": true,
                "has_llm": true,
                "has_embedding": true,
                "installed_llm": "llama3.2:3b",
                "installed_embedding": "nomic-embed-text",
                "recommended_llm": "llama3.2:3b",
                "recommended_embedding": "nomic-embed-text"
            }),
            models: json!({"models": [
                {"name": "llama3.2:3b", "size": 2019393189u64},
                {"name": "nomic-embed-text:latest", "size": 274302450u64}
            ]}),
            index: Reply::default(),
            query: Reply::default(),
            pull: Reply::default(),
            delete_status: 200,
        }
    }
}

#[derive(Default)]
pub struct Recorded {
    pub health_polls: usize,
    pub index_requests: Vec<Value>,
    pub query_requests: Vec<Value>,
    pub pull_requests: Vec<Value>,
    pub deleted: Vec<String>,
}

// Request bodies as the backend declares them. A body that does not match
// is rejected with 422 before the handler runs.

#[derive(Serialize, Deserialize)]
struct IndexRequest {
    folder_path: String,
}

#[derive(Serialize, Deserialize)]
struct QueryRequest {
    query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    top_k: Option<u32>,
}

#[derive(Serialize, Deserialize)]
struct PullModelRequest {
    model_name: String,
}

fn recorded_body<T: Serialize>(body: &T) -> Value {
    serde_json::to_value(body).unwrap()
}

#[derive(Clone)]
struct Shared {
    script: Arc<Mutex<Script>>,
    recorded: Arc<Mutex<Recorded>>,
}

pub struct FakeBackend {
    pub base_url: String,
    shared: Shared,
}

impl FakeBackend {
    pub async fn start(script: Script) -> Self {
        let shared = Shared {
            script: Arc::new(Mutex::new(script)),
            recorded: Arc::new(Mutex::new(Recorded::default())),
        };

        let app = Router::new()
            .route("/health", get(health))
            .route("/setup/status", get(setup_status))
            .route("/models", get(models))
            .route("/index", post(index))
            .route("/query", post(query))
            .route("/setup/pull-model", post(pull_model))
            .route("/folders/{path}", delete(delete_folder))
            .with_state(shared.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{}", addr),
            shared,
        }
    }

    pub fn script(&self) -> MutexGuard<'_, Script> {
        self.shared.script.lock().unwrap()
    }

    pub fn recorded(&self) -> MutexGuard<'_, Recorded> {
        self.shared.recorded.lock().unwrap()
    }

    pub fn config(&self) -> BackendConfig {
        BackendConfig {
            base_url: self.base_url.clone(),
            request_timeout_secs: 5,
            connect_timeout_secs: 2,
        }
    }

    pub fn client(&self) -> BackendClient {
        BackendClient::new(&self.config()).unwrap()
    }
}

/// A base URL nothing listens on.
pub fn unreachable_base_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

fn stream_reply(reply: Reply) -> Response {
    if let Some(code) = reply.status {
        let status = StatusCode::from_u16(code).unwrap();
        return (status, Json(json!({"detail": "scripted failure"}))).into_response();
    }

    let chunks = stream::iter(
        reply
            .chunks
            .into_iter()
            .map(|c| Ok::<_, Infallible>(Bytes::from(c))),
    );
    let body = if reply.hang {
        Body::from_stream(chunks.chain(stream::pending()))
    } else {
        Body::from_stream(chunks)
    };
    ([(header::CONTENT_TYPE, "text/event-stream")], body).into_response()
}

async fn health(State(s): State<Shared>) -> Response {
    s.recorded.lock().unwrap().health_polls += 1;
    let health = s.script.lock().unwrap().health.clone();
    match health {
        Some(body) => Json(body).into_response(),
        None => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

async fn setup_status(State(s): State<Shared>) -> Json<Value> {
    let setup = s.script.lock().unwrap().setup.clone();
    Json(setup)
}

async fn models(State(s): State<Shared>) -> Json<Value> {
    let models = s.script.lock().unwrap().models.clone();
    Json(models)
}

async fn index(State(s): State<Shared>, Json(body): Json<IndexRequest>) -> Response {
    s.recorded.lock().unwrap().index_requests.push(recorded_body(&body));
    let reply = s.script.lock().unwrap().index.clone();
    stream_reply(reply)
}

async fn query(State(s): State<Shared>, Json(body): Json<QueryRequest>) -> Response {
    s.recorded.lock().unwrap().query_requests.push(recorded_body(&body));
    let reply = s.script.lock().unwrap().query.clone();
    stream_reply(reply)
}

async fn pull_model(State(s): State<Shared>, Json(body): Json<PullModelRequest>) -> Response {
    s.recorded.lock().unwrap().pull_requests.push(recorded_body(&body));
    let reply = s.script.lock().unwrap().pull.clone();
    stream_reply(reply)
}

async fn delete_folder(State(s): State<Shared>, Path(path): Path<String>) -> Response {
    s.recorded.lock().unwrap().deleted.push(path);
    let code = s.script.lock().unwrap().delete_status;
    let status = StatusCode::from_u16(code).unwrap();
    if status.is_success() {
        Json(json!({"status": "deleted"})).into_response()
    } else {
        (status, Json(json!({"detail": "Folder not found"}))).into_response()
    }
}

/// The indexing run from the reference scenario: two files, one failure.
pub fn index_scenario(folder: &str) -> Vec<Value> {
    vec![
        json!({"type": "start", "folder": folder}),
        json!({"type": "discovery", "total_files": 2, "folder": folder}),
        json!({"type": "file_done", "current": 1, "total": 2, "percent": 50.0,
               "file": "a.txt", "file_path": format!("{}/a.txt", folder), "chunks": 3}),
        json!({"type": "file_error", "current": 2, "total": 2,
               "file": "b.pdf", "file_path": format!("{}/b.pdf", folder), "error": "encrypted"}),
        json!({"type": "embedding", "status": "Generating embeddings...", "total_chunks": 3}),
        json!({"type": "done", "processed": 1, "errors": 1,
               "error_files": [{"file": "b.pdf", "error": "encrypted"}]}),
    ]
}

pub fn answer(tokens: &[&str], with_done: bool) -> Vec<Value> {
    let mut records = vec![json!({"type": "sources", "sources": [
        {"file_path": "/docs/a.txt", "file_name": "a.txt", "score": 0.87,
         "content": "tokio is an async runtime", "chunk_index": 0}
    ]})];
    records.extend(
        tokens
            .iter()
            .map(|t| json!({"type": "token", "content": t})),
    );
    if with_done {
        records.push(json!({"type": "done"}));
    }
    records
}
