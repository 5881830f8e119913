//! Wire events carried by the backend's streaming endpoints.
//!
//! Every long-running endpoint answers with newline-delimited
//! `data: <json>` frames. The `/index` and `/query` streams tag each
//! record with a `type` field; the `/setup/pull-model` stream forwards the
//! model runtime's own progress records, which are discriminated by their
//! `status` field instead.
//!
//! | Stream | Type | Tags |
//! |--------|------|------|
//! | `POST /index` | [`IndexEvent`] | `start`, `discovery`, `file_done`, `file_error`, `embedding`, `done`, `error` |
//! | `POST /query` | [`QueryEvent`] | `sources`, `token`, `done`, `error` |
//! | `POST /setup/pull-model` | [`PullEvent`] | `status`, `error` (by `status` value) |
//!
//! Tags this client does not know decode to an explicit `Unknown` variant
//! and are ignored by the reducers. A known tag with a malformed payload is
//! a decode error and the frame is dropped by the
//! [`FrameDecoder`](crate::frame::FrameDecoder).

use serde::{Deserialize, Serialize};

use crate::models::Source;

/// One record of the folder indexing stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IndexEvent {
    /// First record of every run.
    Start {
        #[serde(default)]
        folder: Option<String>,
    },
    /// The backend finished walking the folder.
    Discovery {
        total_files: u64,
        #[serde(default)]
        folder: Option<String>,
    },
    /// One file was parsed and chunked.
    FileDone {
        current: u64,
        total: u64,
        #[serde(default)]
        percent: f64,
        file: String,
        #[serde(default)]
        file_path: Option<String>,
        #[serde(default)]
        chunks: Option<u64>,
    },
    /// One file failed. Non-fatal: the run continues.
    FileError {
        current: u64,
        total: u64,
        file: String,
        #[serde(default)]
        file_path: Option<String>,
        error: String,
    },
    /// All files are processed and embeddings are being generated.
    Embedding {
        status: String,
        #[serde(default)]
        total_chunks: Option<u64>,
    },
    /// Terminal success.
    Done {
        processed: u64,
        errors: u64,
        #[serde(default)]
        error_files: Vec<FailedFile>,
    },
    /// Terminal failure.
    Error { message: String },
    #[serde(other)]
    Unknown,
}

impl IndexEvent {
    /// Terminal events end the run; nothing after them is folded.
    pub fn is_terminal(&self) -> bool {
        matches!(self, IndexEvent::Done { .. } | IndexEvent::Error { .. })
    }
}

/// A failed file as repeated in the `done` record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedFile {
    pub file: String,
    #[serde(default)]
    pub file_path: Option<String>,
    pub error: String,
}

/// One record of the chat query stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueryEvent {
    /// Retrieval results, sent before the first token.
    Sources { sources: Vec<Source> },
    /// One generated token (or several characters of one).
    Token { content: String },
    /// Generation finished.
    Done,
    /// Retrieval or generation failed on the backend.
    Error { message: String },
    #[serde(other)]
    Unknown,
}

/// One record of the model pull stream.
///
/// The runtime's records carry no `type` tag: `{"status":"error",
/// "message":..}` is a failure, anything else is progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawPullRecord", into = "RawPullRecord")]
pub enum PullEvent {
    Status {
        status: String,
        total: Option<u64>,
        completed: Option<u64>,
        digest: Option<String>,
    },
    Error { message: String },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RawPullRecord {
    #[serde(default)]
    status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    total: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    completed: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    digest: Option<String>,
}

impl From<RawPullRecord> for PullEvent {
    fn from(raw: RawPullRecord) -> Self {
        // The runtime reports some failures as a bare `{"error": ".."}`.
        if raw.status.as_deref() == Some("error") || (raw.status.is_none() && raw.error.is_some())
        {
            return PullEvent::Error {
                message: raw
                    .message
                    .or(raw.error)
                    .unwrap_or_else(|| "model pull failed".to_string()),
            };
        }
        PullEvent::Status {
            status: raw.status.unwrap_or_default(),
            total: raw.total,
            completed: raw.completed,
            digest: raw.digest,
        }
    }
}

impl From<PullEvent> for RawPullRecord {
    fn from(event: PullEvent) -> Self {
        match event {
            PullEvent::Status {
                status,
                total,
                completed,
                digest,
            } => RawPullRecord {
                status: Some(status),
                total,
                completed,
                digest,
                ..Default::default()
            },
            PullEvent::Error { message } => RawPullRecord {
                status: Some("error".to_string()),
                message: Some(message),
                ..Default::default()
            },
        }
    }
}
