//! Data models shared by the reducers and the application crate.
//!
//! These are the payloads that outlive a single stream: retrieval
//! citations, the persisted folder summary, and the JSON objects returned
//! by the backend's non-streaming endpoints.

use serde::{Deserialize, Serialize};

/// A retrieval citation attached to an assistant message.
///
/// The backend also sends `file_name` and `chunk_index`; both are kept
/// when present but neither is required.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub file_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    /// Relevance in `0.0..=1.0`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    /// Snippet of the matching chunk.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_index: Option<u64>,
}

impl Source {
    pub fn new(file_path: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            file_name: None,
            score: None,
            content: None,
            chunk_index: None,
        }
    }

    /// Last path component, splitting on both `/` and `\`.
    pub fn display_name(&self) -> &str {
        if let Some(name) = self.file_name.as_deref().filter(|n| !n.is_empty()) {
            return name;
        }
        self.file_path
            .rsplit(|c: char| c == '/' || c == '\\')
            .next()
            .unwrap_or(&self.file_path)
    }
}

/// Persisted summary of a completed indexing run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Folder {
    pub path: String,
    pub document_count: u64,
    pub error_count: u64,
}

/// Response of `GET /setup/status`.
///
/// When the model runtime is down the backend only sends the first few
/// fields, so everything beyond `ready` and `ollama_running` is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SetupStatus {
    #[serde(default)]
    pub ready: bool,
    #[serde(default)]
    pub ollama_installed: Option<bool>,
    #[serde(default)]
    pub ollama_running: bool,
    #[serde(default)]
    pub has_llm: Option<bool>,
    #[serde(default)]
    pub has_embedding: Option<bool>,
    #[serde(default)]
    pub installed_llm: Option<String>,
    #[serde(default)]
    pub installed_embedding: Option<String>,
    #[serde(default)]
    pub recommended_llm: Option<String>,
    #[serde(default)]
    pub recommended_embedding: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub install_url: Option<String>,
}

impl SetupStatus {
    /// Models the user still has to pull before setup is complete.
    pub fn missing_models(&self) -> Vec<&str> {
        let mut missing = Vec::new();
        if !self.ollama_running {
            return missing;
        }
        if !self.has_llm.unwrap_or(false) {
            if let Some(m) = self.recommended_llm.as_deref() {
                missing.push(m);
            }
        }
        if !self.has_embedding.unwrap_or(false) {
            if let Some(m) = self.recommended_embedding.as_deref() {
                missing.push(m);
            }
        }
        missing
    }
}

/// One entry of `GET /models`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    #[serde(default)]
    pub size: u64,
}

/// Response of `GET /models`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelList {
    #[serde(default)]
    pub models: Vec<ModelInfo>,
}
