//! Indexing progress reducer.
//!
//! Folds the records of one `POST /index` stream into an [`IndexingState`]:
//!
//! ```text
//! Discovering ──file_done/file_error──▶ Processing ──embedding──▶ Embedding
//!      │                                    │                        │
//!      └──────────────── done ──────────────┴────────────────────────┴──▶ Done
//!      └──────────────── error ─────────────┴────────────────────────┴──▶ Failed
//! ```
//!
//! `Done` and `Failed` are terminal: every later record is ignored and the
//! state is left untouched. Individual file failures are recorded in the
//! ledger and the error list but never fail the run.

use serde::{Deserialize, Serialize};

use crate::events::IndexEvent;
use crate::models::Folder;

/// Phase of one indexing run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexPhase {
    Discovering,
    Processing,
    Embedding,
    Done,
    Failed,
}

impl IndexPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, IndexPhase::Done | IndexPhase::Failed)
    }
}

/// Status of one file in the ledger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    #[default]
    Pending,
    Processing,
    Done,
    Error,
}

/// One ledger row. There is at most one row per distinct path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub path: String,
    pub status: FileStatus,
    pub chunk_count: Option<u64>,
    pub error_message: Option<String>,
}

/// A non-fatal per-file failure, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFailure {
    pub file: String,
    pub error: String,
}

/// Result of folding one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexStep {
    /// State changed; the run goes on.
    Continue,
    /// Record had no effect (unknown tag, or the run already ended).
    Ignored,
    /// Terminal success. The caller persists the folder and drops the state.
    Completed(Folder),
    /// Terminal failure with a user-facing message.
    Failed(String),
}

/// Counters shown while embeddings are generated.
pub const EMBEDDING_SENTINEL: u64 = 100;

/// One in-flight folder indexing run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexingState {
    folder_path: String,
    pub phase: IndexPhase,
    pub processed: u64,
    pub total: u64,
    pub current_file: Option<String>,
    /// Human-readable status line.
    pub status: String,
    pub ledger: Vec<FileEntry>,
    pub errors: Vec<FileFailure>,
}

impl IndexingState {
    pub fn new(folder_path: impl Into<String>) -> Self {
        Self {
            folder_path: folder_path.into(),
            phase: IndexPhase::Discovering,
            processed: 0,
            total: 0,
            current_file: None,
            status: "Starting...".to_string(),
            ledger: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn folder_path(&self) -> &str {
        &self.folder_path
    }

    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }

    /// Fold one record into the state.
    pub fn apply(&mut self, event: IndexEvent) -> IndexStep {
        if self.is_terminal() {
            return IndexStep::Ignored;
        }

        match event {
            IndexEvent::Start { .. } => {
                self.status = "Scanning folder...".to_string();
                IndexStep::Continue
            }
            IndexEvent::Discovery { total_files, .. } => {
                if self.phase == IndexPhase::Embedding {
                    return IndexStep::Ignored;
                }
                // Totals only grow, so a late discovery cannot undercut `processed`.
                self.advance(0, total_files);
                self.status = format!("Found {} files", total_files);
                IndexStep::Continue
            }
            IndexEvent::FileDone {
                current,
                total,
                percent,
                file,
                file_path,
                chunks,
            } => {
                let key = file_path.unwrap_or_else(|| file.clone());
                let entry = self.upsert(&key);
                entry.status = FileStatus::Done;
                entry.chunk_count = chunks;
                entry.error_message = None;

                if self.phase != IndexPhase::Embedding {
                    self.phase = IndexPhase::Processing;
                    self.advance(current, total);
                    self.current_file = Some(file);
                    self.status = format!("Indexing: {}%", percent.round() as i64);
                }
                IndexStep::Continue
            }
            IndexEvent::FileError {
                current,
                total,
                file,
                file_path,
                error,
            } => {
                let key = file_path.unwrap_or_else(|| file.clone());
                let entry = self.upsert(&key);
                entry.status = FileStatus::Error;
                entry.error_message = Some(error.clone());

                self.errors.push(FileFailure {
                    file: file.clone(),
                    error,
                });

                if self.phase != IndexPhase::Embedding {
                    self.phase = IndexPhase::Processing;
                    self.advance(current, total);
                    self.status = format!("Error on {}", file);
                    self.current_file = Some(file);
                }
                IndexStep::Continue
            }
            IndexEvent::Embedding { status, .. } => {
                self.phase = IndexPhase::Embedding;
                self.processed = EMBEDDING_SENTINEL;
                self.total = EMBEDDING_SENTINEL;
                self.current_file = None;
                self.status = status;
                IndexStep::Continue
            }
            IndexEvent::Done { processed, errors, .. } => {
                self.phase = IndexPhase::Done;
                self.current_file = None;
                self.status = format!("Indexed {} files", processed);
                IndexStep::Completed(Folder {
                    path: self.folder_path.clone(),
                    document_count: processed,
                    error_count: errors,
                })
            }
            IndexEvent::Error { message } => {
                self.phase = IndexPhase::Failed;
                self.status = message.clone();
                IndexStep::Failed(message)
            }
            IndexEvent::Unknown => IndexStep::Ignored,
        }
    }

    /// Fail a run that has not reached a terminal phase, e.g. on a
    /// transport error. Returns `None` when the run already ended.
    pub fn fail(&mut self, message: impl Into<String>) -> Option<IndexStep> {
        if self.is_terminal() {
            return None;
        }
        let message = message.into();
        self.phase = IndexPhase::Failed;
        self.status = message.clone();
        Some(IndexStep::Failed(message))
    }

    /// `processed / total` clamped to `[0, 1]`, or `None` while the total
    /// is unknown.
    pub fn progress_ratio(&self) -> Option<f64> {
        if self.total == 0 {
            return None;
        }
        Some((self.processed as f64 / self.total as f64).clamp(0.0, 1.0))
    }

    /// Number of ledger rows in each status.
    pub fn ledger_counts(&self) -> LedgerCounts {
        let mut counts = LedgerCounts::default();
        for entry in &self.ledger {
            match entry.status {
                FileStatus::Pending => counts.pending += 1,
                FileStatus::Processing => counts.processing += 1,
                FileStatus::Done => counts.done += 1,
                FileStatus::Error => counts.error += 1,
            }
        }
        counts
    }

    fn advance(&mut self, current: u64, total: u64) {
        if total > self.total {
            self.total = total;
        }
        self.processed = self.processed.max(current);
        if self.total > 0 {
            self.processed = self.processed.min(self.total);
        }
    }

    fn upsert(&mut self, path: &str) -> &mut FileEntry {
        let idx = match self.ledger.iter().position(|e| e.path == path) {
            Some(idx) => idx,
            None => {
                self.ledger.push(FileEntry {
                    path: path.to_string(),
                    status: FileStatus::Pending,
                    chunk_count: None,
                    error_message: None,
                });
                self.ledger.len() - 1
            }
        };
        &mut self.ledger[idx]
    }
}

/// Ledger summary for the error count badge and the detail view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedgerCounts {
    pub pending: usize,
    pub processing: usize,
    pub done: usize,
    pub error: usize,
}
