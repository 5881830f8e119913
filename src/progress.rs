//! Indexing and download progress reporting.
//!
//! Reports observable progress during `mnemora index` and `mnemora setup
//! --pull` so users see what is being processed and how much is left.
//! Progress is emitted on **stderr** so stdout remains parseable for
//! scripts.
//!
//! Reporters are fed from a store subscription ([`follow`]): they render
//! whatever the latest state is, so a slow terminal never holds up the
//! stream being folded.

use std::io::Write;
use std::sync::Arc;

use mnemora_core::indexing::{IndexPhase, IndexingState};
use mnemora_core::pull::PullProgress;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::store::{AppState, AppStore};

/// A single progress event.
#[derive(Clone, Debug, PartialEq)]
pub enum ProgressEvent {
    /// Indexing run: `processed` of `total` files (total 0 while unknown).
    Indexing {
        folder: String,
        phase: IndexPhase,
        processed: u64,
        total: u64,
        errors: usize,
        status: String,
    },
    /// Model download.
    Pulling {
        model: String,
        status: String,
        percent: u8,
        digest: Option<String>,
    },
}

impl ProgressEvent {
    pub fn from_indexing(run: &IndexingState) -> Self {
        ProgressEvent::Indexing {
            folder: run.folder_path().to_string(),
            phase: run.phase,
            processed: run.processed,
            total: run.total,
            errors: run.errors.len(),
            status: run.status.clone(),
        }
    }

    pub fn from_pull(pull: &PullProgress) -> Self {
        ProgressEvent::Pulling {
            model: pull.model.clone(),
            status: pull.status.clone(),
            percent: pull.percent,
            digest: pull.digest.clone(),
        }
    }
}

/// Reports progress. Implementations write to stderr (human or JSON).
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// Human-friendly progress on stderr: "index /docs  processing  12 / 40 files".
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: ProgressEvent) {
        let line = match &event {
            ProgressEvent::Indexing {
                folder,
                phase,
                processed,
                total,
                errors,
                status,
            } => match phase {
                IndexPhase::Discovering => format!("index {}  {}\n", folder, status),
                IndexPhase::Embedding => format!("index {}  generating embeddings...\n", folder),
                _ => {
                    let errors = if *errors > 0 {
                        format!("  ({} errors)", format_number(*errors as u64))
                    } else {
                        String::new()
                    };
                    format!(
                        "index {}  processing  {} / {} files{}\n",
                        folder,
                        format_number(*processed),
                        format_number(*total),
                        errors
                    )
                }
            },
            ProgressEvent::Pulling {
                model,
                status,
                percent,
                digest,
            } => match digest {
                Some(d) => format!("pull {}  {}  {}  {}%\n", model, status, d, percent),
                None => format!("pull {}  {}  {}%\n", model, status, percent),
            },
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, event: ProgressEvent) {
        let obj = match &event {
            ProgressEvent::Indexing {
                folder,
                phase,
                processed,
                total,
                errors,
                status,
            } => serde_json::json!({
                "event": "progress",
                "kind": "index",
                "folder": folder,
                "phase": phase,
                "n": processed,
                "total": total,
                "errors": errors,
                "status": status
            }),
            ProgressEvent::Pulling {
                model,
                status,
                percent,
                digest,
            } => serde_json::json!({
                "event": "progress",
                "kind": "pull",
                "model": model,
                "status": status,
                "percent": percent,
                "digest": digest
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: ProgressEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    for (i, c) in s.chars().enumerate() {
        if i > 0 && (s.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}

/// The event to report for `state`, if anything is in flight.
pub fn current_event(state: &AppState) -> Option<ProgressEvent> {
    if let Some(run) = &state.indexing {
        return Some(ProgressEvent::from_indexing(run));
    }
    state
        .pull
        .as_ref()
        .filter(|p| !p.is_terminal())
        .map(ProgressEvent::from_pull)
}

/// Report progress from store changes until `cancel` fires.
///
/// Consecutive identical events are reported once.
pub fn follow(
    store: Arc<AppStore>,
    reporter: Box<dyn ProgressReporter>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    let mut rx = store.subscribe();
    tokio::spawn(async move {
        let mut last: Option<ProgressEvent> = None;
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                changed = rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
            let event = current_event(&rx.borrow_and_update());
            if let Some(event) = event {
                if last.as_ref() != Some(&event) {
                    reporter.report(event.clone());
                    last = Some(event);
                }
            }
        }
    })
}
