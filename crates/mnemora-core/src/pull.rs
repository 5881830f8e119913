//! Model download progress.
//!
//! Folds the records of a `POST /setup/pull-model` stream. The runtime
//! reports a status line per layer (`pulling <digest>`, `verifying sha256
//! digest`, `writing manifest`, ...) and finishes with `success`.

use serde::{Deserialize, Serialize};

use crate::events::PullEvent;

/// Length of the digest prefix shown next to the status line.
pub const DIGEST_PREFIX_LEN: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PullPhase {
    Running,
    Finished,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullProgress {
    pub model: String,
    pub phase: PullPhase,
    pub status: String,
    /// `0..=100`. Kept at its last value when a record carries no sizes.
    pub percent: u8,
    pub digest: Option<String>,
    pub error: Option<String>,
}

impl PullProgress {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            phase: PullPhase::Running,
            status: "Starting download...".to_string(),
            percent: 0,
            digest: None,
            error: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.phase != PullPhase::Running
    }

    /// Fold one record. Returns `false` if it was ignored.
    pub fn apply(&mut self, event: PullEvent) -> bool {
        if self.is_terminal() {
            return false;
        }
        match event {
            PullEvent::Status {
                status,
                total,
                completed,
                digest,
            } => {
                if let (Some(total), Some(completed)) = (total, completed) {
                    if total > 0 {
                        let pct = (completed as f64 / total as f64 * 100.0).round();
                        self.percent = pct.clamp(0.0, 100.0) as u8;
                    }
                }
                if let Some(d) = digest {
                    let short = d.strip_prefix("sha256:").unwrap_or(d.as_str());
                    self.digest = Some(short.chars().take(DIGEST_PREFIX_LEN).collect());
                }
                if status == "success" {
                    self.phase = PullPhase::Finished;
                    self.percent = 100;
                }
                self.status = if status.is_empty() {
                    "Downloading...".to_string()
                } else {
                    status
                };
            }
            PullEvent::Error { message } => {
                self.phase = PullPhase::Failed;
                self.status = message.clone();
                self.error = Some(message);
            }
        }
        true
    }

    /// Fail a pull that has not finished. Returns `false` if it already ended.
    pub fn fail(&mut self, message: impl Into<String>) -> bool {
        self.apply(PullEvent::Error {
            message: message.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(s: &str, total: Option<u64>, completed: Option<u64>) -> PullEvent {
        PullEvent::Status {
            status: s.to_string(),
            total,
            completed,
            digest: Some("sha256:8eeb52dfb3bb9aefdf9d1ef24b3bdbcfbe82238798c4b918278320b6fcef18fe".to_string()),
        }
    }

    #[test]
    fn computes_percent_and_short_digest() {
        let mut p = PullProgress::new("llama3.2:3b");
        p.apply(status("pulling manifest", None, None));
        assert_eq!(p.percent, 0);
        p.apply(status("pulling 8eeb52dfb3bb", Some(2_000), Some(500)));
        assert_eq!(p.percent, 25);
        assert_eq!(p.digest.as_deref(), Some("8eeb52dfb3bb"));
        p.apply(status("verifying sha256 digest", None, None));
        assert_eq!(p.percent, 25);
        assert_eq!(p.status, "verifying sha256 digest");
    }

    #[test]
    fn success_finishes() {
        let mut p = PullProgress::new("nomic-embed-text");
        p.apply(status("success", None, None));
        assert_eq!(p.phase, PullPhase::Finished);
        assert_eq!(p.percent, 100);
        assert!(!p.apply(status("pulling again", Some(1), Some(0))));
    }

    #[test]
    fn error_fails_and_freezes() {
        let mut p = PullProgress::new("nope");
        p.apply(PullEvent::Error {
            message: "Failed to pull model: 500".to_string(),
        });
        assert_eq!(p.phase, PullPhase::Failed);
        assert_eq!(p.error.as_deref(), Some("Failed to pull model: 500"));
        let frozen = p.clone();
        assert!(!p.apply(status("success", None, None)));
        assert!(!p.fail("late"));
        assert_eq!(p, frozen);
    }

    #[test]
    fn zero_total_keeps_previous_percent() {
        let mut p = PullProgress::new("m");
        p.apply(status("pulling", Some(10), Some(5)));
        p.apply(status("pulling", Some(0), Some(0)));
        assert_eq!(p.percent, 50);
    }
}
