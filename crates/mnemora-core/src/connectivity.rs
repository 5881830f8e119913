//! Tri-state health signal for the backend and the model runtime.
//!
//! The state only ever changes on a completed poll. A successful `/health`
//! response marks the backend connected and adopts the runtime status the
//! backend reports; any failure marks both sides disconnected at once.

use serde::{Deserialize, Serialize};

/// Liveness of one dependency.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkStatus {
    Connected,
    /// No poll has completed yet.
    #[default]
    Connecting,
    Disconnected,
}

impl LinkStatus {
    /// Parse the backend's status string. Anything unrecognized counts as
    /// disconnected.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "connected" => LinkStatus::Connected,
            "connecting" => LinkStatus::Connecting,
            _ => LinkStatus::Disconnected,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LinkStatus::Connected => "connected",
            LinkStatus::Connecting => "connecting",
            LinkStatus::Disconnected => "disconnected",
        }
    }
}

impl std::fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body of `GET /health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    pub ollama_status: String,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectivityState {
    pub backend: LinkStatus,
    pub ollama: LinkStatus,
}

impl ConnectivityState {
    /// Fold a successful poll. Returns `true` if anything changed.
    pub fn record_success(&mut self, report: &HealthReport) -> bool {
        let next = ConnectivityState {
            backend: LinkStatus::Connected,
            ollama: LinkStatus::parse(&report.ollama_status),
        };
        self.transition(next)
    }

    /// Fold a failed poll (network error, non-success status or malformed
    /// body). Returns `true` if anything changed.
    pub fn record_failure(&mut self) -> bool {
        self.transition(ConnectivityState {
            backend: LinkStatus::Disconnected,
            ollama: LinkStatus::Disconnected,
        })
    }

    /// Whether user actions that need the backend may proceed.
    pub fn can_send(&self) -> bool {
        self.backend == LinkStatus::Connected
    }

    fn transition(&mut self, next: ConnectivityState) -> bool {
        let changed = *self != next;
        *self = next;
        changed
    }
}
