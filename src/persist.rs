//! Local snapshot of the state that survives a restart.
//!
//! Only the folder list, the selected model, the theme and the sources
//! panel toggle are stored. Transcripts, in-flight runs and connectivity
//! are rebuilt at runtime.

use anyhow::{Context, Result};
use mnemora_core::models::Folder;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::store::Theme;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub folders: Vec<Folder>,
    #[serde(default)]
    pub selected_model: Option<String>,
    #[serde(default)]
    pub theme: Theme,
    #[serde(default = "default_show_sources")]
    pub show_sources: bool,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            folders: Vec::new(),
            selected_model: None,
            theme: Theme::default(),
            show_sources: default_show_sources(),
        }
    }
}

fn default_show_sources() -> bool {
    true
}

/// Load the snapshot at `path`, or the default if the file does not exist.
pub fn load_snapshot(path: &Path) -> Result<Snapshot> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "no saved state, starting fresh");
        return Ok(Snapshot::default());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read state file: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse state file: {}", path.display()))
}

pub fn save_snapshot(path: &Path, snapshot: &Snapshot) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(snapshot)?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write state file: {}", path.display()))?;
    tracing::debug!(path = %path.display(), folders = snapshot.folders.len(), "state saved");
    Ok(())
}
