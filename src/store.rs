//! Application state container.
//!
//! [`AppStore`] owns the single [`AppState`] behind a `tokio::sync::watch`
//! channel. Every mutation goes through [`AppStore::update`], which changes
//! the state in place and wakes all subscribers; a presentation layer calls
//! [`AppStore::subscribe`] and re-renders on `changed()`. The store is built
//! once at startup and shared by `Arc`.
//!
//! Two flags gate the long-running flows. They are taken with
//! [`AppStore::begin_generating`] / [`AppStore::begin_indexing`] and handed
//! back as guards, so they are released on every exit path including
//! errors and cancellation.

use chrono::{DateTime, Duration, Utc};
use mnemora_core::chat::Transcript;
use mnemora_core::connectivity::ConnectivityState;
use mnemora_core::indexing::IndexingState;
use mnemora_core::models::{Folder, ModelInfo, SetupStatus, Source};
use mnemora_core::pull::PullProgress;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use uuid::Uuid;

use crate::persist::Snapshot;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Dark,
    Light,
}

impl Theme {
    pub fn toggled(self) -> Self {
        match self {
            Theme::Dark => Theme::Light,
            Theme::Light => Theme::Dark,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// How long a notice stays visible.
pub const NOTICE_TTL_SECS: i64 = 5;

/// Notices kept at once; the oldest go first.
pub const MAX_NOTICES: usize = 8;

/// A transient user-visible message (toast).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub id: Uuid,
    pub level: NoticeLevel,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("already indexing {0}")]
    IndexingInProgress(String),
    #[error("a response is already being generated")]
    AlreadyGenerating,
}

#[derive(Debug, Clone)]
pub struct AppState {
    /// Folders with a completed indexing run, in insertion order.
    pub folders: Vec<Folder>,
    /// The run in flight, if any.
    pub indexing: Option<IndexingState>,
    /// Final state of the previous run, kept for the error detail view.
    pub last_index_run: Option<IndexingState>,
    pub transcript: Transcript,
    pub generating: bool,
    /// Citations of the query in flight, refreshed as they arrive.
    pub current_sources: Vec<Source>,
    pub available_models: Vec<ModelInfo>,
    pub selected_model: String,
    pub connectivity: ConnectivityState,
    pub setup: Option<SetupStatus>,
    pub pull: Option<PullProgress>,
    pub notices: Vec<Notice>,
    pub theme: Theme,
    pub show_sources: bool,
}

impl AppState {
    pub fn new(default_model: impl Into<String>) -> Self {
        Self {
            folders: Vec::new(),
            indexing: None,
            last_index_run: None,
            transcript: Transcript::new(),
            generating: false,
            current_sources: Vec::new(),
            available_models: Vec::new(),
            selected_model: default_model.into(),
            connectivity: ConnectivityState::default(),
            setup: None,
            pull: None,
            notices: Vec::new(),
            theme: Theme::default(),
            show_sources: true,
        }
    }

    /// Restore the persisted subset. `default_model` is used when the
    /// snapshot has no model selected.
    pub fn from_snapshot(snapshot: Snapshot, default_model: &str) -> Self {
        let selected_model = snapshot
            .selected_model
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| default_model.to_string());
        Self {
            folders: snapshot.folders,
            theme: snapshot.theme,
            show_sources: snapshot.show_sources,
            ..Self::new(selected_model)
        }
    }

    /// The persisted subset of this state.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            folders: self.folders.clone(),
            selected_model: Some(self.selected_model.clone()),
            theme: self.theme,
            show_sources: self.show_sources,
        }
    }

    /// Add `folder`, replacing an earlier entry for the same path.
    pub fn upsert_folder(&mut self, folder: Folder) {
        match self.folders.iter_mut().find(|f| f.path == folder.path) {
            Some(existing) => *existing = folder,
            None => self.folders.push(folder),
        }
    }

    /// Remove the folder at `path`. Returns `false` if it was not listed.
    pub fn remove_folder(&mut self, path: &str) -> bool {
        let before = self.folders.len();
        self.folders.retain(|f| f.path != path);
        self.folders.len() != before
    }

    /// Add a notice. Expired notices are dropped first, and the list never
    /// holds more than [`MAX_NOTICES`].
    pub fn push_notice(&mut self, level: NoticeLevel, message: impl Into<String>) -> Uuid {
        let now = Utc::now();
        self.expire_notices(now);

        let id = Uuid::new_v4();
        self.notices.push(Notice {
            id,
            level,
            message: message.into(),
            created_at: now,
        });
        if self.notices.len() > MAX_NOTICES {
            let excess = self.notices.len() - MAX_NOTICES;
            self.notices.drain(..excess);
        }
        id
    }

    /// Drop notices older than [`NOTICE_TTL_SECS`] at `now`. Returns how
    /// many were removed.
    pub fn expire_notices(&mut self, now: DateTime<Utc>) -> usize {
        let ttl = Duration::seconds(NOTICE_TTL_SECS);
        let before = self.notices.len();
        self.notices.retain(|n| now - n.created_at < ttl);
        before - self.notices.len()
    }

    pub fn dismiss_notice(&mut self, id: Uuid) -> bool {
        let before = self.notices.len();
        self.notices.retain(|n| n.id != id);
        self.notices.len() != before
    }

    /// Clear the conversation and the live sources panel.
    pub fn clear_messages(&mut self) {
        self.transcript.clear();
        self.current_sources.clear();
    }

    pub fn select_model(&mut self, model: impl Into<String>) {
        self.selected_model = model.into();
    }

    pub fn toggle_theme(&mut self) {
        self.theme = self.theme.toggled();
    }

    pub fn set_show_sources(&mut self, show: bool) {
        self.show_sources = show;
    }
}

#[derive(Debug)]
pub struct AppStore {
    tx: watch::Sender<AppState>,
}

impl AppStore {
    pub fn new(state: AppState) -> Self {
        let (tx, _rx) = watch::channel(state);
        Self { tx }
    }

    pub fn from_snapshot(snapshot: Snapshot, default_model: &str) -> Self {
        Self::new(AppState::from_snapshot(snapshot, default_model))
    }

    /// Mutate the state and notify subscribers.
    pub fn update<R>(&self, f: impl FnOnce(&mut AppState) -> R) -> R {
        let mut result = None;
        self.tx.send_modify(|state| result = Some(f(state)));
        result.unwrap_or_else(|| unreachable!("send_modify runs its closure once"))
    }

    /// Read from the current state without cloning it.
    pub fn read<R>(&self, f: impl FnOnce(&AppState) -> R) -> R {
        f(&self.tx.borrow())
    }

    pub fn snapshot(&self) -> AppState {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<AppState> {
        self.tx.subscribe()
    }

    pub fn push_notice(&self, level: NoticeLevel, message: impl Into<String>) -> Uuid {
        let message = message.into();
        match level {
            NoticeLevel::Error => tracing::error!(%message, "notice"),
            NoticeLevel::Warning => tracing::warn!(%message, "notice"),
            _ => tracing::info!(%message, "notice"),
        }
        self.update(|s| s.push_notice(level, message))
    }

    /// Mark a response as generating. Fails if one already is.
    pub fn begin_generating(&self) -> Result<GeneratingGuard<'_>, StoreError> {
        let acquired = self.tx.send_if_modified(|s| {
            if s.generating {
                false
            } else {
                s.generating = true;
                true
            }
        });
        if acquired {
            Ok(GeneratingGuard { store: self })
        } else {
            Err(StoreError::AlreadyGenerating)
        }
    }

    /// Start tracking an indexing run for `folder_path`. Fails if another
    /// run is in flight.
    pub fn begin_indexing(&self, folder_path: &str) -> Result<IndexingGuard<'_>, StoreError> {
        let mut busy = None;
        self.tx.send_if_modified(|s| match &s.indexing {
            Some(run) => {
                busy = Some(run.folder_path().to_string());
                false
            }
            None => {
                s.indexing = Some(IndexingState::new(folder_path));
                true
            }
        });
        match busy {
            Some(path) => Err(StoreError::IndexingInProgress(path)),
            None => Ok(IndexingGuard { store: self }),
        }
    }
}

/// Holds the `generating` flag; clears it on drop.
#[derive(Debug)]
pub struct GeneratingGuard<'a> {
    store: &'a AppStore,
}

impl Drop for GeneratingGuard<'_> {
    fn drop(&mut self) {
        self.store.tx.send_if_modified(|s| std::mem::replace(&mut s.generating, false));
    }
}

/// Holds the in-flight indexing run. On drop a run that is still present
/// is moved to `last_index_run`.
#[derive(Debug)]
pub struct IndexingGuard<'a> {
    store: &'a AppStore,
}

impl IndexingGuard<'_> {
    /// Fold into the in-flight run, if it is still present.
    pub fn with_run<R>(&self, f: impl FnOnce(&mut IndexingState) -> R) -> Option<R> {
        self.store.update(|s| s.indexing.as_mut().map(f))
    }
}

impl Drop for IndexingGuard<'_> {
    fn drop(&mut self) {
        self.store.tx.send_if_modified(|s| match s.indexing.take() {
            Some(run) => {
                s.last_index_run = Some(run);
                true
            }
            None => false,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> AppStore {
        AppStore::new(AppState::new("llama3.2:3b"))
    }

    fn folder(path: &str, docs: u64) -> Folder {
        Folder {
            path: path.to_string(),
            document_count: docs,
            error_count: 0,
        }
    }

    #[test]
    fn generating_guard_is_exclusive_and_released_on_drop() {
        let store = store();
        let guard = store.begin_generating().unwrap();
        assert!(store.read(|s| s.generating));
        assert_eq!(
            store.begin_generating().unwrap_err(),
            StoreError::AlreadyGenerating
        );
        drop(guard);
        assert!(!store.read(|s| s.generating));
        assert!(store.begin_generating().is_ok());
    }

    #[test]
    fn indexing_guard_rejects_a_second_run() {
        let store = store();
        let guard = store.begin_indexing("/docs").unwrap();
        assert_eq!(
            store.begin_indexing("/other").unwrap_err(),
            StoreError::IndexingInProgress("/docs".to_string())
        );
        guard.with_run(|run| run.status = "Scanning folder...".to_string());
        drop(guard);

        let state = store.snapshot();
        assert!(state.indexing.is_none());
        let last = state.last_index_run.unwrap();
        assert_eq!(last.folder_path(), "/docs");
        assert_eq!(last.status, "Scanning folder...");
        assert!(store.begin_indexing("/other").is_ok());
    }

    #[test]
    fn upsert_replaces_same_path() {
        let mut state = AppState::new("m");
        state.upsert_folder(folder("/a", 1));
        state.upsert_folder(folder("/b", 2));
        state.upsert_folder(folder("/a", 5));
        assert_eq!(state.folders.len(), 2);
        assert_eq!(state.folders[0].document_count, 5);
        assert!(state.remove_folder("/b"));
        assert!(!state.remove_folder("/b"));
    }

    #[test]
    fn notices_can_be_dismissed() {
        let store = store();
        let id = store.push_notice(NoticeLevel::Error, "boom");
        store.push_notice(NoticeLevel::Info, "hello");
        assert_eq!(store.read(|s| s.notices.len()), 2);
        assert!(store.update(|s| s.dismiss_notice(id)));
        let notices = store.read(|s| s.notices.clone());
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].message, "hello");
    }

    #[test]
    fn notices_are_capped_oldest_first() {
        let mut state = AppState::new("m");
        for i in 0..MAX_NOTICES + 3 {
            state.push_notice(NoticeLevel::Info, format!("notice {}", i));
        }
        assert_eq!(state.notices.len(), MAX_NOTICES);
        assert_eq!(state.notices[0].message, "notice 3");
        assert_eq!(
            state.notices.last().unwrap().message,
            format!("notice {}", MAX_NOTICES + 2)
        );
    }

    #[test]
    fn old_notices_expire() {
        let mut state = AppState::new("m");
        state.push_notice(NoticeLevel::Error, "stale");
        state.notices[0].created_at -= Duration::seconds(NOTICE_TTL_SECS + 1);
        state.push_notice(NoticeLevel::Info, "fresh");

        assert_eq!(state.notices.len(), 1);
        assert_eq!(state.notices[0].message, "fresh");

        let later = Utc::now() + Duration::seconds(NOTICE_TTL_SECS);
        assert_eq!(state.expire_notices(later), 1);
        assert!(state.notices.is_empty());
    }

    #[test]
    fn clear_messages_also_clears_sources() {
        let store = store();
        store.update(|s| {
            s.transcript.push_user("hi");
            s.current_sources.push(Source::new("/a.txt"));
            s.clear_messages();
        });
        let state = store.snapshot();
        assert!(state.transcript.is_empty());
        assert!(state.current_sources.is_empty());
    }

    #[tokio::test]
    async fn subscribers_see_updates() {
        let store = store();
        let mut rx = store.subscribe();
        store.update(|s| s.select_model("qwen2.5:7b"));
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().selected_model, "qwen2.5:7b");
    }

    #[test]
    fn snapshot_round_trips_persisted_fields() {
        let mut state = AppState::new("llama3.2:3b");
        state.upsert_folder(folder("/docs", 3));
        state.toggle_theme();
        state.set_show_sources(false);
        state.transcript.push_user("not persisted");

        let restored = AppState::from_snapshot(state.snapshot(), "other");
        assert_eq!(restored.folders, state.folders);
        assert_eq!(restored.theme, Theme::Light);
        assert!(!restored.show_sources);
        assert_eq!(restored.selected_model, "llama3.2:3b");
        assert!(restored.transcript.is_empty());
    }
}
