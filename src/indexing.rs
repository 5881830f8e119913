//! Folder indexing and removal.
//!
//! [`add_folder`] drives one `POST /index` stream through the store:
//!
//! 1. Take the indexing slot ([`AppStore::begin_indexing`]).
//! 2. Open the stream and fold every record into the in-flight run.
//! 3. On `done`, add the folder to the list; on anything else, fail the run.
//!
//! A folder only enters the list after a `done` record. A stream that ends
//! early, a read error and cancellation all fail the run, and the partial
//! ledger is kept in `last_index_run` for inspection.

use anyhow::Result;
use futures::StreamExt;
use mnemora_core::indexing::IndexStep;
use mnemora_core::models::Folder;
use tokio_util::sync::CancellationToken;

use crate::client::{BackendClient, ClientError};
use crate::config::Config;
use crate::persist::load_snapshot;
use crate::progress::{self, ProgressMode};
use crate::session::{cancel_on_ctrl_c, Session};
use crate::store::{AppStore, IndexingGuard, NoticeLevel, StoreError};
use crate::stream::StreamError;

pub const CLOSED_EARLY: &str = "indexing stream closed before completion";
pub const CANCELLED: &str = "indexing cancelled";

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error(transparent)]
    Rejected(#[from] StoreError),
    #[error("indexing failed: {0}")]
    Failed(String),
}

/// Index `folder_path` and return its summary.
pub async fn add_folder(
    client: &BackendClient,
    store: &AppStore,
    folder_path: &str,
    cancel: CancellationToken,
) -> Result<Folder, IndexError> {
    let folder_path = folder_path.trim();
    if folder_path.is_empty() {
        return Err(IndexError::Failed("folder path is empty".to_string()));
    }

    let guard = store.begin_indexing(folder_path)?;
    tracing::info!(folder = folder_path, "indexing started");

    let mut events = match client.index_folder(folder_path, cancel).await {
        Ok(events) => events,
        Err(ClientError::Cancelled) => return Err(fail(store, &guard, CANCELLED)),
        Err(e) => return Err(fail(store, &guard, &e.user_message())),
    };

    while let Some(item) = events.next().await {
        match item {
            Ok(event) => {
                let step = guard
                    .with_run(|run| run.apply(event))
                    .unwrap_or(IndexStep::Ignored);
                match step {
                    IndexStep::Completed(folder) => {
                        tracing::info!(
                            folder = %folder.path,
                            documents = folder.document_count,
                            errors = folder.error_count,
                            "indexing finished"
                        );
                        store.update(|s| {
                            if let Some(run) = s.indexing.take() {
                                s.last_index_run = Some(run);
                            }
                            s.upsert_folder(folder.clone());
                            s.push_notice(
                                NoticeLevel::Success,
                                format!(
                                    "Indexed {} documents from {}",
                                    folder.document_count, folder.path
                                ),
                            );
                        });
                        return Ok(folder);
                    }
                    IndexStep::Failed(message) => {
                        return Err(finish_failed(store, &message));
                    }
                    IndexStep::Continue | IndexStep::Ignored => {}
                }
            }
            Err(StreamError::Cancelled) => return Err(fail(store, &guard, CANCELLED)),
            Err(StreamError::Read(e)) => {
                return Err(fail(store, &guard, &format!("connection lost: {}", e)));
            }
        }
    }

    Err(fail(store, &guard, CLOSED_EARLY))
}

/// Fail the in-flight run with `message`.
fn fail(store: &AppStore, guard: &IndexingGuard<'_>, message: &str) -> IndexError {
    guard.with_run(|run| run.fail(message));
    finish_failed(store, message)
}

fn finish_failed(store: &AppStore, message: &str) -> IndexError {
    tracing::warn!(%message, "indexing failed");
    store.update(|s| {
        if let Some(run) = s.indexing.take() {
            s.last_index_run = Some(run);
        }
    });
    store.push_notice(NoticeLevel::Error, format!("Indexing failed: {}", message));
    IndexError::Failed(message.to_string())
}

/// Remove a folder from the backend index, then from the local list.
///
/// The local list is only touched once the backend confirmed the delete.
pub async fn remove_folder(
    client: &BackendClient,
    store: &AppStore,
    folder_path: &str,
) -> Result<(), ClientError> {
    match client.delete_folder(folder_path).await {
        Ok(()) => {
            let removed = store.update(|s| s.remove_folder(folder_path));
            tracing::info!(folder = folder_path, removed, "folder removed");
            store.push_notice(NoticeLevel::Info, format!("Removed {}", folder_path));
            Ok(())
        }
        Err(e) => {
            store.push_notice(
                NoticeLevel::Error,
                format!("Failed to remove {}: {}", folder_path, e.user_message()),
            );
            Err(e)
        }
    }
}

/// `mnemora index PATH`.
pub async fn run_index(config: &Config, path: &str, mode: ProgressMode) -> Result<()> {
    let folder_path = match std::fs::canonicalize(path) {
        Ok(p) => p.to_string_lossy().into_owned(),
        Err(_) => path.to_string(),
    };

    let session = Session::open(config)?;
    let follow_cancel = CancellationToken::new();
    let follower = progress::follow(session.store.clone(), mode.reporter(), follow_cancel.clone());

    let result = add_folder(
        &session.client,
        &session.store,
        &folder_path,
        cancel_on_ctrl_c(),
    )
    .await;

    follow_cancel.cancel();
    let _ = follower.await;

    let last_run = session.store.read(|s| s.last_index_run.clone());
    let failures = last_run.map(|run| run.errors).unwrap_or_default();

    let folder = result?;
    session.save()?;

    println!("index {}", folder.path);
    println!("  documents indexed: {}", folder.document_count);
    println!("  files with errors: {}", folder.error_count);
    for failure in &failures {
        println!("    {}: {}", failure.file, failure.error);
    }
    println!("ok");
    Ok(())
}

/// `mnemora folders list`. Reads the saved state only.
pub fn run_folders_list(config: &Config) -> Result<()> {
    let snapshot = load_snapshot(&config.storage.state_path)?;
    if snapshot.folders.is_empty() {
        println!("No folders indexed.");
        return Ok(());
    }
    println!("{:<10} {:<8} PATH", "DOCUMENTS", "ERRORS");
    for folder in &snapshot.folders {
        println!(
            "{:<10} {:<8} {}",
            folder.document_count, folder.error_count, folder.path
        );
    }
    Ok(())
}

/// `mnemora folders remove PATH`.
pub async fn run_folders_remove(config: &Config, path: &str) -> Result<()> {
    let session = Session::open(config)?;
    let known = session.store.read(|s| s.folders.iter().any(|f| f.path == path));
    if !known {
        tracing::warn!(folder = path, "folder is not in the local list");
    }
    remove_folder(&session.client, &session.store, path).await?;
    session.save()?;
    println!("removed {}", path);
    Ok(())
}
