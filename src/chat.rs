//! Sending a chat message.
//!
//! [`send_message`] checks that a message may be sent, takes the
//! `generating` flag, appends the user message right away and then streams
//! the answer into an assistant placeholder. Transport failures do not
//! surface as `Err`: they end up in the transcript as an error entry, the
//! same place the user is looking.

use std::io::Write;

use anyhow::{bail, Result};
use futures::StreamExt;
use mnemora_core::chat::{ChatReducer, ChatStep, Role};
use mnemora_core::connectivity::LinkStatus;
use mnemora_core::events::QueryEvent;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::client::{BackendClient, ClientError};
use crate::config::Config;
use crate::monitor::ConnectivityMonitor;
use crate::session::{cancel_on_ctrl_c, Session};
use crate::store::{AppState, AppStore, StoreError};
use crate::stream::{EventStream, StreamError};

/// Why a message was not sent.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    #[error("message is empty")]
    EmptyMessage,
    #[error("backend is {0}")]
    BackendUnavailable(LinkStatus),
    #[error(transparent)]
    Busy(#[from] StoreError),
}

/// How a sent message ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatOutcome {
    /// The backend sent `done`.
    Completed,
    /// The stream closed before `done`; the partial answer is kept.
    Partial,
    /// The caller cancelled; the partial answer is kept.
    Cancelled,
    /// An error entry was appended to the transcript.
    Failed(String),
}

/// Send `content` with the selected model and stream the answer.
pub async fn send_message(
    client: &BackendClient,
    store: &AppStore,
    content: &str,
    cancel: CancellationToken,
) -> Result<ChatOutcome, SendError> {
    let content = content.trim();
    if content.is_empty() {
        return Err(SendError::EmptyMessage);
    }
    let backend = store.read(|s| s.connectivity.backend);
    if backend != LinkStatus::Connected {
        return Err(SendError::BackendUnavailable(backend));
    }

    let _generating = store.begin_generating()?;
    let model = store.update(|s| {
        s.transcript.push_user(content);
        s.current_sources.clear();
        s.selected_model.clone()
    });
    tracing::debug!(%model, "query sent");

    let outcome = match client.query(content, &model, cancel).await {
        Ok(events) => {
            store.update(|s| s.transcript.push_placeholder());
            fold_answer(store, events).await
        }
        Err(ClientError::Cancelled) => ChatOutcome::Cancelled,
        Err(e) => {
            let message = match &e {
                ClientError::Status { .. } => format!("Query failed ({})", e.user_message()),
                _ => e.user_message(),
            };
            append_error(store, message)
        }
    };

    tracing::info!(?outcome, "query finished");
    Ok(outcome)
}

async fn fold_answer(store: &AppStore, mut events: EventStream<QueryEvent>) -> ChatOutcome {
    let mut reducer = ChatReducer::new();

    while let Some(item) = events.next().await {
        match item {
            Ok(event) => {
                let step = store.update(|s| {
                    let step = reducer.apply(&mut s.transcript, event);
                    if step == ChatStep::SourcesUpdated {
                        s.current_sources = reducer.sources().to_vec();
                    }
                    step
                });
                match step {
                    ChatStep::Completed => return ChatOutcome::Completed,
                    ChatStep::Failed(message) => return append_error(store, message),
                    ChatStep::Continue | ChatStep::SourcesUpdated | ChatStep::Ignored => {}
                }
            }
            Err(StreamError::Cancelled) => {
                store.update(|s| reducer.finish_partial(&mut s.transcript));
                return ChatOutcome::Cancelled;
            }
            Err(StreamError::Read(e)) => {
                reducer.abort();
                return append_error(store, format!("connection lost: {}", e));
            }
        }
    }

    tracing::warn!(
        tokens = reducer.token_count(),
        "query stream closed before done, keeping partial answer"
    );
    store.update(|s| reducer.finish_partial(&mut s.transcript));
    ChatOutcome::Partial
}

fn append_error(store: &AppStore, message: String) -> ChatOutcome {
    tracing::warn!(%message, "query failed");
    store.update(|s| s.transcript.push_error(&message));
    ChatOutcome::Failed(message)
}

/// `mnemora ask QUERY`: stream the answer to stdout.
pub async fn run_ask(config: &Config, query: &str, model: Option<String>) -> Result<()> {
    let session = Session::open(config)?;
    let store = &session.store;

    ConnectivityMonitor::poll_once(&session.client, store).await;
    if let Some(model) = model {
        store.update(|s| s.select_model(model));
    }

    let printer_done = CancellationToken::new();
    let printer = tokio::spawn(print_answer(store.subscribe(), printer_done.clone()));

    let result = send_message(&session.client, store, query, cancel_on_ctrl_c()).await;

    printer_done.cancel();
    let _ = printer.await;
    println!();

    match result? {
        ChatOutcome::Completed => {}
        ChatOutcome::Partial => eprintln!("(answer incomplete: the connection closed early)"),
        ChatOutcome::Cancelled => eprintln!("(cancelled)"),
        ChatOutcome::Failed(message) => bail!("query failed: {}", message),
    }

    let (show, sources) = store.read(|s| {
        let sources = s
            .transcript
            .last()
            .and_then(|m| m.sources.clone())
            .unwrap_or_default();
        (s.show_sources, sources)
    });
    if show && !sources.is_empty() {
        println!();
        println!("Sources:");
        for (i, source) in sources.iter().enumerate() {
            match source.score {
                Some(score) => println!(
                    "  [{}] {} ({:.0}%)",
                    i + 1,
                    source.display_name(),
                    score * 100.0
                ),
                None => println!("  [{}] {}", i + 1, source.display_name()),
            }
            println!("      {}", source.file_path);
        }
    }
    Ok(())
}

/// Print the in-flight answer as it grows.
async fn print_answer(mut rx: watch::Receiver<AppState>, done: CancellationToken) {
    let mut printed = 0usize;
    loop {
        let stop = tokio::select! {
            biased;
            changed = rx.changed() => changed.is_err(),
            _ = done.cancelled() => true,
        };

        let text = rx
            .borrow_and_update()
            .transcript
            .last()
            .filter(|m| m.role == Role::Assistant && !m.is_error)
            .map(|m| m.content.clone());
        if let Some(text) = text {
            if text.len() > printed && text.is_char_boundary(printed) {
                let mut out = std::io::stdout().lock();
                let _ = out.write_all(text[printed..].as_bytes());
                let _ = out.flush();
                printed = text.len();
            }
        }

        if stop {
            break;
        }
    }
}
