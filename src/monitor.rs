//! Background health polling.
//!
//! [`ConnectivityMonitor`] polls `GET /health` on a fixed interval and folds
//! each result into `store.connectivity`. It runs on its own task and never
//! touches streams in flight: a failing poll flips the indicator but does
//! not abort a chat or an indexing run.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use mnemora_core::connectivity::{ConnectivityState, LinkStatus};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::client::BackendClient;
use crate::config::Config;
use crate::session::{cancel_on_ctrl_c, Session};
use crate::setup;
use crate::store::AppStore;

pub struct ConnectivityMonitor;

impl ConnectivityMonitor {
    /// Start polling. The first poll runs immediately; the task ends when
    /// `cancel` fires.
    pub fn spawn(
        client: BackendClient,
        store: Arc<AppStore>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = Self::poll_once(&client, &store) => {}
                }
            }
            tracing::debug!("connectivity monitor stopped");
        })
    }

    /// Poll once and fold the result. Returns the new state.
    pub async fn poll_once(client: &BackendClient, store: &AppStore) -> ConnectivityState {
        let result = client.health().await;
        store.update(|s| {
            let before = s.connectivity;
            let changed = match &result {
                Ok(report) => s.connectivity.record_success(report),
                Err(e) => {
                    tracing::debug!(error = %e, "health check failed");
                    s.connectivity.record_failure()
                }
            };
            if changed {
                tracing::info!(
                    backend = %s.connectivity.backend,
                    ollama = %s.connectivity.ollama,
                    was_backend = %before.backend,
                    was_ollama = %before.ollama,
                    "connectivity changed"
                );
            }
            s.connectivity
        })
    }
}

/// `mnemora status`: one health poll plus the setup summary.
pub async fn run_status(config: &Config) -> Result<()> {
    let session = Session::open(config)?;
    let state = ConnectivityMonitor::poll_once(&session.client, &session.store).await;

    println!("backend:  {}  ({})", state.backend, session.client.base_url());
    println!("ollama:   {}", state.ollama);

    if state.backend == LinkStatus::Connected {
        match setup::check_setup(&session.client, &session.store).await {
            Ok(status) => {
                println!("ready:    {}", status.ready);
                let missing = status.missing_models();
                if !missing.is_empty() {
                    println!("missing:  {}", missing.join(", "));
                }
                if let Some(message) = status.message.as_deref() {
                    println!("note:     {}", message);
                }
            }
            Err(e) => println!("ready:    unknown ({})", e.user_message()),
        }
    }

    let (model, folders) = session
        .store
        .read(|s| (s.selected_model.clone(), s.folders.len()));
    println!("model:    {}", model);
    println!("folders:  {}", folders);
    Ok(())
}

/// `mnemora watch`: poll until Ctrl-C, printing every transition.
pub async fn run_watch(config: &Config) -> Result<()> {
    let session = Session::open(config)?;
    let cancel = cancel_on_ctrl_c();
    let mut rx = session.store.subscribe();

    let handle = ConnectivityMonitor::spawn(
        session.client.clone(),
        session.store.clone(),
        config.monitor.health_interval(),
        cancel.clone(),
    );

    let mut last: Option<ConnectivityState> = None;
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
        let current = rx.borrow_and_update().connectivity;
        if current.backend == LinkStatus::Connecting || last == Some(current) {
            continue;
        }
        println!(
            "{}  backend: {:<12} ollama: {}",
            chrono::Local::now().format("%H:%M:%S"),
            current.backend.as_str(),
            current.ollama
        );
        last = Some(current);
    }

    handle.await?;
    Ok(())
}
