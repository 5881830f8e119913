//! First-run setup: runtime status, installed models and model downloads.

use std::time::Duration;

use anyhow::{bail, Result};
use futures::StreamExt;
use mnemora_core::models::{ModelInfo, SetupStatus};
use mnemora_core::pull::{PullPhase, PullProgress};
use tokio_util::sync::CancellationToken;

use crate::client::{BackendClient, ClientError};
use crate::config::Config;
use crate::progress::{self, ProgressMode};
use crate::session::{cancel_on_ctrl_c, Session};
use crate::store::{AppStore, NoticeLevel};
use crate::stream::StreamError;

/// Refresh the installed model list.
///
/// On failure the previous list is kept. If the selected model is not
/// installed and something else is, the first installed model is selected.
pub async fn fetch_models(
    client: &BackendClient,
    store: &AppStore,
) -> Result<Vec<ModelInfo>, ClientError> {
    let models = match client.list_models().await {
        Ok(list) => list.models,
        Err(e) => {
            tracing::error!(error = %e, "failed to fetch models");
            return Err(e);
        }
    };

    store.update(|s| {
        if !models.is_empty() && !models.iter().any(|m| m.name == s.selected_model) {
            tracing::info!(
                from = %s.selected_model,
                to = %models[0].name,
                "selected model is not installed, switching"
            );
            s.selected_model = models[0].name.clone();
        }
        s.available_models = models.clone();
    });
    Ok(models)
}

/// Fetch `/setup/status` into the store. A failed check clears it.
pub async fn check_setup(
    client: &BackendClient,
    store: &AppStore,
) -> Result<SetupStatus, ClientError> {
    match client.setup_status().await {
        Ok(status) => {
            tracing::debug!(ready = status.ready, ollama = status.ollama_running, "setup status");
            store.update(|s| s.setup = Some(status.clone()));
            Ok(status)
        }
        Err(e) => {
            tracing::warn!(error = %e, "setup status check failed");
            store.update(|s| s.setup = None);
            Err(e)
        }
    }
}

/// Poll `/setup/status` every `interval` until the backend reports ready.
///
/// Failed checks are retried. Returns `None` if cancelled first.
pub async fn wait_until_ready(
    client: &BackendClient,
    store: &AppStore,
    interval: Duration,
    cancel: CancellationToken,
) -> Option<SetupStatus> {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return None,
            _ = ticker.tick() => {}
        }
        if let Ok(status) = check_setup(client, store).await {
            if status.ready {
                return Some(status);
            }
        }
    }
}

/// Download `model` through the backend, tracking progress in `store.pull`.
///
/// The final progress stays in the store. A finished pull refreshes the
/// setup status and the model list.
pub async fn pull_model(
    client: &BackendClient,
    store: &AppStore,
    model: &str,
    cancel: CancellationToken,
) -> PullProgress {
    store.update(|s| s.pull = Some(PullProgress::new(model)));
    tracing::info!(model, "pull started");

    let failure = match client.pull_model(model, cancel).await {
        Ok(mut events) => loop {
            match events.next().await {
                Some(Ok(event)) => {
                    let terminal = store.update(|s| match s.pull.as_mut() {
                        Some(progress) => {
                            progress.apply(event);
                            progress.is_terminal()
                        }
                        None => true,
                    });
                    if terminal {
                        break None;
                    }
                }
                Some(Err(StreamError::Cancelled)) => break Some("download cancelled".to_string()),
                Some(Err(StreamError::Read(e))) => break Some(format!("connection lost: {}", e)),
                None => break Some("download stream closed before completion".to_string()),
            }
        },
        Err(ClientError::Cancelled) => Some("download cancelled".to_string()),
        Err(e) => Some(e.user_message()),
    };

    if let Some(message) = failure {
        store.update(|s| {
            if let Some(progress) = s.pull.as_mut() {
                progress.fail(message);
            }
        });
    }

    let progress = store
        .read(|s| s.pull.clone())
        .unwrap_or_else(|| PullProgress::new(model));

    match progress.phase {
        PullPhase::Finished => {
            tracing::info!(model, "pull finished");
            store.push_notice(NoticeLevel::Success, format!("Downloaded {}", model));
            let _ = check_setup(client, store).await;
            let _ = fetch_models(client, store).await;
        }
        _ => {
            let reason = progress.error.as_deref().unwrap_or("unknown error");
            store.push_notice(
                NoticeLevel::Error,
                format!("Failed to download {}: {}", model, reason),
            );
        }
    }
    progress
}

/// `mnemora setup`: print the setup status, optionally pull a model and
/// optionally wait until the backend reports ready.
pub async fn run_setup(
    config: &Config,
    pull: Option<String>,
    wait: bool,
    mode: ProgressMode,
) -> Result<()> {
    let session = Session::open(config)?;
    let client = &session.client;
    let store = &session.store;

    let status = check_setup(client, store).await?;
    print_setup(&status);

    if let Some(model) = pull {
        let cancel = cancel_on_ctrl_c();
        let follow_cancel = CancellationToken::new();
        let follower = progress::follow(store.clone(), mode.reporter(), follow_cancel.clone());

        let result = pull_model(client, store, &model, cancel).await;

        follow_cancel.cancel();
        let _ = follower.await;

        match result.phase {
            PullPhase::Finished => println!("pulled {}", model),
            _ => bail!(
                "pull {} failed: {}",
                model,
                result.error.as_deref().unwrap_or("unknown error")
            ),
        }
    }

    if wait && !status.ready {
        println!("waiting for setup to complete (Ctrl-C to stop)...");
        match wait_until_ready(client, store, config.monitor.setup_interval(), cancel_on_ctrl_c())
            .await
        {
            Some(_) => println!("ready"),
            None => bail!("interrupted before setup completed"),
        }
    }

    Ok(())
}

fn print_setup(status: &SetupStatus) {
    println!("ready:            {}", status.ready);
    if let Some(installed) = status.ollama_installed {
        println!("ollama installed: {}", installed);
    }
    println!("ollama running:   {}", status.ollama_running);
    if let Some(llm) = status.installed_llm.as_deref() {
        println!("chat model:       {}", llm);
    }
    if let Some(embedding) = status.installed_embedding.as_deref() {
        println!("embedding model:  {}", embedding);
    }
    for model in status.missing_models() {
        println!("missing:          {}  (mnemora setup --pull {})", model, model);
    }
    if let Some(message) = status.message.as_deref() {
        println!("note:             {}", message);
    }
    if let Some(url) = status.install_url.as_deref() {
        println!("install:          {}", url);
    }
}

/// `mnemora models`: list installed models, optionally selecting one.
pub async fn run_models(config: &Config, select: Option<String>) -> Result<()> {
    let session = Session::open(config)?;
    let models = fetch_models(&session.client, &session.store).await?;

    if let Some(name) = select {
        if !models.iter().any(|m| m.name == name) {
            bail!("model '{}' is not installed", name);
        }
        session.store.update(|s| s.select_model(name));
        session.save()?;
    }

    if models.is_empty() {
        println!("No models installed.");
        return Ok(());
    }

    let selected = session.store.read(|s| s.selected_model.clone());
    println!("  {:<32} SIZE", "NAME");
    for model in &models {
        let marker = if model.name == selected { "*" } else { " " };
        println!("{} {:<32} {}", marker, model.name, format_size(model.size));
    }
    Ok(())
}

fn format_size(bytes: u64) -> String {
    const GB: f64 = 1_000_000_000.0;
    const MB: f64 = 1_000_000.0;
    let b = bytes as f64;
    if b >= GB {
        format!("{:.1} GB", b / GB)
    } else {
        format!("{:.0} MB", b / MB)
    }
}
