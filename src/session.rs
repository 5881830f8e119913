//! Wiring shared by the CLI commands: config → client + store.

use std::sync::Arc;

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use crate::client::BackendClient;
use crate::config::Config;
use crate::persist::{load_snapshot, save_snapshot};
use crate::store::AppStore;

pub struct Session {
    pub config: Config,
    pub client: BackendClient,
    pub store: Arc<AppStore>,
}

impl Session {
    /// Build the client and restore the saved state.
    pub fn open(config: &Config) -> Result<Self> {
        let snapshot = load_snapshot(&config.storage.state_path)?;
        let client = BackendClient::new(&config.backend)?;
        let store = Arc::new(AppStore::from_snapshot(
            snapshot,
            &config.chat.default_model,
        ));
        Ok(Self {
            config: config.clone(),
            client,
            store,
        })
    }

    /// Write the persisted subset of the state back to disk.
    pub fn save(&self) -> Result<()> {
        let snapshot = self.store.read(|s| s.snapshot());
        save_snapshot(&self.config.storage.state_path, &snapshot)
    }
}

/// A token that fires on Ctrl-C.
pub fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::debug!("interrupted");
            token.cancel();
        }
    });
    cancel
}
