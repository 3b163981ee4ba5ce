//! Daemon state definition.

use expense_relay::RelaySupervisor;
use relay_config_and_utils::{Config, Paths};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Shared daemon state (thread-safe).
#[derive(Clone)]
pub struct DaemonState {
    pub config: Arc<Config>,
    pub paths: Arc<Paths>,
    /// Retry dispatcher, drain reconciler and their background tasks.
    pub relay: Arc<RelaySupervisor>,
    /// Last `ledgerlite://` link accepted by `openUrl`.
    pub initial_url: Arc<RwLock<Option<String>>>,
}

impl DaemonState {
    pub fn new(config: Config, paths: Paths, relay: RelaySupervisor) -> Self {
        Self {
            config: Arc::new(config),
            paths: Arc::new(paths),
            relay: Arc::new(relay),
            initial_url: Arc::new(RwLock::new(None)),
        }
    }

    pub async fn remember_url(&self, url: &str) {
        *self.initial_url.write().await = Some(url.to_string());
    }

    pub async fn initial_url(&self) -> Option<String> {
        self.initial_url.read().await.clone()
    }
}
