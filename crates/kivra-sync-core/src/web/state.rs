//! Shared state for the web handlers.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::hub::StatusHub;
use crate::orchestrator::RunTrigger;

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    /// Status snapshot and broadcast feed
    pub hub: StatusHub,
    /// Starts a sync run
    pub trigger: Arc<dyn RunTrigger>,
    /// Closes open event streams on server shutdown
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Create the state from a hub and something that can start runs.
    pub fn new(hub: StatusHub, trigger: Arc<dyn RunTrigger>) -> Self {
        Self {
            hub,
            trigger,
            shutdown: CancellationToken::new(),
        }
    }

    /// Use `token` to close event streams.
    #[must_use]
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("hub", &self.hub)
            .finish_non_exhaustive()
    }
}
