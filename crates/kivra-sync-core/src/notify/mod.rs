//! Progress notifiers.
//!
//! A notifier shows the BankID challenge to the user and reports how the run
//! went. The variant is picked from configuration when the process starts:
//!
//! - [`LocalNotifier`]: terminal output, or logs only when a web front-end
//!   does the displaying
//! - [`NtfyNotifier`]: push notifications through an ntfy server, which can
//!   also listen for a trigger phrase
//!
//! Delivery failures are returned to the caller, which logs them; they never
//! fail a sync run.

pub mod local;
pub mod ntfy;

use std::future::Future;

pub use local::LocalNotifier;
pub use ntfy::NtfyNotifier;

use crate::config::{NotifyConfig, NotifyProvider};
use crate::error::Result;
use crate::orchestrator::RunResult;

/// What a notifier can do.
pub trait Notify: Send + Sync {
    /// Show a BankID challenge.
    fn present_challenge(&self, qr_payload: &str) -> impl Future<Output = Result<()>> + Send;

    /// Tell the user the challenge was accepted.
    fn report_authenticated(&self) -> impl Future<Output = Result<()>> + Send;

    /// Report the outcome of a run.
    fn report_result(&self, result: &RunResult) -> impl Future<Output = Result<()>> + Send;
}

/// The configured notifier.
#[derive(Debug, Clone)]
pub enum Notifier {
    /// Terminal / log output
    Local(LocalNotifier),
    /// ntfy push notifications
    Ntfy(NtfyNotifier),
}

impl Notifier {
    /// Build the notifier selected by `config`.
    ///
    /// `interactive` decides whether the local variant prints to the terminal.
    pub fn from_config(config: &NotifyConfig, interactive: bool) -> Result<Self> {
        match config.provider {
            NotifyProvider::Local => Ok(Self::Local(LocalNotifier::new(interactive))),
            NotifyProvider::Ntfy => Ok(Self::Ntfy(NtfyNotifier::from_config(config)?)),
        }
    }

    /// The ntfy notifier, when that is the configured variant.
    pub fn as_ntfy(&self) -> Option<&NtfyNotifier> {
        match self {
            Self::Ntfy(ntfy) => Some(ntfy),
            Self::Local(_) => None,
        }
    }
}

impl Notify for Notifier {
    async fn present_challenge(&self, qr_payload: &str) -> Result<()> {
        match self {
            Self::Local(n) => n.present_challenge(qr_payload).await,
            Self::Ntfy(n) => n.present_challenge(qr_payload).await,
        }
    }

    async fn report_authenticated(&self) -> Result<()> {
        match self {
            Self::Local(n) => n.report_authenticated().await,
            Self::Ntfy(n) => n.report_authenticated().await,
        }
    }

    async fn report_result(&self, result: &RunResult) -> Result<()> {
        match self {
            Self::Local(n) => n.report_result(result).await,
            Self::Ntfy(n) => n.report_result(result).await,
        }
    }
}
