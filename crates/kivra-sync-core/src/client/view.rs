//! What a front-end shows for each status.

use std::fmt;

use crate::status::{Stats, StatusEvent, SyncStatus};

/// Headline shown next to the action control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Label {
    /// Ready to start a run
    Idle,
    /// A run is starting
    Processing,
    /// Waiting for the QR code to be scanned
    ScanQr,
    /// Documents are being fetched
    Syncing,
}

impl Label {
    /// Display text.
    pub const fn text(self) -> &'static str {
        match self {
            Self::Idle => "Ready to sync",
            Self::Processing => "Processing...",
            Self::ScanQr => "Scan the QR code with BankID",
            Self::Syncing => "Syncing documents...",
        }
    }
}

/// Outcome panel of a finished run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultsPanel {
    /// Whether the run completed
    pub success: bool,
    /// Message from the server
    pub message: String,
    /// Counters, only for completed runs
    pub stats: Option<Stats>,
}

/// The full UI state derived from the last status event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewState {
    /// Whether a run can be started
    pub action_enabled: bool,
    /// Headline
    pub label: Label,
    /// Whether the QR code is visible
    pub qr_visible: bool,
    /// Where to load the QR image from
    pub qr_url: Option<String>,
    /// Whether the progress spinner is visible
    pub spinner_visible: bool,
    /// Results of the last run, when visible
    pub results: Option<ResultsPanel>,
}

impl Default for ViewState {
    fn default() -> Self {
        Self::for_status(SyncStatus::Idle)
    }
}

impl ViewState {
    fn for_status(status: SyncStatus) -> Self {
        let (action_enabled, label, spinner_visible) = match status {
            SyncStatus::Idle | SyncStatus::Complete | SyncStatus::Error => (true, Label::Idle, false),
            SyncStatus::Processing => (false, Label::Processing, true),
            SyncStatus::QrReady => (false, Label::ScanQr, false),
            SyncStatus::Authenticated => (false, Label::Syncing, true),
        };
        Self {
            action_enabled,
            label,
            qr_visible: status == SyncStatus::QrReady,
            qr_url: None,
            spinner_visible,
            results: None,
        }
    }

    /// The view for `event`. Heartbeats yield `None`.
    pub fn render(event: &StatusEvent) -> Option<Self> {
        if event.heartbeat {
            return None;
        }

        let mut view = Self::for_status(event.status);
        match event.status {
            SyncStatus::QrReady => {
                view.qr_url = event.qr_url.clone();
            }
            SyncStatus::Complete => {
                view.results = Some(ResultsPanel {
                    success: true,
                    message: event.message.clone(),
                    stats: Some(event.stats.unwrap_or_default()),
                });
            }
            SyncStatus::Error => {
                view.results = Some(ResultsPanel {
                    success: false,
                    message: event.message.clone(),
                    stats: None,
                });
            }
            _ => {}
        }
        Some(view)
    }
}

impl fmt::Display for ViewState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label.text())?;
        if self.qr_visible {
            write!(f, " (QR code: {})", self.qr_url.as_deref().unwrap_or("/qr.png"))?;
        }

        let Some(results) = &self.results else {
            return Ok(());
        };
        writeln!(f)?;
        if results.success {
            writeln!(f, "Sync completed")?;
        } else {
            writeln!(f, "Sync failed")?;
        }
        write!(f, "{}", results.message)?;
        if let Some(stats) = &results.stats {
            write!(
                f,
                "\nReceipts: {} total, {} fetched, {} new\nLetters: {} total, {} fetched, {} new",
                stats.receipts_total,
                stats.receipts_fetched,
                stats.receipts_stored,
                stats.letters_total,
                stats.letters_fetched,
                stats.letters_stored,
            )?;
        }
        Ok(())
    }
}
