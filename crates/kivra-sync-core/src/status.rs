//! Status values and events shared by the orchestrator, the web bridge and
//! the terminal consumer.
//!
//! The wire format is plain JSON, one object per event:
//!
//! ```json
//! {"status":"qr_ready","message":"Scan the QR code with BankID","qr_url":"/qr.png"}
//! {"heartbeat":true}
//! ```

use serde::{Deserialize, Serialize};

/// The process-wide sync status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Nothing is running
    #[default]
    Idle,
    /// A run has started and is requesting a challenge
    Processing,
    /// A QR challenge is waiting to be scanned
    QrReady,
    /// BankID resolved; documents are being fetched
    Authenticated,
    /// The last run finished successfully
    Complete,
    /// The last run failed
    Error,
}

impl SyncStatus {
    /// Whether a run is in flight while this status is current.
    #[must_use]
    pub const fn is_busy(self) -> bool {
        matches!(self, Self::Processing | Self::QrReady | Self::Authenticated)
    }

    /// Whether this status ends a run.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Error)
    }

    /// Wire name of the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Processing => "processing",
            Self::QrReady => "qr_ready",
            Self::Authenticated => "authenticated",
            Self::Complete => "complete",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Document counters for one sync run.
///
/// Missing fields deserialize as 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Stats {
    /// Receipts listed by the remote service
    pub receipts_total: u64,
    /// Receipts processed after the count cap
    pub receipts_fetched: u64,
    /// Receipts newly written to storage
    pub receipts_stored: u64,
    /// Letters listed by the remote service
    pub letters_total: u64,
    /// Letters processed after the count cap
    pub letters_fetched: u64,
    /// Letters newly written to storage
    pub letters_stored: u64,
}

impl Stats {
    /// Human-readable two-line summary.
    ///
    /// ```
    /// use kivra_sync_core::status::Stats;
    ///
    /// let stats = Stats { receipts_total: 8, receipts_fetched: 5, receipts_stored: 2, ..Default::default() };
    /// assert_eq!(
    ///     stats.summary(),
    ///     "Receipts: 2 new items, 5 of 8 fetched\nLetters: 0 new items, 0 fetched"
    /// );
    /// ```
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "Receipts: {} new items, {} fetched\nLetters: {} new items, {} fetched",
            self.receipts_stored,
            fetched_count(self.receipts_fetched, self.receipts_total),
            self.letters_stored,
            fetched_count(self.letters_fetched, self.letters_total),
        )
    }
}

fn fetched_count(fetched: u64, total: u64) -> String {
    if fetched == total {
        total.to_string()
    } else {
        format!("{fetched} of {total}")
    }
}

/// A single status transition (or heartbeat) as broadcast to consumers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEvent {
    /// Current status
    #[serde(default)]
    pub status: SyncStatus,
    /// Human-readable message
    #[serde(default)]
    pub message: String,
    /// Where the QR image can be fetched, while a challenge is pending
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qr_url: Option<String>,
    /// Counters, on progress and completion events
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<Stats>,
    /// Keep-alive marker; carries no state
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub heartbeat: bool,
}

impl StatusEvent {
    /// Create a transition event.
    #[must_use]
    pub fn new(status: SyncStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            ..Default::default()
        }
    }

    /// Attach a QR image location.
    #[must_use]
    pub fn with_qr_url(mut self, url: impl Into<String>) -> Self {
        self.qr_url = Some(url.into());
        self
    }

    /// Attach counters.
    #[must_use]
    pub const fn with_stats(mut self, stats: Stats) -> Self {
        self.stats = Some(stats);
        self
    }

    /// The initial snapshot before any run.
    #[must_use]
    pub fn idle() -> Self {
        Self::new(SyncStatus::Idle, "Ready to sync")
    }

    /// A keep-alive event. Serializes as `{"heartbeat":true}`.
    #[must_use]
    pub fn heartbeat() -> Self {
        Self {
            heartbeat: true,
            ..Default::default()
        }
    }

    /// Serialize for the wire.
    #[must_use]
    pub fn to_json(&self) -> String {
        if self.heartbeat {
            return r#"{"heartbeat":true}"#.to_string();
        }
        serde_json::to_string(self).unwrap_or_default()
    }
}
