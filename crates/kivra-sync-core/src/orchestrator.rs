//! Sync run coordination.
//!
//! A run signs in with BankID, lists receipts and letters, fetches every
//! document that is not already stored and persists it. Every transition is
//! published on the [`StatusHub`]:
//!
//! ```text
//! processing -> qr_ready -> authenticated (+ progress) -> complete
//!            \___________\______________________________-> error
//! ```
//!
//! At most one run is active at a time. Starting a run while one is active
//! fails with [`Error::Busy`] and has no other effect.

use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinHandle;

use crate::auth::{Authenticator, Session};
use crate::config::{AuthConfig, Config, StorageProvider, SyncConfig};
use crate::error::{Error, Result};
use crate::hub::{RunGuard, StatusHub};
use crate::notify::{Notifier, Notify};
use crate::remote::{AuthApi, KivraClient, LetterPart, LetterSummary, Mailbox, ReceiptSummary};
use crate::status::{Stats, StatusEvent, SyncStatus};
use crate::storage::{
    ContentFormat, DocumentKind, DocumentMeta, DocumentStore, FileSystemStore, PersistOutcome,
};

/// Where the web bridge serves the current challenge QR image.
pub const QR_IMAGE_PATH: &str = "/qr.png";

/// What a run fetches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOptions {
    /// Fetch receipts
    pub fetch_receipts: bool,
    /// Fetch letters
    pub fetch_letters: bool,
    /// Maximum receipts to process (0 = unlimited)
    pub max_receipts: usize,
    /// Maximum letters to process (0 = unlimited)
    pub max_letters: usize,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self::from(&SyncConfig::default())
    }
}

impl From<&SyncConfig> for SyncOptions {
    fn from(config: &SyncConfig) -> Self {
        Self {
            fetch_receipts: config.fetch_receipts,
            fetch_letters: config.fetch_letters,
            max_receipts: config.max_receipts,
            max_letters: config.max_letters,
        }
    }
}

/// Outcome of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunResult {
    /// Whether the run completed
    pub success: bool,
    /// Summary on success, the failure on error
    pub message: String,
    /// Counters at the end of the run
    pub stats: Stats,
    /// Items skipped because fetching or storing them failed
    pub failed_items: u64,
}

/// Something that can start a run without waiting for it.
///
/// Used by the web bridge and the ntfy listener.
pub trait RunTrigger: Send + Sync {
    /// Start a run with default options.
    ///
    /// Fails with [`Error::Busy`] while a run is active.
    fn trigger(&self) -> Result<()>;
}

#[derive(Debug, Default)]
struct Progress {
    stats: Stats,
    failed_items: u64,
}

fn cap<T>(items: &[T], max: usize) -> &[T] {
    if max == 0 {
        items
    } else {
        &items[..max.min(items.len())]
    }
}

/// Coordinates authentication, fetching and storage for sync runs.
pub struct Orchestrator<R, S, N> {
    remote: Arc<R>,
    store: Arc<S>,
    notifier: Arc<N>,
    hub: StatusHub,
    auth: AuthConfig,
    defaults: SyncOptions,
}

impl<R, S, N> Clone for Orchestrator<R, S, N> {
    fn clone(&self) -> Self {
        Self {
            remote: Arc::clone(&self.remote),
            store: Arc::clone(&self.store),
            notifier: Arc::clone(&self.notifier),
            hub: self.hub.clone(),
            auth: self.auth.clone(),
            defaults: self.defaults,
        }
    }
}

impl<R, S, N> std::fmt::Debug for Orchestrator<R, S, N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("hub", &self.hub)
            .field("defaults", &self.defaults)
            .finish_non_exhaustive()
    }
}

/// The orchestrator wired to the real Kivra service.
pub type KivraOrchestrator = Orchestrator<KivraClient, FileSystemStore, Notifier>;

impl KivraOrchestrator {
    /// Build from configuration.
    ///
    /// `interactive` selects terminal output for the local notifier.
    pub fn from_config(config: &Config, hub: StatusHub, interactive: bool) -> Result<Self> {
        config.validate()?;

        let remote = KivraClient::new(config.retry.clone())?;
        let store = match config.storage.provider {
            StorageProvider::Filesystem => FileSystemStore::from_config(&config.storage),
        };
        let notifier = Notifier::from_config(&config.notify, interactive)?;

        Ok(Self::new(
            Arc::new(remote),
            Arc::new(store),
            Arc::new(notifier),
            hub,
            config.auth.clone(),
            SyncOptions::from(&config.sync),
        ))
    }
}

impl<R, S, N> Orchestrator<R, S, N>
where
    R: AuthApi + Mailbox + 'static,
    S: DocumentStore + 'static,
    N: Notify + 'static,
{
    /// Wire an orchestrator from its capabilities.
    pub fn new(
        remote: Arc<R>,
        store: Arc<S>,
        notifier: Arc<N>,
        hub: StatusHub,
        auth: AuthConfig,
        defaults: SyncOptions,
    ) -> Self {
        Self {
            remote,
            store,
            notifier,
            hub,
            auth,
            defaults,
        }
    }

    /// The hub transitions are published on.
    pub fn hub(&self) -> &StatusHub {
        &self.hub
    }

    /// The notifier in use.
    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    /// Options used by [`RunTrigger::trigger`].
    pub fn default_options(&self) -> SyncOptions {
        self.defaults
    }

    /// Start a run in the background.
    ///
    /// Fails with [`Error::Busy`] while another run is active.
    pub fn try_start(&self, options: SyncOptions) -> Result<JoinHandle<RunResult>> {
        let guard = self.hub.try_acquire().ok_or(Error::Busy)?;
        let this = self.clone();
        Ok(tokio::spawn(async move { this.run_guarded(guard, options).await }))
    }

    /// Run to completion.
    ///
    /// Fails with [`Error::Busy`] while another run is active; every other
    /// failure is reported in the returned [`RunResult`].
    ///
    /// The run lives in its own task together with its gate. Dropping this
    /// future stops waiting for it; the run still finishes and publishes
    /// its terminal event, and the gate stays closed until then.
    pub async fn run(&self, options: SyncOptions) -> Result<RunResult> {
        self.try_start(options)?
            .await
            .map_err(|e| Error::Internal(format!("sync task failed: {e}")))
    }

    async fn run_guarded(&self, guard: RunGuard, options: SyncOptions) -> RunResult {
        tracing::info!("Starting sync run");
        self.hub.publish(StatusEvent::new(
            SyncStatus::Processing,
            "Starting BankID authentication...",
        ));

        // The body runs in its own task so a panic still ends in a terminal event.
        let this = self.clone();
        let body = tokio::spawn(async move { this.execute(options).await });

        let result = match body.await {
            Ok(Ok(progress)) => RunResult {
                success: true,
                message: progress.stats.summary(),
                stats: progress.stats,
                failed_items: progress.failed_items,
            },
            Ok(Err(e)) => {
                tracing::error!("Sync failed: {}", e);
                self.failure(format!("Sync failed: {e}"))
            }
            Err(e) => {
                tracing::error!("Sync task aborted: {}", e);
                self.failure(format!("Sync failed unexpectedly: {e}"))
            }
        };

        let event = if result.success {
            StatusEvent::new(SyncStatus::Complete, result.message.clone()).with_stats(result.stats)
        } else {
            StatusEvent::new(SyncStatus::Error, result.message.clone())
        };
        self.hub.finish(guard, event);

        self.notify("result", self.notifier.report_result(&result))
            .await;
        result
    }

    fn failure(&self, message: String) -> RunResult {
        RunResult {
            success: false,
            message,
            stats: self.hub.snapshot().stats.unwrap_or_default(),
            failed_items: 0,
        }
    }

    async fn notify(&self, what: &str, delivery: impl Future<Output = Result<()>>) {
        if let Err(e) = delivery.await {
            tracing::warn!("Failed to deliver {} notification: {}", what, e);
        }
    }

    async fn execute(&self, options: SyncOptions) -> Result<Progress> {
        let authenticator = Authenticator::new(Arc::clone(&self.remote), self.auth.clone());

        let challenge = authenticator.begin_challenge().await?;
        self.hub.publish_challenge(
            StatusEvent::new(SyncStatus::QrReady, "Scan the QR code with the BankID app")
                .with_qr_url(QR_IMAGE_PATH),
            challenge.qr_payload(),
        );
        self.notify(
            "challenge",
            self.notifier.present_challenge(challenge.qr_payload()),
        )
        .await;

        let session = authenticator.await_resolution(challenge).await?;
        let mut progress = Progress::default();
        self.hub.publish(
            StatusEvent::new(SyncStatus::Authenticated, "Authenticated, fetching documents...")
                .with_stats(progress.stats),
        );
        self.notify("authenticated", self.notifier.report_authenticated())
            .await;

        if options.fetch_receipts {
            self.sync_receipts(&session, options.max_receipts, &mut progress)
                .await?;
        }
        if options.fetch_letters {
            self.sync_letters(&session, options.max_letters, &mut progress)
                .await?;
        }

        tracing::info!("Sync complete: {}", progress.stats.summary().replace('\n', "; "));
        Ok(progress)
    }

    fn publish_progress(&self, progress: &Progress, message: String) {
        self.hub.publish(
            StatusEvent::new(SyncStatus::Authenticated, message).with_stats(progress.stats),
        );
    }

    /// Fold one item's outcome into `progress`. Fatal errors abort the loop.
    fn record(
        &self,
        kind: DocumentKind,
        key: &str,
        outcome: Result<bool>,
        progress: &mut Progress,
    ) -> Result<bool> {
        match outcome {
            Ok(stored) => Ok(stored),
            Err(e) if e.is_fatal() => Err(e),
            Err(Error::StorageConflict(_)) => Ok(false),
            Err(e) => {
                progress.failed_items += 1;
                tracing::warn!("Skipping {} {}: {}", kind.as_str(), key, e);
                Ok(false)
            }
        }
    }

    async fn sync_receipts(
        &self,
        session: &Session,
        max: usize,
        progress: &mut Progress,
    ) -> Result<()> {
        self.publish_progress(progress, "Fetching receipts...".to_string());
        let listing = self.remote.list_receipts(session).await?;
        progress.stats.receipts_total = listing.total;

        if let Err(e) = self
            .store
            .report_listing(DocumentKind::Receipt, &listing.raw)
            .await
        {
            tracing::warn!("Failed to archive receipt listing: {}", e);
        }

        let items = cap(&listing.items, max);
        tracing::info!(
            "Found {} receipts, processing {}",
            listing.total,
            items.len()
        );

        for (n, receipt) in items.iter().enumerate() {
            progress.stats.receipts_fetched += 1;
            let outcome = self.sync_receipt(session, receipt).await;
            if self.record(DocumentKind::Receipt, &receipt.key, outcome, progress)? {
                progress.stats.receipts_stored += 1;
            }
            self.publish_progress(
                progress,
                format!("Receipts: {} of {} processed", n + 1, items.len()),
            );
        }
        Ok(())
    }

    async fn sync_receipt(&self, session: &Session, receipt: &ReceiptSummary) -> Result<bool> {
        let meta = DocumentMeta::receipt(&receipt.key, &receipt.date, &receipt.store_name);
        if self.store.exists(&meta).await? {
            tracing::debug!("Skipping receipt {}: already fetched", receipt.key);
            return Ok(false);
        }

        tracing::debug!("Processing receipt {}", receipt.key);
        let details = self.remote.receipt_details(session, &receipt.key).await?;
        let pdf = self.remote.receipt_pdf(session, &receipt.key).await?;

        let outcome = self
            .store
            .persist(&pdf, &meta.with_format(ContentFormat::Pdf))
            .await?;
        // Metadata last: its presence marks the receipt as done.
        self.store.report_metadata(&details, &meta).await?;

        Ok(outcome == PersistOutcome::Stored)
    }

    async fn sync_letters(
        &self,
        session: &Session,
        max: usize,
        progress: &mut Progress,
    ) -> Result<()> {
        self.publish_progress(progress, "Fetching letters...".to_string());
        let listing = self.remote.list_letters(session).await?;
        progress.stats.letters_total = listing.total();

        let raw = Value::Array(listing.raw.clone());
        if let Err(e) = self.store.report_listing(DocumentKind::Letter, &raw).await {
            tracing::warn!("Failed to archive letter listing: {}", e);
        }

        let items = cap(&listing.items, max);
        tracing::info!(
            "Found {} letters, processing {}",
            listing.total(),
            items.len()
        );

        for (n, letter) in items.iter().enumerate() {
            progress.stats.letters_fetched += 1;
            let outcome = self.sync_letter(session, letter).await;
            if self.record(DocumentKind::Letter, &letter.key, outcome, progress)? {
                progress.stats.letters_stored += 1;
            }
            self.publish_progress(
                progress,
                format!("Letters: {} of {} processed", n + 1, items.len()),
            );
        }
        Ok(())
    }

    async fn sync_letter(&self, session: &Session, letter: &LetterSummary) -> Result<bool> {
        let meta = DocumentMeta::letter(&letter.key, &letter.date, &letter.sender_name);
        if self.store.exists(&meta).await? {
            tracing::debug!("Skipping letter {}: already fetched", letter.key);
            return Ok(false);
        }

        tracing::debug!("Processing letter {}", letter.key);
        let content = self.remote.letter_content(session, &letter.key).await?;
        if content.parts.is_empty() {
            tracing::warn!("Letter {} has no parts", letter.key);
        }

        let multi_part = content.parts.len() > 1;
        let mut parts_stored = 0usize;
        for (index, part) in content.parts.iter().enumerate() {
            let (format, data): (ContentFormat, Cow<'_, [u8]>) = match part {
                LetterPart::Text(body) => (ContentFormat::Text, Cow::Borrowed(body.as_bytes())),
                LetterPart::Html(body) => (ContentFormat::Html, Cow::Borrowed(body.as_bytes())),
                LetterPart::Pdf { file_key } => (
                    ContentFormat::Pdf,
                    Cow::Owned(
                        self.remote
                            .letter_file(session, &letter.key, file_key)
                            .await?,
                    ),
                ),
                LetterPart::Unsupported(content_type) => {
                    tracing::warn!(
                        "Unknown content type in letter {}: {}",
                        letter.key,
                        content_type
                    );
                    continue;
                }
            };

            let mut part_meta = meta.with_format(format);
            if multi_part {
                part_meta = part_meta.with_part(index);
            }
            if self.store.persist(&data, &part_meta).await? == PersistOutcome::Stored {
                parts_stored += 1;
            }
        }

        let mut metadata = letter.raw.clone();
        if let Value::Object(map) = &mut metadata {
            map.insert("content".to_string(), content.raw);
        }
        self.store.report_metadata(&metadata, &meta).await?;

        Ok(parts_stored > 0)
    }
}

impl<R, S, N> RunTrigger for Orchestrator<R, S, N>
where
    R: AuthApi + Mailbox + 'static,
    S: DocumentStore + 'static,
    N: Notify + 'static,
{
    fn trigger(&self) -> Result<()> {
        self.try_start(self.defaults).map(|_| ())
    }
}
