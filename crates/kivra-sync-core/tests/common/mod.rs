//! In-memory fakes shared by the integration tests.

#![allow(dead_code)]

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde_json::{json, Value};
use tokio::sync::{broadcast, Semaphore};

use kivra_sync_core::auth::Session;
use kivra_sync_core::config::AuthConfig;
use kivra_sync_core::error::{Error, Result};
use kivra_sync_core::hub::StatusHub;
use kivra_sync_core::notify::Notify;
use kivra_sync_core::orchestrator::{Orchestrator, RunResult, SyncOptions};
use kivra_sync_core::remote::{
    AuthApi, AuthStart, LetterContent, LetterListing, LetterPart, Mailbox, PollState,
    ReceiptListing, ReceiptSummary, TokenGrant,
};
use kivra_sync_core::status::{StatusEvent, SyncStatus};
use kivra_sync_core::storage::{DocumentKind, DocumentMeta, DocumentStore, PersistOutcome};

pub const QR_PAYLOAD: &str = "bankid.fake-token.0.fake-secret";

/// An unsigned JWT with the given claims.
pub fn id_token(claims: &Value) -> String {
    format!(
        "{}.{}.sig",
        URL_SAFE_NO_PAD.encode(br#"{"alg":"none"}"#),
        URL_SAFE_NO_PAD.encode(claims.to_string())
    )
}

/// Scripted Kivra service.
#[derive(Default)]
pub struct FakeKivra {
    /// Poll answers in order; `Complete` once exhausted
    pub polls: Mutex<VecDeque<PollState>>,
    pub receipts: Vec<ReceiptSummary>,
    pub letters: Vec<Value>,
    /// Receipt keys whose PDF fetch fails, with the error to return
    pub broken_receipts: Mutex<Vec<(String, Error)>>,
    /// When set, listing receipts waits for a permit
    pub hold: Option<Arc<Semaphore>>,
    /// When set, listing receipts panics
    pub panic_on_listing: bool,
    pub authorize_calls: AtomicU32,
    pub pdf_calls: AtomicU32,
}

impl FakeKivra {
    pub fn with_receipts(count: usize) -> Self {
        Self {
            receipts: (1..=count)
                .map(|n| ReceiptSummary {
                    key: format!("r{n}"),
                    date: format!("2024-01-{n:02}"),
                    store_name: "ICA Maxi".to_string(),
                })
                .collect(),
            ..Self::default()
        }
    }

    pub fn with_letters(mut self, letters: Vec<Value>) -> Self {
        self.letters = letters;
        self
    }

    pub fn with_polls(self, polls: impl IntoIterator<Item = PollState>) -> Self {
        *self.polls.lock().unwrap() = polls.into_iter().collect();
        self
    }

    pub fn with_hold(mut self, hold: Arc<Semaphore>) -> Self {
        self.hold = Some(hold);
        self
    }

    pub fn panicking() -> Self {
        Self {
            panic_on_listing: true,
            ..Self::with_receipts(2)
        }
    }

    pub fn break_receipt(self, key: &str, error: Error) -> Self {
        self.broken_receipts
            .lock()
            .unwrap()
            .push((key.to_string(), error));
        self
    }

    fn take_broken(&self, key: &str) -> Option<Error> {
        let mut broken = self.broken_receipts.lock().unwrap();
        let pos = broken.iter().position(|(k, _)| k == key)?;
        Some(broken.remove(pos).1)
    }
}

impl AuthApi for FakeKivra {
    async fn authorize(&self, _code_challenge: &str) -> Result<AuthStart> {
        self.authorize_calls.fetch_add(1, Ordering::SeqCst);
        Ok(AuthStart {
            qr_code: QR_PAYLOAD.to_string(),
            next_poll_url: "/v2/bankid/poll/1".to_string(),
            code: "auth-code".to_string(),
        })
    }

    async fn poll(&self, _poll_url: &str) -> Result<PollState> {
        Ok(self
            .polls
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(PollState::Complete))
    }

    async fn exchange(&self, _code: &str, _code_verifier: &str) -> Result<TokenGrant> {
        Ok(TokenGrant {
            access_token: "access-token".to_string(),
            id_token: id_token(&json!({"kivra_user_id": "user-1"})),
        })
    }
}

impl Mailbox for FakeKivra {
    async fn list_receipts(&self, _session: &Session) -> Result<ReceiptListing> {
        if let Some(hold) = &self.hold {
            hold.acquire()
                .await
                .map_err(|e| Error::Internal(e.to_string()))?
                .forget();
        }
        if self.panic_on_listing {
            panic!("receipt listing blew up");
        }
        Ok(ReceiptListing {
            total: self.receipts.len() as u64,
            items: self.receipts.clone(),
            raw: json!({"total": self.receipts.len()}),
        })
    }

    async fn receipt_details(&self, _session: &Session, key: &str) -> Result<Value> {
        Ok(json!({"key": key, "totalAmount": 42}))
    }

    async fn receipt_pdf(&self, _session: &Session, key: &str) -> Result<Vec<u8>> {
        self.pdf_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.take_broken(key) {
            return Err(error);
        }
        Ok(format!("%PDF-1.4 {key}").into_bytes())
    }

    async fn list_letters(&self, _session: &Session) -> Result<LetterListing> {
        Ok(LetterListing::from_entries(self.letters.clone()))
    }

    async fn letter_content(&self, _session: &Session, key: &str) -> Result<LetterContent> {
        Ok(LetterContent {
            parts: vec![
                LetterPart::Text(format!("Hello from {key}")),
                LetterPart::Pdf {
                    file_key: "f1".to_string(),
                },
                LetterPart::Unsupported("image/png".to_string()),
            ],
            raw: json!({"subject": key}),
        })
    }

    async fn letter_file(&self, _session: &Session, key: &str, file_key: &str) -> Result<Vec<u8>> {
        Ok(format!("%PDF-1.4 {key}/{file_key}").into_bytes())
    }
}

/// Keeps everything in memory.
#[derive(Default)]
pub struct MemoryStore {
    pub files: Mutex<HashSet<String>>,
    pub metadata: Mutex<HashSet<String>>,
    pub listings: Mutex<Vec<DocumentKind>>,
}

impl MemoryStore {
    fn file_id(meta: &DocumentMeta) -> String {
        format!(
            "{}/{}/{:?}/{}",
            meta.kind.as_str(),
            meta.key,
            meta.part_index,
            meta.format.extension()
        )
    }

    fn doc_id(meta: &DocumentMeta) -> String {
        format!("{}/{}", meta.kind.as_str(), meta.key)
    }

    pub fn file_count(&self) -> usize {
        self.files.lock().unwrap().len()
    }

    pub fn has_metadata(&self, kind: DocumentKind, key: &str) -> bool {
        self.metadata
            .lock()
            .unwrap()
            .contains(&format!("{}/{}", kind.as_str(), key))
    }
}

impl DocumentStore for MemoryStore {
    async fn report_listing(&self, kind: DocumentKind, _listing: &Value) -> Result<()> {
        self.listings.lock().unwrap().push(kind);
        Ok(())
    }

    async fn exists(&self, meta: &DocumentMeta) -> Result<bool> {
        Ok(self.metadata.lock().unwrap().contains(&Self::doc_id(meta)))
    }

    async fn report_metadata(&self, _data: &Value, meta: &DocumentMeta) -> Result<()> {
        self.metadata.lock().unwrap().insert(Self::doc_id(meta));
        Ok(())
    }

    async fn persist(&self, _data: &[u8], meta: &DocumentMeta) -> Result<PersistOutcome> {
        if self.files.lock().unwrap().insert(Self::file_id(meta)) {
            Ok(PersistOutcome::Stored)
        } else {
            Ok(PersistOutcome::Duplicate)
        }
    }
}

/// Records every notification; optionally fails each delivery.
#[derive(Default)]
pub struct RecordingNotifier {
    pub calls: Mutex<Vec<String>>,
    pub fail: bool,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) -> Result<()> {
        self.calls.lock().unwrap().push(call);
        if self.fail {
            Err(Error::Notification("push service unreachable".into()))
        } else {
            Ok(())
        }
    }
}

impl Notify for RecordingNotifier {
    async fn present_challenge(&self, qr_payload: &str) -> Result<()> {
        self.record(format!("challenge:{qr_payload}"))
    }

    async fn report_authenticated(&self) -> Result<()> {
        self.record("authenticated".to_string())
    }

    async fn report_result(&self, result: &RunResult) -> Result<()> {
        self.record(format!("result:{}", result.success))
    }
}

pub type TestOrchestrator = Orchestrator<FakeKivra, MemoryStore, RecordingNotifier>;

/// Fast polling so paused-clock tests finish in few steps.
pub fn fast_auth() -> AuthConfig {
    AuthConfig {
        poll_interval: Duration::from_secs(2),
        challenge_timeout: Duration::from_secs(60),
        max_poll_retries: 2,
    }
}

pub fn receipts_only(max_receipts: usize) -> SyncOptions {
    SyncOptions {
        fetch_receipts: true,
        fetch_letters: false,
        max_receipts,
        max_letters: 0,
    }
}

pub struct Harness {
    pub orchestrator: TestOrchestrator,
    pub remote: Arc<FakeKivra>,
    pub store: Arc<MemoryStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub hub: StatusHub,
}

impl Harness {
    pub fn new(remote: FakeKivra) -> Self {
        Self::with_notifier(remote, RecordingNotifier::default())
    }

    pub fn with_notifier(remote: FakeKivra, notifier: RecordingNotifier) -> Self {
        let remote = Arc::new(remote);
        let store = Arc::new(MemoryStore::default());
        let notifier = Arc::new(notifier);
        let hub = StatusHub::default();
        let orchestrator = Orchestrator::new(
            Arc::clone(&remote),
            Arc::clone(&store),
            Arc::clone(&notifier),
            hub.clone(),
            fast_auth(),
            receipts_only(0),
        );
        Self {
            orchestrator,
            remote,
            store,
            notifier,
            hub,
        }
    }
}

/// Every event already queued on `receiver`, heartbeats excluded.
pub fn drain(receiver: &mut broadcast::Receiver<StatusEvent>) -> Vec<StatusEvent> {
    let mut events = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        if !event.heartbeat {
            events.push(event);
        }
    }
    events
}

/// Statuses in order, with consecutive repeats collapsed.
pub fn status_path(events: &[StatusEvent]) -> Vec<SyncStatus> {
    let mut path: Vec<SyncStatus> = Vec::new();
    for event in events {
        if path.last() != Some(&event.status) {
            path.push(event.status);
        }
    }
    path
}

/// Wait until an event with `message` arrives.
pub async fn wait_for_message(receiver: &mut broadcast::Receiver<StatusEvent>, message: &str) {
    loop {
        let event = receiver.recv().await.expect("hub feed closed");
        if event.message == message {
            return;
        }
    }
}
