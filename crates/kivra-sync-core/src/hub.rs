//! Process-wide status snapshot and broadcast fan-out.
//!
//! [`StatusHub`] owns the single current [`StatusEvent`] and a broadcast
//! channel. Every transition replaces the snapshot and is sent to all
//! subscribers while the same lock is held, so a subscriber always starts
//! from the last published transition and then sees every later one, with
//! no gap and no duplicate.
//!
//! The hub also carries the single-flight gate for sync runs: at most one
//! [`RunGuard`] exists at a time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::status::{StatusEvent, SyncStatus};

/// Default broadcast buffer per subscriber.
///
/// A subscriber that falls this far behind is disconnected.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug)]
struct Snapshot {
    event: StatusEvent,
    qr_payload: Option<String>,
}

#[derive(Debug)]
struct HubInner {
    snapshot: Mutex<Snapshot>,
    tx: broadcast::Sender<StatusEvent>,
    running: AtomicBool,
}

/// Shared status state, cheap to clone.
#[derive(Debug, Clone)]
pub struct StatusHub {
    inner: Arc<HubInner>,
}

/// A new subscriber: the snapshot at subscription time plus the live feed.
#[derive(Debug)]
pub struct Subscription {
    /// The last transition published before subscribing
    pub snapshot: StatusEvent,
    /// Every event published after subscribing
    pub receiver: broadcast::Receiver<StatusEvent>,
}

impl StatusHub {
    /// Create a hub with the given per-subscriber buffer.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            inner: Arc::new(HubInner {
                snapshot: Mutex::new(Snapshot {
                    event: StatusEvent::idle(),
                    qr_payload: None,
                }),
                tx,
                running: AtomicBool::new(false),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Snapshot> {
        self.inner
            .snapshot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> StatusEvent {
        self.lock().event.clone()
    }

    /// Current status.
    pub fn status(&self) -> SyncStatus {
        self.lock().event.status
    }

    /// Raw QR payload of the pending challenge, if any.
    pub fn qr_payload(&self) -> Option<String> {
        self.lock().qr_payload.clone()
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.tx.receiver_count()
    }

    /// Publish a transition.
    ///
    /// Any pending QR payload is discarded unless the new status is
    /// [`SyncStatus::QrReady`].
    pub fn publish(&self, event: StatusEvent) {
        self.publish_inner(event, None);
    }

    /// Publish a `qr_ready` transition together with its raw payload.
    pub fn publish_challenge(&self, event: StatusEvent, qr_payload: impl Into<String>) {
        self.publish_inner(event, Some(qr_payload.into()));
    }

    fn publish_inner(&self, event: StatusEvent, qr_payload: Option<String>) {
        if event.heartbeat {
            self.heartbeat();
            return;
        }

        let mut snapshot = self.lock();
        tracing::debug!(status = %event.status, "publishing status transition");

        if event.status == SyncStatus::QrReady {
            if qr_payload.is_some() {
                snapshot.qr_payload = qr_payload;
            }
        } else {
            snapshot.qr_payload = None;
        }
        snapshot.event = event.clone();

        // No subscribers is not an error.
        let _ = self.inner.tx.send(event);
    }

    /// Publish the terminal transition of a run and release its gate.
    ///
    /// The gate opens before the event reaches any subscriber, so a consumer
    /// reacting to the terminal event can start the next run right away.
    pub fn finish(&self, guard: RunGuard, event: StatusEvent) {
        let mut snapshot = self.lock();
        tracing::debug!(status = %event.status, "publishing terminal transition");

        snapshot.qr_payload = None;
        snapshot.event = event.clone();
        drop(guard);

        let _ = self.inner.tx.send(event);
    }

    /// Subscribe to the feed, starting from the current snapshot.
    pub fn subscribe(&self) -> Subscription {
        let snapshot = self.lock();
        Subscription {
            snapshot: snapshot.event.clone(),
            receiver: self.inner.tx.subscribe(),
        }
    }

    /// Send a heartbeat to every subscriber without touching the snapshot.
    pub fn heartbeat(&self) {
        let _ = self.inner.tx.send(StatusEvent::heartbeat());
    }

    /// Broadcast heartbeats at a fixed interval until cancelled.
    pub fn spawn_heartbeat(&self, every: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        let hub = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => hub.heartbeat(),
                }
            }
        })
    }

    /// Try to claim the single-flight gate.
    ///
    /// Returns `None` while another run holds it.
    pub fn try_acquire(&self) -> Option<RunGuard> {
        self.inner
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunGuard {
                inner: Arc::clone(&self.inner),
            })
    }

    /// Whether a run currently holds the gate.
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }
}

impl Default for StatusHub {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

/// Proof that the holder owns the single run slot. Released on drop.
#[derive(Debug)]
pub struct RunGuard {
    inner: Arc<HubInner>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.inner.running.store(false, Ordering::Release);
    }
}
