//! Server-Sent Events feed of status transitions.
//!
//! Every connection starts with the current snapshot, followed by each
//! transition and heartbeat as a `data:` line holding one JSON object.

use std::convert::Infallible;

use axum::{
    extract::State,
    response::sse::{Event, Sse},
};
use futures::stream::Stream;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

use crate::hub::Subscription;
use crate::status::StatusEvent;

use super::state::AppState;

fn to_sse(event: &StatusEvent) -> Event {
    Event::default().data(event.to_json())
}

/// Turn a hub subscription into an SSE event stream.
///
/// The stream ends when the subscriber falls behind the broadcast buffer, the
/// hub goes away or `shutdown` fires; the client reconnects and starts from a
/// fresh snapshot.
pub fn event_stream(
    subscription: Subscription,
    shutdown: CancellationToken,
) -> impl Stream<Item = Result<Event, Infallible>> {
    let Subscription {
        snapshot,
        mut receiver,
    } = subscription;

    async_stream::stream! {
        yield Ok(to_sse(&snapshot));

        loop {
            let next = tokio::select! {
                () = shutdown.cancelled() => break,
                next = receiver.recv() => next,
            };
            match next {
                Ok(event) => yield Ok(to_sse(&event)),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Dropping slow event subscriber ({} events behind)", skipped);
                    break;
                }
                Err(RecvError::Closed) => break,
            }
        }
    }
}

/// GET /events - SSE stream of status events.
pub async fn events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let subscription = state.hub.subscribe();
    tracing::debug!(
        subscribers = state.hub.subscriber_count(),
        "event subscriber connected"
    );
    Sse::new(event_stream(subscription, state.shutdown.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::StatusHub;
    use crate::status::SyncStatus;
    use futures::StreamExt as _;

    #[tokio::test]
    async fn test_stream_starts_with_snapshot() {
        let hub = StatusHub::default();
        hub.publish(StatusEvent::new(SyncStatus::Processing, "Starting"));

        let stream = event_stream(hub.subscribe(), CancellationToken::new());
        futures::pin_mut!(stream);
        assert!(stream.next().await.is_some());

        hub.publish(StatusEvent::new(SyncStatus::Error, "Sync failed: x"));
        assert!(stream.next().await.is_some());
    }

    #[tokio::test]
    async fn test_lagging_stream_ends() {
        let hub = StatusHub::new(1);
        let stream = event_stream(hub.subscribe(), CancellationToken::new());
        futures::pin_mut!(stream);
        assert!(stream.next().await.is_some());

        for n in 0..5 {
            hub.publish(StatusEvent::new(SyncStatus::Authenticated, format!("item {n}")));
        }
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_shutdown_ends_stream() {
        let hub = StatusHub::default();
        let shutdown = CancellationToken::new();
        let stream = event_stream(hub.subscribe(), shutdown.clone());
        futures::pin_mut!(stream);
        assert!(stream.next().await.is_some());

        shutdown.cancel();
        assert!(stream.next().await.is_none());
    }
}
