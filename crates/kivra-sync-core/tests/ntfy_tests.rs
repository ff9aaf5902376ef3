//! ntfy publishing and trigger listening against a fake ntfy server.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::Router;
use futures::stream::{self, StreamExt as _};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use kivra_sync_core::error::{Error, Result};
use kivra_sync_core::notify::{Notify, NtfyNotifier};
use kivra_sync_core::orchestrator::{RunResult, RunTrigger};
use kivra_sync_core::status::Stats;

#[derive(Debug, Clone)]
struct Published {
    topic: String,
    title: String,
    filename: Option<String>,
    authorization: Option<String>,
    body: Bytes,
}

type Inbox = Arc<Mutex<Vec<Published>>>;

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

async fn publish(
    State(inbox): State<Inbox>,
    Path(topic): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    if topic == "broken" {
        return StatusCode::INTERNAL_SERVER_ERROR;
    }
    inbox.lock().unwrap().push(Published {
        topic,
        title: header(&headers, "title").unwrap_or_default(),
        filename: header(&headers, "filename"),
        authorization: header(&headers, "authorization"),
        body,
    });
    StatusCode::OK
}

async fn subscribe(Path(_topic): Path<String>) -> Body {
    let lines = [
        r#"{"event":"open"}"#,
        r#"{"event":"keepalive"}"#,
        r#"{"event":"message","message":"hello"}"#,
        "not json",
        r#"{"event":"message","message":"  RUN NOW "}"#,
    ];
    let chunks = lines
        .into_iter()
        .map(|line| Ok::<_, Infallible>(Bytes::from(format!("{line}\n"))));
    // Stay open like a real subscription.
    Body::from_stream(stream::iter(chunks).chain(stream::pending()))
}

async fn spawn_ntfy() -> (SocketAddr, Inbox) {
    let inbox = Inbox::default();
    let app = Router::new()
        .route("/{topic}", post(publish))
        .route("/{topic}/json", get(subscribe))
        .with_state(Arc::clone(&inbox));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await });
    (addr, inbox)
}

struct ChannelTrigger(mpsc::UnboundedSender<()>);

impl RunTrigger for ChannelTrigger {
    fn trigger(&self) -> Result<()> {
        self.0
            .send(())
            .map_err(|_| Error::Internal("receiver gone".into()))
    }
}

#[tokio::test]
async fn test_publishes_challenge_and_result() {
    let (addr, inbox) = spawn_ntfy().await;
    let ntfy = NtfyNotifier::new(&format!("http://{addr}/"), "kivra", "run now")
        .unwrap()
        .with_credentials("user", "pw");

    ntfy.present_challenge("bankid.token.0.secret").await.unwrap();
    ntfy.report_authenticated().await.unwrap();
    ntfy.report_result(&RunResult {
        success: false,
        message: "Sync failed: BankID authentication expired".to_string(),
        stats: Stats::default(),
        failed_items: 0,
    })
    .await
    .unwrap();

    let published = inbox.lock().unwrap().clone();
    assert_eq!(published.len(), 3);
    assert!(published.iter().all(|p| p.topic == "kivra"));
    assert!(published
        .iter()
        .all(|p| p.authorization.as_deref() == Some("Basic dXNlcjpwdw==")));

    assert_eq!(published[0].title, "Kivra authentication");
    assert_eq!(published[0].filename.as_deref(), Some("kivra-bankid.png"));
    assert_eq!(&published[0].body[..4], b"\x89PNG");

    assert_eq!(published[1].title, "Kivra authentication successful");
    assert_eq!(published[2].title, "Kivra sync failed");
    assert!(String::from_utf8_lossy(&published[2].body).contains("expired"));
}

#[tokio::test]
async fn test_publish_failure_is_reported() {
    let (addr, _inbox) = spawn_ntfy().await;
    let ntfy = NtfyNotifier::new(&format!("http://{addr}"), "broken", "run now").unwrap();

    let err = ntfy.report_authenticated().await.unwrap_err();
    assert!(matches!(err, Error::Notification(_)), "{err}");
}

#[tokio::test]
async fn test_listen_triggers_on_phrase_only() {
    let (addr, _inbox) = spawn_ntfy().await;
    let ntfy = NtfyNotifier::new(&format!("http://{addr}"), "kivra", "Run Now")
        .unwrap()
        .with_reconnect_delay(Duration::from_millis(50));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let trigger = ChannelTrigger(tx);
    let cancel = CancellationToken::new();

    let listener = tokio::spawn({
        let cancel = cancel.clone();
        async move { ntfy.listen(&trigger, cancel).await }
    });

    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("trigger phrase not seen")
        .unwrap();
    // Only one of the streamed messages matches.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(rx.try_recv().is_err());

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(5), listener)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}
