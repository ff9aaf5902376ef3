//! Tokio driver for the reconnecting event consumer.
//!
//! [`EventConsumer::run`] connects to a `/events` endpoint, feeds everything
//! it sees into a [`Reconnector`] and carries out the returned directives.
//! Front-ends steer it with [`Control`] messages and receive [`Update`]s.

use std::pin::Pin;
use std::time::Duration;

use futures::stream::BoxStream;
use futures::StreamExt as _;
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use reqwest::Client;
use tokio::sync::mpsc;
use tokio::time::Sleep;

use crate::error::{Error, Result};

use super::machine::{Directive, ReconnectPolicy, Reconnector, Visibility};
use super::sse::SseDecoder;
use super::view::ViewState;

const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Commands from the front-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    /// The front-end was hidden or shown
    Visibility(Visibility),
    /// Reset the retry budget and reconnect now
    Reset,
    /// Stop for good
    Teardown,
}

/// Notifications to the front-end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Update {
    /// The event stream is open
    Connected,
    /// A status event changed the view
    View(ViewState),
    /// The connection failed; retrying after `delay`
    Reconnecting {
        /// Consecutive failures so far
        attempt: u32,
        /// Wait before the next attempt
        delay: Duration,
    },
    /// Gave up; needs a reset or visibility change
    ConnectionLost,
}

enum Wire {
    Opened,
    Data(Vec<u8>),
    Failed(Error),
    Ended,
}

enum Step {
    Wire(Option<Wire>),
    Timer,
    Control(Option<Control>),
}

/// Reconnecting consumer of a status event stream.
#[derive(Debug)]
pub struct EventConsumer {
    http: Client,
    url: String,
    machine: Reconnector,
}

impl EventConsumer {
    /// Create a consumer for `url` (the full `/events` URL).
    pub fn new(url: impl Into<String>, policy: ReconnectPolicy) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| Error::Internal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            url: url.into(),
            machine: Reconnector::new(policy),
        })
    }

    /// The `/events` URL of a server at `base`.
    pub fn events_url(base: &str) -> String {
        format!("{}/events", base.trim_end_matches('/'))
    }

    /// The state machine, for inspection.
    pub fn machine(&self) -> &Reconnector {
        &self.machine
    }

    fn open(&self) -> BoxStream<'static, Wire> {
        let request = self
            .http
            .get(&self.url)
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache");

        Box::pin(async_stream::stream! {
            let response = match request.send().await {
                Ok(response) => response,
                Err(e) => {
                    yield Wire::Failed(Error::from_transport("event stream", &e));
                    return;
                }
            };
            if !response.status().is_success() {
                yield Wire::Failed(Error::from_status("event stream", response.status()));
                return;
            }
            yield Wire::Opened;

            let mut body = response.bytes_stream();
            while let Some(chunk) = body.next().await {
                match chunk {
                    Ok(bytes) => yield Wire::Data(bytes.to_vec()),
                    Err(e) => {
                        yield Wire::Failed(Error::from_transport("event stream", &e));
                        return;
                    }
                }
            }
            yield Wire::Ended;
        })
    }

    /// Run until torn down or until `controls` closes.
    ///
    /// Returns early if `updates` is closed.
    pub async fn run(
        mut self,
        mut controls: mpsc::Receiver<Control>,
        updates: mpsc::Sender<Update>,
    ) -> Result<()> {
        let mut connection: Option<BoxStream<'static, Wire>> = None;
        let mut timer: Option<Pin<Box<Sleep>>> = None;
        let mut decoder = SseDecoder::default();

        let mut directive = self.machine.start();
        loop {
            match directive {
                Directive::None => {}
                Directive::Connect => {
                    timer = None;
                    decoder.reset();
                    tracing::debug!("Connecting to {}", self.url);
                    connection = Some(self.open());
                }
                Directive::Schedule(delay) => {
                    connection = None;
                    timer = Some(Box::pin(tokio::time::sleep(delay)));
                    let update = Update::Reconnecting {
                        attempt: self.machine.retry_count(),
                        delay,
                    };
                    if updates.send(update).await.is_err() {
                        break;
                    }
                }
                Directive::ConnectionLost => {
                    connection = None;
                    timer = None;
                    tracing::warn!("Connection to {} lost, giving up", self.url);
                    if updates.send(Update::ConnectionLost).await.is_err() {
                        break;
                    }
                }
                Directive::Shutdown => break,
            }

            let step = tokio::select! {
                wire = next_wire(&mut connection) => Step::Wire(wire),
                () = fire(&mut timer) => Step::Timer,
                control = controls.recv() => Step::Control(control),
            };

            directive = match step {
                Step::Wire(Some(Wire::Opened)) => {
                    self.machine.on_open();
                    tracing::info!("Connected to {}", self.url);
                    if updates.send(Update::Connected).await.is_err() {
                        break;
                    }
                    Directive::None
                }
                Step::Wire(Some(Wire::Data(bytes))) => match decoder.push(&bytes) {
                    Ok(payloads) => {
                        for payload in payloads {
                            let Some(view) = self.machine.on_message(&payload) else {
                                continue;
                            };
                            if updates.send(Update::View(view.clone())).await.is_err() {
                                return Ok(());
                            }
                        }
                        Directive::None
                    }
                    Err(e) => {
                        tracing::warn!("Dropping event stream: {}", e);
                        connection = None;
                        self.machine.on_error()
                    }
                },
                Step::Wire(Some(Wire::Failed(e))) => {
                    tracing::warn!("Event stream error: {}", e);
                    connection = None;
                    self.machine.on_error()
                }
                Step::Wire(Some(Wire::Ended) | None) => {
                    tracing::debug!("Event stream closed by server");
                    connection = None;
                    self.machine.on_error()
                }
                Step::Timer => {
                    timer = None;
                    self.machine.on_timer()
                }
                Step::Control(Some(Control::Visibility(visibility))) => {
                    self.machine.on_visibility(visibility)
                }
                Step::Control(Some(Control::Reset)) => {
                    tracing::info!("Manual reconnect requested");
                    self.machine.manual_reset()
                }
                Step::Control(Some(Control::Teardown) | None) => self.machine.teardown(),
            };
        }

        tracing::debug!("Event consumer stopped");
        Ok(())
    }
}

async fn next_wire(connection: &mut Option<BoxStream<'static, Wire>>) -> Option<Wire> {
    match connection {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}

async fn fire(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}
