//! ntfy push notifications and trigger listening.
//!
//! Messages are published to `{server}/{topic}`. Listening subscribes to
//! `{server}/{topic}/json`, a stream of newline-delimited JSON messages, and
//! starts a run whenever a message equals the trigger phrase
//! (case-insensitive).

use std::time::Duration;

use futures::StreamExt as _;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use super::Notify;
use crate::config::NotifyConfig;
use crate::error::{Error, Result};
use crate::lines::LineBuffer;
use crate::orchestrator::{RunResult, RunTrigger};
use crate::qr;

const PUBLISH_TIMEOUT_SECS: u64 = 30;
const CONNECT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct NtfyMessage {
    #[serde(default = "default_event")]
    event: String,
    #[serde(default)]
    message: String,
}

fn default_event() -> String {
    "message".to_string()
}

/// Whether `text` is the trigger phrase.
fn is_trigger(text: &str, phrase: &str) -> bool {
    !phrase.is_empty() && text.trim().to_lowercase() == phrase.trim().to_lowercase()
}

/// Notifier backed by an ntfy server.
#[derive(Clone)]
pub struct NtfyNotifier {
    http: Client,
    server: String,
    topic: String,
    credentials: Option<(String, String)>,
    trigger_message: String,
    reconnect_delay: Duration,
}

impl std::fmt::Debug for NtfyNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NtfyNotifier")
            .field("server", &self.server)
            .field("topic", &self.topic)
            .field("trigger_message", &self.trigger_message)
            .finish_non_exhaustive()
    }
}

impl NtfyNotifier {
    /// Create a notifier for `topic` on `server`.
    pub fn new(server: &str, topic: &str, trigger_message: &str) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| Error::Internal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            server: server.trim_end_matches('/').to_string(),
            topic: topic.to_string(),
            credentials: None,
            trigger_message: trigger_message.to_string(),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        })
    }

    /// Create a notifier from configuration.
    pub fn from_config(config: &NotifyConfig) -> Result<Self> {
        let topic = config
            .ntfy_topic
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::InvalidConfig {
                key: "notify.ntfy_topic".to_string(),
                reason: "required for the ntfy provider".to_string(),
            })?;

        let mut notifier = Self::new(&config.ntfy_server, topic, &config.trigger_message)?;
        if let Some(user) = &config.ntfy_user {
            notifier = notifier.with_credentials(
                user,
                config.ntfy_password.as_deref().unwrap_or_default(),
            );
        }
        Ok(notifier)
    }

    /// Authenticate with HTTP basic auth.
    #[must_use]
    pub fn with_credentials(mut self, user: &str, password: &str) -> Self {
        self.credentials = Some((user.to_string(), password.to_string()));
        self
    }

    /// Delay before resubscribing after the stream fails or ends.
    #[must_use]
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Topic URL messages are published to.
    pub fn topic_url(&self) -> String {
        format!("{}/{}", self.server, self.topic)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.credentials {
            Some((user, password)) => request.basic_auth(user, Some(password)),
            None => request,
        }
    }

    async fn publish(
        &self,
        title: &str,
        priority: &str,
        body: impl Into<reqwest::Body>,
        filename: Option<&str>,
    ) -> Result<()> {
        let mut request = self
            .http
            .post(self.topic_url())
            .timeout(Duration::from_secs(PUBLISH_TIMEOUT_SECS))
            .header("Title", title)
            .header("Priority", priority)
            .body(body);
        if let Some(name) = filename {
            request = request.header("Filename", name);
        }

        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|e| Error::Notification(format!("ntfy publish failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Notification(format!(
                "ntfy publish to '{}' failed: {status}",
                self.topic
            )));
        }
        tracing::debug!("Published '{}' to ntfy topic '{}'", title, self.topic);
        Ok(())
    }

    /// Listen for the trigger phrase until `cancel` fires.
    ///
    /// Each match calls [`RunTrigger::trigger`]; a busy orchestrator is logged
    /// and otherwise ignored. Connection failures are retried after the
    /// reconnect delay.
    pub async fn listen(&self, trigger: &dyn RunTrigger, cancel: CancellationToken) -> Result<()> {
        let url = format!("{}/json", self.topic_url());
        tracing::info!("Listening for '{}' on {}", self.trigger_message, url);

        loop {
            let outcome = tokio::select! {
                () = cancel.cancelled() => break,
                outcome = self.listen_once(&url, trigger) => outcome,
            };

            match outcome {
                Ok(()) => tracing::warn!(
                    "ntfy stream closed, reconnecting in {:?}",
                    self.reconnect_delay
                ),
                Err(e) => tracing::warn!(
                    "ntfy connection error: {}; reconnecting in {:?}",
                    e,
                    self.reconnect_delay
                ),
            }

            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(self.reconnect_delay) => {}
            }
        }

        tracing::info!("Stopped listening on ntfy topic '{}'", self.topic);
        Ok(())
    }

    async fn listen_once(&self, url: &str, trigger: &dyn RunTrigger) -> Result<()> {
        let response = self
            .authorized(self.http.get(url))
            .send()
            .await
            .map_err(|e| Error::from_transport("ntfy subscribe", &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::from_status("ntfy subscribe", status));
        }

        let mut stream = response.bytes_stream();
        let mut lines = LineBuffer::default();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| Error::from_transport("ntfy subscribe", &e))?;
            for line in lines.push(&chunk)? {
                self.handle_line(&line, trigger);
            }
        }
        Ok(())
    }

    /// Handle one subscription line. Returns whether it was a trigger.
    fn handle_line(&self, line: &str, trigger: &dyn RunTrigger) -> bool {
        if line.trim().is_empty() {
            return false;
        }

        let message: NtfyMessage = match serde_json::from_str(line) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!("Failed to parse ntfy message: {}", e);
                return false;
            }
        };
        if message.event != "message" {
            return false;
        }

        tracing::info!("Received message: {}", message.message);
        if !is_trigger(&message.message, &self.trigger_message) {
            return false;
        }

        match trigger.trigger() {
            Ok(()) => tracing::info!("Trigger message received, starting sync"),
            Err(Error::Busy) => {
                tracing::info!("Trigger message ignored: a sync run is already in progress");
            }
            Err(e) => tracing::error!("Failed to start sync: {}", e),
        }
        true
    }
}

impl Notify for NtfyNotifier {
    async fn present_challenge(&self, qr_payload: &str) -> Result<()> {
        let png = qr::generate_png(qr_payload, qr::DEFAULT_PNG_SIZE)?;
        self.publish("Kivra authentication", "urgent", png, Some("kivra-bankid.png"))
            .await?;
        tracing::info!("QR code sent via ntfy to topic '{}'", self.topic);
        Ok(())
    }

    async fn report_authenticated(&self) -> Result<()> {
        self.publish(
            "Kivra authentication successful",
            "default",
            "BankID authentication successful! Starting data sync...",
            None,
        )
        .await
    }

    async fn report_result(&self, result: &RunResult) -> Result<()> {
        if result.success {
            self.publish(
                "Kivra sync completed",
                "default",
                format!("Kivra sync completed\n{}", result.message),
                None,
            )
            .await
        } else {
            self.publish(
                "Kivra sync failed",
                "high",
                format!("Kivra sync failed\n{}", result.message),
                None,
            )
            .await
        }
    }
}
