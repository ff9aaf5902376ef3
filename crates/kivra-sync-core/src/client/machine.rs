//! Reconnect state machine for an event-stream consumer.
//!
//! [`Reconnector`] performs no I/O. Each handler updates the state and
//! returns a [`Directive`] the driver carries out. The driver owns exactly
//! one connection slot and one timer slot; [`Directive::Connect`] always
//! clears both before opening a new connection.

use std::time::Duration;

use crate::config::ClientConfig;
use crate::status::StatusEvent;

use super::view::ViewState;

/// Backoff parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay after the first failure
    pub base_delay: Duration,
    /// Cap for the delay
    pub max_delay: Duration,
    /// Consecutive failures after which the consumer gives up
    pub max_retries: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::from(&ClientConfig::default())
    }
}

impl From<&ClientConfig> for ReconnectPolicy {
    fn from(config: &ClientConfig) -> Self {
        Self {
            base_delay: config.base_delay,
            max_delay: config.max_delay,
            max_retries: config.max_retries,
        }
    }
}

impl ReconnectPolicy {
    /// Delay after `failures` consecutive failures: `min(base * 2^(failures-1), max)`.
    pub fn delay_for(&self, failures: u32) -> Duration {
        let factor = 2u32.saturating_pow(failures.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Page or terminal visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    /// Not shown to the user
    Hidden,
    /// Shown to the user
    Visible,
}

/// What the driver must do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    /// Nothing
    None,
    /// Cancel any pending timer, close any connection, open a new one
    Connect,
    /// Close the connection and reconnect after the delay
    Schedule(Duration),
    /// Close the connection and show the connection-lost indicator
    ConnectionLost,
    /// Cancel the timer, close the connection and stop for good
    Shutdown,
}

/// State of the single connection slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Link {
    /// No connection was ever opened
    Absent,
    /// Opening
    Connecting,
    /// Receiving events
    Open,
    /// Failed or closed
    Closed,
}

/// Reconnect bookkeeping plus the current view.
#[derive(Debug, Clone)]
pub struct Reconnector {
    policy: ReconnectPolicy,
    should_reconnect: bool,
    retry_count: u32,
    current_delay: Duration,
    link: Link,
    timer_pending: bool,
    torn_down: bool,
    connection_lost: bool,
    view: ViewState,
}

impl Reconnector {
    /// Create a machine with nothing connected yet.
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            should_reconnect: true,
            retry_count: 0,
            current_delay: policy.base_delay,
            link: Link::Absent,
            timer_pending: false,
            torn_down: false,
            connection_lost: false,
            view: ViewState::default(),
        }
    }

    /// Consecutive failures since the last successful open.
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Delay used for the last scheduled reconnect.
    pub fn current_delay(&self) -> Duration {
        self.current_delay
    }

    /// Whether failures still lead to reconnects.
    pub fn should_reconnect(&self) -> bool {
        self.should_reconnect
    }

    /// State of the connection slot.
    pub fn link(&self) -> Link {
        self.link
    }

    /// Whether a reconnect timer is pending.
    pub fn timer_pending(&self) -> bool {
        self.timer_pending
    }

    /// Whether the connection-lost indicator is shown.
    pub fn connection_lost(&self) -> bool {
        self.connection_lost
    }

    /// Current view.
    pub fn view(&self) -> &ViewState {
        &self.view
    }

    fn connect(&mut self) -> Directive {
        if self.torn_down {
            return Directive::None;
        }
        self.timer_pending = false;
        self.connection_lost = false;
        self.link = Link::Connecting;
        Directive::Connect
    }

    /// Open the first connection.
    pub fn start(&mut self) -> Directive {
        self.connect()
    }

    /// The connection is open.
    pub fn on_open(&mut self) {
        self.link = Link::Open;
        self.retry_count = 0;
        self.current_delay = self.policy.base_delay;
    }

    /// One event payload arrived. Returns the new view unless it was a
    /// heartbeat or could not be parsed.
    pub fn on_message(&mut self, data: &str) -> Option<&ViewState> {
        let event: StatusEvent = match serde_json::from_str(data) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!("Ignoring malformed status event: {}", e);
                return None;
            }
        };
        self.view = ViewState::render(&event)?;
        Some(&self.view)
    }

    /// The connection failed or the server closed it.
    pub fn on_error(&mut self) -> Directive {
        self.link = Link::Closed;
        if self.torn_down {
            return Directive::Shutdown;
        }
        if !self.should_reconnect {
            return Directive::None;
        }

        self.retry_count += 1;
        if self.retry_count >= self.policy.max_retries {
            self.should_reconnect = false;
            self.connection_lost = true;
            return Directive::ConnectionLost;
        }

        self.current_delay = self.policy.delay_for(self.retry_count);
        self.timer_pending = true;
        Directive::Schedule(self.current_delay)
    }

    /// The reconnect timer fired.
    pub fn on_timer(&mut self) -> Directive {
        if !self.timer_pending {
            return Directive::None;
        }
        self.timer_pending = false;
        if self.should_reconnect {
            self.connect()
        } else {
            Directive::None
        }
    }

    /// Visibility changed.
    ///
    /// Becoming visible re-arms a disabled consumer with a fresh retry budget
    /// and reconnects when no connection is live.
    pub fn on_visibility(&mut self, visibility: Visibility) -> Directive {
        if visibility == Visibility::Hidden || self.torn_down {
            return Directive::None;
        }

        if !self.should_reconnect {
            self.should_reconnect = true;
            self.retry_count = 0;
        }
        match self.link {
            Link::Absent | Link::Closed => self.connect(),
            Link::Connecting | Link::Open => Directive::None,
        }
    }

    /// Operator-driven recovery: fresh retry budget and reconnect now.
    pub fn manual_reset(&mut self) -> Directive {
        self.retry_count = 0;
        self.should_reconnect = true;
        self.connect()
    }

    /// Stop for good. No later handler reconnects.
    pub fn teardown(&mut self) -> Directive {
        self.torn_down = true;
        self.should_reconnect = false;
        self.timer_pending = false;
        self.link = Link::Closed;
        Directive::Shutdown
    }
}
