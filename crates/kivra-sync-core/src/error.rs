//! Error types for kivra-sync.
//!
//! This module provides a unified error type for all sync operations, with
//! variants that let the authenticator and the orchestrator tell transient
//! network trouble apart from terminal authentication and remote failures.

use std::io;

use thiserror::Error;

/// A specialized `Result` type for kivra-sync operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for kivra-sync.
#[derive(Error, Debug)]
pub enum Error {
    /// Network hiccup that may succeed on retry (E001)
    #[error("network error: {0}")]
    TransientNetwork(String),

    /// The user or the identity provider refused the BankID challenge (E002)
    #[error("BankID authentication was denied: {0}")]
    AuthDenied(String),

    /// The BankID challenge was not resolved before it expired (E003)
    #[error("BankID authentication expired before it was completed")]
    AuthExpired,

    /// The document is already present in the store
    #[error("document already stored: {0}")]
    StorageConflict(String),

    /// The storage backend failed to persist a document (E004)
    #[error("storage error: {0}")]
    Storage(String),

    /// The remote service failed in a way that makes further requests pointless (E005)
    #[error("remote service error: {0}")]
    FatalRemote(String),

    /// A remote document does not exist (E006)
    #[error("not found: {0}")]
    NotFound(String),

    /// A sync run is already in flight (E007)
    #[error("a sync run is already in progress")]
    Busy,

    /// The remote service answered with something we could not understand
    #[error("unexpected response from remote service: {0}")]
    Protocol(String),

    /// Delivering a notification failed
    #[error("notification failed: {0}")]
    Notification(String),

    /// Configuration file error
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Invalid configuration value
    #[error("invalid configuration value for '{key}': {reason}")]
    InvalidConfig {
        /// Configuration key
        key: String,
        /// Reason for invalidity
        reason: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Internal error (should not happen)
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns the error code associated with this error, if any.
    ///
    /// Error codes follow the pattern EXXX where XXX is a 3-digit number.
    #[must_use]
    pub const fn code(&self) -> Option<&'static str> {
        match self {
            Self::TransientNetwork(_) => Some("E001"),
            Self::AuthDenied(_) => Some("E002"),
            Self::AuthExpired => Some("E003"),
            Self::Storage(_) => Some("E004"),
            Self::FatalRemote(_) => Some("E005"),
            Self::NotFound(_) => Some("E006"),
            Self::Busy => Some("E007"),
            _ => None,
        }
    }

    /// Returns whether this error is recoverable (can be retried).
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::TransientNetwork(_))
    }

    /// Returns whether this error must abort the remaining fetch loop.
    ///
    /// Everything else is recovered per item: logged, counted and skipped.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::AuthDenied(_) | Self::AuthExpired | Self::FatalRemote(_)
        )
    }

    /// Classify a transport-level `reqwest` failure.
    pub(crate) fn from_transport(context: &str, err: &reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() {
            Self::TransientNetwork(format!("{context}: {err}"))
        } else if err.is_decode() {
            Self::Protocol(format!("{context}: {err}"))
        } else {
            Self::FatalRemote(format!("{context}: {err}"))
        }
    }

    /// Classify a non-success HTTP status from the remote service.
    pub(crate) fn from_status(context: &str, status: reqwest::StatusCode) -> Self {
        use reqwest::StatusCode;

        match status {
            StatusCode::NOT_FOUND => Self::NotFound(context.to_string()),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Self::FatalRemote(format!("{context}: session rejected ({status})"))
            }
            StatusCode::TOO_MANY_REQUESTS | StatusCode::REQUEST_TIMEOUT => {
                Self::TransientNetwork(format!("{context}: {status}"))
            }
            s if s.is_server_error() => Self::TransientNetwork(format!("{context}: {status}")),
            _ => Self::FatalRemote(format!("{context}: {status}")),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
