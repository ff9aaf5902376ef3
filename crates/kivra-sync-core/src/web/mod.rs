//! Embedded web bridge.
//!
//! Serves a status page and a live event feed, and accepts run triggers.
//!
//! ## API Endpoints
//!
//! | Method | Endpoint | Description |
//! |--------|----------|-------------|
//! | GET | / | Status page |
//! | GET | /static/{file} | Page assets |
//! | GET | /events | Status events (SSE) |
//! | POST | /trigger | Start a sync run |
//! | GET | /qr.png | Pending BankID QR code |
//! | GET | /api/status | Current snapshot |

pub mod assets;
pub mod error;
pub mod handlers;
pub mod sse;
pub mod state;

use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    routing::{get, post},
    Router,
};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;

use crate::config::WebConfig;
use crate::error::{Error, Result};
use crate::orchestrator::QR_IMAGE_PATH;

pub use error::{ApiError, ApiResult};
pub use state::AppState;

/// Largest accepted request body. `POST /trigger` ignores its body.
const MAX_BODY_BYTES: usize = 16 * 1024;

/// Configuration for the web server.
#[derive(Debug, Clone)]
pub struct WebServerConfig {
    /// Port to listen on
    pub port: u16,
    /// Bind to localhost only
    pub localhost_only: bool,
    /// Interval between heartbeat events
    pub heartbeat_interval: Duration,
}

impl Default for WebServerConfig {
    fn default() -> Self {
        Self::from(&WebConfig::default())
    }
}

impl From<&WebConfig> for WebServerConfig {
    fn from(config: &WebConfig) -> Self {
        Self {
            port: config.port,
            localhost_only: config.localhost_only,
            heartbeat_interval: config.heartbeat_interval,
        }
    }
}

impl WebServerConfig {
    /// Get the bind address for the server.
    #[must_use]
    pub fn bind_addr(&self) -> SocketAddr {
        if self.localhost_only {
            SocketAddr::from(([127, 0, 0, 1], self.port))
        } else {
            SocketAddr::from(([0, 0, 0, 0], self.port))
        }
    }
}

/// Build the router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(assets::serve_index))
        .route("/static/{*path}", get(assets::serve_static))
        .route("/events", get(sse::events))
        .route("/trigger", post(handlers::trigger))
        .route(QR_IMAGE_PATH, get(handlers::qr_png))
        .route("/api/status", get(handlers::status))
        .fallback(assets::not_found)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Serve the bridge until `cancel` fires.
///
/// Heartbeats are broadcast every `config.heartbeat_interval` while the
/// server runs. Open event streams are closed on shutdown.
pub async fn serve(config: &WebServerConfig, state: AppState, cancel: CancellationToken) -> Result<()> {
    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Internal(format!("failed to bind {addr}: {e}")))?;
    let local_addr = listener.local_addr()?;

    let state = state.with_shutdown(cancel.clone());
    let heartbeat = state
        .hub
        .spawn_heartbeat(config.heartbeat_interval, cancel.clone());

    tracing::info!("Web interface ready at http://{}", local_addr);

    let result = axum::serve(listener, router(state))
        .with_graceful_shutdown(cancel.clone().cancelled_owned())
        .await;

    cancel.cancel();
    let _ = heartbeat.await;
    tracing::info!("Web server stopped");

    result.map_err(Error::Io)
}
