//! HTTP endpoint handlers for the web bridge.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::qr;
use crate::status::StatusEvent;

use super::error::{ApiError, ApiResult};
use super::state::AppState;

/// Acknowledgement for an accepted trigger.
#[derive(Debug, Serialize)]
pub struct TriggerResponse {
    /// Always `"triggered"`
    status: &'static str,
}

/// POST /trigger - start a sync run without waiting for it.
///
/// Responds 409 while a run is in progress.
pub async fn trigger(State(state): State<AppState>) -> ApiResult<(StatusCode, Json<TriggerResponse>)> {
    match state.trigger.trigger() {
        Ok(()) => {
            tracing::info!("Sync triggered from the web interface");
            Ok((
                StatusCode::ACCEPTED,
                Json(TriggerResponse {
                    status: "triggered",
                }),
            ))
        }
        Err(e) => {
            tracing::info!("Rejected web trigger: {}", e);
            Err(ApiError::from(e))
        }
    }
}

/// GET /api/status - the current snapshot.
pub async fn status(State(state): State<AppState>) -> Json<StatusEvent> {
    Json(state.hub.snapshot())
}

/// GET /qr.png - the pending BankID challenge as a PNG.
pub async fn qr_png(State(state): State<AppState>) -> ApiResult<Response> {
    let payload = state
        .hub
        .qr_payload()
        .ok_or_else(|| ApiError::not_found("no QR code is pending"))?;
    let png = qr::generate_png(&payload, qr::DEFAULT_PNG_SIZE)?;

    Ok((
        [
            (header::CONTENT_TYPE, "image/png"),
            (header::CACHE_CONTROL, "no-cache, no-store, must-revalidate"),
        ],
        png,
    )
        .into_response())
}
