//! Relay endpoint handler.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use super::types::{SendPushRequest, SendPushResponse};
use super::RelayState;
use crate::notifications::push::endpoint_for_log;
use crate::notifications::{send_notification, VapidKeys};

/// POST /api/send-push-msg - Encrypt, sign and forward one push message.
///
/// - push service accepted: `200 {"success": true}`
/// - push service refused: its status code and body
/// - anything that failed before or instead of a response: `400` with the
///   error text
pub async fn send_push_msg(
    State(state): State<Arc<RelayState>>,
    request: Result<Json<SendPushRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match request {
        Ok(request) => request,
        Err(rejection) => return bad_request(rejection.body_text()),
    };

    let keys = match VapidKeys::try_from(request.application_keys) {
        Ok(keys) => keys,
        Err(e) => return bad_request(e.to_string()),
    };

    let payload = request.data.as_deref().filter(|data| !data.is_empty());
    let target = endpoint_for_log(&request.subscription.endpoint);
    log::info!(
        "[Relay] Sending push to {} ({} byte payload)",
        target,
        payload.map_or(0, str::len)
    );

    let result = match send_notification(
        &state.client,
        &request.subscription,
        payload.map(str::as_bytes),
        &keys,
        &state.options,
    )
    .await
    {
        Ok(result) => result,
        Err(e) => {
            log::warn!("[Relay] Rejected request for {}: {}", target, e);
            return bad_request(e.to_string());
        }
    };

    if result.success {
        return (StatusCode::OK, Json(SendPushResponse { success: true })).into_response();
    }

    match result.status_code {
        Some(status) => {
            let status = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
            (status, result.message).into_response()
        }
        None => bad_request(result.message),
    }
}

fn bad_request(message: String) -> Response {
    (StatusCode::BAD_REQUEST, message).into_response()
}
