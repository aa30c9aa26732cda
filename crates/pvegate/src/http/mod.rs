//! HTTP surface of the gateway.
//!
//! The front-end owns strict decoding, validation ordering, and the
//! idempotency gate: hashes are computed after validation, replays are
//! byte-for-byte, conflicts abort before the runner is invoked, and every
//! completed outcome (success or error) is stored under its key.

use std::time::Duration;

use axum::{
    Router,
    body::Body,
    http::{HeaderMap, StatusCode, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
};
use common::api::ActionRequest;
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::{
    app_state::AppState,
    canonical,
    error::{ApiResult, AppError},
    idempotency::{Lookup, StoredResponse},
};

mod actions;
mod queries;
mod system;

pub(crate) const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";
pub(crate) const JSON_CONTENT_TYPE: &str = "application/json";

pub fn build_router(state: AppState) -> Router<AppState> {
    Router::<AppState>::new()
        .merge(system::router(state.clone()))
        .merge(actions::router(state.clone()))
        .merge(queries::router(state))
        .layer(TraceLayer::new_for_http())
}

/// A miss reserved under an idempotency key; the completed response is
/// stored here by [`complete`].
pub(crate) struct PendingIdempotency {
    scope: &'static str,
    key: String,
    payload_hash: String,
    ttl: Duration,
}

/// Outcome of the front-end idempotency gate.
pub(crate) enum Gate {
    /// A recorded response is replayed verbatim; execution must not proceed.
    Replay(Response),
    /// Execution proceeds; `Some` when the outcome must be stored.
    Proceed(Option<PendingIdempotency>),
}

/// Consults the idempotency store for a validated request. Conflict errors
/// surface as 409 and are themselves never stored.
pub(crate) fn idempotency_gate(
    state: &AppState,
    headers: &HeaderMap,
    scope: &'static str,
    req: &ActionRequest,
    ttl: Duration,
) -> ApiResult<Gate> {
    let Some(key) = headers
        .get(IDEMPOTENCY_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .map(str::to_string)
    else {
        return Ok(Gate::Proceed(None));
    };

    let payload_hash = canonical::request_hash(req).map_err(|err| {
        error!(?err, "canonical hashing failed");
        AppError::internal("failed to hash request")
    })?;

    match state.idempotency.lookup(scope, &key, &payload_hash) {
        Lookup::Replay(stored) => Ok(Gate::Replay(
            (
                stored.status,
                [(CONTENT_TYPE, stored.content_type)],
                stored.body,
            )
                .into_response(),
        )),
        Lookup::Conflict => Err(AppError::conflict(
            "idempotency key reused with different payload",
        )),
        Lookup::Miss => Ok(Gate::Proceed(Some(PendingIdempotency {
            scope,
            key,
            payload_hash,
            ttl,
        }))),
    }
}

/// Renders the outcome, records it under the pending idempotency key, and
/// returns the response. The stored bytes are exactly the returned bytes.
pub(crate) fn complete<T: Serialize>(
    state: &AppState,
    pending: Option<PendingIdempotency>,
    outcome: ApiResult<T>,
) -> Response {
    let (status, content_type, body) = match outcome {
        Ok(value) => match serde_json::to_vec(&value) {
            Ok(mut bytes) => {
                bytes.push(b'\n');
                (StatusCode::OK, JSON_CONTENT_TYPE, bytes)
            }
            Err(err) => {
                error!(?err, "response serialization failed");
                AppError::internal("failed to encode response").to_parts()
            }
        },
        Err(err) => err.to_parts(),
    };

    if let Some(pending) = pending {
        state.idempotency.store(
            pending.scope,
            &pending.key,
            StoredResponse {
                payload_hash: pending.payload_hash,
                status,
                content_type: content_type.to_string(),
                body: body.clone(),
            },
            pending.ttl,
        );
    }

    (status, [(CONTENT_TYPE, content_type)], Body::from(body)).into_response()
}
