//! Plan and apply endpoints for arbitrary actions.

use std::time::Duration;

use axum::{
    Router,
    body::Bytes,
    extract::{Extension, State},
    http::HeaderMap,
    middleware,
    response::{IntoResponse, Response},
    routing::post,
};
use common::api::{ActionRequest, ActionType, RiskLevel};

use crate::{
    app_state::AppState,
    auth::{Actor, require_bearer_auth},
    error::ApiResult,
    policy, validation,
};

use super::{Gate, complete, idempotency_gate};

pub(crate) fn router(state: AppState) -> Router<AppState> {
    Router::<AppState>::new()
        .route("/v1/actions/plan", post(plan))
        .route("/v1/actions/apply", post(apply))
        .route_layer(middleware::from_fn_with_state(state, require_bearer_auth))
}

async fn plan(
    State(state): State<AppState>,
    Extension(Actor(actor)): Extension<Actor>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let mut req = match decode_and_validate(&state, &body) {
        Ok(req) => req,
        Err(err) => return err.into_response(),
    };
    req.actor = actor;

    let pending = match idempotency_gate(&state, &headers, "/v1/actions/plan", &req, state.ttls.default)
    {
        Ok(Gate::Replay(response)) => return response,
        Ok(Gate::Proceed(pending)) => pending,
        Err(err) => return err.into_response(),
    };

    let outcome = state.runner.plan(&req).await;
    complete(&state, pending, outcome)
}

async fn apply(
    State(state): State<AppState>,
    Extension(Actor(actor)): Extension<Actor>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let mut req = match decode_and_validate(&state, &body) {
        Ok(req) => req,
        Err(err) => return err.into_response(),
    };
    req.actor = actor;

    let ttl = apply_ttl(&state, req.action);
    let pending = match idempotency_gate(&state, &headers, "/v1/actions/apply", &req, ttl) {
        Ok(Gate::Replay(response)) => return response,
        Ok(Gate::Proceed(pending)) => pending,
        Err(err) => return err.into_response(),
    };

    let outcome = state.runner.apply(&req).await;
    complete(&state, pending, outcome)
}

fn decode_and_validate(state: &AppState, body: &[u8]) -> ApiResult<ActionRequest> {
    let req: ActionRequest = validation::decode_strict_json(body)?;
    state.validator.validate(&req)?;
    Ok(req)
}

/// High-risk applies keep their records for a shorter window than everything
/// else.
fn apply_ttl(state: &AppState, action: ActionType) -> Duration {
    let (risk, _, _) = policy::classify(action);
    if risk == RiskLevel::High {
        state.ttls.high_risk_apply
    } else {
        state.ttls.default
    }
}
