//! Liveness and environment listing.

use axum::{
    Json, Router,
    extract::State,
    middleware,
    routing::get,
};
use common::api::EnvironmentsResponse;
use serde_json::json;

use crate::{app_state::AppState, auth::require_bearer_auth};

pub(crate) fn router(state: AppState) -> Router<AppState> {
    Router::<AppState>::new()
        .route("/healthz", get(healthz))
        .merge(
            Router::<AppState>::new()
                .route("/v1/environments", get(environments))
                .route_layer(middleware::from_fn_with_state(state, require_bearer_auth)),
        )
}

async fn healthz() -> Json<serde_json::Value> {
    Json(json!({ "ok": true }))
}

/// Lists configured environments. The summary carries name, base URL, and
/// token id only; secrets stay inside the adapter.
async fn environments(State(state): State<AppState>) -> Json<EnvironmentsResponse> {
    Json(EnvironmentsResponse {
        environments: state.environments.as_ref().clone(),
    })
}
