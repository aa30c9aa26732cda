//! Server-side plan+apply read endpoints.
//!
//! Each handler translates validated query parameters into the equivalent
//! canonical request and runs the full lifecycle, so query reads get the
//! same policy evaluation and audit trail as posted actions.

use axum::{
    Router,
    extract::{Extension, Query, State},
    http::HeaderMap,
    middleware,
    response::{IntoResponse, Response},
    routing::get,
};
use common::api::{ActionRequest, ActionType, ReadResponse};
use serde::Deserialize;
use serde_json::json;

use crate::{
    app_state::AppState,
    auth::{Actor, require_bearer_auth},
    error::{ApiResult, AppError},
};

use super::{Gate, complete, idempotency_gate};

pub(crate) fn router(state: AppState) -> Router<AppState> {
    Router::<AppState>::new()
        .route("/v1/inventory", get(inventory))
        .route("/v1/tasks", get(tasks))
        .route("/v1/tasks/status", get(task_status))
        .route("/v1/vm/status", get(vm_status))
        .route_layer(middleware::from_fn_with_state(state, require_bearer_auth))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct InventoryParams {
    #[serde(default)]
    environment: Option<String>,
    #[serde(default)]
    state: Option<String>,
}

async fn inventory(
    State(state): State<AppState>,
    Extension(Actor(actor)): Extension<Actor>,
    headers: HeaderMap,
    Query(params): Query<InventoryParams>,
) -> Response {
    let environment = match required_param(params.environment, "environment") {
        Ok(value) => value,
        Err(err) => return err.into_response(),
    };
    let guest_state = params
        .state
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| "all".to_string());

    let mut req = ActionRequest::new(
        environment,
        ActionType::ReadInventory,
        format!("inventory/{guest_state}"),
    );
    req.actor = actor;

    run_read(state, headers, "/v1/inventory", req).await
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TasksParams {
    #[serde(default)]
    environment: Option<String>,
    #[serde(default)]
    node: Option<String>,
    #[serde(default)]
    limit: Option<u32>,
}

async fn tasks(
    State(state): State<AppState>,
    Extension(Actor(actor)): Extension<Actor>,
    headers: HeaderMap,
    Query(params): Query<TasksParams>,
) -> Response {
    let (environment, node) = match (
        required_param(params.environment, "environment"),
        required_param(params.node, "node"),
    ) {
        (Ok(environment), Ok(node)) => (environment, node),
        (Err(err), _) | (_, Err(err)) => return err.into_response(),
    };

    let mut req = ActionRequest::new(environment, ActionType::ReadTasks, "task/list");
    req.params.insert("node".to_string(), json!(node));
    if let Some(limit) = params.limit {
        req.params.insert("limit".to_string(), json!(limit));
    }
    req.actor = actor;

    run_read(state, headers, "/v1/tasks", req).await
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TaskStatusParams {
    #[serde(default)]
    environment: Option<String>,
    #[serde(default)]
    node: Option<String>,
    #[serde(default)]
    upid: Option<String>,
}

async fn task_status(
    State(state): State<AppState>,
    Extension(Actor(actor)): Extension<Actor>,
    headers: HeaderMap,
    Query(params): Query<TaskStatusParams>,
) -> Response {
    let (environment, node, upid) = match (
        required_param(params.environment, "environment"),
        required_param(params.node, "node"),
        required_param(params.upid, "upid"),
    ) {
        (Ok(environment), Ok(node), Ok(upid)) => (environment, node, upid),
        (Err(err), _, _) | (_, Err(err), _) | (_, _, Err(err)) => return err.into_response(),
    };

    let mut req = ActionRequest::new(environment, ActionType::ReadTaskStatus, "task/status");
    req.params.insert("node".to_string(), json!(node));
    req.params.insert("upid".to_string(), json!(upid));
    req.actor = actor;

    run_read(state, headers, "/v1/tasks/status", req).await
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct VmStatusParams {
    #[serde(default)]
    environment: Option<String>,
    #[serde(default)]
    node: Option<String>,
    #[serde(default)]
    vmid: Option<String>,
}

async fn vm_status(
    State(state): State<AppState>,
    Extension(Actor(actor)): Extension<Actor>,
    headers: HeaderMap,
    Query(params): Query<VmStatusParams>,
) -> Response {
    let (environment, node, vmid) = match (
        required_param(params.environment, "environment"),
        required_param(params.node, "node"),
        required_param(params.vmid, "vmid"),
    ) {
        (Ok(environment), Ok(node), Ok(vmid)) => (environment, node, vmid),
        (Err(err), _, _) | (_, Err(err), _) | (_, _, Err(err)) => return err.into_response(),
    };

    let mut req = ActionRequest::new(environment, ActionType::ReadVm, format!("vm/{vmid}"));
    req.params.insert("node".to_string(), json!(node));
    req.actor = actor;

    run_read(state, headers, "/v1/vm/status", req).await
}

/// Shared tail: validate the constructed request, gate on idempotency, then
/// plan and apply in one round trip.
async fn run_read(
    state: AppState,
    headers: HeaderMap,
    scope: &'static str,
    req: ActionRequest,
) -> Response {
    if let Err(err) = state.validator.validate(&req) {
        return err.into_response();
    }

    let pending = match idempotency_gate(&state, &headers, scope, &req, state.ttls.default) {
        Ok(Gate::Replay(response)) => return response,
        Ok(Gate::Proceed(pending)) => pending,
        Err(err) => return err.into_response(),
    };

    let outcome: ApiResult<ReadResponse> = async {
        let plan = state.runner.plan(&req).await?;
        let apply = state.runner.apply(&req).await?;
        Ok(ReadResponse {
            request: req.clone(),
            plan: plan.decision,
            result: apply.result,
        })
    }
    .await;

    complete(&state, pending, outcome)
}

fn required_param(value: Option<String>, name: &str) -> ApiResult<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| AppError::bad_request(format!("{name} query parameter is required")))
}
