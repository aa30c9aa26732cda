//! Translation of canonical actions into concrete cluster API calls.

use common::api::{ActionRequest, ActionType};
use reqwest::Method;
use serde_json::{Map, Value};

use crate::error::PveError;

/// A fully translated cluster API call.
#[derive(Debug)]
pub(crate) struct RequestSpec {
    pub method: Method,
    pub endpoint: String,
    /// Query parameters for GET calls, form body otherwise.
    pub params: Map<String, Value>,
}

pub(crate) fn request_spec(req: &ActionRequest) -> Result<RequestSpec, PveError> {
    match req.action {
        ActionType::ReadVm => {
            let (node, vmid) = resolve_vm_target(req)?;
            Ok(RequestSpec {
                method: Method::GET,
                endpoint: format!("/api2/json/nodes/{node}/qemu/{vmid}/status/current"),
                params: Map::new(),
            })
        }
        ActionType::StartVm => vm_action_spec(req, "status/start"),
        ActionType::StopVm => vm_action_spec(req, "status/stop"),
        ActionType::SnapshotVm => vm_action_spec(req, "snapshot"),
        ActionType::CloneVm => vm_action_spec(req, "clone"),
        ActionType::MigrateVm => vm_action_spec(req, "migrate"),
        ActionType::DeleteVm => {
            let (node, vmid) = resolve_vm_target(req)?;
            Ok(RequestSpec {
                method: Method::DELETE,
                endpoint: format!("/api2/json/nodes/{node}/qemu/{vmid}"),
                params: strip_routing_params(&req.params),
            })
        }
        ActionType::ReadInventory => Ok(RequestSpec {
            method: Method::GET,
            endpoint: "/api2/json/cluster/resources".to_string(),
            params: Map::new(),
        }),
        ActionType::ReadTasks => {
            let node = require_param(req, "node")?;
            Ok(RequestSpec {
                method: Method::GET,
                endpoint: format!("/api2/json/nodes/{node}/tasks"),
                params: strip_routing_params(&req.params),
            })
        }
        ActionType::ReadTaskStatus => {
            let node = require_param(req, "node")?;
            let upid = require_param(req, "upid")?;
            Ok(RequestSpec {
                method: Method::GET,
                endpoint: format!("/api2/json/nodes/{node}/tasks/{upid}/status"),
                params: Map::new(),
            })
        }
        ActionType::StorageEdit => custom_endpoint_spec(req, Method::PUT),
        ActionType::FirewallEdit => custom_endpoint_spec(req, Method::POST),
    }
}

fn vm_action_spec(req: &ActionRequest, suffix: &str) -> Result<RequestSpec, PveError> {
    let (node, vmid) = resolve_vm_target(req)?;
    Ok(RequestSpec {
        method: Method::POST,
        endpoint: format!("/api2/json/nodes/{node}/qemu/{vmid}/{suffix}"),
        params: strip_routing_params(&req.params),
    })
}

/// Resolves `(node, vmid)` from a `vm/<id>` target plus `params.node`, or
/// from the legacy `node/vmid` target form.
fn resolve_vm_target(req: &ActionRequest) -> Result<(String, String), PveError> {
    let target = req.target.trim();

    if let Some(vmid) = target.strip_prefix("vm/")
        && !vmid.is_empty()
        && vmid.bytes().all(|b| b.is_ascii_digit())
    {
        let node = param_str(&req.params, "node").ok_or_else(|| {
            PveError::InvalidParams(format!("params.node is required when target is {target:?}"))
        })?;
        return Ok((node, vmid.to_string()));
    }

    let mut parts = target.split('/');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(node), Some(vmid), None) if !node.is_empty() && !vmid.is_empty() => {
            Ok((node.to_string(), vmid.to_string()))
        }
        _ => Err(PveError::InvalidTarget(format!(
            "invalid VM target {target:?}; expected vm/<id> or node/vmid"
        ))),
    }
}

/// Custom-endpoint escape hatch used by `storage_edit` and `firewall_edit`:
/// `params.endpoint` becomes the literal endpoint (constrained to the
/// `/api2/json/` prefix) and `params.method` may override the default verb.
fn custom_endpoint_spec(req: &ActionRequest, default_method: Method) -> Result<RequestSpec, PveError> {
    if req.params.is_empty() {
        return Err(PveError::InvalidParams(
            "params are required for this action".to_string(),
        ));
    }
    let endpoint = param_str(&req.params, "endpoint").ok_or_else(|| {
        PveError::InvalidParams("params.endpoint is required for this action".to_string())
    })?;
    if !endpoint.starts_with("/api2/json/") {
        return Err(PveError::InvalidParams(format!(
            "invalid endpoint {endpoint:?}; must begin with /api2/json/"
        )));
    }

    let method = match param_str(&req.params, "method") {
        Some(raw) => match raw.to_ascii_uppercase().as_str() {
            "GET" => Method::GET,
            "POST" => Method::POST,
            "PUT" => Method::PUT,
            "DELETE" => Method::DELETE,
            other => {
                return Err(PveError::InvalidParams(format!(
                    "unsupported params.method {other:?}"
                )));
            }
        },
        None => default_method,
    };

    let params = req
        .params
        .iter()
        .filter(|(key, _)| key.as_str() != "endpoint" && key.as_str() != "method")
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    Ok(RequestSpec {
        method,
        endpoint,
        params,
    })
}

fn require_param(req: &ActionRequest, key: &str) -> Result<String, PveError> {
    param_str(&req.params, key)
        .ok_or_else(|| PveError::InvalidParams(format!("params.{key} is required for this action")))
}

fn param_str(params: &Map<String, Value>, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Routing params consumed by endpoint construction never reach the wire body.
fn strip_routing_params(params: &Map<String, Value>) -> Map<String, Value> {
    params
        .iter()
        .filter(|(key, _)| key.as_str() != "node" && key.as_str() != "upid")
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Encodes params as form/query pairs with Proxmox conventions: booleans as
/// `1`/`0`, numbers as canonical decimal, strings as-is.
pub(crate) fn encode_pairs(params: &Map<String, Value>) -> Vec<(String, String)> {
    params
        .iter()
        .filter(|(key, _)| !key.is_empty())
        .map(|(key, value)| (key.clone(), encode_value(value)))
        .collect()
}

fn encode_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(true) => "1".to_string(),
        Value::Bool(false) => "0".to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}
