//! Shared API DTOs used across the gateway, the cluster adapter, and tests.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Canonical action vocabulary (wire format uses snake_case identifiers).
///
/// This enumeration is closed: every layer that branches on action identity
/// matches exhaustively, so adding a variant is a compile-time sweep of the
/// policy engine, the validator, and the adapter translation table.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Read the current state of a single VM.
    ReadVm,
    /// List cluster resources (VMs and containers).
    ReadInventory,
    /// Read the status of a single asynchronous task.
    ReadTaskStatus,
    /// List recent tasks on a node.
    ReadTasks,
    /// Start a VM.
    StartVm,
    /// Stop a VM.
    StopVm,
    /// Snapshot a VM.
    SnapshotVm,
    /// Clone a VM.
    CloneVm,
    /// Migrate a VM to another node.
    MigrateVm,
    /// Delete a VM.
    DeleteVm,
    /// Edit storage configuration through the custom-endpoint escape hatch.
    StorageEdit,
    /// Edit firewall configuration through the custom-endpoint escape hatch.
    FirewallEdit,
}

impl ActionType {
    /// Every canonical action, in wire order.
    pub const ALL: [ActionType; 12] = [
        ActionType::ReadVm,
        ActionType::ReadInventory,
        ActionType::ReadTaskStatus,
        ActionType::ReadTasks,
        ActionType::StartVm,
        ActionType::StopVm,
        ActionType::SnapshotVm,
        ActionType::CloneVm,
        ActionType::MigrateVm,
        ActionType::DeleteVm,
        ActionType::StorageEdit,
        ActionType::FirewallEdit,
    ];

    /// Returns the canonical snake_case wire identifier.
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::ReadVm => "read_vm",
            ActionType::ReadInventory => "read_inventory",
            ActionType::ReadTaskStatus => "read_task_status",
            ActionType::ReadTasks => "read_tasks",
            ActionType::StartVm => "start_vm",
            ActionType::StopVm => "stop_vm",
            ActionType::SnapshotVm => "snapshot_vm",
            ActionType::CloneVm => "clone_vm",
            ActionType::MigrateVm => "migrate_vm",
            ActionType::DeleteVm => "delete_vm",
            ActionType::StorageEdit => "storage_edit",
            ActionType::FirewallEdit => "firewall_edit",
        }
    }

    /// Returns true for the read-only actions.
    pub fn is_read(&self) -> bool {
        matches!(
            self,
            ActionType::ReadVm
                | ActionType::ReadInventory
                | ActionType::ReadTaskStatus
                | ActionType::ReadTasks
        )
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Risk classification reported by the policy engine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    /// Read-only, no cluster mutation.
    Low,
    /// State-changing but recoverable.
    Medium,
    /// Destructive or broad-impact.
    High,
}

impl RiskLevel {
    /// Returns the canonical lowercase representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        }
    }
}

/// Outcome classification of an executed (or dry-run) action.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    /// Dry-run only; the cluster API was not called.
    Planned,
    /// Synchronous read completed.
    Ok,
    /// The cluster accepted an asynchronous task.
    Accepted,
}

impl ResultStatus {
    /// Returns the canonical lowercase representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultStatus::Planned => "planned",
            ResultStatus::Ok => "ok",
            ResultStatus::Accepted => "accepted",
        }
    }
}

/// The unit of work submitted to the gateway.
///
/// `actor` is filled from the authenticated request context and is never
/// accepted from the wire; unknown body fields are rejected outright.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ActionRequest {
    /// Name of a configured cluster environment.
    pub environment: String,
    /// Canonical action identifier.
    pub action: ActionType,
    /// Structured resource reference, grammar depends on the action.
    pub target: String,
    /// Opaque cluster-API arguments: scalars or nested objects, no arrays.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub params: serde_json::Map<String, Value>,
    /// When true, apply must not mutate the cluster.
    #[serde(default)]
    pub dry_run: bool,
    /// Identity of the approver for actions that require approval.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub approved_by: String,
    /// Ticket reference backing the approval.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub approval_ticket: String,
    /// Free-form justification for the approval.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,
    /// RFC 3339 expiry of the approval.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub expires_at: String,
    /// Authenticated caller identity; set by the front-end only.
    #[serde(skip)]
    pub actor: String,
}

impl ActionRequest {
    /// Minimal request for the given environment, action, and target.
    pub fn new(
        environment: impl Into<String>,
        action: ActionType,
        target: impl Into<String>,
    ) -> Self {
        Self {
            environment: environment.into(),
            action,
            target: target.into(),
            params: serde_json::Map::new(),
            dry_run: false,
            approved_by: String::new(),
            approval_ticket: String::new(),
            reason: String::new(),
            expires_at: String::new(),
            actor: String::new(),
        }
    }
}

/// Policy verdict for a request in a given phase.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Decision {
    /// Whether the request may proceed in the evaluated phase.
    pub allowed: bool,
    /// Risk classification of the action.
    pub risk_level: RiskLevel,
    /// Whether apply requires approval metadata.
    pub requires_approval: bool,
    /// Human-readable rationale.
    pub reason: String,
}

/// Outcome of executing an action against the cluster.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActionResult {
    /// Outcome classification.
    pub status: ResultStatus,
    /// UPID for asynchronous tasks, otherwise a short description.
    pub message: String,
    /// Response payload for read actions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Response envelope for `POST /v1/actions/plan`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanResponse {
    /// The admitted request.
    pub request: ActionRequest,
    /// Plan-phase policy decision.
    pub decision: Decision,
}

/// Response envelope for `POST /v1/actions/apply`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyResponse {
    /// The admitted request.
    pub request: ActionRequest,
    /// Apply-phase policy decision.
    pub decision: Decision,
    /// Execution outcome.
    pub result: ActionResult,
}

/// Response envelope for the server-side plan+apply read endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadResponse {
    /// The request the gateway constructed from query parameters.
    pub request: ActionRequest,
    /// Plan-phase policy decision.
    pub plan: Decision,
    /// Execution outcome.
    pub result: ActionResult,
}

/// A configured environment as exposed to operators; never carries secrets.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EnvironmentSummary {
    /// Environment name.
    pub name: String,
    /// Cluster API base URL.
    pub base_url: String,
    /// API token identifier (not the secret).
    pub token_id: String,
}

/// Response envelope for `GET /v1/environments`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentsResponse {
    /// All configured environments.
    pub environments: Vec<EnvironmentSummary>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn action_type_round_trips_wire_identifiers() {
        for action in ActionType::ALL {
            let encoded = serde_json::to_string(&action).expect("encode action");
            assert_eq!(encoded, format!("\"{}\"", action.as_str()));
            let decoded: ActionType = serde_json::from_str(&encoded).expect("decode action");
            assert_eq!(decoded, action);
        }
    }

    #[test]
    fn action_request_rejects_unknown_fields() {
        let raw = json!({
            "environment": "home",
            "action": "read_vm",
            "target": "vm/101",
            "unknown": true,
        });
        let err = serde_json::from_value::<ActionRequest>(raw).unwrap_err();
        assert!(err.to_string().contains("unknown"));
    }

    #[test]
    fn action_request_never_accepts_actor_from_wire() {
        let raw = json!({
            "environment": "home",
            "action": "read_vm",
            "target": "vm/101",
            "actor": "spoofed",
        });
        assert!(serde_json::from_value::<ActionRequest>(raw).is_err());
    }

    #[test]
    fn action_request_omits_empty_optionals_when_serialized() {
        let req = ActionRequest::new("home", ActionType::ReadVm, "vm/101");
        let value = serde_json::to_value(&req).expect("encode request");
        let obj = value.as_object().expect("object");
        assert!(!obj.contains_key("params"));
        assert!(!obj.contains_key("approved_by"));
        assert!(!obj.contains_key("actor"));
        assert_eq!(obj.get("dry_run"), Some(&json!(false)));
    }

    #[test]
    fn risk_and_status_serialize_lowercase() {
        assert_eq!(serde_json::to_string(&RiskLevel::High).unwrap(), "\"high\"");
        assert_eq!(
            serde_json::to_string(&ResultStatus::Planned).unwrap(),
            "\"planned\""
        );
    }
}
