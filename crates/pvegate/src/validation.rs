//! Structural and semantic admission of action requests.
//!
//! Every request enters through here before policy evaluation or hashing:
//! the environment must be configured, the target must match its action's
//! grammar, approval metadata must satisfy the joint rules, and params must
//! stay within the scalar-or-object shape the adapter can encode.

use std::collections::HashSet;
use std::sync::LazyLock;

use common::api::{ActionRequest, ActionType};
use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{ApiResult, AppError};

static VM_TARGET: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^vm/[0-9]+$").expect("pattern"));
static INVENTORY_TARGET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^inventory/(all|running)$").expect("pattern"));
static TASK_STATUS_TARGET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^task/status$").expect("pattern"));
static TASK_LIST_TARGET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^task/list$").expect("pattern"));
static STORAGE_TARGET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^storage/[A-Za-z0-9._:-]+$").expect("pattern"));
static FIREWALL_TARGET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^firewall/(cluster|node/[A-Za-z0-9._-]+|vm/[0-9]+)$").expect("pattern"));
static APPROVED_BY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9._:@/-]{3,128}$").expect("pattern"));
static APPROVAL_TICKET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9._:-]{3,128}$").expect("pattern"));

/// Decodes a JSON body strictly: unknown fields (enforced by the DTO) and
/// trailing content after the top-level value both fail.
pub fn decode_strict_json<T: DeserializeOwned>(bytes: &[u8]) -> ApiResult<T> {
    serde_json::from_slice(bytes).map_err(|err| AppError::bad_request(format!("invalid JSON body: {err}")))
}

/// Admits action requests against the configured environments.
pub struct RequestValidator {
    environments: HashSet<String>,
}

impl RequestValidator {
    pub fn new(environments: impl IntoIterator<Item = String>) -> Self {
        Self {
            environments: environments.into_iter().collect(),
        }
    }

    pub fn validate(&self, req: &ActionRequest) -> ApiResult<()> {
        let environment = req.environment.trim();
        if environment.is_empty() {
            return Err(AppError::bad_request("environment is required"));
        }
        if !self.environments.contains(environment) {
            return Err(AppError::bad_request(format!(
                "unknown environment {environment:?}"
            )));
        }

        let target = req.target.trim();
        if target.is_empty() {
            return Err(AppError::bad_request("target is required"));
        }
        validate_target(req.action, target)?;
        validate_params(&req.params)?;
        validate_approval_metadata(req)?;
        Ok(())
    }
}

fn validate_target(action: ActionType, target: &str) -> ApiResult<()> {
    let (pattern, expected): (&Regex, &str) = match action {
        ActionType::ReadVm
        | ActionType::StartVm
        | ActionType::StopVm
        | ActionType::SnapshotVm
        | ActionType::CloneVm
        | ActionType::MigrateVm
        | ActionType::DeleteVm => (&VM_TARGET, "vm/<id>"),
        ActionType::ReadInventory => (&INVENTORY_TARGET, "inventory/all or inventory/running"),
        ActionType::ReadTaskStatus => (&TASK_STATUS_TARGET, "task/status"),
        ActionType::ReadTasks => (&TASK_LIST_TARGET, "task/list"),
        ActionType::StorageEdit => (&STORAGE_TARGET, "storage/<name>"),
        ActionType::FirewallEdit => (
            &FIREWALL_TARGET,
            "firewall/cluster, firewall/node/<name>, or firewall/vm/<id>",
        ),
    };

    if !pattern.is_match(target) {
        return Err(AppError::bad_request(format!(
            "invalid target for {action:?}: expected {expected}",
            action = action.as_str()
        )));
    }
    Ok(())
}

/// Params carry opaque scalars or nested objects; arrays are rejected at the
/// wire edge because no action's endpoint consumes them.
fn validate_params(params: &serde_json::Map<String, Value>) -> ApiResult<()> {
    for (key, value) in params {
        if key.trim().is_empty() {
            return Err(AppError::bad_request("params keys cannot be empty"));
        }
        validate_param_value(key, value)?;
    }
    Ok(())
}

fn validate_param_value(key: &str, value: &Value) -> ApiResult<()> {
    match value {
        Value::Array(_) => Err(AppError::bad_request(format!(
            "params.{key} must be a scalar or object, not an array"
        ))),
        Value::Object(map) => {
            for (nested_key, nested) in map {
                validate_param_value(nested_key, nested)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

fn validate_approval_metadata(req: &ActionRequest) -> ApiResult<()> {
    let approved_by = req.approved_by.trim();
    let approval_ticket = req.approval_ticket.trim();
    let reason = req.reason.trim();
    let expires_at = req.expires_at.trim();

    if !approved_by.is_empty() && !APPROVED_BY.is_match(approved_by) {
        return Err(AppError::bad_request("invalid approved_by format"));
    }
    if !approval_ticket.is_empty() && !APPROVAL_TICKET.is_match(approval_ticket) {
        return Err(AppError::bad_request("invalid approval_ticket format"));
    }
    if !reason.is_empty() && reason.len() < 8 {
        return Err(AppError::bad_request(
            "reason must be at least 8 characters when provided",
        ));
    }
    if !expires_at.is_empty() && chrono::DateTime::parse_from_rfc3339(expires_at).is_err() {
        return Err(AppError::bad_request("expires_at must be RFC 3339 format"));
    }
    if approved_by.is_empty()
        && (!approval_ticket.is_empty() || !reason.is_empty() || !expires_at.is_empty())
    {
        return Err(AppError::bad_request(
            "approved_by is required when approval metadata is provided",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn validator() -> RequestValidator {
        RequestValidator::new(["home".to_string()])
    }

    fn request(action: ActionType, target: &str) -> ActionRequest {
        ActionRequest::new("home", action, target)
    }

    #[test]
    fn admits_every_canonical_action_with_its_target() {
        let cases = [
            (ActionType::ReadVm, "vm/101"),
            (ActionType::ReadInventory, "inventory/all"),
            (ActionType::ReadInventory, "inventory/running"),
            (ActionType::ReadTaskStatus, "task/status"),
            (ActionType::ReadTasks, "task/list"),
            (ActionType::StartVm, "vm/101"),
            (ActionType::StopVm, "vm/101"),
            (ActionType::SnapshotVm, "vm/101"),
            (ActionType::CloneVm, "vm/101"),
            (ActionType::MigrateVm, "vm/101"),
            (ActionType::DeleteVm, "vm/101"),
            (ActionType::StorageEdit, "storage/local-lvm"),
            (ActionType::FirewallEdit, "firewall/cluster"),
            (ActionType::FirewallEdit, "firewall/node/pve-1"),
            (ActionType::FirewallEdit, "firewall/vm/101"),
        ];
        let validator = validator();
        for (action, target) in cases {
            validator
                .validate(&request(action, target))
                .unwrap_or_else(|err| panic!("{action:?} {target}: {}", err.message));
        }
    }

    #[test]
    fn rejects_targets_that_violate_the_action_grammar() {
        let cases = [
            (ActionType::ReadVm, "vm/abc"),
            (ActionType::ReadVm, "node1/101"),
            (ActionType::ReadInventory, "inventory/active"),
            (ActionType::ReadTasks, "task/status"),
            (ActionType::StorageEdit, "storage/"),
            (ActionType::StorageEdit, "storage/bad name"),
            (ActionType::FirewallEdit, "firewall/datacenter"),
            (ActionType::FirewallEdit, "firewall/vm/abc"),
        ];
        let validator = validator();
        for (action, target) in cases {
            let err = validator.validate(&request(action, target)).unwrap_err();
            assert!(
                err.message.contains("invalid target"),
                "{action:?} {target}: {}",
                err.message
            );
        }
    }

    #[test]
    fn rejects_missing_and_unknown_environment() {
        let validator = validator();

        let mut req = request(ActionType::ReadVm, "vm/101");
        req.environment = String::new();
        assert!(validator.validate(&req).is_err());

        req.environment = "prod".to_string();
        let err = validator.validate(&req).unwrap_err();
        assert!(err.message.contains("unknown environment"), "{}", err.message);
    }

    #[test]
    fn rejects_empty_target() {
        let err = validator()
            .validate(&request(ActionType::ReadVm, ""))
            .unwrap_err();
        assert!(err.message.contains("target is required"));
    }

    #[test]
    fn approval_metadata_joint_rules() {
        let validator = validator();

        let mut req = request(ActionType::DeleteVm, "vm/101");
        req.approved_by = "ops-user".to_string();
        req.approval_ticket = "CHG-1234".to_string();
        req.reason = "decommissioned host".to_string();
        req.expires_at = "2026-01-02T03:04:05Z".to_string();
        validator.validate(&req).expect("full metadata admits");

        let mut bad_format = request(ActionType::DeleteVm, "vm/101");
        bad_format.approved_by = "x".to_string();
        assert!(validator.validate(&bad_format).is_err(), "too-short approver");

        let mut bad_ticket = request(ActionType::DeleteVm, "vm/101");
        bad_ticket.approved_by = "ops-user".to_string();
        bad_ticket.approval_ticket = "CHG 1234".to_string();
        assert!(validator.validate(&bad_ticket).is_err(), "spaces in ticket");

        let mut short_reason = request(ActionType::DeleteVm, "vm/101");
        short_reason.approved_by = "ops-user".to_string();
        short_reason.reason = "meh".to_string();
        assert!(validator.validate(&short_reason).is_err(), "short reason");

        let mut bad_expiry = request(ActionType::DeleteVm, "vm/101");
        bad_expiry.approved_by = "ops-user".to_string();
        bad_expiry.expires_at = "tomorrow".to_string();
        assert!(validator.validate(&bad_expiry).is_err(), "non-RFC3339 expiry");

        let mut orphaned = request(ActionType::DeleteVm, "vm/101");
        orphaned.approval_ticket = "CHG-1234".to_string();
        let err = validator.validate(&orphaned).unwrap_err();
        assert!(
            err.message.contains("approved_by is required"),
            "{}",
            err.message
        );
    }

    #[test]
    fn params_allow_scalars_and_objects_but_not_arrays() {
        let validator = validator();

        let mut req = request(ActionType::CloneVm, "vm/103");
        req.params = json!({"node": "node1", "newid": 104, "full": false, "meta": {"origin": "ops"}})
            .as_object()
            .cloned()
            .unwrap();
        validator.validate(&req).expect("scalars and objects admit");

        req.params = json!({"disks": ["scsi0", "scsi1"]})
            .as_object()
            .cloned()
            .unwrap();
        let err = validator.validate(&req).unwrap_err();
        assert!(err.message.contains("not an array"), "{}", err.message);

        req.params = json!({"meta": {"nested": [1, 2]}})
            .as_object()
            .cloned()
            .unwrap();
        assert!(validator.validate(&req).is_err(), "nested arrays rejected");
    }

    #[test]
    fn strict_decode_rejects_unknown_fields_and_trailing_content() {
        let unknown = br#"{"environment":"home","action":"read_vm","target":"vm/101","unknown":true}"#;
        assert!(decode_strict_json::<ActionRequest>(unknown).is_err());

        let trailing = br#"{"environment":"home","action":"read_vm","target":"vm/101"}{"x":1}"#;
        assert!(decode_strict_json::<ActionRequest>(trailing).is_err());

        let valid = br#"{"environment":"home","action":"read_vm","target":"vm/101"}"#;
        let req: ActionRequest = decode_strict_json(valid).expect("valid body decodes");
        assert_eq!(req.action, ActionType::ReadVm);
    }

    #[test]
    fn strict_decode_rejects_unknown_actions() {
        let body = br#"{"environment":"home","action":"reboot_vm","target":"vm/101"}"#;
        let err = decode_strict_json::<ActionRequest>(body).unwrap_err();
        assert!(err.message.contains("invalid JSON body"), "{}", err.message);
    }
}
