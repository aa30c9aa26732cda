//! Stateless risk and approval policy.
//!
//! The risk map is part of the public contract: changing a mapping is an
//! API-breaking change.

use common::api::{ActionRequest, ActionType, Decision, RiskLevel};

use crate::error::{ApiResult, AppError};

/// Evaluates requests for the plan or apply phase.
#[derive(Debug, Default)]
pub struct Engine;

impl Engine {
    pub fn new() -> Self {
        Self
    }

    /// Plan never enforces approval; it reports risk and whether apply will
    /// require approval metadata.
    pub fn evaluate_for_plan(&self, req: &ActionRequest) -> ApiResult<Decision> {
        self.evaluate(req, false)
    }

    /// Apply denies actions that require approval when `approved_by` is
    /// empty.
    pub fn evaluate_for_apply(&self, req: &ActionRequest) -> ApiResult<Decision> {
        self.evaluate(req, true)
    }

    fn evaluate(&self, req: &ActionRequest, enforce_approval: bool) -> ApiResult<Decision> {
        let (risk_level, requires_approval, reason) = classify(req.action);

        if requires_approval && enforce_approval && req.approved_by.trim().is_empty() {
            return Ok(Decision {
                allowed: false,
                risk_level,
                requires_approval: true,
                reason: "approval required before apply".to_string(),
            });
        }
        if req.environment.trim().is_empty() || req.target.trim().is_empty() {
            return Err(AppError::bad_request("environment and target are required"));
        }

        Ok(Decision {
            allowed: true,
            risk_level,
            requires_approval,
            reason: reason.to_string(),
        })
    }
}

/// Risk, approval requirement, and rationale for every canonical action.
pub fn classify(action: ActionType) -> (RiskLevel, bool, &'static str) {
    match action {
        ActionType::ReadVm
        | ActionType::ReadInventory
        | ActionType::ReadTaskStatus
        | ActionType::ReadTasks => (RiskLevel::Low, false, "read/safe operation"),
        ActionType::StartVm | ActionType::SnapshotVm | ActionType::CloneVm => {
            (RiskLevel::Medium, false, "state-changing operation")
        }
        ActionType::StopVm => (RiskLevel::Medium, true, "service-impacting operation"),
        ActionType::MigrateVm
        | ActionType::DeleteVm
        | ActionType::StorageEdit
        | ActionType::FirewallEdit => (RiskLevel::High, true, "high-impact operation"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(action: ActionType) -> ActionRequest {
        ActionRequest::new("home", action, "vm/101")
    }

    #[test]
    fn risk_and_approval_mapping() {
        let cases = [
            (ActionType::ReadVm, RiskLevel::Low, false),
            (ActionType::ReadInventory, RiskLevel::Low, false),
            (ActionType::ReadTaskStatus, RiskLevel::Low, false),
            (ActionType::ReadTasks, RiskLevel::Low, false),
            (ActionType::StartVm, RiskLevel::Medium, false),
            (ActionType::SnapshotVm, RiskLevel::Medium, false),
            (ActionType::CloneVm, RiskLevel::Medium, false),
            (ActionType::StopVm, RiskLevel::Medium, true),
            (ActionType::MigrateVm, RiskLevel::High, true),
            (ActionType::DeleteVm, RiskLevel::High, true),
            (ActionType::StorageEdit, RiskLevel::High, true),
            (ActionType::FirewallEdit, RiskLevel::High, true),
        ];

        let engine = Engine::new();
        for (action, risk, requires_approval) in cases {
            let plan = engine.evaluate_for_plan(&request(action)).expect("plan");
            assert_eq!(plan.risk_level, risk, "{action}");
            assert_eq!(plan.requires_approval, requires_approval, "{action}");
            assert!(plan.allowed, "plan always allows: {action}");

            let apply = engine.evaluate_for_apply(&request(action)).expect("apply");
            assert_eq!(
                apply.allowed, !requires_approval,
                "unapproved apply allowed iff no approval needed: {action}"
            );
        }
    }

    #[test]
    fn apply_denial_carries_the_contract_reason() {
        let engine = Engine::new();
        let decision = engine
            .evaluate_for_apply(&request(ActionType::DeleteVm))
            .expect("apply evaluates");
        assert!(!decision.allowed);
        assert!(decision.requires_approval);
        assert_eq!(decision.reason, "approval required before apply");
    }

    #[test]
    fn apply_allows_approved_high_risk_actions() {
        let engine = Engine::new();
        let mut req = request(ActionType::DeleteVm);
        req.approved_by = "ops-user".to_string();
        let decision = engine.evaluate_for_apply(&req).expect("apply evaluates");
        assert!(decision.allowed);
        assert_eq!(decision.risk_level, RiskLevel::High);
    }

    #[test]
    fn empty_environment_or_target_is_an_error() {
        let engine = Engine::new();

        let mut req = request(ActionType::ReadVm);
        req.environment = String::new();
        assert!(engine.evaluate_for_plan(&req).is_err());

        let mut req = request(ActionType::ReadVm);
        req.target = String::new();
        assert!(engine.evaluate_for_plan(&req).is_err());
    }
}
