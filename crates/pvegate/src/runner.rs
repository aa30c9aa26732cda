//! The action runner: policy, backend, and audit composed into the
//! plan/apply lifecycle.

use std::sync::Arc;

use chrono::Utc;
use common::api::{ActionRequest, ActionResult, ApplyResponse, Decision, PlanResponse};
use pve_api::ActionExecutor;
use tracing::error;

use crate::audit::{AuditKind, AuditRecord, AuditSink};
use crate::error::{ApiResult, AppError};
use crate::policy::Engine;

pub struct Runner {
    policy: Engine,
    executor: Arc<dyn ActionExecutor>,
    audit: Arc<dyn AuditSink>,
}

impl Runner {
    pub fn new(policy: Engine, executor: Arc<dyn ActionExecutor>, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            policy,
            executor,
            audit,
        }
    }

    /// Evaluates the plan phase and records a `plan` audit event. Never
    /// calls the backend.
    pub async fn plan(&self, req: &ActionRequest) -> ApiResult<PlanResponse> {
        let decision = self.policy.evaluate_for_plan(req)?;
        self.audit(AuditKind::Plan, req, &decision, None).await?;
        Ok(PlanResponse {
            request: req.clone(),
            decision,
        })
    }

    /// Re-evaluates policy for the apply phase, executes on allow, and
    /// records either `apply_denied` or `apply`.
    ///
    /// A successful return implies the policy allowed the request and the
    /// backend returned without error; backend failures surface verbatim and
    /// are never recorded as successful applies.
    pub async fn apply(&self, req: &ActionRequest) -> ApiResult<ApplyResponse> {
        let decision = self.policy.evaluate_for_apply(req)?;
        if !decision.allowed {
            self.audit(AuditKind::ApplyDenied, req, &decision, None).await?;
            return Err(AppError::forbidden(format!(
                "request denied by policy: {}",
                decision.reason
            )));
        }

        let result = self.executor.execute(req).await?;
        self.audit(AuditKind::Apply, req, &decision, Some(&result)).await?;
        Ok(ApplyResponse {
            request: req.clone(),
            decision,
            result,
        })
    }

    /// Audit failures fail the operation; an unauditable action must not
    /// report success.
    async fn audit(
        &self,
        kind: AuditKind,
        req: &ActionRequest,
        decision: &Decision,
        result: Option<&ActionResult>,
    ) -> ApiResult<()> {
        let record = AuditRecord {
            ts: Utc::now(),
            kind,
            actor: req.actor.clone(),
            request: req.clone(),
            decision: decision.clone(),
            result: result.cloned(),
        };
        self.audit.record(&record).await.map_err(|err| {
            error!(?err, kind = kind.as_str(), "audit write failed");
            AppError::internal("failed to write audit record")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use common::api::{ActionType, ResultStatus};
    use futures_util::future::BoxFuture;
    use pve_api::PveError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingExecutor {
        calls: AtomicUsize,
        fail: bool,
    }

    impl CountingExecutor {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail: true,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl ActionExecutor for CountingExecutor {
        fn execute<'a>(
            &'a self,
            _req: &'a ActionRequest,
        ) -> BoxFuture<'a, Result<ActionResult, PveError>> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                if self.fail {
                    return Err(PveError::Http {
                        status: 500,
                        method: "POST".to_string(),
                        endpoint: "/api2/json/nodes/n1/qemu/101/status/start".to_string(),
                        message: "boom".to_string(),
                    });
                }
                Ok(ActionResult {
                    status: ResultStatus::Accepted,
                    message: "UPID:n1:0001".to_string(),
                    data: None,
                })
            })
        }
    }

    fn runner_with(
        executor: Arc<CountingExecutor>,
        audit: Arc<dyn AuditSink>,
    ) -> Runner {
        Runner::new(Engine::new(), executor, audit)
    }

    fn delete_request(approved: bool) -> ActionRequest {
        let mut req = ActionRequest::new("home", ActionType::DeleteVm, "vm/101");
        req.actor = "test-agent".to_string();
        if approved {
            req.approved_by = "ops-user".to_string();
        }
        req
    }

    fn audit_kinds(path: &std::path::Path) -> Vec<String> {
        std::fs::read_to_string(path)
            .expect("read audit log")
            .trim_end()
            .lines()
            .map(|line| {
                serde_json::from_str::<serde_json::Value>(line).expect("line decodes")["kind"]
                    .as_str()
                    .expect("kind")
                    .to_string()
            })
            .collect()
    }

    #[tokio::test]
    async fn plan_allows_high_risk_without_approval_and_never_executes() {
        let executor = Arc::new(CountingExecutor::new());
        let runner = runner_with(executor.clone(), Arc::new(crate::audit::NoopAuditSink));

        let resp = runner.plan(&delete_request(false)).await.expect("plan");
        assert!(resp.decision.allowed);
        assert!(resp.decision.requires_approval);
        assert_eq!(executor.calls(), 0);
    }

    #[tokio::test]
    async fn apply_denies_unapproved_high_risk_without_executing() {
        let executor = Arc::new(CountingExecutor::new());
        let runner = runner_with(executor.clone(), Arc::new(crate::audit::NoopAuditSink));

        let err = runner.apply(&delete_request(false)).await.expect_err("denied");
        assert_eq!(err.status, StatusCode::FORBIDDEN);
        assert!(err.message.contains("request denied by policy"));
        assert_eq!(executor.calls(), 0);
    }

    #[tokio::test]
    async fn apply_executes_once_with_approval() {
        let executor = Arc::new(CountingExecutor::new());
        let runner = runner_with(executor.clone(), Arc::new(crate::audit::NoopAuditSink));

        let resp = runner.apply(&delete_request(true)).await.expect("apply");
        assert_eq!(executor.calls(), 1);
        assert_eq!(resp.result.status, ResultStatus::Accepted);
    }

    #[tokio::test]
    async fn backend_failure_surfaces_without_a_success_audit() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("audit.log");
        let executor = Arc::new(CountingExecutor::failing());
        let runner = runner_with(
            executor.clone(),
            Arc::new(crate::audit::FileAuditSink::new(&path)),
        );

        let err = runner.apply(&delete_request(true)).await.expect_err("fails");
        assert_eq!(err.status, StatusCode::BAD_GATEWAY);
        assert_eq!(executor.calls(), 1);
        // Nothing was audited for the failed execution.
        assert!(!path.exists() || audit_kinds(&path).is_empty());
    }

    #[tokio::test]
    async fn lifecycle_writes_plan_denied_and_apply_records_in_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("audit.log");
        let executor = Arc::new(CountingExecutor::new());
        let runner = runner_with(
            executor.clone(),
            Arc::new(crate::audit::FileAuditSink::new(&path)),
        );

        runner.plan(&delete_request(false)).await.expect("plan");
        runner
            .apply(&delete_request(false))
            .await
            .expect_err("denied apply");
        runner.apply(&delete_request(true)).await.expect("approved apply");

        assert_eq!(audit_kinds(&path), ["plan", "apply_denied", "apply"]);
        assert_eq!(executor.calls(), 1);
    }

    #[tokio::test]
    async fn audit_records_carry_the_authenticated_actor() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("audit.log");
        let runner = runner_with(
            Arc::new(CountingExecutor::new()),
            Arc::new(crate::audit::FileAuditSink::new(&path)),
        );

        let mut req = ActionRequest::new("home", ActionType::ReadVm, "vm/101");
        req.actor = "test-agent".to_string();
        runner.plan(&req).await.expect("plan");

        let contents = std::fs::read_to_string(&path).expect("read audit log");
        let record: serde_json::Value =
            serde_json::from_str(contents.trim_end()).expect("decode");
        assert_eq!(record["actor"], "test-agent");
    }
}
