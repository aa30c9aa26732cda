#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{Router, body::Body, http::Request, response::Response};
use common::api::{ActionRequest, ActionResult, EnvironmentSummary, ResultStatus};
use futures_util::future::BoxFuture;
use http_body_util::BodyExt;
use pve_api::{ActionExecutor, PveError};
use pvegate::{
    app_state::{AppState, IdempotencyTtls},
    audit::FileAuditSink,
    auth::OperatorAuth,
    http::build_router,
    idempotency::IdempotencyStore,
    policy::Engine,
    runner::Runner,
    validation::RequestValidator,
};
use tower::ServiceExt;

pub const TEST_API_TOKEN: &str = "test-api-token";
pub const TEST_ENVIRONMENT: &str = "home";

/// Counting executor standing in for the cluster adapter.
pub struct MockExecutor {
    calls: AtomicUsize,
    last: Mutex<Option<ActionRequest>>,
    result: ActionResult,
}

impl MockExecutor {
    pub fn new() -> Self {
        Self::with_result(ActionResult {
            status: ResultStatus::Accepted,
            message: "UPID:node1:0001".to_string(),
            data: None,
        })
    }

    pub fn with_result(result: ActionResult) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            last: Mutex::new(None),
            result,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<ActionRequest> {
        self.last.lock().expect("mock lock").clone()
    }
}

impl ActionExecutor for MockExecutor {
    fn execute<'a>(
        &'a self,
        req: &'a ActionRequest,
    ) -> BoxFuture<'a, Result<ActionResult, PveError>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last.lock().expect("mock lock") = Some(req.clone());
            Ok(self.result.clone())
        })
    }
}

pub struct TestApp {
    pub router: Router,
    pub executor: Arc<MockExecutor>,
    pub audit_path: PathBuf,
    _dir: tempfile::TempDir,
}

pub fn setup_app() -> TestApp {
    setup_app_with(MockExecutor::new(), TEST_API_TOKEN)
}

pub fn setup_app_without_token() -> TestApp {
    setup_app_with(MockExecutor::new(), "")
}

pub fn setup_app_with(executor: MockExecutor, api_token: &str) -> TestApp {
    let dir = tempfile::tempdir().expect("tempdir");
    let audit_path = dir.path().join("audit.log");
    let executor = Arc::new(executor);

    let runner = Runner::new(
        Engine::new(),
        executor.clone(),
        Arc::new(FileAuditSink::new(&audit_path)),
    );
    let state = AppState {
        runner: Arc::new(runner),
        validator: Arc::new(RequestValidator::new([TEST_ENVIRONMENT.to_string()])),
        idempotency: Arc::new(IdempotencyStore::new()),
        ttls: IdempotencyTtls {
            high_risk_apply: Duration::from_secs(900),
            default: Duration::from_secs(3600),
        },
        auth: OperatorAuth::new(api_token),
        environments: Arc::new(vec![EnvironmentSummary {
            name: TEST_ENVIRONMENT.to_string(),
            base_url: "https://proxmox.example.com:8006".to_string(),
            token_id: "root@pam!agent".to_string(),
        }]),
    };
    let router = build_router(state.clone()).with_state(state);

    TestApp {
        router,
        executor,
        audit_path,
        _dir: dir,
    }
}

pub fn authed_request(method: &str, uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .header("authorization", format!("Bearer {TEST_API_TOKEN}"))
        .header("x-actor-id", "test-agent")
        .body(Body::from(body.to_string()))
        .expect("request builds")
}

pub fn anonymous_request(method: &str, uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request builds")
}

pub async fn send(router: &Router, request: Request<Body>) -> Response {
    router
        .clone()
        .oneshot(request)
        .await
        .expect("router handles request")
}

pub async fn body_bytes(response: Response) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .expect("read body")
        .to_bytes()
        .to_vec()
}

pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = body_bytes(response).await;
    serde_json::from_slice(&bytes).expect("body is JSON")
}

pub fn audit_lines(path: &std::path::Path) -> Vec<serde_json::Value> {
    if !path.exists() {
        return Vec::new();
    }
    std::fs::read_to_string(path)
        .expect("read audit log")
        .trim_end()
        .lines()
        .map(|line| serde_json::from_str(line).expect("audit line decodes"))
        .collect()
}
