use std::sync::Arc;
use std::time::Duration;

use common::api::EnvironmentSummary;

use crate::auth::OperatorAuth;
use crate::config::IdempotencyConfig;
use crate::idempotency::IdempotencyStore;
use crate::runner::Runner;
use crate::validation::RequestValidator;

/// Shared application state passed into handlers.
///
/// Everything here is read-only after construction except the idempotency
/// store, which serializes its own mutation internally.
#[derive(Clone)]
pub struct AppState {
    pub runner: Arc<Runner>,
    pub validator: Arc<RequestValidator>,
    pub idempotency: Arc<IdempotencyStore>,
    pub ttls: IdempotencyTtls,
    pub auth: OperatorAuth,
    /// Configured environments as exposed on `/v1/environments`; secrets are
    /// resolved inside the adapter and never reach this summary.
    pub environments: Arc<Vec<EnvironmentSummary>>,
}

/// Resolved idempotency record lifetimes.
#[derive(Debug, Clone, Copy)]
pub struct IdempotencyTtls {
    pub high_risk_apply: Duration,
    pub default: Duration,
}

impl From<&IdempotencyConfig> for IdempotencyTtls {
    fn from(cfg: &IdempotencyConfig) -> Self {
        Self {
            high_risk_apply: Duration::from_secs(cfg.high_risk_apply_ttl_secs),
            default: Duration::from_secs(cfg.default_ttl_secs),
        }
    }
}

#[allow(dead_code)]
fn _assert_app_state_bounds() {
    fn assert_bounds<T: Clone + Send + Sync + 'static>() {}
    assert_bounds::<AppState>();
}
