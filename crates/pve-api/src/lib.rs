//! Proxmox VE API adapter.
//!
//! Translates canonical [`common::api::ActionRequest`]s into concrete
//! `/api2/json/...` calls with token authentication, a fixed TLS floor,
//! bounded GET-only retries, and a dry-run short-circuit. The gateway talks
//! to this crate exclusively through the [`ActionExecutor`] seam so tests can
//! substitute a counting mock.

pub mod client;
pub mod error;
mod request;

use common::api::{ActionRequest, ActionResult};
use futures_util::future::BoxFuture;

pub use client::{EnvironmentConfig, PveClient};
pub use error::PveError;

/// Backend seam between the action runner and the cluster API.
///
/// Implementations must not mutate the cluster when `req.dry_run` is set.
pub trait ActionExecutor: Send + Sync + 'static {
    /// Translate and execute the request against the cluster API.
    fn execute<'a>(
        &'a self,
        req: &'a ActionRequest,
    ) -> BoxFuture<'a, Result<ActionResult, PveError>>;
}

impl ActionExecutor for PveClient {
    fn execute<'a>(
        &'a self,
        req: &'a ActionRequest,
    ) -> BoxFuture<'a, Result<ActionResult, PveError>> {
        Box::pin(PveClient::execute(self, req))
    }
}
