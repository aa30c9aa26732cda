use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request, header::AUTHORIZATION},
    middleware::Next,
    response::Response,
};
use subtle::ConstantTimeEq;

use crate::{
    app_state::AppState,
    error::{ApiResult, AppError},
};

/// Header supplying the audit actor identity.
pub const ACTOR_HEADER: &str = "x-actor-id";
/// Actor recorded when no `X-Actor-ID` header is present.
pub const DEFAULT_ACTOR: &str = "authenticated";

/// Authenticated caller identity, inserted into request extensions by
/// [`require_bearer_auth`]. Never sourced from the request body.
#[derive(Debug, Clone)]
pub struct Actor(pub String);

/// Operator bearer-token configuration.
#[derive(Clone)]
pub struct OperatorAuth {
    token: Option<String>,
}

impl OperatorAuth {
    pub fn new(token: impl Into<String>) -> Self {
        let token = token.into().trim().to_string();
        Self {
            token: (!token.is_empty()).then_some(token),
        }
    }

    /// Reads the token from `PVEGATE_API_TOKEN`; an absent or empty value
    /// leaves every authenticated endpoint unavailable (503).
    pub fn from_env() -> Self {
        Self::new(std::env::var(crate::config::ENV_API_TOKEN).unwrap_or_default())
    }

    pub fn is_configured(&self) -> bool {
        self.token.is_some()
    }

    fn matches(&self, candidate: &str) -> bool {
        let Some(token) = &self.token else {
            return false;
        };
        if token.len() != candidate.len() {
            return false;
        }
        token.as_bytes().ct_eq(candidate.as_bytes()).into()
    }
}

/// Middleware guarding every non-health endpoint: constant-time bearer check
/// plus actor extraction.
pub async fn require_bearer_auth(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> ApiResult<Response> {
    if !state.auth.is_configured() {
        return Err(AppError::service_unavailable(
            "server auth token is not configured",
        ));
    }

    let token = extract_bearer(req.headers())?;
    if !state.auth.matches(&token) {
        return Err(AppError::unauthorized("invalid bearer token"));
    }

    let actor = req
        .headers()
        .get(ACTOR_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(DEFAULT_ACTOR)
        .to_string();
    req.extensions_mut().insert(Actor(actor));

    Ok(next.run(req).await)
}

pub fn extract_bearer(headers: &HeaderMap) -> ApiResult<String> {
    let value = headers
        .get(AUTHORIZATION)
        .ok_or_else(|| AppError::unauthorized("missing bearer token"))?;

    let value = value
        .to_str()
        .map_err(|_| AppError::unauthorized("invalid authorization header"))?;

    let prefix = "Bearer ";
    if !value.trim_start().starts_with(prefix) {
        return Err(AppError::unauthorized("missing bearer token"));
    }

    Ok(value.trim_start()[prefix.len()..].trim().to_string())
}
