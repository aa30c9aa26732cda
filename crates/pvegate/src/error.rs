use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use pve_api::PveError;
use tracing::error;

/// Error bodies are a single `text/plain` line; status and code carry the
/// machine-readable classification.
pub const ERROR_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

/// Application error type for HTTP handlers.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

pub type ApiResult<T> = std::result::Result<T, AppError>;

impl AppError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "invalid_argument",
            message: msg.into(),
        }
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            code: "unauthorized",
            message: msg.into(),
        }
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::FORBIDDEN,
            code: "policy_denied",
            message: msg.into(),
        }
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::CONFLICT,
            code: "idempotency_conflict",
            message: msg.into(),
        }
    }

    pub fn bad_gateway(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_GATEWAY,
            code: "upstream_http",
            message: msg.into(),
        }
    }

    pub fn gateway_timeout(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::GATEWAY_TIMEOUT,
            code: "upstream_transport",
            message: msg.into(),
        }
    }

    pub fn service_unavailable(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            code: "unconfigured",
            message: msg.into(),
        }
    }

    pub fn internal(msg: &str) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "internal",
            message: msg.to_string(),
        }
    }

    /// Status, content type, and body bytes of the HTTP rendering. The
    /// idempotency store records exactly these parts so replays are
    /// byte-equal.
    pub fn to_parts(&self) -> (StatusCode, &'static str, Vec<u8>) {
        let body = format!("{}\n", self.message).into_bytes();
        (self.status, ERROR_CONTENT_TYPE, body)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        error!(?err, "internal error");
        AppError::internal("internal server error")
    }
}

impl From<PveError> for AppError {
    fn from(err: PveError) -> Self {
        match &err {
            PveError::Http { .. } | PveError::Decode(_) => AppError::bad_gateway(err.to_string()),
            PveError::Transport { .. } => AppError::gateway_timeout(err.to_string()),
            PveError::UnknownEnvironment(_)
            | PveError::InvalidTarget(_)
            | PveError::InvalidParams(_) => AppError::bad_request(err.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, content_type, body) = self.to_parts();
        (
            status,
            [(axum::http::header::CONTENT_TYPE, content_type)],
            body,
        )
            .into_response()
    }
}
