use thiserror::Error;

/// Closed failure taxonomy surfaced by the adapter.
///
/// Messages never contain token secrets; the authorization header is built
/// immediately before send and is not part of any error path.
#[derive(Debug, Clone, Error)]
pub enum PveError {
    /// The request never produced an HTTP response (DNS, connect, timeout).
    #[error("proxmox API error ({method} {endpoint}): {message}")]
    Transport {
        /// HTTP method of the attempted call.
        method: String,
        /// Cluster API endpoint path.
        endpoint: String,
        /// Underlying transport failure.
        message: String,
    },

    /// The cluster returned a terminal non-2xx response.
    #[error("proxmox API error ({method} {endpoint}) status {status}: {message}")]
    Http {
        /// Terminal HTTP status code.
        status: u16,
        /// HTTP method of the call.
        method: String,
        /// Cluster API endpoint path.
        endpoint: String,
        /// Message extracted from the response envelope.
        message: String,
    },

    /// The response body was not the expected `{data: ...}` envelope.
    #[error("decode proxmox response: {0}")]
    Decode(String),

    /// The request named an environment the adapter was not built with.
    #[error("unknown environment {0:?}")]
    UnknownEnvironment(String),

    /// The target (or its routing params) cannot be translated.
    #[error("{0}")]
    InvalidTarget(String),

    /// The params required by the action are missing or malformed.
    #[error("{0}")]
    InvalidParams(String),
}

impl PveError {
    /// Terminal upstream status code, when the failure carries one.
    pub fn status(&self) -> Option<u16> {
        match self {
            PveError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}
