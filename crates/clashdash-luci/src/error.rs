//! Remote execution error types.

use std::time::Duration;

/// Error from a remote exec or login call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecError {
    /// Credentials or session token rejected.
    #[error("authentication rejected: {0}")]
    Auth(String),

    /// Network failure or unexpected HTTP status.
    #[error("transport: {0}")]
    Transport(String),

    /// No answer within the configured bound.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The device answered with a JSON-RPC error.
    #[error("remote error: {0}")]
    Remote(String),

    /// The answer could not be understood.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl ExecError {
    /// Create a transport error from any error type.
    #[inline]
    pub fn transport<E: std::fmt::Display>(err: E) -> Self {
        Self::Transport(err.to_string())
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth(_))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}
