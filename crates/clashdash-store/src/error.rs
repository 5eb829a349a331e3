//! Rule store error types.

use clashdash_luci::ExecError;
use clashdash_rules::RulesError;

/// Error returned by rule store operations.
///
/// Every variant carries enough text to show to a user as-is.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Credentials rejected, including after one re-authentication.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Network failure, failed remote command or failed read.
    #[error("transport: {0}")]
    Transport(String),

    /// A remote call got no answer in time.
    #[error("timed out: {0}")]
    Timeout(String),

    /// Plugin missing or too old; nothing was read or written.
    #[error("feature unsupported: {0}")]
    Unsupported(String),

    /// Rejected before any remote call.
    #[error("validation: {0}")]
    Validation(String),

    /// Remote content could not be decoded at all.
    #[error("decode: {0}")]
    Decode(String),

    #[error("rule store is not ready (state: {0})")]
    NotReady(String),

    #[error("rule not found: {0}")]
    NotFound(String),

    /// The owner went away while the operation was in flight.
    #[error("rule store detached; result discarded")]
    Detached,

    /// A write timed out and the store was reloaded from the device.
    #[error("write outcome unknown, reloaded from device: {0}")]
    OutcomeUnknown(String),

    /// A reorder failed partway and the store was reloaded from the device.
    #[error("reorder interrupted, reloaded from device: {0}")]
    ReorderInterrupted(String),

    #[error("config: {0}")]
    Config(String),
}

impl StoreError {
    /// Whether the failed call may have taken effect remotely.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

impl From<ExecError> for StoreError {
    fn from(err: ExecError) -> Self {
        match err {
            ExecError::Auth(msg) => Self::Auth(msg),
            ExecError::Timeout(after) => Self::Timeout(format!("no answer after {after:?}")),
            other => Self::Transport(other.to_string()),
        }
    }
}

impl From<RulesError> for StoreError {
    fn from(err: RulesError) -> Self {
        match err {
            RulesError::Validation(msg) => Self::Validation(msg),
            RulesError::NotText(msg) => Self::Decode(msg),
        }
    }
}
