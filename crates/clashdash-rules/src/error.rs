//! Error types for rule validation and decoding.

use thiserror::Error;

/// Errors raised by the rule model and codecs.
///
/// Per-line problems are never errors; they become [`Fault`](crate::Fault)s.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RulesError {
    #[error("invalid rule: {0}")]
    Validation(String),

    #[error("content is not text: {0}")]
    NotText(String),
}
