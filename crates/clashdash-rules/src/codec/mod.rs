//! Codecs between raw device text and ordered rule sequences.

pub mod list_file;
pub mod uci;

use serde::{Deserialize, Serialize};

use crate::error::RulesError;
use crate::rule::Rule;

/// Where a decode fault was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind", content = "at")]
pub enum FaultLocation {
    /// 1-based line number in a list file.
    Line(usize),
    /// Section index in an indexed store.
    Section(usize),
}

/// A non-fatal decode problem isolated to one entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fault {
    pub location: FaultLocation,
    pub reason: String,
}

impl Fault {
    pub fn line(line: usize, reason: impl Into<String>) -> Self {
        Self {
            location: FaultLocation::Line(line),
            reason: reason.into(),
        }
    }

    pub fn section(index: usize, reason: impl Into<String>) -> Self {
        Self {
            location: FaultLocation::Section(index),
            reason: reason.into(),
        }
    }
}

/// Result of decoding a raw document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Decoded {
    /// Rules in document order.
    pub rules: Vec<Rule>,
    pub faults: Vec<Fault>,
}

/// Quote a value for a POSIX shell using single quotes.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Reject content that is not text at all.
pub(crate) fn ensure_text(raw: &str) -> Result<(), RulesError> {
    match raw.find('\0') {
        Some(offset) => Err(RulesError::NotText(format!("NUL byte at offset {offset}"))),
        None => Ok(()),
    }
}
