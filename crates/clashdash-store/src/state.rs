//! Rule store lifecycle.

use std::fmt;

use serde::Serialize;

/// Where a [`RuleStore`](crate::RuleStore) is in its lifecycle.
///
/// ```text
/// Unloaded -> Loading -> Ready <-> Mutating
///                ^                    |
///                +---- forced reload -+
/// ```
///
/// Remote I/O is outstanding only in `Loading` and `Mutating`; mutations
/// start only from `Ready`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreState {
    #[default]
    Unloaded,
    Loading,
    Ready,
    Mutating,
}

impl fmt::Display for StoreState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StoreState::Unloaded => "unloaded",
            StoreState::Loading => "loading",
            StoreState::Ready => "ready",
            StoreState::Mutating => "mutating",
        })
    }
}
