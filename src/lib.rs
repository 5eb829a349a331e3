//! # clashdash
//!
//! Remote rule-list synchronization for Clash-family proxy cores on OpenWrt
//! routers, driven entirely through LuCI's JSON-RPC `exec` call.
//!
//! ## Crates
//!
//! - [`clashdash_rules`] - Rule model and list-file / UCI codecs
//! - [`clashdash_luci`] - LuCI transport, login and token handling
//! - [`clashdash_store`] - Backends, version gate and the rule store

pub use clashdash_luci as luci;
pub use clashdash_rules as rules;
pub use clashdash_store as store;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use clashdash_luci::{CommandRunner, Credentials, LuciClient, Session, TokenHolder};
    pub use clashdash_rules::{Action, MatchType, Rule, RuleId};
    pub use clashdash_store::{
        BackendVariant, CancellationToken, RuleStore, StoreConfig, StoreError, StoreState,
        build_store, load_config,
    };
}
