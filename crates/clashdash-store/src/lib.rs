//! Remote rule list synchronization for OpenClash and Nikki routers.
//!
//! A [`RuleStore`] holds the rules of one device and mirrors every edit to
//! it through a [`RuleBackend`]:
//!
//! - [`OpenClash`]: a YAML-like list file, rewritten whole.
//! - [`Nikki`]: UCI `@rule` sections, cleared and re-added in order, gated on
//!   the installed `luci-app-nikki` version.
//!
//! # Example
//!
//! ```no_run
//! use clashdash_store::{CancellationToken, build_store, load_config};
//!
//! # async fn example() -> Result<(), clashdash_store::StoreError> {
//! let config = load_config("clashdash.toml".as_ref())?;
//! let store = build_store(&config, CancellationToken::new())?;
//! store.load().await?;
//! for rule in &store.snapshot().rules.rules {
//!     println!("{} {}", rule.match_type, rule.target);
//! }
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod cli;
pub mod config;
pub mod error;
pub mod ruleset;
pub mod state;
pub mod store;
pub mod version;

pub use backend::{BackendVariant, Baseline, Fetched, Nikki, OpenClash, RuleBackend, WRITE_ACK};
pub use cli::RulesArgs;
pub use config::{BackendConfig, DeviceConfig, StoreConfig, build_store, load_config};
pub use error::StoreError;
pub use ruleset::{RuleSet, Undo};
pub use state::StoreState;
pub use store::{RuleStore, Snapshot};
pub use tokio_util::sync::CancellationToken;
pub use version::Version;
