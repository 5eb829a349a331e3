//! Store configuration.
//!
//! ```toml
//! log_level = "info"
//!
//! [device]
//! url = "http://192.168.1.1"
//! username = "root"
//! password = "secret"
//!
//! [backend]
//! variant = "openclash"
//! ```

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clashdash_luci::{Credentials, LuciClient, Session, TokenHolder};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::backend::{self, BackendVariant};
use crate::error::StoreError;
use crate::store::RuleStore;

/// Top-level configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    pub device: DeviceConfig,

    #[serde(default)]
    pub backend: BackendConfig,

    /// Log level override (trace, debug, info, warn, error).
    #[serde(default)]
    pub log_level: Option<String>,
}

/// LuCI endpoint and login.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceConfig {
    /// LuCI base URL (e.g. `http://192.168.1.1`).
    pub url: String,

    #[serde(default = "default_username")]
    pub username: String,

    pub password: String,

    /// Bound on every remote call, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Accept self-signed router certificates.
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

/// Which rule backend to drive and where it keeps its data.
#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_variant")]
    pub variant: BackendVariant,

    /// OpenClash custom rules file.
    #[serde(default = "default_rules_path")]
    pub rules_path: String,

    /// UCI key enabling OpenClash custom rules.
    #[serde(default = "default_openclash_switch")]
    pub openclash_switch: String,

    /// UCI package holding Nikki rule sections.
    #[serde(default = "default_package")]
    pub package: String,

    /// UCI key enabling Nikki mixin rules.
    #[serde(default = "default_nikki_switch")]
    pub nikki_switch: String,

    /// Oldest `luci-app-<package>` version with rule support.
    #[serde(default = "default_min_version")]
    pub min_version: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            variant: default_variant(),
            rules_path: default_rules_path(),
            openclash_switch: default_openclash_switch(),
            package: default_package(),
            nikki_switch: default_nikki_switch(),
            min_version: default_min_version(),
        }
    }
}

fn default_username() -> String {
    "root".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_variant() -> BackendVariant {
    BackendVariant::OpenClash
}

fn default_rules_path() -> String {
    "/etc/openclash/custom/openclash_custom_rules.list".to_string()
}

fn default_openclash_switch() -> String {
    "openclash.config.enable_custom_clash_rules".to_string()
}

fn default_package() -> String {
    "nikki".to_string()
}

fn default_nikki_switch() -> String {
    "nikki.mixin.rule".to_string()
}

fn default_min_version() -> String {
    "1.19.0".to_string()
}

/// Load configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<StoreConfig, StoreError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| StoreError::Config(format!("{}: {e}", path.display())))?;
    toml::from_str(&content).map_err(|e| StoreError::Config(format!("{}: {e}", path.display())))
}

/// Wire a [`RuleStore`] to the configured device.
///
/// The store is detached when `owner` is cancelled.
pub fn build_store(config: &StoreConfig, owner: CancellationToken) -> Result<RuleStore, StoreError> {
    let timeout = Duration::from_secs(config.device.timeout_secs);
    let http = reqwest::Client::builder()
        .danger_accept_invalid_certs(config.device.accept_invalid_certs)
        .timeout(timeout)
        .build()
        .map_err(|e| StoreError::Config(format!("http client: {e}")))?;

    let client = Arc::new(LuciClient::with_client(http, config.device.url.clone()));
    let tokens = Arc::new(TokenHolder::new(
        client.clone(),
        Credentials::new(config.device.username.clone(), config.device.password.clone()),
    ));
    let session = Session::new(client, tokens, timeout);
    let backend = backend::select(&config.backend)?;

    Ok(RuleStore::new(backend, Arc::new(session), owner))
}
