//! Backend adapters.
//!
//! Each adapter binds one persistence scheme on the device to the shared
//! [`RuleBackend`] surface: the codec, the shell commands built around it,
//! and (for Nikki) the plugin version gate. The store selects one adapter
//! per session and never branches on the variant itself.

mod nikki;
mod openclash;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use clashdash_luci::CommandRunner;
use clashdash_rules::codec::uci::IncompleteSection;
use clashdash_rules::{Fault, Rule};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::BackendConfig;
use crate::error::StoreError;
use crate::version::Version;

pub use nikki::Nikki;
pub use openclash::OpenClash;

/// Printed by every write command after its last step succeeds.
pub const WRITE_ACK: &str = "__clashdash_write_ok__";

/// Rule persistence scheme on the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendVariant {
    /// OpenClash custom rules list file.
    OpenClash,
    /// Nikki (mihomo) UCI rule sections.
    #[serde(alias = "mihomo")]
    Nikki,
}

impl fmt::Display for BackendVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BackendVariant::OpenClash => "openclash",
            BackendVariant::Nikki => "nikki",
        })
    }
}

/// What a backend needs from the last read to write the next version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Baseline {
    /// Full list-file text; everything outside `rules:` is kept from it.
    Text(String),
    /// Rule sections currently on the device.
    Sections {
        count: usize,
        incomplete: Vec<IncompleteSection>,
    },
}

/// Result of a full read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fetched {
    pub rules: Vec<Rule>,
    pub faults: Vec<Fault>,
    pub master_enabled: bool,
    pub baseline: Baseline,
}

/// One rule persistence scheme.
#[async_trait]
pub trait RuleBackend: Send + Sync {
    fn variant(&self) -> BackendVariant;

    /// Fail with [`StoreError::Unsupported`] if the device cannot be used.
    ///
    /// Runs once per load, before any rule content is read.
    async fn check_support(&self, _runner: &dyn CommandRunner) -> Result<(), StoreError> {
        Ok(())
    }

    async fn fetch(&self, runner: &dyn CommandRunner) -> Result<Fetched, StoreError>;

    /// Persist `rules`, returning the baseline for the next write.
    async fn write(
        &self,
        runner: &dyn CommandRunner,
        baseline: &Baseline,
        rules: &[Rule],
    ) -> Result<Baseline, StoreError>;

    async fn set_master(
        &self,
        runner: &dyn CommandRunner,
        enabled: bool,
    ) -> Result<(), StoreError>;
}

#[async_trait]
impl<B: RuleBackend + ?Sized> RuleBackend for Arc<B> {
    fn variant(&self) -> BackendVariant {
        (**self).variant()
    }

    async fn check_support(&self, runner: &dyn CommandRunner) -> Result<(), StoreError> {
        (**self).check_support(runner).await
    }

    async fn fetch(&self, runner: &dyn CommandRunner) -> Result<Fetched, StoreError> {
        (**self).fetch(runner).await
    }

    async fn write(
        &self,
        runner: &dyn CommandRunner,
        baseline: &Baseline,
        rules: &[Rule],
    ) -> Result<Baseline, StoreError> {
        (**self).write(runner, baseline, rules).await
    }

    async fn set_master(
        &self,
        runner: &dyn CommandRunner,
        enabled: bool,
    ) -> Result<(), StoreError> {
        (**self).set_master(runner, enabled).await
    }
}

/// Build the adapter for the configured variant.
pub fn select(config: &BackendConfig) -> Result<Arc<dyn RuleBackend>, StoreError> {
    Ok(match config.variant {
        BackendVariant::OpenClash => Arc::new(OpenClash::new(
            config.rules_path.clone(),
            config.openclash_switch.clone(),
        )),
        BackendVariant::Nikki => Arc::new(Nikki::new(
            config.package.clone(),
            config.nikki_switch.clone(),
            config
                .min_version
                .parse::<Version>()
                .map_err(|e| StoreError::Config(format!("min_version: {e}")))?,
        )),
    })
}

/// Run a write command and require the acknowledgement marker in its output.
pub(crate) async fn run_acked(runner: &dyn CommandRunner, command: &str) -> Result<(), StoreError> {
    debug!(bytes = command.len(), "write command");
    let output = runner.run(&format!("{command} && echo {WRITE_ACK}")).await?;
    if output.contains(WRITE_ACK) {
        Ok(())
    } else {
        Err(StoreError::Transport(format!(
            "write not acknowledged: {}",
            summarize(&output)
        )))
    }
}

/// Read a UCI flag; anything but `1` is off.
pub(crate) async fn read_flag(runner: &dyn CommandRunner, key: &str) -> Result<bool, StoreError> {
    let value = runner.run(&format!("uci -q get {key}")).await?;
    Ok(value.trim() == "1")
}

/// Set a UCI flag and commit its package.
pub(crate) async fn write_flag(
    runner: &dyn CommandRunner,
    key: &str,
    enabled: bool,
) -> Result<(), StoreError> {
    let package = key.split('.').next().unwrap_or(key);
    let value = if enabled { "1" } else { "0" };
    run_acked(
        runner,
        &format!("uci set {key}='{value}' && uci commit {package}"),
    )
    .await
}

fn summarize(output: &str) -> String {
    let trimmed = output.trim();
    match trimmed.char_indices().nth(120) {
        Some((cut, _)) => format!("{}...", &trimmed[..cut]),
        None if trimmed.is_empty() => "no output".to_string(),
        None => trimmed.to_string(),
    }
}
