//! Nikki (mihomo) rules stored as UCI sections.

use async_trait::async_trait;
use clashdash_luci::CommandRunner;
use clashdash_rules::Rule;
use clashdash_rules::codec::uci::{self, UciOp};
use tracing::{debug, info, warn};

use super::{BackendVariant, Baseline, Fetched, RuleBackend, read_flag, run_acked, write_flag};
use crate::error::StoreError;
use crate::version::Version;

/// Rules kept as `@rule` sections of a UCI package.
///
/// UCI has no move primitive, so every write clears all sections and adds
/// them back in order. Edits are staged until `uci commit`; a failed write
/// reverts whatever was staged.
#[derive(Debug, Clone)]
pub struct Nikki {
    package: String,
    switch: String,
    min_version: Version,
}

/// What the package manager reports about the LuCI app.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PluginStatus {
    package: String,
    version: String,
}

impl Nikki {
    pub fn new(package: impl Into<String>, switch: impl Into<String>, min_version: Version) -> Self {
        Self {
            package: package.into(),
            switch: switch.into(),
            min_version,
        }
    }

    fn app_name(&self) -> String {
        format!("luci-app-{}", self.package)
    }

    fn verify(&self, status: Option<PluginStatus>) -> Result<Version, StoreError> {
        let expected = self.app_name();
        let Some(status) = status else {
            return Err(StoreError::Unsupported(format!("{expected} is not installed")));
        };
        if status.package != expected {
            return Err(StoreError::Unsupported(format!(
                "expected plugin {expected}, device reports {}",
                status.package
            )));
        }
        let version: Version = status.version.parse()?;
        if version < self.min_version {
            return Err(StoreError::Unsupported(format!(
                "{expected} {version} is older than required {}",
                self.min_version
            )));
        }
        Ok(version)
    }

    async fn revert(&self, runner: &dyn CommandRunner) {
        if let Err(e) = runner.run(&format!("uci revert {}", self.package)).await {
            warn!(package = %self.package, error = %e, "failed to revert staged changes");
        }
    }
}

/// Parse `opkg status` output. `None` when the package is not installed.
fn parse_status(output: &str) -> Option<PluginStatus> {
    let mut package = None;
    let mut version = None;
    for line in output.lines() {
        if let Some((key, value)) = line.split_once(':') {
            let value = value.trim();
            match key.trim() {
                "Package" => package = Some(value.to_string()),
                "Version" => version = Some(value.to_string()),
                "Status" if value.contains("not-installed") => return None,
                _ => {}
            }
        }
    }
    Some(PluginStatus {
        package: package?,
        version: version.unwrap_or_default(),
    })
}

fn render_step(ops: &[UciOp], package: &str) -> String {
    ops.iter()
        .map(|op| op.render(package))
        .collect::<Vec<_>>()
        .join(" && ")
}

#[async_trait]
impl RuleBackend for Nikki {
    fn variant(&self) -> BackendVariant {
        BackendVariant::Nikki
    }

    async fn check_support(&self, runner: &dyn CommandRunner) -> Result<(), StoreError> {
        let output = runner
            .run(&format!("opkg status {} 2>/dev/null", self.app_name()))
            .await?;
        let version = self.verify(parse_status(&output))?;
        info!(plugin = %self.app_name(), version = %version, "plugin version accepted");
        Ok(())
    }

    async fn fetch(&self, runner: &dyn CommandRunner) -> Result<Fetched, StoreError> {
        let master_enabled = read_flag(runner, &self.switch).await?;
        let raw = runner.run(&format!("uci -q show {}", self.package)).await?;
        let decoded = uci::decode(&raw)?;
        debug!(
            package = %self.package,
            sections = decoded.sections,
            rules = decoded.rules.len(),
            incomplete = decoded.incomplete.len(),
            "rule sections decoded"
        );

        Ok(Fetched {
            rules: decoded.rules,
            faults: decoded.faults,
            master_enabled,
            baseline: Baseline::Sections {
                count: decoded.sections,
                incomplete: decoded.incomplete,
            },
        })
    }

    async fn write(
        &self,
        runner: &dyn CommandRunner,
        baseline: &Baseline,
        rules: &[Rule],
    ) -> Result<Baseline, StoreError> {
        let Baseline::Sections { count, incomplete } = baseline else {
            return Err(StoreError::Decode(
                "section baseline missing; reload first".into(),
            ));
        };

        let plan = uci::plan_rewrite(*count, rules, incomplete);
        let steps = plan.steps();
        for (n, step) in steps.iter().enumerate() {
            debug!(step = n + 1, of = steps.len(), ops = step.len(), "uci rewrite step");
            if let Err(e) = run_acked(runner, &render_step(step, &self.package)).await {
                warn!(
                    package = %self.package,
                    step = n + 1,
                    of = steps.len(),
                    error = %e,
                    "uci rewrite failed"
                );
                self.revert(runner).await;
                return Err(e);
            }
        }

        Ok(Baseline::Sections {
            count: rules.len() + incomplete.len(),
            incomplete: incomplete.clone(),
        })
    }

    async fn set_master(
        &self,
        runner: &dyn CommandRunner,
        enabled: bool,
    ) -> Result<(), StoreError> {
        write_flag(runner, &self.switch, enabled).await
    }
}
