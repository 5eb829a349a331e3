//! OpenClash custom rules list file.

use async_trait::async_trait;
use clashdash_luci::CommandRunner;
use clashdash_rules::codec::list_file;
use clashdash_rules::{Rule, shell_quote};
use tracing::debug;

use super::{BackendVariant, Baseline, Fetched, RuleBackend, read_flag, run_acked, write_flag};
use crate::error::StoreError;

/// Rules kept in a YAML-like list file, overwritten whole on every write.
#[derive(Debug, Clone)]
pub struct OpenClash {
    path: String,
    switch: String,
}

impl OpenClash {
    /// `switch` is the UCI key that splices the file into the running config.
    pub fn new(path: impl Into<String>, switch: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            switch: switch.into(),
        }
    }
}

#[async_trait]
impl RuleBackend for OpenClash {
    fn variant(&self) -> BackendVariant {
        BackendVariant::OpenClash
    }

    async fn fetch(&self, runner: &dyn CommandRunner) -> Result<Fetched, StoreError> {
        let master_enabled = read_flag(runner, &self.switch).await?;
        let raw = runner
            .run(&format!("cat {} 2>/dev/null", shell_quote(&self.path)))
            .await?;
        let decoded = list_file::decode(&raw)?;
        debug!(
            path = %self.path,
            rules = decoded.rules.len(),
            faults = decoded.faults.len(),
            "list file decoded"
        );

        Ok(Fetched {
            rules: decoded.rules,
            faults: decoded.faults,
            master_enabled,
            baseline: Baseline::Text(raw),
        })
    }

    async fn write(
        &self,
        runner: &dyn CommandRunner,
        baseline: &Baseline,
        rules: &[Rule],
    ) -> Result<Baseline, StoreError> {
        let Baseline::Text(original) = baseline else {
            return Err(StoreError::Decode(
                "list file baseline missing; reload first".into(),
            ));
        };

        let text = list_file::encode(rules, original);
        run_acked(
            runner,
            &format!(
                "printf '%s' {} > {}",
                shell_quote(&text),
                shell_quote(&self.path)
            ),
        )
        .await?;
        Ok(Baseline::Text(text))
    }

    async fn set_master(
        &self,
        runner: &dyn CommandRunner,
        enabled: bool,
    ) -> Result<(), StoreError> {
        write_flag(runner, &self.switch, enabled).await
    }
}
