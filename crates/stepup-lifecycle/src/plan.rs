use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use stepup_core::{RunOptions, UpgradeRegistry, Version, VersionMap};

use crate::{CommandStep, Phase, UpgradeConsumer};

/// Declarative list of command-backed upgrade steps.
///
/// ```toml
/// version = 1
///
/// [options]
/// failure_scope = "isolate-member"
///
/// [[steps]]
/// member = "core"
/// version = "2500"
/// phase = "critical"
/// command = ["./migrations/core-2500.sh"]
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct StepPlan {
    #[serde(default = "plan_file_version")]
    pub version: u32,
    #[serde(default)]
    pub options: RunOptions,
    #[serde(default)]
    pub steps: Vec<PlannedCommand>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PlannedCommand {
    pub member: String,
    pub version: Version,
    #[serde(default)]
    pub phase: Phase,
    pub command: Vec<String>,
}

impl StepPlan {
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let plan: Self = toml::from_str(input).context("failed to parse upgrade plan")?;
        let expected = plan_file_version();
        if plan.version != expected {
            return Err(anyhow!(
                "unsupported upgrade plan version {} (expected {})",
                plan.version,
                expected
            ));
        }

        for (index, step) in plan.steps.iter().enumerate() {
            if step.member.trim().is_empty() {
                return Err(anyhow!("plan step {} has an empty member", index + 1));
            }
            if step.command.first().map_or(true, |program| program.trim().is_empty()) {
                return Err(anyhow!(
                    "plan step {} ({}@{}) has an empty command",
                    index + 1,
                    step.member,
                    step.version
                ));
            }
        }

        Ok(plan)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed reading upgrade plan: {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("failed loading upgrade plan: {}", path.display()))
    }

    pub fn steps_for(&self, phase: Phase) -> impl Iterator<Item = &PlannedCommand> {
        self.steps.iter().filter(move |step| step.phase == phase)
    }
}

fn plan_file_version() -> u32 {
    1
}

/// Registers plan steps that are still ahead of each member's current version.
#[derive(Debug, Clone)]
pub struct PlanConsumer {
    name: String,
    steps: Vec<PlannedCommand>,
}

impl PlanConsumer {
    pub fn new(name: impl Into<String>, plan: &StepPlan) -> Self {
        Self {
            name: name.into(),
            steps: plan.steps.clone(),
        }
    }

    /// Steps that `prepare` would register for `phase`, in plan order.
    pub fn pending<'a>(
        &'a self,
        phase: Phase,
        versions: &'a VersionMap,
    ) -> impl Iterator<Item = &'a PlannedCommand> + 'a {
        self.steps.iter().filter(move |step| {
            step.phase == phase
                && versions.needs_upgrade(&step.member, &step.version)
        })
    }
}

impl UpgradeConsumer for PlanConsumer {
    fn name(&self) -> &str {
        &self.name
    }

    fn prepare(&mut self, phase: Phase, versions: &VersionMap, registry: &mut UpgradeRegistry) {
        for step in self.pending(phase, versions) {
            match CommandStep::new(&step.member, &step.command) {
                Ok(callback) => {
                    registry.register(step.member.clone(), step.version.clone(), callback)
                }
                Err(err) => {
                    tracing::warn!(member = %step.member, version = %step.version, error = %err, "skipping plan step");
                }
            }
        }
    }
}
