use std::process::Command;

use anyhow::{anyhow, Context, Result};
use stepup_core::{StepCallback, Version};

/// Upgrade step backed by an external command.
///
/// The command receives `STEPUP_MEMBER` and `STEPUP_TARGET_VERSION` in its
/// environment; a non-zero exit is a step failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandStep {
    member: String,
    program: String,
    args: Vec<String>,
}

impl CommandStep {
    pub fn new(member: &str, argv: &[String]) -> Result<Self> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| anyhow!("upgrade command for '{member}' must not be empty"))?;
        Ok(Self {
            member: member.to_string(),
            program: program.clone(),
            args: args.to_vec(),
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl StepCallback for CommandStep {
    fn run(&mut self, target: &Version) -> Result<()> {
        let status = Command::new(&self.program)
            .args(&self.args)
            .env("STEPUP_MEMBER", &self.member)
            .env("STEPUP_TARGET_VERSION", target.as_str())
            .status()
            .with_context(|| format!("failed to launch upgrade command '{}'", self.program))?;
        if !status.success() {
            return Err(anyhow!(
                "upgrade command '{}' exited with {status}",
                self.program
            ));
        }
        Ok(())
    }
}
