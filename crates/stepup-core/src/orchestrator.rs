use std::collections::HashSet;
use std::ops::ControlFlow;

use serde::{Deserialize, Serialize};

use crate::{
    Halt, HaltReason, PersistedVersionStore, PlannedStep, ResourceProbe, RunReport, StepOutcome,
    StepStatus, UpgradePlan, UpgradeRegistry, VersionMap, DEFAULT_MIN_HEADROOM_BYTES,
};

/// What a step or persistence failure stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureScope {
    /// Stop the whole run, including unrelated members.
    #[default]
    HaltRun,
    /// Stop the failing member only.
    IsolateMember,
}

/// How often the version map is written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WriteMode {
    /// One write per successful callback.
    #[default]
    PerCallback,
    /// One write per (member, version) group, after all of its callbacks succeed.
    PerVersion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunOptions {
    pub min_headroom_bytes: u64,
    pub failure_scope: FailureScope,
    pub write_mode: WriteMode,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            min_headroom_bytes: DEFAULT_MIN_HEADROOM_BYTES,
            failure_scope: FailureScope::default(),
            write_mode: WriteMode::default(),
        }
    }
}

/// Runs finalized upgrade plans against a version map and its store.
#[derive(Debug, Clone, Default)]
pub struct Orchestrator {
    options: RunOptions,
}

impl Orchestrator {
    pub fn new(options: RunOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    pub fn run<S, P>(
        &self,
        registry: UpgradeRegistry,
        versions: &mut VersionMap,
        store: &mut S,
        probe: &P,
    ) -> RunReport
    where
        S: PersistedVersionStore + ?Sized,
        P: ResourceProbe + ?Sized,
    {
        self.run_plan(registry.finalize(), versions, store, probe)
    }

    pub fn run_plan<S, P>(
        &self,
        plan: UpgradePlan,
        versions: &mut VersionMap,
        store: &mut S,
        probe: &P,
    ) -> RunReport
    where
        S: PersistedVersionStore + ?Sized,
        P: ResourceProbe + ?Sized,
    {
        let _span = tracing::debug_span!("upgrade_run", steps = plan.len()).entered();

        let mut report = RunReport::default();
        let mut blocked: HashSet<String> = HashSet::new();
        let mut steps = plan.into_steps().peekable();

        while let Some(step) = steps.next() {
            let PlannedStep {
                member,
                version,
                position,
                mut callback,
            } = step;
            if blocked.contains(&member) {
                continue;
            }

            if let Err(err) = callback.run(&version) {
                let error = format!("{err:#}");
                tracing::warn!(
                    member = %member,
                    version = %version,
                    position,
                    error = %error,
                    "upgrade step failed"
                );
                report.outcomes.push(StepOutcome {
                    member: member.clone(),
                    version: version.clone(),
                    position,
                    status: StepStatus::Failed,
                });
                let halt = Halt {
                    member,
                    version,
                    reason: HaltReason::StepFailed { error },
                };
                match self.stop(&mut report, &mut blocked, halt) {
                    ControlFlow::Break(()) => break,
                    ControlFlow::Continue(()) => continue,
                }
            }

            let closes_group = steps
                .peek()
                .map_or(true, |next| next.member != member || next.version != version);
            if self.options.write_mode == WriteMode::PerVersion && !closes_group {
                report.outcomes.push(StepOutcome {
                    member,
                    version,
                    position,
                    status: StepStatus::Pending,
                });
                continue;
            }

            let prior = versions.commit(&member, &version);
            if let Err(err) = store.save(&versions.to_store_map()) {
                versions.restore(&member, prior);
                let error = format!("{err:#}");
                tracing::warn!(
                    member = %member,
                    version = %version,
                    error = %error,
                    "failed persisting upgraded version"
                );
                report.outcomes.push(StepOutcome {
                    member: member.clone(),
                    version: version.clone(),
                    position,
                    status: StepStatus::PersistFailed,
                });
                let halt = Halt {
                    member,
                    version,
                    reason: HaltReason::PersistFailed { error },
                };
                match self.stop(&mut report, &mut blocked, halt) {
                    ControlFlow::Break(()) => break,
                    ControlFlow::Continue(()) => continue,
                }
            }

            tracing::debug!(
                member = %member,
                version = %version,
                position,
                "upgrade step committed"
            );
            report.outcomes.push(StepOutcome {
                member: member.clone(),
                version: version.clone(),
                position,
                status: StepStatus::Committed,
            });

            if !probe.has_headroom(self.options.min_headroom_bytes) {
                tracing::warn!(
                    member = %member,
                    version = %version,
                    min_bytes = self.options.min_headroom_bytes,
                    "upgrade run halted: insufficient headroom"
                );
                report.halt = Some(Halt {
                    member,
                    version,
                    reason: HaltReason::ResourceExhausted {
                        min_bytes: self.options.min_headroom_bytes,
                    },
                });
                break;
            }
        }

        report
    }

    fn stop(
        &self,
        report: &mut RunReport,
        blocked: &mut HashSet<String>,
        halt: Halt,
    ) -> ControlFlow<()> {
        match self.options.failure_scope {
            FailureScope::HaltRun => {
                report.halt = Some(halt);
                ControlFlow::Break(())
            }
            FailureScope::IsolateMember => {
                blocked.insert(halt.member.clone());
                report.blocked.push(halt);
                ControlFlow::Continue(())
            }
        }
    }
}
