use std::collections::BTreeMap;
use std::fmt;

use anyhow::{anyhow, Result};
use indexmap::IndexMap;

use crate::Version;

/// Work performed to bring a member up to a target version.
pub trait StepCallback {
    fn run(&mut self, target: &Version) -> Result<()>;
}

impl<F> StepCallback for F
where
    F: FnMut(&Version) -> Result<()>,
{
    fn run(&mut self, target: &Version) -> Result<()> {
        self(target)
    }
}

/// Adapts a success/failure predicate into a [`StepCallback`].
pub fn step_fn<F>(mut predicate: F) -> impl StepCallback
where
    F: FnMut(&Version) -> bool,
{
    move |target: &Version| {
        if predicate(target) {
            Ok(())
        } else {
            Err(anyhow!("step reported failure"))
        }
    }
}

type BoxedCallback = Box<dyn StepCallback>;

/// Collects upgrade steps while consumers prepare a phase.
///
/// Members keep their first-registration order, versions are sorted per
/// member, and callbacks sharing a (member, version) keep registration order.
#[derive(Default)]
pub struct UpgradeRegistry {
    members: IndexMap<String, BTreeMap<Version, Vec<BoxedCallback>>>,
    registered: usize,
}

impl UpgradeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<C>(
        &mut self,
        member: impl Into<String>,
        version: impl Into<Version>,
        callback: C,
    ) where
        C: StepCallback + 'static,
    {
        let member = member.into();
        let version = version.into();
        tracing::trace!(member = %member, version = %version, "upgrade step registered");
        self.members
            .entry(member)
            .or_default()
            .entry(version)
            .or_default()
            .push(Box::new(callback));
        self.registered += 1;
    }

    /// Number of registered callbacks.
    pub fn len(&self) -> usize {
        self.registered
    }

    pub fn is_empty(&self) -> bool {
        self.registered == 0
    }

    pub fn finalize(self) -> UpgradePlan {
        UpgradePlan {
            members: self.members,
            steps: self.registered,
        }
    }
}

impl fmt::Debug for UpgradeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpgradeRegistry")
            .field("members", &self.members.len())
            .field("registered", &self.registered)
            .finish()
    }
}

/// Finalized, ordered set of steps. Consumed once by the orchestrator.
pub struct UpgradePlan {
    members: IndexMap<String, BTreeMap<Version, Vec<BoxedCallback>>>,
    steps: usize,
}

impl UpgradePlan {
    pub fn len(&self) -> usize {
        self.steps
    }

    pub fn is_empty(&self) -> bool {
        self.steps == 0
    }

    /// `(member, version, callback count)` in execution order.
    pub fn summary(&self) -> Vec<(String, Version, usize)> {
        self.members
            .iter()
            .flat_map(|(member, versions)| {
                versions.iter().map(move |(version, callbacks)| {
                    (member.clone(), version.clone(), callbacks.len())
                })
            })
            .collect()
    }

    /// Flattens the plan into its execution sequence.
    pub fn into_steps(self) -> impl Iterator<Item = PlannedStep> {
        self.members.into_iter().flat_map(|(member, versions)| {
            versions.into_iter().flat_map(move |(version, callbacks)| {
                let member = member.clone();
                callbacks
                    .into_iter()
                    .enumerate()
                    .map(move |(position, callback)| PlannedStep {
                        member: member.clone(),
                        version: version.clone(),
                        position,
                        callback,
                    })
            })
        })
    }
}

impl fmt::Debug for UpgradePlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpgradePlan")
            .field("members", &self.members.len())
            .field("steps", &self.steps)
            .finish()
    }
}

/// One callback from the flattened plan.
pub struct PlannedStep {
    pub member: String,
    pub version: Version,
    /// Index of the callback within its (member, version) group.
    pub position: usize,
    pub callback: Box<dyn StepCallback>,
}

impl fmt::Debug for PlannedStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlannedStep")
            .field("member", &self.member)
            .field("version", &self.version)
            .field("position", &self.position)
            .finish_non_exhaustive()
    }
}
