use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Context, Result};
use stepup_core::{
    Orchestrator, PersistedVersionStore, ResourceProbe, RunOptions, RunReport, UpgradeRegistry,
    Version, VersionMap,
};

use crate::{HostContext, Phase, UpgradeConsumer};

static LIVE_HOSTS: AtomicUsize = AtomicUsize::new(0);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseReport {
    pub phase: Phase,
    /// Callbacks registered during the prepare pass.
    pub registered: usize,
    pub report: RunReport,
}

impl PhaseReport {
    pub fn halted(&self) -> bool {
        !self.report.is_complete()
    }
}

/// The process-wide upgrade orchestrator and everything it runs against.
///
/// Construct one at startup and hand it to the lifecycle driver. A second live
/// instance trips a debug assertion and is logged in release builds.
pub struct UpgradeHost<S, P> {
    store: S,
    probe: P,
    orchestrator: Orchestrator,
    consumers: Vec<Box<dyn UpgradeConsumer>>,
    versions: Option<VersionMap>,
}

impl<S, P> UpgradeHost<S, P>
where
    S: PersistedVersionStore,
    P: ResourceProbe,
{
    pub fn new(store: S, probe: P, options: RunOptions) -> Self {
        let live = LIVE_HOSTS.fetch_add(1, Ordering::SeqCst);
        let host = Self {
            store,
            probe,
            orchestrator: Orchestrator::new(options),
            consumers: Vec::new(),
            versions: None,
        };
        if live > 0 {
            tracing::warn!(live = live + 1, "more than one upgrade host is live in this process");
        }
        debug_assert_eq!(live, 0, "only one upgrade host may be live per process");
        host
    }

    pub fn add_consumer(&mut self, consumer: impl UpgradeConsumer + 'static) {
        self.consumers.push(Box::new(consumer));
    }

    pub fn options(&self) -> &RunOptions {
        self.orchestrator.options()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Version state of the latest phase, loaded on first use.
    pub fn versions(&mut self) -> Result<&VersionMap> {
        if self.versions.is_none() {
            self.versions = Some(VersionMap::load(&self.store)?);
        }
        self.versions
            .as_ref()
            .context("upgrade versions are not loaded")
    }

    pub fn current_version(&mut self, member: &str) -> Result<Version> {
        Ok(self.versions()?.current_version(member))
    }

    pub fn previous_version(&mut self, member: &str) -> Result<Version> {
        Ok(self.versions()?.previous_version(member))
    }

    /// Runs one prepare → parse cycle against freshly loaded state.
    pub fn run_phase(&mut self, phase: Phase) -> Result<PhaseReport> {
        let _span = tracing::info_span!("upgrade_phase", phase = %phase).entered();

        let mut versions = VersionMap::load(&self.store)
            .with_context(|| format!("failed loading upgrade state for phase '{phase}'"))?;
        let mut registry = UpgradeRegistry::new();

        tracing::debug!(
            hook = phase.prepare_hook(),
            consumers = self.consumers.len(),
            "preparing upgrade phase"
        );
        for consumer in &mut self.consumers {
            let before = registry.len();
            consumer.prepare(phase, &versions, &mut registry);
            tracing::trace!(
                consumer = consumer.name(),
                steps = registry.len() - before,
                "consumer prepared"
            );
        }

        let registered = registry.len();
        tracing::debug!(hook = phase.parse_hook(), steps = registered, "running upgrade phase");
        let report = self
            .orchestrator
            .run(registry, &mut versions, &mut self.store, &self.probe);

        if let Some(halt) = &report.halt {
            tracing::warn!(
                member = %halt.member,
                version = %halt.version,
                reason = halt.reason.code(),
                "upgrade phase halted"
            );
        } else if registered > 0 {
            tracing::info!(steps = registered, writes = report.writes(), "upgrade phase finished");
        }

        self.versions = Some(versions);
        Ok(PhaseReport {
            phase,
            registered,
            report,
        })
    }

    /// Runs every phase that applies to `context`, in firing order.
    pub fn run_lifecycle(&mut self, context: &HostContext) -> Result<Vec<PhaseReport>> {
        let mut reports = Vec::new();
        for phase in Phase::ALL {
            if !phase.applies_to(context) {
                continue;
            }
            reports.push(self.run_phase(phase)?);
        }
        Ok(reports)
    }
}

impl<S, P> fmt::Debug for UpgradeHost<S, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpgradeHost")
            .field("orchestrator", &self.orchestrator)
            .field("consumers", &self.consumers.len())
            .field("loaded", &self.versions.is_some())
            .finish_non_exhaustive()
    }
}

impl<S, P> Drop for UpgradeHost<S, P> {
    fn drop(&mut self) {
        LIVE_HOSTS.fetch_sub(1, Ordering::SeqCst);
    }
}
