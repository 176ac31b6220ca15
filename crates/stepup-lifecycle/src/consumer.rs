use stepup_core::{UpgradeRegistry, VersionMap};

use crate::Phase;

/// Component that contributes upgrade steps when a phase is prepared.
///
/// Implementations compare against `versions` and register only the steps a
/// member still needs, so re-running a phase is a no-op.
pub trait UpgradeConsumer {
    fn name(&self) -> &str;

    fn prepare(&mut self, phase: Phase, versions: &VersionMap, registry: &mut UpgradeRegistry);
}
