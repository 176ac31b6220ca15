mod orchestrator;
mod registry;
mod report;
mod resource;
mod store;
mod version;
mod version_map;

pub use orchestrator::{FailureScope, Orchestrator, RunOptions, WriteMode};
pub use registry::{step_fn, PlannedStep, StepCallback, UpgradePlan, UpgradeRegistry};
pub use report::{Halt, HaltReason, RunReport, StepOutcome, StepStatus};
pub use resource::{
    FixedHeadroom, ResourceProbe, SystemMemoryProbe, Unlimited, DEFAULT_MIN_HEADROOM_BYTES,
};
pub use store::{MemoryVersionStore, PersistedVersionStore};
pub use version::Version;
pub use version_map::VersionMap;
