mod command_step;
mod consumer;
mod host;
mod phase;
mod plan;

pub use command_step::CommandStep;
pub use consumer::UpgradeConsumer;
pub use host::{PhaseReport, UpgradeHost};
pub use phase::{HostContext, Phase};
pub use plan::{PlanConsumer, PlannedCommand, StepPlan};

#[cfg(test)]
mod tests;
