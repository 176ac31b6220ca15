use thiserror::Error;

use crate::Version;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    /// Callback succeeded and the advance was persisted.
    Committed,
    /// Callback reported failure.
    Failed,
    /// Callback succeeded but the store rejected the write.
    PersistFailed,
    /// Callback succeeded; the write is deferred to the end of its version group.
    Pending,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Committed => "committed",
            Self::Failed => "failed",
            Self::PersistFailed => "persist-failed",
            Self::Pending => "pending",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome {
    pub member: String,
    /// Target the step ran for.
    pub version: Version,
    pub position: usize,
    pub status: StepStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HaltReason {
    #[error("upgrade step failed: {error}")]
    StepFailed { error: String },
    #[error("failed persisting version: {error}")]
    PersistFailed { error: String },
    #[error("insufficient resource headroom (needed {min_bytes} bytes)")]
    ResourceExhausted { min_bytes: u64 },
}

impl HaltReason {
    pub fn code(&self) -> &'static str {
        match self {
            Self::StepFailed { .. } => "step-failed",
            Self::PersistFailed { .. } => "persist-failed",
            Self::ResourceExhausted { .. } => "resource-exhausted",
        }
    }
}

/// Where a run or a member lane stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Halt {
    pub member: String,
    pub version: Version,
    pub reason: HaltReason,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub outcomes: Vec<StepOutcome>,
    /// Set when the whole run stopped early.
    pub halt: Option<Halt>,
    /// Member lanes stopped while the rest of the run continued.
    pub blocked: Vec<Halt>,
}

impl RunReport {
    pub fn is_complete(&self) -> bool {
        self.halt.is_none() && self.blocked.is_empty()
    }

    /// Number of store writes performed.
    pub fn writes(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.status == StepStatus::Committed)
            .count()
    }

    /// Highest step target committed for `member` during the run.
    ///
    /// This is the target the step ran for. The recorded version can be higher
    /// when a step targeted a version below the one already stored; read the
    /// `VersionMap` for the recorded value.
    pub fn committed(&self, member: &str) -> Option<&Version> {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.member == member && outcome.status == StepStatus::Committed)
            .map(|outcome| &outcome.version)
            .max()
    }
}
