use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use serde::{Deserialize, Serialize};

/// Point in the host lifecycle at which a prepare → parse cycle runs.
///
/// Variants are declared in firing order.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    /// Fires before the host finishes booting.
    Critical,
    Admin,
    NetworkAdmin,
    #[default]
    Always,
    NetworkAlways,
}

/// What kind of request the host is serving.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HostContext {
    pub admin: bool,
    pub network: bool,
}

impl Phase {
    pub const ALL: [Phase; 5] = [
        Phase::Critical,
        Phase::Admin,
        Phase::NetworkAdmin,
        Phase::Always,
        Phase::NetworkAlways,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::Admin => "admin",
            Self::NetworkAdmin => "network-admin",
            Self::Always => "always",
            Self::NetworkAlways => "network-always",
        }
    }

    pub fn prepare_hook(&self) -> &'static str {
        match self {
            Self::Critical => "prepare-critical",
            Self::Admin => "prepare-admin",
            Self::NetworkAdmin => "prepare-network-admin",
            Self::Always => "prepare-always",
            Self::NetworkAlways => "prepare-network-always",
        }
    }

    pub fn parse_hook(&self) -> &'static str {
        match self {
            Self::Critical => "parse-critical",
            Self::Admin => "parse-admin",
            Self::NetworkAdmin => "parse-network-admin",
            Self::Always => "parse-always",
            Self::NetworkAlways => "parse-network-always",
        }
    }

    pub fn applies_to(&self, context: &HostContext) -> bool {
        match self {
            Self::Critical | Self::Always => true,
            Self::Admin => context.admin,
            Self::NetworkAdmin => context.admin && context.network,
            Self::NetworkAlways => context.network,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|phase| phase.as_str() == value)
            .ok_or_else(|| anyhow!("unknown upgrade phase: '{value}'"))
    }
}
