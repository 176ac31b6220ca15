use std::collections::BTreeMap;

use anyhow::{Context, Result};
use indexmap::IndexMap;

use crate::{PersistedVersionStore, Version};

/// Member → version state, plus the snapshot taken when it was loaded.
///
/// Only the orchestrator advances entries. A member's recorded version never
/// moves backwards.
#[derive(Debug, Clone, Default)]
pub struct VersionMap {
    previous: IndexMap<String, Version>,
    current: IndexMap<String, Version>,
}

impl VersionMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_versions<I, K, V>(versions: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Version>,
    {
        let current: IndexMap<String, Version> = versions
            .into_iter()
            .map(|(member, version)| (member.into(), version.into()))
            .collect();
        Self {
            previous: current.clone(),
            current,
        }
    }

    pub fn load<S: PersistedVersionStore + ?Sized>(store: &S) -> Result<Self> {
        let raw = store.load().context("failed loading persisted versions")?;
        let mut current = IndexMap::with_capacity(raw.len());
        for (member, value) in raw {
            let version = Version::parse(&value)
                .with_context(|| format!("invalid persisted version for member '{member}'"))?;
            current.insert(member, version);
        }

        Ok(Self {
            previous: current.clone(),
            current,
        })
    }

    /// Version recorded when this map was loaded, `"0"` if unknown.
    pub fn previous_version(&self, member: &str) -> Version {
        self.previous.get(member).cloned().unwrap_or_default()
    }

    /// Live version, including advances committed during the current run.
    pub fn current_version(&self, member: &str) -> Version {
        self.current.get(member).cloned().unwrap_or_default()
    }

    pub fn needs_upgrade(&self, member: &str, target: &Version) -> bool {
        self.current
            .get(member)
            .map_or_else(|| Version::initial() < *target, |current| current < target)
    }

    pub fn members(&self) -> impl Iterator<Item = (&str, &Version)> {
        self.current
            .iter()
            .map(|(member, version)| (member.as_str(), version))
    }

    pub fn len(&self) -> usize {
        self.current.len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_empty()
    }

    pub fn to_store_map(&self) -> BTreeMap<String, String> {
        self.current
            .iter()
            .map(|(member, version)| (member.clone(), version.to_string()))
            .collect()
    }

    /// Advances `member` to `target` and returns the entry it replaced.
    pub(crate) fn commit(&mut self, member: &str, target: &Version) -> Option<Version> {
        let prior = self.current.get(member).cloned();
        let next = match &prior {
            Some(existing) if existing > target => existing.clone(),
            _ => target.clone(),
        };
        self.current.insert(member.to_string(), next);
        prior
    }

    /// Puts back the entry returned by a `commit` whose write was rejected.
    pub(crate) fn restore(&mut self, member: &str, prior: Option<Version>) {
        match prior {
            Some(version) => {
                self.current.insert(member.to_string(), version);
            }
            None => {
                self.current.shift_remove(member);
            }
        }
    }
}
