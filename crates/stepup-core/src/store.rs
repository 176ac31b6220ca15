use std::collections::BTreeMap;

use anyhow::Result;

/// Backing store for the member → version map.
///
/// The whole map is written on every save; implementations decide the format.
pub trait PersistedVersionStore {
    fn load(&self) -> Result<BTreeMap<String, String>>;

    /// Persists the full map. An `Err` means the write was rejected.
    fn save(&mut self, versions: &BTreeMap<String, String>) -> Result<()>;
}

impl<S: PersistedVersionStore + ?Sized> PersistedVersionStore for &mut S {
    fn load(&self) -> Result<BTreeMap<String, String>> {
        (**self).load()
    }

    fn save(&mut self, versions: &BTreeMap<String, String>) -> Result<()> {
        (**self).save(versions)
    }
}

impl<S: PersistedVersionStore + ?Sized> PersistedVersionStore for Box<S> {
    fn load(&self) -> Result<BTreeMap<String, String>> {
        (**self).load()
    }

    fn save(&mut self, versions: &BTreeMap<String, String>) -> Result<()> {
        (**self).save(versions)
    }
}

/// In-process store that keeps every saved map in write order.
#[derive(Debug, Clone, Default)]
pub struct MemoryVersionStore {
    current: BTreeMap<String, String>,
    writes: Vec<BTreeMap<String, String>>,
}

impl MemoryVersionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_versions<I, K, V>(versions: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            current: versions
                .into_iter()
                .map(|(member, version)| (member.into(), version.into()))
                .collect(),
            writes: Vec::new(),
        }
    }

    pub fn current(&self) -> &BTreeMap<String, String> {
        &self.current
    }

    pub fn writes(&self) -> &[BTreeMap<String, String>] {
        &self.writes
    }
}

impl PersistedVersionStore for MemoryVersionStore {
    fn load(&self) -> Result<BTreeMap<String, String>> {
        Ok(self.current.clone())
    }

    fn save(&mut self, versions: &BTreeMap<String, String>) -> Result<()> {
        self.current = versions.clone();
        self.writes.push(versions.clone());
        Ok(())
    }
}
