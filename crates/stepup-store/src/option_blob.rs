use std::collections::BTreeMap;

use anyhow::{Context, Result};
use serde_json::Value;
use stepup_core::PersistedVersionStore;

/// Option key the version map is stored under unless configured otherwise.
pub const DEFAULT_OPTION_KEY: &str = "stepup_versions";

/// String key-value table, such as a host application's options storage.
pub trait KeyValueBackend {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&mut self, key: &str, value: &str) -> Result<()>;
}

#[derive(Debug, Clone, Default)]
pub struct MemoryKeyValue {
    entries: BTreeMap<String, String>,
}

impl MemoryKeyValue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &BTreeMap<String, String> {
        &self.entries
    }
}

impl KeyValueBackend for MemoryKeyValue {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Stores the whole version map as one JSON object under a single option key.
#[derive(Debug, Clone)]
pub struct OptionBlobStore<B> {
    backend: B,
    key: String,
}

impl<B: KeyValueBackend> OptionBlobStore<B> {
    pub fn new(backend: B) -> Self {
        Self::with_key(backend, DEFAULT_OPTION_KEY)
    }

    pub fn with_key(backend: B, key: impl Into<String>) -> Self {
        Self {
            backend,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn into_backend(self) -> B {
        self.backend
    }
}

impl<B: KeyValueBackend> PersistedVersionStore for OptionBlobStore<B> {
    fn load(&self) -> Result<BTreeMap<String, String>> {
        let raw = self
            .backend
            .get(&self.key)
            .with_context(|| format!("failed reading option '{}'", self.key))?;
        let Some(raw) = raw.filter(|raw| !raw.trim().is_empty()) else {
            return Ok(BTreeMap::new());
        };

        let parsed: BTreeMap<String, Value> = serde_json::from_str(&raw)
            .with_context(|| format!("option '{}' does not hold a version map", self.key))?;
        let mut versions = BTreeMap::new();
        for (member, value) in parsed {
            let version = match value {
                Value::String(version) => version,
                Value::Number(version) => version.to_string(),
                other => anyhow::bail!(
                    "option '{}' holds non-version value {other} for member '{member}'",
                    self.key
                ),
            };
            versions.insert(member, version);
        }
        Ok(versions)
    }

    fn save(&mut self, versions: &BTreeMap<String, String>) -> Result<()> {
        let blob = serde_json::to_string(versions)
            .with_context(|| format!("failed serializing option '{}'", self.key))?;
        self.backend
            .set(&self.key, &blob)
            .with_context(|| format!("failed writing option '{}'", self.key))
    }
}
