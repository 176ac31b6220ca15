use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use stepup_core::PersistedVersionStore;

use crate::{parse_version_state_file, validate_members, RunLock, VersionStateFile};

/// Keeps the version map in `<state_root>/versions.toml`.
#[derive(Debug, Clone)]
pub struct FileVersionStore {
    pub(crate) state_root: PathBuf,
}

impl FileVersionStore {
    pub fn new(state_root: impl Into<PathBuf>) -> Self {
        Self {
            state_root: state_root.into(),
        }
    }

    pub fn state_root(&self) -> &Path {
        &self.state_root
    }

    pub fn versions_file_path(&self) -> PathBuf {
        self.state_root.join("versions.toml")
    }

    pub fn lock_file_path(&self) -> PathBuf {
        self.state_root.join("versions.lock")
    }

    /// Claims exclusive use of this store for one upgrade run.
    pub fn lock(&self) -> Result<RunLock> {
        RunLock::acquire(self.lock_file_path())
    }

    fn load_state(&self) -> Result<VersionStateFile> {
        let path = self.versions_file_path();
        if !path.exists() {
            return Ok(VersionStateFile::default());
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("failed reading upgrade state: {}", path.display()))?;
        parse_version_state_file(&content)
            .with_context(|| format!("failed parsing upgrade state: {}", path.display()))
    }

    fn save_state(&self, state: &VersionStateFile) -> Result<()> {
        fs::create_dir_all(&self.state_root).with_context(|| {
            format!(
                "failed creating upgrade state root: {}",
                self.state_root.display()
            )
        })?;

        let path = self.versions_file_path();
        let content = toml::to_string(state)
            .with_context(|| format!("failed serializing upgrade state: {}", path.display()))?;

        let mut staged = tempfile::NamedTempFile::new_in(&self.state_root).with_context(|| {
            format!(
                "failed staging upgrade state in {}",
                self.state_root.display()
            )
        })?;
        staged
            .write_all(content.as_bytes())
            .with_context(|| format!("failed writing upgrade state: {}", path.display()))?;
        staged
            .persist(&path)
            .map_err(|err| err.error)
            .with_context(|| format!("failed replacing upgrade state: {}", path.display()))?;
        tracing::trace!(path = %path.display(), "upgrade state saved");
        Ok(())
    }
}

impl PersistedVersionStore for FileVersionStore {
    fn load(&self) -> Result<BTreeMap<String, String>> {
        Ok(self.load_state()?.members)
    }

    fn save(&mut self, versions: &BTreeMap<String, String>) -> Result<()> {
        validate_members(versions)?;
        self.save_state(&VersionStateFile {
            members: versions.clone(),
            ..VersionStateFile::default()
        })
    }
}
