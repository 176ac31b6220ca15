use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};

/// Exclusive marker held for the duration of an upgrade run.
///
/// Two processes sharing a store must not run upgrades at the same time; the
/// marker is created with create-new semantics and removed on drop.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
    released: bool,
}

impl RunLock {
    pub(crate) fn acquire(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let mut file = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                let detail = read_lock_owner(&path)
                    .map(|owner| format!(" (pid={owner})"))
                    .unwrap_or_default();
                return Err(anyhow!(
                    "upgrade lock already held{detail}: remove {} if no upgrade is running",
                    path.display()
                ));
            }
            Err(err) => {
                return Err(err).with_context(|| {
                    format!("failed to claim upgrade lock: {}", path.display())
                });
            }
        };

        let lock = Self {
            path,
            released: false,
        };
        file.write_all(format!("{}\n", std::process::id()).as_bytes())
            .and_then(|()| file.flush())
            .with_context(|| format!("failed to write upgrade lock: {}", lock.path.display()))?;
        Ok(lock)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn release(mut self) -> Result<()> {
        self.released = true;
        fs::remove_file(&self.path)
            .with_context(|| format!("failed to release upgrade lock: {}", self.path.display()))
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(err) = fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %err, "failed to release upgrade lock");
        }
    }
}

fn read_lock_owner(path: &Path) -> Option<String> {
    let raw = fs::read_to_string(path).ok()?;
    let owner = raw.trim();
    (!owner.is_empty()).then(|| owner.to_string())
}
