//! Single-instance lock next to the ban file.
//!
//! Two daemons reconciling the same file would fight over it, so `run`
//! takes an advisory lock before starting.

use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Lock file path for a given ban file: `<ban_file>.lock`.
pub fn lock_path_for(ban_file: &Path) -> PathBuf {
    let mut name = ban_file
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "bansync".into());
    name.push(".lock");
    ban_file.with_file_name(name)
}

/// Holds an exclusive lock until dropped.
#[derive(Debug)]
pub struct LockGuard {
    _file: File,
    path: PathBuf,
}

impl LockGuard {
    /// Take the lock without blocking. Fails if another instance holds it.
    pub fn acquire(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        // create+read+write without truncate: no window between create and lock
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .with_context(|| format!("Failed to open lock file: {}", path.display()))?;

        fs::set_permissions(path, fs::Permissions::from_mode(0o600))
            .context("Failed to set lock file permissions")?;

        file.try_lock_exclusive().map_err(|_| {
            anyhow::anyhow!(
                "Another instance of bansync is already syncing this file.\n\
                 If you believe this is an error, remove the lock file: {}",
                path.display()
            )
        })?;

        Ok(Self {
            _file: file,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
