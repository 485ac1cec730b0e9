//! Init command implementation.

use anyhow::{bail, Context, Result};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use tracing::info;

use crate::config::Config;
use crate::fs_abstraction::{real_fs, FileSystem};

/// Write the default configuration template to `config_path`.
pub fn run(config_path: &Path, force: bool) -> Result<()> {
    write_template(real_fs(), config_path, force)?;
    info!("Configuration written to {}", config_path.display());
    println!("Edit {} and set the database URL before running `bansync run`.", config_path.display());
    Ok(())
}

fn write_template(fs: &dyn FileSystem, config_path: &Path, force: bool) -> Result<()> {
    if fs.exists(config_path) && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            config_path.display()
        );
    }

    if let Some(parent) = config_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs.create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    fs.replace(config_path, Config::generate_default_yaml().as_bytes())
        .with_context(|| format!("Failed to write {}", config_path.display()))?;

    // May hold credentials once edited
    fs::set_permissions(config_path, fs::Permissions::from_mode(0o600))
        .context("Failed to set config file permissions")?;
    Ok(())
}
