//! Planner configuration.
//!
//! Settings come from an optional YAML config file with CLI flags layered
//! on top. The backup directory falls back to `$AXION_BACKUP_DIR`, then
//! `~/.config/axion/backups`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Deserialize;

pub const BACKUP_DIR_ENV: &str = "AXION_BACKUP_DIR";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Agent API endpoint, e.g. `https://host:8080`.
    pub endpoint: String,
    pub enable_backups: bool,
    pub backup_dir: Option<PathBuf>,
    /// Reserved for the future parallel scheduler.
    pub concurrency: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8080".into(),
            enable_backups: false,
            backup_dir: None,
            concurrency: 1,
        }
    }
}

impl Config {
    /// Loads the config file when one is given; defaults otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        serde_yaml::from_str(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }

    pub fn resolved_backup_dir(&self) -> PathBuf {
        self.backup_dir.clone().unwrap_or_else(default_backup_dir)
    }
}

pub fn default_backup_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(BACKUP_DIR_ENV)
        && !dir.is_empty()
    {
        return PathBuf::from(dir);
    }
    match dirs::home_dir() {
        Some(home) => home.join(".config").join("axion").join("backups"),
        None => PathBuf::from("/tmp/axionctl/backups"),
    }
}

/// The backup directory must exist (it is created on demand) and be
/// writable; a quick probe file catches read-only mounts up front.
pub fn validate_backup_dir(path: &Path) -> Result<()> {
    if path.as_os_str().is_empty() {
        bail!("backup directory is empty");
    }

    match std::fs::metadata(path) {
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            std::fs::create_dir_all(path).with_context(|| {
                format!(
                    "backup directory {} does not exist and could not be created",
                    path.display()
                )
            })?;
            return Ok(());
        }
        Err(err) => {
            return Err(err)
                .with_context(|| format!("cannot access backup directory {}", path.display()));
        }
        Ok(info) if !info.is_dir() => {
            bail!("backup path {} is not a directory", path.display());
        }
        Ok(_) => {}
    }

    let probe = path.join(".axionctl_write_test");
    std::fs::write(&probe, b"")
        .with_context(|| format!("backup directory {} is not writable", path.display()))?;
    let _ = std::fs::remove_file(&probe);
    Ok(())
}
