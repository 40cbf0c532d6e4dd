//! Per-user config directory resolution and legacy-name migration.
//!
//! Grounded in `infrastructure/setup.rs`'s `SetupPaths` pattern, adapted from
//! a project-local config directory to the `~/.config/<app>/` layout, using
//! the `dirs` crate for home directory resolution.

use std::path::PathBuf;

use tracing::{info, warn};

use crate::domain::errors::{KasmosError, KasmosResult};

/// Current config directory name.
const CURRENT_DIR_NAME: &str = "kasmos";

/// Directory names used by earlier builds, checked (in order) for migration
/// on first run.
const LEGACY_DIR_NAMES: &[&str] = &["abathur", "swarm-orchestrator"];

/// Resolved config paths for the current user.
#[derive(Debug, Clone)]
pub struct SetupPaths {
    /// `~/.config/kasmos/`.
    pub config_dir: PathBuf,
    /// `<config_dir>/config.json`.
    pub config_file: PathBuf,
    /// `<config_dir>/config.toml`, optional overlay.
    pub config_overlay_file: PathBuf,
    /// `<config_dir>/permissions.db`.
    pub permissions_db_file: PathBuf,
}

impl SetupPaths {
    /// Derive paths from an explicit config directory, bypassing `~/.config/`
    /// resolution and legacy-name migration entirely. Used when the caller
    /// overrides the config directory directly.
    #[must_use]
    pub fn at(config_dir: PathBuf) -> Self {
        Self {
            config_file: config_dir.join("config.json"),
            config_overlay_file: config_dir.join("config.toml"),
            permissions_db_file: config_dir.join("permissions.db"),
            config_dir,
        }
    }

    /// Resolve paths under `~/.config/`, migrating a legacy directory name
    /// if present and the current one is not.
    pub fn resolve() -> KasmosResult<Self> {
        let home = dirs::home_dir().ok_or_else(|| KasmosError::StorageUnavailable("could not resolve home directory".to_string()))?;
        let config_root = home.join(".config");
        let current = config_root.join(CURRENT_DIR_NAME);

        migrate_legacy_dir(&config_root, &current)?;

        Ok(Self {
            config_file: current.join("config.json"),
            config_overlay_file: current.join("config.toml"),
            permissions_db_file: current.join("permissions.db"),
            config_dir: current,
        })
    }

    /// Ensure `config_dir` exists on disk.
    pub async fn ensure_dirs(&self) -> KasmosResult<()> {
        tokio::fs::create_dir_all(&self.config_dir).await?;
        Ok(())
    }
}

/// Migration rule: if neither the current nor any legacy
/// directory exists, do nothing (created later on demand). If a legacy
/// directory exists and the current one does not, rename it. Otherwise
/// (both exist, or current already exists), leave both untouched.
fn migrate_legacy_dir(config_root: &std::path::Path, current: &std::path::Path) -> KasmosResult<()> {
    if current.exists() {
        return Ok(());
    }

    for legacy_name in LEGACY_DIR_NAMES {
        let legacy = config_root.join(legacy_name);
        if legacy.exists() {
            info!(from = %legacy.display(), to = %current.display(), "migrating legacy config directory");
            if let Err(err) = std::fs::rename(&legacy, current) {
                warn!(error = %err, "legacy config directory migration failed, leaving both in place");
            }
            return Ok(());
        }
    }

    Ok(())
}
