//! Hierarchical configuration loading: JSON config + optional TOML overlay +
//! environment variables, merged with `figment`.
//!
//! Grounded in `infrastructure/config/loader.rs`'s precedence chain,
//! adapted from an always-project-local YAML config to a per-user
//! JSON-primary + TOML-overlay shape.

use std::path::Path;

use figment::providers::{Env, Format, Json, Serialized, Toml};
use figment::Figment;

use crate::services::config::{Config, ConfigError};

/// Environment variable prefix for config overrides (`KASMOS_FOO__BAR=...`).
pub const ENV_PREFIX: &str = "KASMOS_";

/// Loads `Config` with the following precedence chain:
///
/// 1. Programmatic defaults.
/// 2. `<config_dir>/config.json` (primary; created by first run).
/// 3. `<config_dir>/config.toml` (optional overlay; authoritative for
///    `[phases]`/`[agents.*]` when present).
/// 4. `KASMOS_*` environment variables, `__`-delimited for nested keys.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load and validate configuration rooted at `config_dir`.
    pub fn load(config_dir: &Path) -> Result<Config, ConfigError> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Json::file(config_dir.join("config.json")))
            .merge(Toml::file(config_dir.join("config.toml")))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(|err| ConfigError::Merge(err.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Load from an explicit JSON file, bypassing directory conventions.
    /// Used by tests and by callers pointed at a non-standard config path.
    pub fn load_from_file(path: &Path) -> Result<Config, ConfigError> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Json::file(path))
            .extract()
            .map_err(|err| ConfigError::Merge(err.to_string()))?;

        config.validate()?;
        Ok(config)
    }
}
