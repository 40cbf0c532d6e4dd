//! Configuration data model: defaults, validation, and the TOML profile
//! overlay. Grounded in `services/config.rs`; hierarchical loading/merging
//! itself lives in `infrastructure::config_loader`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced while validating a loaded `Config`.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A required field was present but empty/zero where that is invalid.
    #[error("invalid config field {field}: {reason}")]
    InvalidField {
        /// Dotted field path, e.g. `daemon_poll_interval`.
        field: &'static str,
        /// Human-readable reason.
        reason: String,
    },

    /// The config file on disk could not be parsed as JSON.
    #[error("failed to parse config json: {0}")]
    Json(#[from] serde_json::Error),

    /// The TOML overlay file could not be parsed.
    #[error("failed to parse config toml overlay: {0}")]
    Toml(#[from] toml::de::Error),

    /// Hierarchical merge (figment) failed.
    #[error("config merge failed: {0}")]
    Merge(String),
}

/// Per-role agent program profile, from the optional `[agents.*]` TOML table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentProfile {
    /// Program binary name or path for this role.
    pub program: String,
    /// Extra CLI flags passed on `Start`.
    #[serde(default)]
    pub flags: Vec<String>,
    /// Whether this role is currently selectable by the supervisor.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

const fn default_true() -> bool {
    true
}

/// The orchestrator's persisted configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Default agent program preference list, most-preferred first.
    pub default_program: String,
    /// Operator-level flag authorizing auto-response to confirmation prompts.
    pub auto_yes: bool,
    /// Polling loop cadence in milliseconds.
    pub daemon_poll_interval: u64,
    /// Branch name prefix; defaults to `<username>/` at load time if unset.
    pub branch_prefix: String,
    /// Whether `Running -> Ready` transitions should be surfaced to the
    /// operator as notifications.
    pub notifications_enabled: bool,
    /// Whether anonymous usage telemetry is enabled. Out of the core's
    /// scope to implement, but the field round-trips for the external
    /// telemetry collaborator.
    pub telemetry_enabled: bool,
    /// Whether the startup banner animates.
    pub animate_banner: bool,
    /// TOML-overlay-only: phase name -> role mapping.
    #[serde(default)]
    pub phases: HashMap<String, String>,
    /// TOML-overlay-only: per-role agent profiles.
    #[serde(default)]
    pub agents: HashMap<String, AgentProfile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_program: String::new(),
            auto_yes: false,
            daemon_poll_interval: 1000,
            branch_prefix: String::new(),
            notifications_enabled: true,
            telemetry_enabled: true,
            animate_banner: true,
            phases: HashMap::new(),
            agents: HashMap::new(),
        }
    }
}

impl Config {
    /// Validate invariants not expressible in the type alone.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.daemon_poll_interval == 0 {
            return Err(ConfigError::InvalidField {
                field: "daemon_poll_interval",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// Fill in `branch_prefix` from the OS username when left unset.
    pub fn with_username_fallback(mut self, username: &str) -> Self {
        if self.branch_prefix.is_empty() {
            self.branch_prefix = format!("{username}/");
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn zero_poll_interval_is_rejected() {
        let cfg = Config { daemon_poll_interval: 0, ..Config::default() };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn username_fallback_only_applies_when_unset() {
        let cfg = Config::default().with_username_fallback("ada");
        assert_eq!(cfg.branch_prefix, "ada/");

        let cfg = Config { branch_prefix: "custom/".to_string(), ..Config::default() }.with_username_fallback("ada");
        assert_eq!(cfg.branch_prefix, "custom/");
    }
}
