//! Configuration loading and the process-wide config handle.
//!
//! Mirrors the teacher's `config::init`/`config::get` `OnceLock` pattern:
//! each binary loads and validates a [`CorvidConfig`] once at startup and
//! stores it behind a global, after which every subsystem reads it with
//! [`get`] rather than threading a reference through every call site.

mod defaults;
mod migrations;
mod schema;

pub use schema::{
    AudioConfig, CorvidConfig, LocationConfig, MqttConfig, ModelConfig, NotificationFrequency,
    NotificationRule, NotificationScope, NotificationService, NotificationWhen,
    NotificationsConfig, RegionalDetectionMode, RegionalFilterConfig, RegionalStrictness,
    SpeciesDisplayMode, TaxaFilter, UpdatesConfig,
};

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use thiserror::Error;

static CONFIG: OnceLock<CorvidConfig> = OnceLock::new();

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config YAML: {0}")]
    Parse(#[from] serde_yml::Error),
    #[error("config declares version {found}, which is newer than the {supported} this build understands")]
    FutureVersion { found: u32, supported: u32 },
    #[error("no migration registered for config_version {from}")]
    NoMigrationPath { from: u32 },
    #[error("config is malformed: {0}")]
    Malformed(String),
    #[error("config validation failed, offending keys: {0:?}")]
    UnknownKeys(Vec<String>),
    #[error("config has not been initialized; call config::init() at startup")]
    Uninitialized,
}

impl CorvidConfig {
    /// Loads `path` (falling back to `$CORVID_CONFIG`, then `./config.yaml`),
    /// running it through the migration chain before deserializing into the
    /// current schema.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path);
        let raw_text = std::fs::read_to_string(&resolved).map_err(|source| ConfigError::Read {
            path: resolved.clone(),
            source,
        })?;

        let raw_value: serde_json::Value = serde_yml::from_str(&raw_text)?;
        let migrated = migrations::migrate(raw_value)?;
        let config: CorvidConfig = serde_json::from_value(migrated)
            .map_err(|e| ConfigError::Malformed(e.to_string()))?;

        Ok(config)
    }
}

fn resolve_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }
    if let Ok(env_path) = std::env::var("CORVID_CONFIG") {
        return PathBuf::from(env_path);
    }
    PathBuf::from("config.yaml")
}

/// Installs `config` as the process-wide configuration. Intended to be
/// called exactly once, early in each binary's `main`.
pub fn init(config: CorvidConfig) {
    if CONFIG.set(config).is_err() {
        tracing::warn!("config::init called more than once; ignoring subsequent call");
    }
}

/// Returns the process-wide configuration.
///
/// # Panics
///
/// Panics if [`init`] has not been called yet. A missing config at the
/// point subsystems start reading it is a startup-sequencing bug, not a
/// recoverable runtime condition.
pub fn get() -> &'static CorvidConfig {
    CONFIG.get().expect("config::init must run before config::get")
}

/// Fallible variant of [`get`] for call sites that can defer rather than
/// panic (e.g. a health-check handler probed before startup completes).
pub fn try_get() -> Result<&'static CorvidConfig, ConfigError> {
    CONFIG.get().ok_or(ConfigError::Uninitialized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn load_parses_minimal_v2_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
config_version: 2
location:
  latitude: 45.5
  longitude: -122.6
  timezone: America/Los_Angeles
  language: en
  species_display_mode: full
model:
  model: BirdNET_GLOBAL_6K_V2.4_Model
"#
        )
        .unwrap();

        let config = CorvidConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.location.latitude, 45.5);
        assert_eq!(config.model.species_confidence_threshold, 0.03);
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = CorvidConfig::load(Some(Path::new("/nonexistent/config.yaml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
