//! `config_version` migration chain.
//!
//! Generalizes the teacher's single fixed-schema `WellConfig::load()` into a
//! chain of version-to-version steps. Each step takes the raw JSON of the
//! version it accepts and returns the JSON of `version + 1`, filling in new
//! defaults and renaming/removing fields that changed shape. Config files
//! older than `CURRENT_CONFIG_VERSION` run through every remaining step in
//! order; files already current skip the chain entirely.

use serde_json::Value;

use super::defaults::CURRENT_CONFIG_VERSION;
use super::ConfigError;

type MigrationFn = fn(Value) -> Result<Value, ConfigError>;

const CHAIN: &[(u32, MigrationFn)] = &[(1, migrate_v1_to_v2)];

/// Runs `raw` through every migration step needed to reach
/// [`CURRENT_CONFIG_VERSION`], starting from the `config_version` field
/// already present in `raw` (missing/absent is treated as version 1).
pub fn migrate(mut raw: Value) -> Result<Value, ConfigError> {
    let mut version = raw
        .get("config_version")
        .and_then(Value::as_u64)
        .unwrap_or(1) as u32;

    if version > CURRENT_CONFIG_VERSION {
        return Err(ConfigError::FutureVersion {
            found: version,
            supported: CURRENT_CONFIG_VERSION,
        });
    }

    while version < CURRENT_CONFIG_VERSION {
        let Some((_, step)) = CHAIN.iter().find(|(from, _)| *from == version) else {
            return Err(ConfigError::NoMigrationPath { from: version });
        };
        raw = step(raw)?;
        version += 1;
    }

    Ok(raw)
}

/// v1 had no `regional_filter` group and used a flat `notify_targets` list
/// instead of the `apprise_targets`/`webhook_targets` maps; this step
/// introduces both without touching anything else the caller already set.
fn migrate_v1_to_v2(mut raw: Value) -> Result<Value, ConfigError> {
    let obj = raw
        .as_object_mut()
        .ok_or_else(|| ConfigError::Malformed("top-level config is not a mapping".to_string()))?;

    if let Some(notifications) = obj.get_mut("notifications").and_then(Value::as_object_mut) {
        if let Some(Value::Array(targets)) = notifications.remove("notify_targets") {
            let mut webhook_targets = serde_json::Map::new();
            for (i, target) in targets.into_iter().enumerate() {
                if let Some(url) = target.as_str() {
                    webhook_targets.insert(format!("legacy_{i}"), Value::String(url.to_string()));
                }
            }
            notifications
                .entry("webhook_targets")
                .or_insert(Value::Object(webhook_targets));
        }
    }

    obj.entry("regional_filter")
        .or_insert_with(|| Value::Object(serde_json::Map::new()));
    obj.insert("config_version".to_string(), Value::from(2));

    Ok(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn v1_config_migrates_to_current_version() {
        let v1 = json!({
            "config_version": 1,
            "location": {"latitude": 51.5, "longitude": -0.1, "timezone": "Europe/London", "language": "en", "species_display_mode": "full"},
            "notifications": {
                "notify_targets": ["https://example.com/hook"],
            },
        });

        let migrated = migrate(v1).unwrap();
        assert_eq!(migrated["config_version"], json!(2));
        assert!(migrated["regional_filter"].is_object());
        assert_eq!(
            migrated["notifications"]["webhook_targets"]["legacy_0"],
            json!("https://example.com/hook")
        );
    }

    #[test]
    fn current_version_passes_through_unchanged() {
        let v2 = json!({"config_version": CURRENT_CONFIG_VERSION, "location": {}});
        let migrated = migrate(v2.clone()).unwrap();
        assert_eq!(migrated, v2);
    }

    #[test]
    fn future_version_is_rejected() {
        let from_the_future = json!({"config_version": CURRENT_CONFIG_VERSION + 1});
        assert!(matches!(
            migrate(from_the_future),
            Err(ConfigError::FutureVersion { .. })
        ));
    }
}
