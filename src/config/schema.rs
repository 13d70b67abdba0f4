//! The YAML configuration schema (`spec.md` §6).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::defaults;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CorvidConfig {
    pub config_version: u32,
    #[serde(default)]
    pub location: LocationConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub notifications: NotificationsConfig,
    #[serde(default)]
    pub mqtt: MqttConfig,
    #[serde(default)]
    pub updates: UpdatesConfig,
    #[serde(default)]
    pub regional_filter: RegionalFilterConfig,
}

impl Default for CorvidConfig {
    fn default() -> Self {
        Self {
            config_version: defaults::CURRENT_CONFIG_VERSION,
            location: LocationConfig::default(),
            model: ModelConfig::default(),
            audio: AudioConfig::default(),
            notifications: NotificationsConfig::default(),
            mqtt: MqttConfig::default(),
            updates: UpdatesConfig::default(),
            regional_filter: RegionalFilterConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SpeciesDisplayMode {
    Full,
    CommonName,
    ScientificName,
}

impl Default for SpeciesDisplayMode {
    fn default() -> Self {
        Self::Full
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LocationConfig {
    pub latitude: f64,
    pub longitude: f64,
    pub timezone: String,
    pub language: String,
    pub species_display_mode: SpeciesDisplayMode,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            latitude: 0.0,
            longitude: 0.0,
            timezone: "UTC".to_string(),
            language: "en".to_string(),
            species_display_mode: SpeciesDisplayMode::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelConfig {
    pub model: String,
    pub metadata_model: Option<String>,
    #[serde(default = "defaults::species_confidence_threshold")]
    pub species_confidence_threshold: f64,
    #[serde(default = "defaults::sensitivity_setting")]
    pub sensitivity_setting: f64,
    #[serde(default = "defaults::privacy_threshold")]
    pub privacy_threshold: f64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model: "BirdNET_GLOBAL_6K_V2.4_Model".to_string(),
            metadata_model: None,
            species_confidence_threshold: defaults::species_confidence_threshold(),
            sensitivity_setting: defaults::sensitivity_setting(),
            privacy_threshold: defaults::privacy_threshold(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AudioConfig {
    #[serde(default = "defaults::audio_device_index")]
    pub audio_device_index: i32,
    #[serde(default = "defaults::sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "defaults::audio_channels")]
    pub audio_channels: u16,
    #[serde(default = "defaults::audio_overlap")]
    pub audio_overlap: f64,
    /// Writes each analysis window's PCM to `<data_dir>/recordings/**/*.wav`
    /// and attaches the resulting `AudioFile` to the window's detections.
    /// Off by default: most deployments only want live inference.
    #[serde(default)]
    pub record_audio: bool,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            audio_device_index: defaults::audio_device_index(),
            sample_rate: defaults::sample_rate(),
            audio_channels: defaults::audio_channels(),
            audio_overlap: defaults::audio_overlap(),
            record_audio: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationService {
    Apprise,
    Webhook,
    Mqtt,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationScope {
    All,
    NewEver,
    NewToday,
    NewThisWeek,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationWhen {
    Always,
    OncePerDay,
    OncePerWeek,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct NotificationFrequency {
    pub when: Option<NotificationWhen>,
    pub time: Option<String>,
    pub day: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct TaxaFilter {
    #[serde(default)]
    pub orders: Vec<String>,
    #[serde(default)]
    pub families: Vec<String>,
    #[serde(default)]
    pub genera: Vec<String>,
    #[serde(default)]
    pub species: Vec<String>,
}

impl TaxaFilter {
    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
            && self.families.is_empty()
            && self.genera.is_empty()
            && self.species.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotificationRule {
    pub name: String,
    #[serde(default = "defaults::bool_true")]
    pub enabled: bool,
    pub service: NotificationService,
    pub target: String,
    #[serde(default)]
    pub frequency: NotificationFrequency,
    #[serde(default = "NotificationScope::default_scope")]
    pub scope: NotificationScope,
    #[serde(default)]
    pub include_taxa: TaxaFilter,
    #[serde(default)]
    pub exclude_taxa: TaxaFilter,
    #[serde(default)]
    pub minimum_confidence: f64,
    pub title_template: Option<String>,
    pub body_template: Option<String>,
}

impl NotificationScope {
    fn default_scope() -> Self {
        NotificationScope::All
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct NotificationsConfig {
    #[serde(default)]
    pub apprise_targets: HashMap<String, String>,
    #[serde(default = "defaults::apprise_api_base")]
    pub apprise_api_base: String,
    #[serde(default)]
    pub webhook_targets: HashMap<String, String>,
    #[serde(default)]
    pub notification_rules: Vec<NotificationRule>,
    #[serde(default = "defaults::notification_title_default")]
    pub notification_title_default: String,
    #[serde(default = "defaults::notification_body_default")]
    pub notification_body_default: String,
    pub notify_quiet_hours_start: Option<String>,
    pub notify_quiet_hours_end: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MqttConfig {
    #[serde(default)]
    pub enable_mqtt: bool,
    #[serde(default = "defaults::mqtt_broker_host")]
    pub mqtt_broker_host: String,
    #[serde(default = "defaults::mqtt_broker_port")]
    pub mqtt_broker_port: u16,
    pub mqtt_username: Option<String>,
    pub mqtt_password: Option<String>,
    #[serde(default = "defaults::mqtt_topic_prefix")]
    pub mqtt_topic_prefix: String,
    #[serde(default = "defaults::mqtt_client_id")]
    pub mqtt_client_id: String,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            enable_mqtt: false,
            mqtt_broker_host: defaults::mqtt_broker_host(),
            mqtt_broker_port: defaults::mqtt_broker_port(),
            mqtt_username: None,
            mqtt_password: None,
            mqtt_topic_prefix: defaults::mqtt_topic_prefix(),
            mqtt_client_id: defaults::mqtt_client_id(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UpdatesConfig {
    #[serde(default = "defaults::bool_true")]
    pub check_enabled: bool,
    #[serde(default = "defaults::check_interval_hours")]
    pub check_interval_hours: u32,
    #[serde(default = "defaults::bool_true")]
    pub auto_check_on_startup: bool,
    #[serde(default = "defaults::git_remote")]
    pub git_remote: String,
    #[serde(default = "defaults::git_branch")]
    pub git_branch: String,
}

impl Default for UpdatesConfig {
    fn default() -> Self {
        Self {
            check_enabled: true,
            check_interval_hours: defaults::check_interval_hours(),
            auto_check_on_startup: true,
            git_remote: defaults::git_remote(),
            git_branch: defaults::git_branch(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RegionalDetectionMode {
    Off,
    Warn,
    Filter,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RegionalStrictness {
    Vagrant,
    Rare,
    Uncommon,
    Common,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegionalFilterConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "defaults::h3_resolution")]
    pub h3_resolution: u8,
    #[serde(default = "defaults::detection_mode")]
    pub detection_mode: RegionalDetectionMode,
    #[serde(default = "defaults::detection_strictness")]
    pub detection_strictness: RegionalStrictness,
    #[serde(default = "defaults::neighbour_search_radius_km")]
    pub neighbour_search_radius_km: f64,
    #[serde(default = "defaults::quality_multiplier")]
    pub quality_multiplier: f64,
    #[serde(default)]
    pub temporal_adjustment_enabled: bool,
}

impl Default for RegionalFilterConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            h3_resolution: defaults::h3_resolution(),
            detection_mode: defaults::detection_mode(),
            detection_strictness: defaults::detection_strictness(),
            neighbour_search_radius_km: defaults::neighbour_search_radius_km(),
            quality_multiplier: defaults::quality_multiplier(),
            temporal_adjustment_enabled: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_yaml() {
        let config = CorvidConfig::default();
        let yaml = serde_yml::to_string(&config).unwrap();
        let parsed: CorvidConfig = serde_yml::from_str(&yaml).unwrap();
        assert_eq!(config, parsed);
    }
}
