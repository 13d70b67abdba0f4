//! Default values wired into `schema.rs` via `#[serde(default = "...")]`.
//!
//! Kept as free functions (rather than inline literals) so the same
//! constants back both serde defaults and `Default` impls without drifting.

use super::schema::{RegionalDetectionMode, RegionalStrictness};

pub const CURRENT_CONFIG_VERSION: u32 = 2;

pub fn bool_true() -> bool {
    true
}

pub fn species_confidence_threshold() -> f64 {
    0.03
}

pub fn sensitivity_setting() -> f64 {
    1.25
}

pub fn privacy_threshold() -> f64 {
    10.0
}

pub fn audio_device_index() -> i32 {
    -1
}

pub fn sample_rate() -> u32 {
    48_000
}

pub fn audio_channels() -> u16 {
    1
}

pub fn audio_overlap() -> f64 {
    0.5
}

pub fn notification_title_default() -> String {
    "{common_name} detected".to_string()
}

pub fn notification_body_default() -> String {
    "{common_name} ({scientific_name}) at {confidence}% confidence, {time}".to_string()
}

pub fn apprise_api_base() -> String {
    "http://localhost:8000".to_string()
}

pub fn mqtt_broker_host() -> String {
    "localhost".to_string()
}

pub fn mqtt_broker_port() -> u16 {
    1883
}

pub fn mqtt_topic_prefix() -> String {
    "corvid-sentinel".to_string()
}

pub fn mqtt_client_id() -> String {
    "corvid-sentinel".to_string()
}

pub fn check_interval_hours() -> u32 {
    24
}

pub fn git_remote() -> String {
    "origin".to_string()
}

pub fn git_branch() -> String {
    "main".to_string()
}

pub fn h3_resolution() -> u8 {
    4
}

pub fn detection_mode() -> RegionalDetectionMode {
    RegionalDetectionMode::Off
}

pub fn detection_strictness() -> RegionalStrictness {
    RegionalStrictness::Rare
}

pub fn neighbour_search_radius_km() -> f64 {
    50.0
}

pub fn quality_multiplier() -> f64 {
    1.0
}
