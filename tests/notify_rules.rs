//! End-to-end coverage of notification-rule gating (`spec.md` §4.3
//! "Evaluation order (per detection)": quiet hours, scope, taxa,
//! confidence, frequency, in that order).

use chrono::{DateTime, Utc};
use corvid_sentinel::config::{
    NotificationRule, NotificationService, NotificationsConfig, TaxaFilter,
};
use corvid_sentinel::notify::RuleEngine;
use corvid_sentinel::store::{self, DetectionStore};
use corvid_sentinel::types::{Detection, NewDetection, SpeciesReference};
use tempfile::tempdir;

fn robin(confidence: f64, timestamp: DateTime<Utc>) -> Detection {
    Detection::new(
        NewDetection {
            scientific_name: "Turdus migratorius".to_string(),
            common_name: "American Robin".to_string(),
            confidence,
            latitude: Some(40.0),
            longitude: Some(-74.0),
            species_confidence_threshold: 0.5,
            sensitivity_setting: 1.0,
            overlap: 0.0,
            week: 20,
            audio_file_id: None,
        },
        timestamp,
    )
    .unwrap()
}

fn hawk(confidence: f64, timestamp: DateTime<Utc>) -> Detection {
    Detection::new(
        NewDetection {
            scientific_name: "Buteo jamaicensis".to_string(),
            common_name: "Red-tailed Hawk".to_string(),
            confidence,
            latitude: Some(40.0),
            longitude: Some(-74.0),
            species_confidence_threshold: 0.5,
            sensitivity_setting: 1.0,
            overlap: 0.0,
            week: 20,
            audio_file_id: None,
        },
        timestamp,
    )
    .unwrap()
}

fn passeriformes() -> SpeciesReference {
    SpeciesReference {
        scientific_name: "Turdus migratorius".to_string(),
        english_name: "American Robin".to_string(),
        order: "Passeriformes".to_string(),
        family: "Turdidae".to_string(),
        genus: "Turdus".to_string(),
        species_epithet: "migratorius".to_string(),
        authority: "Linnaeus, 1766".to_string(),
    }
}

fn accipitriformes() -> SpeciesReference {
    SpeciesReference {
        scientific_name: "Buteo jamaicensis".to_string(),
        english_name: "Red-tailed Hawk".to_string(),
        order: "Accipitriformes".to_string(),
        family: "Accipitridae".to_string(),
        genus: "Buteo".to_string(),
        species_epithet: "jamaicensis".to_string(),
        authority: "Gmelin, 1788".to_string(),
    }
}

fn config_with_mqtt_songbird_rule() -> NotificationsConfig {
    NotificationsConfig {
        notification_rules: vec![NotificationRule {
            name: "songbirds-to-mqtt".to_string(),
            enabled: true,
            service: NotificationService::Mqtt,
            target: "corvid/detections".to_string(),
            frequency: Default::default(),
            scope: corvid_sentinel::config::NotificationScope::All,
            include_taxa: TaxaFilter {
                orders: vec!["Passeriformes".to_string()],
                ..Default::default()
            },
            exclude_taxa: TaxaFilter::default(),
            minimum_confidence: 0.8,
            title_template: None,
            body_template: None,
        }],
        notify_quiet_hours_start: Some("22:00".to_string()),
        notify_quiet_hours_end: Some("06:00".to_string()),
        ..Default::default()
    }
}

#[tokio::test]
async fn confidence_and_taxa_and_quiet_hours_gate_independently() {
    let data_dir = tempdir().unwrap();
    let pool = store::open_pool(&data_dir.path().join("corvid.db")).await.unwrap();
    let store = DetectionStore::new(&pool);
    let config = config_with_mqtt_songbird_rule();
    let mut engine = RuleEngine::new();

    let daytime: DateTime<Utc> = "2026-05-01T13:00:00Z".parse().unwrap();
    let night: DateTime<Utc> = "2026-05-01T23:00:00Z".parse().unwrap();

    // Passeriformes above threshold, outside quiet hours: delivered.
    let confident_robin = robin(0.9, daytime);
    let dispatches = engine
        .evaluate(&config, &confident_robin, Some(&passeriformes()), &store, daytime)
        .await;
    assert_eq!(dispatches.len(), 1);
    assert_eq!(dispatches[0].service, NotificationService::Mqtt);
    assert_eq!(dispatches[0].target, "corvid/detections");

    // Passeriformes below the rule's minimum_confidence: dropped.
    let quiet_robin = robin(0.5, daytime);
    let dispatches = engine
        .evaluate(&config, &quiet_robin, Some(&passeriformes()), &store, daytime)
        .await;
    assert!(dispatches.is_empty(), "below minimum_confidence should not dispatch");

    // Confident, but outside the included taxa (order filter): dropped.
    let confident_hawk = hawk(0.95, daytime);
    let dispatches = engine
        .evaluate(&config, &confident_hawk, Some(&accipitriformes()), &store, daytime)
        .await;
    assert!(dispatches.is_empty(), "order outside include_taxa should not dispatch");

    // Confident, correct taxa, but inside the 22:00-06:00 quiet window:
    // quiet hours gate runs before taxa/confidence and drops everything.
    let night_robin = robin(0.95, night);
    let dispatches = engine
        .evaluate(&config, &night_robin, Some(&passeriformes()), &store, night)
        .await;
    assert!(dispatches.is_empty(), "quiet hours should suppress regardless of confidence/taxa");

    pool.close().await;
}

#[tokio::test]
async fn missing_taxonomy_is_excluded_by_a_non_empty_include_filter() {
    let data_dir = tempdir().unwrap();
    let pool = store::open_pool(&data_dir.path().join("corvid.db")).await.unwrap();
    let store = DetectionStore::new(&pool);
    let config = config_with_mqtt_songbird_rule();
    let mut engine = RuleEngine::new();
    let daytime: DateTime<Utc> = "2026-05-01T13:00:00Z".parse().unwrap();

    let confident_robin = robin(0.9, daytime);
    let dispatches = engine.evaluate(&config, &confident_robin, None, &store, daytime).await;

    assert!(dispatches.is_empty(), "no taxonomy + non-empty include_taxa should not match");

    pool.close().await;
}
