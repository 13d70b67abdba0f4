//! End-to-end coverage of the detections/analytics HTTP surface, against
//! a real (tempfile-backed) SQLite pool routed through the full axum
//! router. A tempfile rather than `:memory:` is used deliberately: the
//! pool hands out up to 8 connections, and separate connections to a
//! `:memory:` database are separate, unshared databases, which would make
//! a write on one connection invisible to a read on another.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::Utc;
use corvid_sentinel::api::routes::api_routes;
use corvid_sentinel::api::AppState;
use corvid_sentinel::cache::{namespace, QueryCache};
use corvid_sentinel::eventbus::EventBus;
use corvid_sentinel::store::{self, DetectionStore};
use corvid_sentinel::types::{Detection, NewDetection};
use tower::ServiceExt;
use uuid::Uuid;

struct TestDb {
    state: AppState,
    _tmp: tempfile::TempDir,
}

async fn test_state() -> TestDb {
    let tmp = tempfile::tempdir().unwrap();
    let pool = store::open_pool(&tmp.path().join("corvid.db")).await.unwrap();
    let state = AppState {
        db: pool,
        reference_db_path: tmp.path().join("ioc.db"),
        cache: QueryCache::new(),
        event_bus: EventBus::new(16),
        language: "en".to_string(),
    };
    TestDb { state, _tmp: tmp }
}

/// Populates the reference database with one matching `species_reference`
/// row, for the handlers that `ATTACH` it (`species_summary`,
/// `taxonomy/families`).
async fn seed_reference_db(db: &TestDb) {
    let reference_pool = sqlx::SqlitePool::connect(&format!("sqlite://{}?mode=rwc", db.state.reference_db_path.display()))
        .await
        .unwrap();
    sqlx::query(
        "CREATE TABLE species_reference (scientific_name TEXT PRIMARY KEY, english_name TEXT, \
         \"order\" TEXT, family TEXT, genus TEXT, species_epithet TEXT, authority TEXT)",
    )
    .execute(&reference_pool)
    .await
    .unwrap();
    sqlx::query("CREATE TABLE translations (scientific_name TEXT, language_code TEXT, common_name TEXT)")
        .execute(&reference_pool)
        .await
        .unwrap();
    sqlx::query(
        "INSERT INTO species_reference (scientific_name, english_name, \"order\", family, genus, species_epithet, authority) \
         VALUES ('Turdus migratorius', 'American Robin', 'Passeriformes', 'Turdidae', 'Turdus', 'migratorius', 'Linnaeus, 1766')",
    )
    .execute(&reference_pool)
    .await
    .unwrap();
    reference_pool.close().await;
}

fn sample_detection(scientific_name: &str, common_name: &str, timestamp: chrono::DateTime<Utc>) -> Detection {
    Detection::new(
        NewDetection {
            scientific_name: scientific_name.to_string(),
            common_name: common_name.to_string(),
            confidence: 0.9,
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
    .expect("sample fields are valid")
}

async fn get(state: &AppState, uri: &str) -> (StatusCode, serde_json::Value) {
    let app = api_routes(state.clone());
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, body)
}

/// E3: a full page (10 detections, per_page=10) reports no further pages
/// in either direction.
#[tokio::test]
async fn pagination_reports_exact_totals_for_a_full_single_page() {
    let db = test_state().await;
    let store = DetectionStore::new(&db.state.db);

    let date = "2026-05-01".parse::<chrono::NaiveDate>().unwrap();
    let day_start = date.and_hms_opt(10, 0, 0).unwrap().and_utc();
    for i in 0..10 {
        let d = sample_detection("Turdus migratorius", "American Robin", day_start + chrono::Duration::minutes(i));
        store.insert(&d).await.unwrap();
    }

    let (status, body) = get(
        &db.state,
        &format!("/api/detections/?page=1&per_page=10&start_date={date}&end_date={date}"),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pagination"]["total"], 10);
    assert_eq!(body["pagination"]["total_pages"], 1);
    assert_eq!(body["pagination"]["has_next"], false);
    assert_eq!(body["pagination"]["has_prev"], false);
    assert_eq!(body["detections"].as_array().unwrap().len(), 10);
}

/// E3 (page below range is clamped, per `spec.md` §7): requesting a
/// second page of a single-page result returns zero rows but still
/// reports the real total.
#[tokio::test]
async fn second_page_past_the_end_returns_no_rows_but_keeps_the_total() {
    let db = test_state().await;
    let store = DetectionStore::new(&db.state.db);

    let date = "2026-05-02".parse::<chrono::NaiveDate>().unwrap();
    let day_start = date.and_hms_opt(10, 0, 0).unwrap().and_utc();
    for i in 0..3 {
        let d = sample_detection("Cyanocitta cristata", "Blue Jay", day_start + chrono::Duration::minutes(i));
        store.insert(&d).await.unwrap();
    }

    let (status, body) = get(
        &db.state,
        &format!("/api/detections/?page=2&per_page=10&start_date={date}&end_date={date}"),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pagination"]["total"], 3);
    assert_eq!(body["pagination"]["has_prev"], true);
    assert_eq!(body["pagination"]["has_next"], false);
    assert!(body["detections"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn unknown_detection_id_is_a_404_with_the_uniform_error_envelope() {
    let db = test_state().await;
    let id = Uuid::new_v4();

    let (status, body) = get(&db.state, &format!("/api/detections/{id}")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn known_detection_id_returns_the_full_record() {
    let db = test_state().await;
    let store = DetectionStore::new(&db.state.db);
    let d = sample_detection("Poecile atricapillus", "Black-capped Chickadee", Utc::now());
    store.insert(&d).await.unwrap();

    let (status, body) = get(&db.state, &format!("/api/detections/{}", d.id)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["scientific_name"], "Poecile atricapillus");
}

/// E5: a cached `recent` response only reflects a freshly inserted
/// detection after its namespace is invalidated.
#[tokio::test]
async fn recent_detections_cache_is_stale_until_invalidated() {
    let db = test_state().await;
    let store = DetectionStore::new(&db.state.db);

    let (status, body) = get(&db.state, "/api/detections/recent?limit=10").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 0);

    let d = sample_detection("Cardinalis cardinalis", "Northern Cardinal", Utc::now());
    store.insert(&d).await.unwrap();

    let (_, stale) = get(&db.state, "/api/detections/recent?limit=10").await;
    assert_eq!(stale.as_array().unwrap().len(), 0, "cache should still serve the pre-insert result");

    db.state.cache.invalidate_namespace(namespace::RECENT_DETECTIONS);

    let (_, fresh) = get(&db.state, "/api/detections/recent?limit=10").await;
    assert_eq!(fresh.as_array().unwrap().len(), 1, "invalidated cache should recompute and see the insert");
}

#[tokio::test]
async fn analytics_endpoints_respond_ok_against_an_empty_store() {
    let db = test_state().await;

    for uri in [
        "/api/analytics/heatmap?period=week",
        "/api/analytics/accumulation?period=month&method=random",
        "/api/analytics/beta-diversity?period=month",
        "/api/analytics/correlation?period=month&metric=temperature",
    ] {
        let (status, _) = get(&db.state, uri).await;
        assert_eq!(status, StatusCode::OK, "{uri} should succeed on an empty store");
    }
}

#[tokio::test]
async fn species_summary_and_family_endpoints_respond_ok() {
    let db = test_state().await;
    seed_reference_db(&db).await;
    let store = DetectionStore::new(&db.state.db);
    let d = sample_detection("Turdus migratorius", "American Robin", Utc::now());
    store.insert(&d).await.unwrap();

    let (status, body) = get(&db.state, "/api/detections/species/summary").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["taxonomy"]["family"], "Turdidae");

    let (status, families) = get(&db.state, "/api/detections/taxonomy/families").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(families.as_array().unwrap(), &vec![serde_json::json!("Turdidae")]);
}
