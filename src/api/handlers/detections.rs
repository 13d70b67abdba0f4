//! Detection query endpoints (`spec.md` §6 "`GET /api/detections/...`").

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cache::namespace;
use crate::store::{DetectionFilter, DetectionStore, ReferenceStore};
use crate::types::{CacheKey, Detection, SpeciesReference};

use crate::api::envelope::{cached, ApiError};
use crate::api::AppState;

fn parse_date(raw: &str, field: &str) -> Result<NaiveDate, ApiError> {
    raw.parse::<NaiveDate>()
        .map_err(|_| ApiError::bad_request(format!("{field} must be YYYY-MM-DD, got {raw:?}")))
}

#[derive(Debug, Deserialize)]
pub struct RecentParams {
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    10
}

/// `GET /api/detections/recent?limit=N`.
pub async fn recent(State(state): State<AppState>, Query(params): Query<RecentParams>) -> Result<Json<Vec<Detection>>, ApiError> {
    let key = CacheKey::new(namespace::RECENT_DETECTIONS, &params.limit);
    cached(&state.cache, key, namespace::ttl_seconds(namespace::RECENT_DETECTIONS), || async {
        let store = DetectionStore::new(&state.db);
        store.recent(params.limit).await.map_err(ApiError::from)
    })
    .await
}

/// `GET /api/detections/{uuid}`.
pub async fn get_by_id(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Detection>, ApiError> {
    let store = DetectionStore::new(&state.db);
    let detection = store.get(id).await?;
    detection.map(Json).ok_or_else(|| ApiError::not_found(format!("no detection with id {id}")))
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct ListParams {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct PaginationView {
    page: u32,
    per_page: u32,
    total: u64,
    total_pages: u64,
    has_next: bool,
    has_prev: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DetectionListResponse {
    detections: Vec<Detection>,
    pagination: PaginationView,
}

/// `GET /api/detections/?page&per_page&start_date&end_date`.
pub async fn list(State(state): State<AppState>, Query(params): Query<ListParams>) -> Result<Json<DetectionListResponse>, ApiError> {
    let start_date = params.start_date.as_deref().map(|d| parse_date(d, "start_date")).transpose()?;
    let end_date = params.end_date.as_deref().map(|d| parse_date(d, "end_date")).transpose()?;
    let page = params.page.unwrap_or(1);
    let per_page = params.per_page.unwrap_or(20);

    let key = CacheKey::new(namespace::ALL_DETECTION_DATA, &params);
    cached(&state.cache, key, namespace::ttl_seconds(namespace::ALL_DETECTION_DATA), || async move {
        let store = DetectionStore::new(&state.db);
        let filter = DetectionFilter { start_date, end_date };
        let page_result = store.paginated(&filter, page, per_page).await?;

        Ok(DetectionListResponse {
            detections: page_result.detections,
            pagination: PaginationView {
                page: page_result.page,
                per_page: page_result.per_page,
                total: page_result.total,
                total_pages: page_result.total_pages,
                has_next: page_result.has_next,
                has_prev: page_result.has_prev,
            },
        })
    })
    .await
}

#[derive(Debug, Deserialize)]
pub struct CountParams {
    pub target_date: Option<String>,
}

/// `GET /api/detections/count?target_date=YYYY-MM-DD`, defaulting to
/// today (UTC) when `target_date` is absent.
pub async fn count(State(state): State<AppState>, Query(params): Query<CountParams>) -> Result<Json<serde_json::Value>, ApiError> {
    let date = match params.target_date.as_deref() {
        Some(raw) => parse_date(raw, "target_date")?,
        None => chrono::Utc::now().date_naive(),
    };

    let store = DetectionStore::new(&state.db);
    let count = store.count_for_date(date).await?;

    Ok(Json(serde_json::json!({ "count": count, "date": date })))
}

#[derive(Debug, Deserialize)]
pub struct SpeciesSummaryParams {
    pub since: Option<String>,
}

#[derive(Debug, Serialize, Clone)]
struct SpeciesSummaryEntry {
    scientific_name: String,
    common_name: String,
    detection_count: u64,
    first_seen: chrono::DateTime<chrono::Utc>,
    last_seen: chrono::DateTime<chrono::Utc>,
    taxonomy: Option<SpeciesReference>,
}

/// `GET /api/detections/species/summary` — per-species counts, enriched
/// with IOC taxonomy where the reference DB has a matching row
/// (`spec.md` §4.5 "cross-database JOIN against the reference store").
pub async fn species_summary(State(state): State<AppState>, Query(params): Query<SpeciesSummaryParams>) -> Result<Json<Vec<SpeciesSummaryEntry>>, ApiError> {
    let since = params
        .since
        .as_deref()
        .map(|raw| raw.parse::<chrono::DateTime<chrono::Utc>>())
        .transpose()
        .map_err(|_| ApiError::bad_request("since must be an RFC3339 timestamp"))?;

    let detection_store = DetectionStore::new(&state.db);
    let reference_store = ReferenceStore::new(&state.db, &state.reference_db_path);

    let counts = detection_store.species_counts(since).await?;

    let mut entries = Vec::with_capacity(counts.len());
    for c in counts {
        let taxonomy = match reference_store.lookup(&c.scientific_name, &state.language).await {
            Ok(found) => found.map(|(reference, _display_name)| reference),
            Err(e) => {
                tracing::warn!(species = %c.scientific_name, error = %e, "reference lookup failed, omitting taxonomy");
                None
            }
        };

        entries.push(SpeciesSummaryEntry {
            scientific_name: c.scientific_name,
            common_name: c.common_name,
            detection_count: c.detection_count,
            first_seen: c.first_seen,
            last_seen: c.last_seen,
            taxonomy,
        });
    }

    Ok(Json(entries))
}

/// `GET /api/detections/taxonomy/families` — distinct families present
/// among detected species.
pub async fn taxonomy_families(State(state): State<AppState>) -> Result<Json<Vec<String>>, ApiError> {
    let key = CacheKey::new(namespace::FAMILY_SUMMARY, &());
    cached(&state.cache, key, namespace::ttl_seconds(namespace::FAMILY_SUMMARY), || async {
        let reference_store = ReferenceStore::new(&state.db, &state.reference_db_path);
        reference_store.families_with_detections().await.map_err(ApiError::from)
    })
    .await
}
