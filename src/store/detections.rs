//! `detections` table access (`spec.md` §3 `Detection`, §6 HTTP API).

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::types::Detection;

use super::StoreError;

pub struct DetectionStore<'a> {
    pool: &'a SqlitePool,
}

#[derive(Debug, Clone, Default)]
pub struct DetectionFilter {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Clone)]
pub struct DetectionPage {
    pub detections: Vec<Detection>,
    pub page: u32,
    pub per_page: u32,
    pub total: u64,
    pub total_pages: u64,
    pub has_next: bool,
    pub has_prev: bool,
}

#[derive(sqlx::FromRow)]
struct DetectionRow {
    id: String,
    timestamp: String,
    scientific_name: String,
    common_name: String,
    species_tensor: String,
    confidence: f64,
    latitude: Option<f64>,
    longitude: Option<f64>,
    species_confidence_threshold: f64,
    sensitivity_setting: f64,
    overlap: f64,
    week: i64,
    weather_timestamp: Option<String>,
    weather_latitude: Option<f64>,
    weather_longitude: Option<f64>,
    audio_file_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SpeciesCount {
    pub scientific_name: String,
    pub common_name: String,
    pub detection_count: u64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct SpeciesCountRow {
    scientific_name: String,
    common_name: String,
    detection_count: i64,
    first_seen: String,
    last_seen: String,
}

impl SpeciesCountRow {
    fn into_species_count(self) -> Result<SpeciesCount, StoreError> {
        Ok(SpeciesCount {
            scientific_name: self.scientific_name,
            common_name: self.common_name,
            detection_count: self.detection_count as u64,
            first_seen: self
                .first_seen
                .parse::<DateTime<Utc>>()
                .map_err(|e| StoreError::InvalidDetection(e.to_string()))?,
            last_seen: self
                .last_seen
                .parse::<DateTime<Utc>>()
                .map_err(|e| StoreError::InvalidDetection(e.to_string()))?,
        })
    }
}

const DETECTION_COLUMNS: &str = r#"id, timestamp, scientific_name, common_name, species_tensor,
    confidence, latitude, longitude, species_confidence_threshold,
    sensitivity_setting, overlap, week,
    weather_timestamp, weather_latitude, weather_longitude, audio_file_id"#;

impl DetectionRow {
    fn into_detection(self) -> Result<Detection, StoreError> {
        Ok(Detection {
            id: Uuid::parse_str(&self.id)
                .map_err(|e| StoreError::InvalidDetection(e.to_string()))?,
            timestamp: self
                .timestamp
                .parse::<DateTime<Utc>>()
                .map_err(|e| StoreError::InvalidDetection(e.to_string()))?,
            scientific_name: self.scientific_name,
            common_name: self.common_name,
            species_tensor: self.species_tensor,
            confidence: self.confidence,
            latitude: self.latitude,
            longitude: self.longitude,
            species_confidence_threshold: self.species_confidence_threshold,
            sensitivity_setting: self.sensitivity_setting,
            overlap: self.overlap,
            week: self.week as u8,
            weather_timestamp: self
                .weather_timestamp
                .map(|s| s.parse::<DateTime<Utc>>())
                .transpose()
                .map_err(|e| StoreError::InvalidDetection(e.to_string()))?,
            weather_latitude: self.weather_latitude,
            weather_longitude: self.weather_longitude,
            audio_file_id: self
                .audio_file_id
                .map(|s| Uuid::parse_str(&s))
                .transpose()
                .map_err(|e| StoreError::InvalidDetection(e.to_string()))?,
        })
    }
}

impl<'a> DetectionStore<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, d: &Detection) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO detections (
                id, timestamp, scientific_name, common_name, species_tensor, confidence,
                latitude, longitude, species_confidence_threshold, sensitivity_setting,
                overlap, week, weather_timestamp, weather_latitude, weather_longitude,
                audio_file_id
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(d.id.to_string())
        .bind(d.timestamp.to_rfc3339())
        .bind(&d.scientific_name)
        .bind(&d.common_name)
        .bind(&d.species_tensor)
        .bind(d.confidence)
        .bind(d.latitude)
        .bind(d.longitude)
        .bind(d.species_confidence_threshold)
        .bind(d.sensitivity_setting)
        .bind(d.overlap)
        .bind(i64::from(d.week))
        .bind(d.weather_timestamp.map(|t| t.to_rfc3339()))
        .bind(d.weather_latitude)
        .bind(d.weather_longitude)
        .bind(d.audio_file_id.map(|id| id.to_string()))
        .execute(self.pool)
        .await?;

        Ok(())
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<Detection>, StoreError> {
        let row: Option<DetectionRow> = sqlx::query_as(&format!(
            "SELECT {DETECTION_COLUMNS} FROM detections WHERE id = ?"
        ))
        .bind(id.to_string())
        .fetch_optional(self.pool)
        .await?;

        row.map(DetectionRow::into_detection).transpose()
    }

    pub async fn recent(&self, limit: u32) -> Result<Vec<Detection>, StoreError> {
        let rows: Vec<DetectionRow> = sqlx::query_as(&format!(
            "SELECT {DETECTION_COLUMNS} FROM detections ORDER BY timestamp DESC LIMIT ?"
        ))
        .bind(i64::from(limit))
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(DetectionRow::into_detection).collect()
    }

    pub async fn count_for_date(&self, date: NaiveDate) -> Result<u64, StoreError> {
        let start = date
            .and_hms_opt(0, 0, 0)
            .expect("midnight always exists")
            .and_utc()
            .to_rfc3339();
        let end = (date + chrono::Duration::days(1))
            .and_hms_opt(0, 0, 0)
            .expect("midnight always exists")
            .and_utc()
            .to_rfc3339();

        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM detections WHERE timestamp >= ? AND timestamp < ?",
        )
        .bind(start)
        .bind(end)
        .fetch_one(self.pool)
        .await?;

        Ok(count as u64)
    }

    /// Whether any detection of `scientific_name` exists with
    /// `since <= timestamp < before`, used by the notification scope gate
    /// (`spec.md` §4.3 "is this species new today? new ever?"). A rule
    /// scoped to `new_today` passes when this returns `false` for the
    /// current day's window, i.e. the detection being evaluated is the
    /// first of its species today.
    pub async fn species_seen_in_range(
        &self,
        scientific_name: &str,
        since: DateTime<Utc>,
        before: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM detections \
             WHERE scientific_name = ? AND timestamp >= ? AND timestamp < ?",
        )
        .bind(scientific_name)
        .bind(since.to_rfc3339())
        .bind(before.to_rfc3339())
        .fetch_one(self.pool)
        .await?;

        Ok(count > 0)
    }

    /// Per-species detection counts, optionally restricted to detections
    /// at or after `since`, backing the species/family summary endpoints
    /// (`spec.md` §4.5 "Species/family summaries").
    pub async fn species_counts(&self, since: Option<DateTime<Utc>>) -> Result<Vec<SpeciesCount>, StoreError> {
        let since = since.map(|s| s.to_rfc3339());

        let rows: Vec<SpeciesCountRow> = sqlx::query_as(
            "SELECT scientific_name, common_name, COUNT(*) AS detection_count, \
                    MIN(timestamp) AS first_seen, MAX(timestamp) AS last_seen \
             FROM detections \
             WHERE (? IS NULL OR timestamp >= ?) \
             GROUP BY scientific_name \
             ORDER BY detection_count DESC",
        )
        .bind(&since)
        .bind(&since)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(SpeciesCountRow::into_species_count).collect()
    }

    /// All detections with `start <= timestamp < end`, in chronological
    /// order, backing the analytics endpoints (`spec.md` §4.5), which
    /// operate on the raw timestamp/species sequence rather than a
    /// pre-aggregated query.
    pub async fn in_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<Detection>, StoreError> {
        let rows: Vec<DetectionRow> = sqlx::query_as(&format!(
            "SELECT {DETECTION_COLUMNS} FROM detections \
             WHERE timestamp >= ? AND timestamp < ? ORDER BY timestamp ASC"
        ))
        .bind(start.to_rfc3339())
        .bind(end.to_rfc3339())
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(DetectionRow::into_detection).collect()
    }

    /// Earliest detection's timestamp, if any — the natural `oldest_record`
    /// input to `analytics::period::boundaries(Period::Historical, ...)`.
    pub async fn earliest_timestamp(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
        let row: Option<String> = sqlx::query_scalar("SELECT MIN(timestamp) FROM detections")
            .fetch_one(self.pool)
            .await?;

        row.map(|s| s.parse::<DateTime<Utc>>().map_err(|e| StoreError::InvalidDetection(e.to_string())))
            .transpose()
    }

    /// Detections still missing a weather attachment, oldest first — the
    /// web daemon's periodic weather-fetch job works through this list
    /// (`spec.md` §3 "populated asynchronously after insert").
    pub async fn missing_weather(&self, limit: u32) -> Result<Vec<Detection>, StoreError> {
        let rows: Vec<DetectionRow> = sqlx::query_as(&format!(
            "SELECT {DETECTION_COLUMNS} FROM detections \
             WHERE weather_timestamp IS NULL ORDER BY timestamp ASC LIMIT ?"
        ))
        .bind(i64::from(limit))
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(DetectionRow::into_detection).collect()
    }

    /// Attaches the `(timestamp_hour, latitude, longitude)` weather FK
    /// triple to a previously-persisted detection. Guarded at the DB layer
    /// (rather than trusting the in-memory `Detection::attach_weather`
    /// check alone) with `weather_timestamp IS NULL` in the `WHERE`
    /// clause, so a detection can only ever be attached once even if two
    /// fetch jobs race on it.
    pub async fn attach_weather(
        &self,
        detection_id: Uuid,
        weather_timestamp: DateTime<Utc>,
        weather_latitude: f64,
        weather_longitude: f64,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE detections SET weather_timestamp = ?, weather_latitude = ?, weather_longitude = ? \
             WHERE id = ? AND weather_timestamp IS NULL",
        )
        .bind(weather_timestamp.to_rfc3339())
        .bind(weather_latitude)
        .bind(weather_longitude)
        .bind(detection_id.to_string())
        .execute(self.pool)
        .await?;

        Ok(())
    }

    /// Page-oriented query backing `GET /api/detections/?page&per_page`.
    /// `page` below 1 is clamped to 1 (`spec.md` §7 "silently clamped to
    /// defaults where a safe default exists").
    pub async fn paginated(
        &self,
        filter: &DetectionFilter,
        page: u32,
        per_page: u32,
    ) -> Result<DetectionPage, StoreError> {
        let page = page.max(1);
        let per_page = per_page.max(1);
        let offset = i64::from((page - 1) * per_page);

        let start = filter
            .start_date
            .map(|d| d.and_hms_opt(0, 0, 0).expect("midnight always exists").and_utc().to_rfc3339());
        let end = filter.end_date.map(|d| {
            (d + chrono::Duration::days(1))
                .and_hms_opt(0, 0, 0)
                .expect("midnight always exists")
                .and_utc()
                .to_rfc3339()
        });

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM detections \
             WHERE (? IS NULL OR timestamp >= ?) AND (? IS NULL OR timestamp < ?)",
        )
        .bind(&start)
        .bind(&start)
        .bind(&end)
        .bind(&end)
        .fetch_one(self.pool)
        .await?;
        let total = total as u64;

        let rows: Vec<DetectionRow> = sqlx::query_as(&format!(
            "SELECT {DETECTION_COLUMNS} FROM detections \
             WHERE (? IS NULL OR timestamp >= ?) AND (? IS NULL OR timestamp < ?) \
             ORDER BY timestamp DESC LIMIT ? OFFSET ?"
        ))
        .bind(&start)
        .bind(&start)
        .bind(&end)
        .bind(&end)
        .bind(i64::from(per_page))
        .bind(offset)
        .fetch_all(self.pool)
        .await?;

        let detections = rows
            .into_iter()
            .map(DetectionRow::into_detection)
            .collect::<Result<Vec<_>, _>>()?;

        let total_pages = total.div_ceil(u64::from(per_page)).max(1);

        Ok(DetectionPage {
            detections,
            page,
            per_page,
            total,
            total_pages,
            has_next: u64::from(page) < total_pages,
            has_prev: page > 1,
        })
    }
}
