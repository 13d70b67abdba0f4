//! Analytics endpoints (`spec.md` §4.5 "Analytic algorithms", §6
//! "parameterised by a period enum").
//!
//! Each handler resolves `period` to a `[start, end)` window via
//! `analytics::period::boundaries`, pulls the raw rows the algorithm
//! needs out of the store, and hands them to the corresponding
//! `analytics::*` function — the handlers themselves hold no algorithmic
//! logic, matching the separation `analytics::mod` documents ("taking
//! plain data ... rather than touching the store directly").

use std::collections::HashSet;

use axum::extract::{Query, State};
use axum::Json;
use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::Deserialize;

use crate::analytics::{
    self, AccumulationMethod, AccumulationPoint, Heatmap, Period, TurnoverStep,
};
use crate::store::{DetectionStore, StoreError, WeatherStore};
use crate::types::{Detection, Weather};

use crate::api::envelope::ApiError;
use crate::api::AppState;

#[derive(Debug, Deserialize)]
pub struct PeriodParams {
    #[serde(default = "default_period")]
    pub period: Period,
}

fn default_period() -> Period {
    Period::Week
}

async fn resolve_window(state: &AppState, period: Period) -> Result<(DateTime<Utc>, DateTime<Utc>), StoreError> {
    let store = DetectionStore::new(&state.db);
    let oldest = if period == Period::Historical {
        store.earliest_timestamp().await?
    } else {
        None
    };
    Ok(analytics::boundaries(period, Utc::now(), oldest))
}

async fn detections_in_window(state: &AppState, period: Period) -> Result<Vec<Detection>, ApiError> {
    let (start, end) = resolve_window(state, period).await?;
    let store = DetectionStore::new(&state.db);
    Ok(store.in_range(start, end).await?)
}

/// `GET /api/analytics/heatmap?period=week`.
pub async fn heatmap(State(state): State<AppState>, Query(params): Query<PeriodParams>) -> Result<Json<Heatmap>, ApiError> {
    let (start, end) = resolve_window(&state, params.period).await?;
    let detections = DetectionStore::new(&state.db).in_range(start, end).await?;
    let timestamps: Vec<DateTime<Utc>> = detections.iter().map(|d| d.timestamp).collect();
    Ok(Json(analytics::heatmap(&timestamps, start, end)))
}

#[derive(Debug, Deserialize)]
pub struct AccumulationParams {
    #[serde(default = "default_period")]
    pub period: Period,
    #[serde(default)]
    pub method: AccumulationMethod,
}

impl Default for AccumulationMethod {
    fn default() -> Self {
        AccumulationMethod::Random
    }
}

/// `GET /api/analytics/accumulation?period=month&method=rarefaction`.
pub async fn accumulation(State(state): State<AppState>, Query(params): Query<AccumulationParams>) -> Result<Json<Vec<AccumulationPoint>>, ApiError> {
    let detections = detections_in_window(&state, params.period).await?;
    let sequence: Vec<String> = detections.into_iter().map(|d| d.scientific_name).collect();
    Ok(Json(analytics::accumulation_curve(&sequence, params.method)))
}

/// `GET /api/analytics/beta-diversity?period=month` — windows bucketed
/// by calendar day within the period, one `HashSet` of species per day.
pub async fn beta_diversity(State(state): State<AppState>, Query(params): Query<PeriodParams>) -> Result<Json<Vec<TurnoverStep>>, ApiError> {
    let detections = detections_in_window(&state, params.period).await?;

    let mut by_day: std::collections::BTreeMap<chrono::NaiveDate, HashSet<String>> = std::collections::BTreeMap::new();
    for d in detections {
        by_day.entry(d.timestamp.date_naive()).or_default().insert(d.scientific_name);
    }
    let windows: Vec<HashSet<String>> = by_day.into_values().collect();

    Ok(Json(analytics::temporal_beta_diversity(&windows)))
}

#[derive(Debug, Deserialize)]
pub struct CorrelationParams {
    #[serde(default = "default_period")]
    pub period: Period,
    #[serde(default = "default_metric")]
    pub metric: String,
}

fn default_metric() -> String {
    "temperature".to_string()
}

fn weather_field(w: &Weather, metric: &str) -> Option<f64> {
    match metric {
        "temperature" => w.temperature,
        "humidity" => w.humidity,
        "pressure" => w.pressure,
        "wind_speed" => w.wind_speed,
        "wind_direction" => w.wind_direction,
        "precipitation" => w.precipitation,
        "rain" => w.rain,
        "snow" => w.snow,
        "cloud_cover" => w.cloud_cover,
        "visibility" => w.visibility,
        "uv_index" => w.uv_index,
        "solar_radiation" => w.solar_radiation,
        _ => None,
    }
}

/// `GET /api/analytics/correlation?period=month&metric=temperature` —
/// Pearson correlation between an hourly weather metric and the hourly
/// detection count over the same period.
pub async fn correlation(State(state): State<AppState>, Query(params): Query<CorrelationParams>) -> Result<Json<f64>, ApiError> {
    let (start, end) = resolve_window(&state, params.period).await?;

    let detections = DetectionStore::new(&state.db).in_range(start, end).await?;
    let weather = WeatherStore::new(&state.db).in_range(start, end).await?;

    let mut counts_by_hour: std::collections::HashMap<DateTime<Utc>, f64> = std::collections::HashMap::new();
    for d in &detections {
        let hour = d.timestamp.date_naive().and_hms_opt(d.timestamp.hour(), 0, 0).expect("valid hour").and_utc();
        *counts_by_hour.entry(hour).or_insert(0.0) += 1.0;
    }

    let pairs: Vec<(Option<f64>, Option<f64>)> = weather
        .iter()
        .map(|w| (weather_field(w, &params.metric), counts_by_hour.get(&w.timestamp_hour).copied()))
        .collect();

    Ok(Json(analytics::pearson_correlation(&pairs)))
}
