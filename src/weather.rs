//! Hourly weather fetch (`spec.md` §3 `Weather` "populated asynchronously
//! after insert"), grounded in the webhook/apprise adapters' `reqwest`
//! client pattern (`notify/adapters/webhook.rs`, `notify/adapters/apprise.rs`).
//!
//! Open-Meteo's free, keyless historical-weather API is used as the data
//! source: it needs no account or secret, matching an appliance meant to
//! come up unattended, and exposes the same per-hour fields `Weather`
//! models.

use std::time::Duration;

use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc};
use serde::Deserialize;
use thiserror::Error;

use crate::types::Weather;

const DEFAULT_API_BASE: &str = "https://api.open-meteo.com/v1/forecast";

#[derive(Debug, Error)]
pub enum WeatherFetchError {
    #[error("weather request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("weather response missing hour {0}")]
    MissingHour(String),
}

#[derive(Deserialize)]
struct OpenMeteoResponse {
    hourly: Hourly,
}

#[derive(Deserialize)]
struct Hourly {
    time: Vec<String>,
    temperature_2m: Vec<Option<f64>>,
    relative_humidity_2m: Vec<Option<f64>>,
    surface_pressure: Vec<Option<f64>>,
    wind_speed_10m: Vec<Option<f64>>,
    wind_direction_10m: Vec<Option<f64>>,
    precipitation: Vec<Option<f64>>,
    rain: Vec<Option<f64>>,
    snowfall: Vec<Option<f64>>,
    cloud_cover: Vec<Option<f64>>,
    visibility: Vec<Option<f64>>,
    uv_index: Vec<Option<f64>>,
    shortwave_radiation: Vec<Option<f64>>,
}

/// Fetches the single hourly observation nearest `timestamp_hour` at
/// `(latitude, longitude)`.
pub struct WeatherClient {
    client: reqwest::Client,
    api_base: String,
}

impl WeatherClient {
    pub fn new(timeout: Duration) -> Self {
        Self::with_api_base(DEFAULT_API_BASE.to_string(), timeout)
    }

    pub fn with_api_base(api_base: String, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("failed to build weather HTTP client");
        Self { client, api_base }
    }

    pub async fn fetch_hour(
        &self,
        latitude: f64,
        longitude: f64,
        timestamp_hour: DateTime<Utc>,
    ) -> Result<Weather, WeatherFetchError> {
        let date = timestamp_hour.format("%Y-%m-%d").to_string();
        let response: OpenMeteoResponse = self
            .client
            .get(&self.api_base)
            .query(&[
                ("latitude", latitude.to_string()),
                ("longitude", longitude.to_string()),
                ("start_date", date.clone()),
                ("end_date", date),
                (
                    "hourly",
                    "temperature_2m,relative_humidity_2m,surface_pressure,wind_speed_10m,\
                     wind_direction_10m,precipitation,rain,snowfall,cloud_cover,visibility,\
                     uv_index,shortwave_radiation"
                        .to_string(),
                ),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let target = timestamp_hour.format("%Y-%m-%dT%H:00").to_string();
        let index = response
            .hourly
            .time
            .iter()
            .position(|t| *t == target)
            .ok_or_else(|| WeatherFetchError::MissingHour(target.clone()))?;

        let at = |series: &[Option<f64>]| series.get(index).copied().flatten();

        Ok(Weather {
            timestamp_hour,
            latitude,
            longitude,
            temperature: at(&response.hourly.temperature_2m),
            humidity: at(&response.hourly.relative_humidity_2m),
            pressure: at(&response.hourly.surface_pressure),
            wind_speed: at(&response.hourly.wind_speed_10m),
            wind_direction: at(&response.hourly.wind_direction_10m),
            precipitation: at(&response.hourly.precipitation),
            rain: at(&response.hourly.rain),
            snow: at(&response.hourly.snowfall),
            cloud_cover: at(&response.hourly.cloud_cover),
            visibility: at(&response.hourly.visibility),
            uv_index: at(&response.hourly.uv_index),
            solar_radiation: at(&response.hourly.shortwave_radiation),
            source: "open-meteo".to_string(),
            fetched_at: Utc::now(),
        })
    }
}

/// Truncates a timestamp down to the start of its hour, the granularity
/// `Weather` is keyed at.
pub fn truncate_to_hour(timestamp: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(timestamp.year(), timestamp.month(), timestamp.day(), timestamp.hour(), 0, 0)
        .single()
        .unwrap_or(timestamp)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_to_hour_clears_minutes_and_seconds() {
        let t = Utc.with_ymd_and_hms(2026, 3, 4, 13, 42, 17).unwrap();
        let truncated = truncate_to_hour(t);
        assert_eq!(truncated.format("%Y-%m-%d %H:%M:%S").to_string(), "2026-03-04 13:00:00");
    }
}
