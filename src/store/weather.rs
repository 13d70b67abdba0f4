//! `weather` table access (`spec.md` §3 `Weather`). The web daemon is the
//! sole writer of weather attachments (`spec.md` §5).

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::types::Weather;

use super::StoreError;

pub struct WeatherStore<'a> {
    pool: &'a SqlitePool,
}

#[derive(sqlx::FromRow)]
struct WeatherRow {
    timestamp_hour: String,
    latitude: f64,
    longitude: f64,
    temperature: Option<f64>,
    humidity: Option<f64>,
    pressure: Option<f64>,
    wind_speed: Option<f64>,
    wind_direction: Option<f64>,
    precipitation: Option<f64>,
    rain: Option<f64>,
    snow: Option<f64>,
    cloud_cover: Option<f64>,
    visibility: Option<f64>,
    uv_index: Option<f64>,
    solar_radiation: Option<f64>,
    source: String,
    fetched_at: String,
}

impl WeatherRow {
    fn into_weather(self) -> Result<Weather, StoreError> {
        Ok(Weather {
            timestamp_hour: self
                .timestamp_hour
                .parse::<DateTime<Utc>>()
                .map_err(|e| StoreError::InvalidDetection(e.to_string()))?,
            latitude: self.latitude,
            longitude: self.longitude,
            temperature: self.temperature,
            humidity: self.humidity,
            pressure: self.pressure,
            wind_speed: self.wind_speed,
            wind_direction: self.wind_direction,
            precipitation: self.precipitation,
            rain: self.rain,
            snow: self.snow,
            cloud_cover: self.cloud_cover,
            visibility: self.visibility,
            uv_index: self.uv_index,
            solar_radiation: self.solar_radiation,
            source: self.source,
            fetched_at: self
                .fetched_at
                .parse::<DateTime<Utc>>()
                .map_err(|e| StoreError::InvalidDetection(e.to_string()))?,
        })
    }
}

impl WeatherStore<'_> {
    pub fn new(pool: &SqlitePool) -> WeatherStore<'_> {
        WeatherStore { pool }
    }

    pub async fn upsert(&self, weather: &Weather) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO weather (
                timestamp_hour, latitude, longitude, temperature, humidity, pressure,
                wind_speed, wind_direction, precipitation, rain, snow, cloud_cover,
                visibility, uv_index, solar_radiation, source, fetched_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (timestamp_hour, latitude, longitude) DO UPDATE SET
                temperature = excluded.temperature,
                humidity = excluded.humidity,
                pressure = excluded.pressure,
                wind_speed = excluded.wind_speed,
                wind_direction = excluded.wind_direction,
                precipitation = excluded.precipitation,
                rain = excluded.rain,
                snow = excluded.snow,
                cloud_cover = excluded.cloud_cover,
                visibility = excluded.visibility,
                uv_index = excluded.uv_index,
                solar_radiation = excluded.solar_radiation,
                source = excluded.source,
                fetched_at = excluded.fetched_at
            "#,
        )
        .bind(weather.timestamp_hour.to_rfc3339())
        .bind(weather.latitude)
        .bind(weather.longitude)
        .bind(weather.temperature)
        .bind(weather.humidity)
        .bind(weather.pressure)
        .bind(weather.wind_speed)
        .bind(weather.wind_direction)
        .bind(weather.precipitation)
        .bind(weather.rain)
        .bind(weather.snow)
        .bind(weather.cloud_cover)
        .bind(weather.visibility)
        .bind(weather.uv_index)
        .bind(weather.solar_radiation)
        .bind(&weather.source)
        .bind(weather.fetched_at.to_rfc3339())
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// All hourly weather observations with `start <= timestamp_hour < end`,
    /// in chronological order, backing the weather/detection Pearson
    /// correlation endpoint (`spec.md` §4.5).
    pub async fn in_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<Weather>, StoreError> {
        let rows: Vec<WeatherRow> = sqlx::query_as(
            "SELECT timestamp_hour, latitude, longitude, temperature, humidity, pressure, \
             wind_speed, wind_direction, precipitation, rain, snow, cloud_cover, visibility, \
             uv_index, solar_radiation, source, fetched_at \
             FROM weather WHERE timestamp_hour >= ? AND timestamp_hour < ? ORDER BY timestamp_hour ASC",
        )
        .bind(start.to_rfc3339())
        .bind(end.to_rfc3339())
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(WeatherRow::into_weather).collect()
    }

    pub async fn get(
        &self,
        timestamp_hour: DateTime<Utc>,
        latitude: f64,
        longitude: f64,
    ) -> Result<Option<Weather>, StoreError> {
        let row: Option<WeatherRow> = sqlx::query_as(
            "SELECT timestamp_hour, latitude, longitude, temperature, humidity, pressure, \
             wind_speed, wind_direction, precipitation, rain, snow, cloud_cover, visibility, \
             uv_index, solar_radiation, source, fetched_at \
             FROM weather WHERE timestamp_hour = ? AND latitude = ? AND longitude = ?",
        )
        .bind(timestamp_hour.to_rfc3339())
        .bind(latitude)
        .bind(longitude)
        .fetch_optional(self.pool)
        .await?;

        row.map(WeatherRow::into_weather).transpose()
    }
}
