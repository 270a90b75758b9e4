//! Weather source and snapshot types.
//!
//! The per-garden job fetches a forecast once and passes the snapshot to
//! every zone job it emits, so zone analyses never call the weather API.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Current conditions at the garden.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentWeather {
    /// Air temperature, °C.
    pub temperature_c: f64,
    /// Relative humidity, %.
    pub humidity_pct: Option<f64>,
    /// Precipitation in the last hour, mm.
    pub precipitation_mm: Option<f64>,
    /// Wind speed at 10 m, km/h.
    pub wind_kph: Option<f64>,
}

/// One day of forecast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyForecast {
    /// Forecast date (local to the garden).
    pub date: NaiveDate,
    /// Maximum temperature, °C.
    pub high_c: Option<f64>,
    /// Minimum temperature, °C.
    pub low_c: Option<f64>,
    /// Total precipitation, mm.
    pub precipitation_mm: Option<f64>,
}

/// Weather as seen by the analysis: current conditions plus a few days ahead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherSnapshot {
    /// Conditions now.
    pub current: CurrentWeather,
    /// Upcoming days, earliest first.
    pub daily: Vec<DailyForecast>,
}

/// Errors from the weather source. Always recovered by the caller.
#[derive(Debug, thiserror::Error)]
pub enum WeatherError {
    /// Transport failure or non-success status.
    #[error("weather request failed: {0}")]
    Request(String),

    /// Response body did not have the expected shape.
    #[error("weather response malformed: {0}")]
    Malformed(String),
}

/// Anything that can produce a forecast for a coordinate.
#[async_trait]
pub trait WeatherSource: Send + Sync {
    /// Fetch current conditions and the daily forecast.
    async fn fetch(&self, lat: f64, lng: f64) -> Result<WeatherSnapshot, WeatherError>;
}

/// Number of forecast days requested.
const FORECAST_DAYS: u8 = 7;

const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Open-Meteo forecast API client (no API key required).
#[derive(Debug, Clone)]
pub struct OpenMeteoClient {
    base_url: String,
    client: reqwest::Client,
}

impl OpenMeteoClient {
    /// Create a client against `base_url` (e.g. `https://api.open-meteo.com`).
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
                .build()
                .unwrap_or_default(),
        }
    }
}

#[async_trait]
impl WeatherSource for OpenMeteoClient {
    async fn fetch(&self, lat: f64, lng: f64) -> Result<WeatherSnapshot, WeatherError> {
        let url = format!("{}/v1/forecast", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("latitude", lat.to_string()),
                ("longitude", lng.to_string()),
                (
                    "current",
                    "temperature_2m,relative_humidity_2m,precipitation,wind_speed_10m".to_owned(),
                ),
                (
                    "daily",
                    "temperature_2m_max,temperature_2m_min,precipitation_sum".to_owned(),
                ),
                ("timezone", "auto".to_owned()),
                ("forecast_days", FORECAST_DAYS.to_string()),
            ])
            .send()
            .await
            .map_err(|e| WeatherError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(WeatherError::Request(format!("HTTP {}", response.status())));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| WeatherError::Malformed(e.to_string()))?;
        parse_open_meteo(&body)
    }
}

/// Convert an Open-Meteo forecast response into a [`WeatherSnapshot`].
pub fn parse_open_meteo(body: &serde_json::Value) -> Result<WeatherSnapshot, WeatherError> {
    let current = body
        .get("current")
        .ok_or_else(|| WeatherError::Malformed("missing `current`".to_owned()))?;
    let temperature_c = current
        .get("temperature_2m")
        .and_then(serde_json::Value::as_f64)
        .ok_or_else(|| WeatherError::Malformed("missing current temperature".to_owned()))?;

    let current = CurrentWeather {
        temperature_c,
        humidity_pct: current
            .get("relative_humidity_2m")
            .and_then(serde_json::Value::as_f64),
        precipitation_mm: current.get("precipitation").and_then(serde_json::Value::as_f64),
        wind_kph: current.get("wind_speed_10m").and_then(serde_json::Value::as_f64),
    };

    let daily = body.get("daily");
    let series = |key: &str| -> Vec<Option<f64>> {
        daily
            .and_then(|d| d.get(key))
            .and_then(serde_json::Value::as_array)
            .map(|values| values.iter().map(serde_json::Value::as_f64).collect())
            .unwrap_or_default()
    };
    let highs = series("temperature_2m_max");
    let lows = series("temperature_2m_min");
    let rain = series("precipitation_sum");

    let dates = daily
        .and_then(|d| d.get("time"))
        .and_then(serde_json::Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut forecast = Vec::with_capacity(dates.len());
    for (i, date) in dates.iter().enumerate() {
        let Some(date) = date
            .as_str()
            .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
        else {
            return Err(WeatherError::Malformed(format!("bad daily date at {i}")));
        };
        forecast.push(DailyForecast {
            date,
            high_c: highs.get(i).copied().flatten(),
            low_c: lows.get(i).copied().flatten(),
            precipitation_mm: rain.get(i).copied().flatten(),
        });
    }

    Ok(WeatherSnapshot {
        current,
        daily: forecast,
    })
}
