//! Wind data client.
//!
//! Fetches current wind speed and direction from the Open-Meteo forecast
//! API. Failures degrade to "wind unavailable": the ride continues and the
//! aerodynamic model falls back to its still-air form.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Default Open-Meteo forecast endpoint.
const OPEN_METEO_FORECAST_URL: &str = "https://api.open-meteo.com/v1/forecast";

/// A wind observation for the rider's current location.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindSample {
    /// Wind speed in m/s
    pub speed_ms: f64,
    /// Meteorological wind direction in degrees (where the wind blows from)
    pub direction_deg: f64,
    /// When the observation was fetched
    pub fetched_at: DateTime<Utc>,
}

/// Open-Meteo current-weather response (simplified).
#[derive(Debug, serde::Deserialize)]
struct ForecastResponse {
    current: CurrentWind,
}

#[derive(Debug, serde::Deserialize)]
struct CurrentWind {
    wind_speed_10m: f64,
    wind_direction_10m: f64,
}

/// Wind client backed by the Open-Meteo forecast API.
#[derive(Debug, Clone)]
pub struct WindClient {
    client: reqwest::Client,
    base_url: String,
}

impl WindClient {
    /// Create a new wind client.
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: OPEN_METEO_FORECAST_URL.to_string(),
        }
    }

    /// Create with custom base URL (for testing or self-hosted).
    pub fn with_url(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.to_string(),
        }
    }

    /// Fetch the current wind at a coordinate.
    ///
    /// The API reports wind speed in km/h; it is converted to m/s here.
    pub async fn fetch_wind(&self, latitude: f64, longitude: f64) -> Result<WindSample, WeatherError> {
        let url = format!(
            "{}?latitude={:.2}&longitude={:.2}&current=wind_speed_10m,wind_direction_10m&forecast_days=1",
            self.base_url, latitude, longitude
        );

        tracing::debug!("Fetching wind data from Open-Meteo");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| WeatherError::RequestFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(WeatherError::RequestFailed(format!(
                "API returned status: {}",
                response.status()
            )));
        }

        let body: ForecastResponse = response
            .json()
            .await
            .map_err(|e| WeatherError::DecodeFailed(e.to_string()))?;

        let sample = WindSample {
            speed_ms: body.current.wind_speed_10m / 3.6,
            direction_deg: body.current.wind_direction_10m,
            fetched_at: Utc::now(),
        };

        tracing::debug!(
            "Wind: {:.2} m/s from {:.0}°",
            sample.speed_ms,
            sample.direction_deg
        );

        Ok(sample)
    }
}

impl Default for WindClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors from the wind service. Never fatal to a ride.
#[derive(Debug, Error)]
pub enum WeatherError {
    /// Request could not be sent or returned a failure status
    #[error("Wind request failed: {0}")]
    RequestFailed(String),

    /// Response body did not contain the expected wind fields
    #[error("Wind response invalid: {0}")]
    DecodeFailed(String),
}
