//! Elevation service client for post-ride altitude correction.
//!
//! Fetches corrected elevations from the Open-Meteo elevation API in
//! batches. Unlike the wind client, a failure here is not silently
//! tolerated: the correction pass needs a complete, ordered elevation
//! series, so any batch failure or response-shape mismatch fails the whole
//! fetch and the caller keeps the original GPS altitudes.

use thiserror::Error;

/// Default Open-Meteo elevation endpoint.
const OPEN_METEO_ELEVATION_URL: &str = "https://api.open-meteo.com/v1/elevation";

/// Maximum coordinates per request, respecting API request-size limits.
pub const ELEVATION_BATCH_SIZE: usize = 200;

/// Open-Meteo elevation response.
#[derive(Debug, serde::Deserialize)]
struct ElevationResponse {
    elevation: Vec<f64>,
}

/// Elevation client backed by the Open-Meteo elevation API.
#[derive(Debug, Clone)]
pub struct ElevationClient {
    client: reqwest::Client,
    base_url: String,
    batch_size: usize,
}

impl ElevationClient {
    /// Create a new elevation client.
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: OPEN_METEO_ELEVATION_URL.to_string(),
            batch_size: ELEVATION_BATCH_SIZE,
        }
    }

    /// Create with custom base URL (for testing or self-hosted).
    pub fn with_url(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.to_string(),
            batch_size: ELEVATION_BATCH_SIZE,
        }
    }

    /// Fetch elevations for an ordered list of `(latitude, longitude)`
    /// coordinates.
    ///
    /// Batches are fetched sequentially, in order, because the results are
    /// reassembled positionally. Returns one elevation per input coordinate
    /// or the first error encountered.
    pub async fn fetch_elevations(
        &self,
        coordinates: &[(f64, f64)],
    ) -> Result<Vec<f64>, ElevationError> {
        let mut elevations = Vec::with_capacity(coordinates.len());
        let batch_count = coordinates.len().div_ceil(self.batch_size);

        for (batch_index, batch) in coordinates.chunks(self.batch_size).enumerate() {
            let latitudes = batch
                .iter()
                .map(|(lat, _)| format!("{:.5}", lat))
                .collect::<Vec<_>>()
                .join(",");
            let longitudes = batch
                .iter()
                .map(|(_, lon)| format!("{:.5}", lon))
                .collect::<Vec<_>>()
                .join(",");

            let url = format!(
                "{}?latitude={}&longitude={}",
                self.base_url, latitudes, longitudes
            );

            tracing::debug!(
                "Fetching elevation batch {}/{}",
                batch_index + 1,
                batch_count
            );

            let response = self
                .client
                .get(&url)
                .send()
                .await
                .map_err(|e| ElevationError::RequestFailed(e.to_string()))?;

            if !response.status().is_success() {
                return Err(ElevationError::RequestFailed(format!(
                    "API returned status: {}",
                    response.status()
                )));
            }

            let body: ElevationResponse = response
                .json()
                .await
                .map_err(|e| ElevationError::DecodeFailed(e.to_string()))?;

            if body.elevation.len() != batch.len() {
                return Err(ElevationError::ShapeMismatch {
                    expected: batch.len(),
                    got: body.elevation.len(),
                });
            }

            elevations.extend(body.elevation);
        }

        Ok(elevations)
    }
}

impl Default for ElevationClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors from the elevation service.
#[derive(Debug, Error)]
pub enum ElevationError {
    /// Request could not be sent or returned a failure status
    #[error("Elevation request failed: {0}")]
    RequestFailed(String),

    /// Response body was not valid elevation JSON
    #[error("Elevation response invalid: {0}")]
    DecodeFailed(String),

    /// Response length did not match the request batch
    #[error("Elevation response mismatched: expected {expected} values, got {got}")]
    ShapeMismatch { expected: usize, got: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = ElevationClient::new();
        assert!(client.base_url.contains("open-meteo"));
        assert_eq!(client.batch_size, 200);
    }

    #[test]
    fn test_custom_url() {
        let client = ElevationClient::with_url("http://localhost:8080/v1/elevation");
        assert_eq!(client.base_url, "http://localhost:8080/v1/elevation");
    }
}
