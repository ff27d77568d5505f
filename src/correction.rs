//! Post-ride elevation correction and power recomputation.
//!
//! Two-step batch operation over a finalized ride log: fetch corrected
//! altitudes for every entry with valid coordinates, then replay the log in
//! order, recomputing gradient and power per tick with the *same* physics
//! model as the live path, plus aggregate ascent/descent. The pass operates
//! on a copy (the live log is never mutated) and is all-or-nothing: any
//! elevation fetch failure leaves the caller with the original GPS data.

use crate::config::RiderConfig;
use crate::integrations::elevation::{ElevationClient, ElevationError};
use crate::physics::{self, TelemetrySnapshot};
use crate::ride::types::{AltitudeSource, RideLogEntry};
use thiserror::Error;

/// Time delta assumed when consecutive entries share a timestamp, seconds.
const EQUAL_TIMESTAMP_DELTA_S: f64 = 0.1;

/// Aggregate results of a correction pass.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrectionSummary {
    /// Sum of positive corrected altitude deltas, meters
    pub total_ascent_m: f64,
    /// Sum of negative corrected altitude deltas, meters (positive value)
    pub total_descent_m: f64,
    /// Mean of the recomputed per-tick powers, watts
    pub avg_power_watts: f64,
}

/// A corrected ride log with its summary.
#[derive(Debug, Clone)]
pub struct CorrectedRide {
    /// Parallel copy of the log with `corrected_*` fields populated
    pub log: Vec<RideLogEntry>,
    /// Aggregate ascent/descent and corrected average power
    pub summary: CorrectionSummary,
}

/// Errors that abort the correction pass.
///
/// Correction is all-or-nothing: on any error the caller keeps the
/// original, uncorrected log.
#[derive(Debug, Error)]
pub enum CorrectionError {
    /// The ride log contains no entries
    #[error("Ride log is empty")]
    EmptyLog,

    /// No log entry carries valid coordinates
    #[error("No log entries with valid coordinates")]
    NoValidCoordinates,

    /// The elevation service failed or returned a mismatched response
    #[error(transparent)]
    Elevation(#[from] ElevationError),
}

/// Round to the 0.1 m precision kept for corrected altitudes.
fn round_decimeter(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Correct a finalized ride log against the elevation service.
///
/// Fetches revised altitudes for every entry with valid coordinates
/// (batched inside the client), then recomputes gradient, power and
/// ascent/descent. The input log is left untouched.
pub async fn correct_ride(
    log: &[RideLogEntry],
    elevation_client: &ElevationClient,
    config: &RiderConfig,
) -> Result<CorrectedRide, CorrectionError> {
    if log.is_empty() {
        return Err(CorrectionError::EmptyLog);
    }

    let coordinates: Vec<(f64, f64)> = log
        .iter()
        .filter_map(|entry| match (entry.latitude, entry.longitude) {
            (Some(lat), Some(lon)) => Some((lat, lon)),
            _ => None,
        })
        .collect();

    if coordinates.is_empty() {
        return Err(CorrectionError::NoValidCoordinates);
    }

    tracing::info!(
        "Correcting elevations for {} of {} log entries",
        coordinates.len(),
        log.len()
    );

    let elevations = elevation_client.fetch_elevations(&coordinates).await?;

    let corrected = apply_corrected_elevations(log, &elevations);
    Ok(recompute_with_corrected_altitudes(corrected, config))
}

/// Attach fetched elevations to a copy of the log, in order.
///
/// Entries without valid coordinates, and entries beyond the end of a short
/// elevation series, keep their GPS altitude with the matching source tag.
pub fn apply_corrected_elevations(
    log: &[RideLogEntry],
    elevations: &[f64],
) -> Vec<RideLogEntry> {
    let mut corrected: Vec<RideLogEntry> = log.to_vec();
    let mut elevation_index = 0usize;

    for entry in corrected.iter_mut() {
        if entry.latitude.is_some() && entry.longitude.is_some() {
            if elevation_index < elevations.len() {
                entry.corrected_altitude_m = Some(round_decimeter(elevations[elevation_index]));
                entry.altitude_source = Some(AltitudeSource::Api);
                elevation_index += 1;
            } else {
                entry.corrected_altitude_m = Some(entry.altitude_m);
                entry.altitude_source = Some(AltitudeSource::GpsApiShort);
            }
        } else {
            entry.corrected_altitude_m = Some(entry.altitude_m);
            entry.altitude_source = Some(AltitudeSource::GpsInvalidCoords);
        }
    }

    corrected
}

/// Replay the corrected log through the physics model.
///
/// Walks the entries in order: time delta comes from consecutive logged
/// elapsed seconds (0.1 s when two entries share a timestamp, so the delta
/// is never zero or negative), altitude change from corrected altitudes,
/// and gradient/power from the identical derivation and clamp rules as the
/// live path. The first entry has no predecessor, so its previous altitude
/// is itself.
pub fn recompute_with_corrected_altitudes(
    mut log: Vec<RideLogEntry>,
    config: &RiderConfig,
) -> CorrectedRide {
    let mut power_readings: Vec<f64> = Vec::with_capacity(log.len());
    let mut total_ascent_m = 0.0;
    let mut total_descent_m = 0.0;

    for i in 0..log.len() {
        let current_alt = log[i].corrected_altitude_m.unwrap_or(log[i].altitude_m);

        let (previous_alt, time_delta_s) = if i == 0 {
            (current_alt, 1.0)
        } else {
            let previous_alt = log[i - 1]
                .corrected_altitude_m
                .unwrap_or(log[i - 1].altitude_m);
            let time_delta_s = if log[i].elapsed_seconds > log[i - 1].elapsed_seconds {
                (log[i].elapsed_seconds - log[i - 1].elapsed_seconds) as f64
            } else {
                EQUAL_TIMESTAMP_DELTA_S
            };
            (previous_alt, time_delta_s)
        };

        let altitude_change_m = current_alt - previous_alt;
        if i > 0 {
            if altitude_change_m > 0.0 {
                total_ascent_m += altitude_change_m;
            } else {
                total_descent_m += altitude_change_m.abs();
            }
        }

        let previous_speed_kmh = if i > 0 {
            log[i - 1].speed_kmh
        } else {
            log[i].speed_kmh
        };

        let snapshot = TelemetrySnapshot {
            speed_kmh: log[i].speed_kmh,
            previous_speed_kmh,
            altitude_m: Some(current_alt),
            previous_altitude_m: Some(previous_alt),
            cadence_rpm: log[i].cadence_rpm,
            time_delta_s,
            bearing_deg: log[i].bearing_deg,
            wind_speed_ms: log[i].wind_speed_ms,
            wind_direction_deg: log[i].wind_direction_deg,
        };
        let estimate = physics::total_power(&snapshot, config);

        log[i].corrected_gradient_percent = Some(estimate.gradient_percent);
        log[i].corrected_power_watts = Some(estimate.power_watts.round());
        power_readings.push(estimate.power_watts);
    }

    let avg_power_watts = if power_readings.is_empty() {
        0.0
    } else {
        power_readings.iter().sum::<f64>() / power_readings.len() as f64
    };

    tracing::info!(
        "Recomputation complete: ascent {:.1} m, descent {:.1} m, avg {:.0} W",
        total_ascent_m,
        total_descent_m,
        avg_power_watts
    );

    CorrectedRide {
        log,
        summary: CorrectionSummary {
            total_ascent_m,
            total_descent_m,
            avg_power_watts,
        },
    }
}
