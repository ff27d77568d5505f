//! Ride types: position samples, log entries, live metrics and summaries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle phase of a ride session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RidePhase {
    /// No ride in progress
    #[default]
    Idle,
    /// Processing ticks
    Active,
    /// Ride exists, ticks suppressed
    Paused,
}

impl std::fmt::Display for RidePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RidePhase::Idle => write!(f, "Idle"),
            RidePhase::Active => write!(f, "Active"),
            RidePhase::Paused => write!(f, "Paused"),
        }
    }
}

/// A GPS fix delivered by the position source.
///
/// Timestamps are milliseconds in one monotonic domain shared by the
/// position source and the dispatch clock.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionFix {
    /// Latitude in degrees
    pub latitude: f64,
    /// Longitude in degrees
    pub longitude: f64,
    /// Altitude in meters, if the fix carries one
    pub altitude_m: Option<f64>,
    /// Ground speed in m/s, if the fix carries one
    pub speed_ms: Option<f64>,
    /// Horizontal accuracy in meters, if reported
    pub accuracy_m: Option<f64>,
    /// Fix timestamp in milliseconds
    pub timestamp_ms: f64,
}

/// One telemetry sample fed to the tick processor.
///
/// Synthetic samples are generated by the failsafe ticker during GPS gaps;
/// they carry no position of their own; the processor substitutes the last
/// known coordinate and zero speed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PositionSample {
    /// A real fix from the position source
    Real(PositionFix),
    /// A failsafe-generated placeholder
    Synthetic {
        /// Generation time in milliseconds
        timestamp_ms: f64,
    },
}

impl PositionSample {
    /// Timestamp of the sample in milliseconds.
    pub fn timestamp_ms(&self) -> f64 {
        match self {
            PositionSample::Real(fix) => fix.timestamp_ms,
            PositionSample::Synthetic { timestamp_ms } => *timestamp_ms,
        }
    }

    /// Whether this sample was synthesized by the failsafe ticker.
    pub fn is_synthetic(&self) -> bool {
        matches!(self, PositionSample::Synthetic { .. })
    }
}

/// Where a log entry's corrected altitude came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AltitudeSource {
    /// Original GPS altitude
    Gps,
    /// Elevation service
    Api,
    /// GPS altitude kept because the API response ran short
    GpsApiShort,
    /// GPS altitude kept because the entry has no valid coordinates
    GpsInvalidCoords,
}

impl std::fmt::Display for AltitudeSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AltitudeSource::Gps => write!(f, "GPS"),
            AltitudeSource::Api => write!(f, "API"),
            AltitudeSource::GpsApiShort => write!(f, "GPS (API data short)"),
            AltitudeSource::GpsInvalidCoords => write!(f, "GPS (invalid coords)"),
        }
    }
}

/// One processed tick in the ride log, real or synthetic.
///
/// Entries are immutable once appended; the correction pass works on a full
/// copy of the log and fills in the `corrected_*` fields there.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RideLogEntry {
    /// Whole seconds of ride time elapsed when the tick was processed
    pub elapsed_seconds: u64,
    /// Raw device timestamp of the fix in milliseconds (absent for
    /// synthetic ticks)
    pub device_timestamp_ms: Option<f64>,
    /// Resolved speed in km/h
    pub speed_kmh: f64,
    /// Estimated rider power in watts (live estimate)
    pub power_watts: f64,
    /// Longitude at 5-decimal precision, if known
    pub longitude: Option<f64>,
    /// Latitude at 5-decimal precision, if known
    pub latitude: Option<f64>,
    /// Resolved altitude in meters
    pub altitude_m: f64,
    /// Gradient for the tick in percent
    pub gradient_percent: f64,
    /// Resolved cadence in RPM
    pub cadence_rpm: u16,
    /// GPS accuracy in meters, if reported
    pub gps_accuracy_m: Option<f64>,
    /// Whether this tick was synthesized by the failsafe ticker
    pub synthetic: bool,
    /// Direction of travel in degrees, if known
    pub bearing_deg: Option<f64>,
    /// Wind speed in m/s
    pub wind_speed_ms: f64,
    /// Wind direction in degrees, if known
    pub wind_direction_deg: Option<f64>,
    /// Speed reported by the dedicated sensor, if connected
    pub sensor_speed_kmh: Option<f64>,
    /// Cadence reported by the dedicated sensor, if connected
    pub sensor_cadence_rpm: Option<u16>,
    /// Wheel RPM / crank RPM, when derivable
    pub gear_ratio: Option<f64>,
    /// Altitude after elevation correction
    pub corrected_altitude_m: Option<f64>,
    /// Gradient recomputed from corrected altitudes, percent
    pub corrected_gradient_percent: Option<f64>,
    /// Power recomputed from corrected altitudes, watts
    pub corrected_power_watts: Option<f64>,
    /// Which altitude the corrected fields are based on
    pub altitude_source: Option<AltitudeSource>,
}

/// Live display aggregates, rebuilt after every tick.
#[derive(Debug, Clone, Default)]
pub struct LiveMetrics {
    /// Resolved speed of the latest tick in km/h
    pub current_speed_kmh: f64,
    /// Power estimate of the latest tick in watts
    pub current_power_watts: f64,
    /// Total distance / total elapsed hours
    pub avg_speed_kmh: f64,
    /// Mean of recorded power samples
    pub avg_power_watts: f64,
    /// Accumulated distance in km
    pub distance_km: f64,
    /// Accumulated ride time in ms
    pub elapsed_ms: u64,
    /// Resolved altitude in meters, once known
    pub altitude_m: Option<f64>,
    /// Gradient of the latest tick in percent
    pub gradient_percent: f64,
    /// Resolved cadence in RPM
    pub cadence_rpm: u16,
    /// Wheel RPM / crank RPM, when derivable
    pub gear_ratio: Option<f64>,
    /// Wind speed in m/s
    pub wind_speed_ms: f64,
    /// Wind direction in degrees, if known
    pub wind_direction_deg: Option<f64>,
}

/// Summary statistics of a finished ride.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RideSummary {
    /// Wall-clock ride start
    pub started_at: DateTime<Utc>,
    /// Wall-clock ride end
    pub ended_at: DateTime<Utc>,
    /// Total distance in km
    pub distance_km: f64,
    /// Accumulated ride time in ms (pauses excluded)
    pub elapsed_ms: u64,
    /// Total distance / total elapsed hours
    pub avg_speed_kmh: f64,
    /// Mean of recorded power samples in watts
    pub avg_power_watts: f64,
}

impl RideSummary {
    /// Elapsed ride time formatted as `hh:mm:ss`.
    pub fn elapsed_hms(&self) -> String {
        format_elapsed_hms(self.elapsed_ms)
    }
}

/// A finished ride: summary plus the finalized log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalizedRide {
    /// Summary statistics
    pub summary: RideSummary,
    /// The append-only tick log, in processing order
    pub log: Vec<RideLogEntry>,
}

/// Format a millisecond duration as `hh:mm:ss`.
pub fn format_elapsed_hms(ms: u64) -> String {
    let mut total_seconds = ms / 1000;
    let hours = total_seconds / 3600;
    total_seconds %= 3600;
    let minutes = total_seconds / 60;
    let seconds = total_seconds % 60;
    format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
}

/// Errors from ride session state transitions.
#[derive(Debug, Error)]
pub enum RideError {
    /// A ride is already in progress
    #[error("A ride is already active")]
    AlreadyActive,

    /// The operation needs an active ride
    #[error("No active ride")]
    NotActive,

    /// Resume called without a paused ride
    #[error("Ride is not paused")]
    NotPaused,
}
