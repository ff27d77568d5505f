//! Live telemetry fusion and tick processing.
//!
//! A [`RideSession`] owns all mutable ride state and is driven one event at
//! a time by the dispatcher: position samples (real or synthetic), sensor
//! events, and wind updates. Each processed position sample becomes exactly
//! one [`RideLogEntry`], so the display layer never observes a partially
//! applied tick.

use crate::config::RiderConfig;
use crate::geo;
use crate::physics::{self, TelemetrySnapshot};
use crate::ride::types::{
    FinalizedRide, LiveMetrics, PositionSample, RideError, RideLogEntry, RidePhase, RideSummary,
};
use crate::sensors::csc::CscDecoder;
use crate::sensors::types::{ConnectionState, SensorEvent};
use chrono::{DateTime, Utc};

/// Altitude assumed until the first fix that carries one, meters.
const FALLBACK_ALTITUDE_M: f64 = 100.0;

/// Deltas under this are candidates for de-duplication, seconds.
const DEDUP_WINDOW_S: f64 = 0.05;

/// Floor applied to degenerate deltas of real samples, seconds.
const MIN_REAL_TICK_S: f64 = 0.05;

/// Floor applied to degenerate deltas of synthetic samples, seconds.
const SYNTHETIC_TICK_S: f64 = 1.0;

/// Round a coordinate to the 5-decimal precision kept in the log.
fn round5(value: f64) -> f64 {
    (value * 1e5).round() / 1e5
}

/// Stateful fusion processor for one ride at a time.
pub struct RideSession {
    /// Rider configuration, immutable during the ride
    config: RiderConfig,
    /// Current lifecycle phase
    phase: RidePhase,
    /// Wall-clock ride start
    started_at: Option<DateTime<Utc>>,

    /// Accumulated distance in km
    total_distance_km: f64,
    /// Accumulated ride time in ms (pauses excluded)
    total_elapsed_ms: f64,
    /// Latest known coordinate
    current_latitude: Option<f64>,
    current_longitude: Option<f64>,
    /// Coordinate of the previous tick
    previous_latitude: Option<f64>,
    previous_longitude: Option<f64>,
    /// Resolved altitude of the latest tick
    current_altitude_m: Option<f64>,
    /// Altitude baseline for the next tick's delta
    previous_altitude_m: Option<f64>,
    /// Resolved speed of the latest tick
    current_speed_kmh: f64,
    /// Resolved cadence of the latest tick
    current_cadence_rpm: u16,
    /// Direction of travel, once derivable
    current_bearing_deg: Option<f64>,
    /// Wheel RPM / crank RPM, when derivable
    current_gear_ratio: Option<f64>,
    /// Timestamp of the previous processed sample
    previous_timestamp_ms: Option<f64>,
    /// Resolved speed of the previous tick in km/h
    previous_speed_kmh: f64,
    /// When the last sample was processed (staleness reference)
    last_processed_ms: f64,
    /// Power estimate of the latest tick
    last_power_watts: f64,
    /// Gradient of the latest tick in percent
    last_gradient_percent: f64,

    /// Current wind, refreshed periodically by the dispatcher
    wind_speed_ms: f64,
    wind_direction_deg: Option<f64>,

    /// Speed/cadence decoder fed by sensor measurements
    decoder: CscDecoder,
    /// Whether a sensor connection is currently active
    sensor_connected: bool,

    /// Power samples recorded while Active, for the running average
    power_samples: Vec<f64>,
    /// Append-only tick log
    log: Vec<RideLogEntry>,
}

impl RideSession {
    /// Create an idle session for the given rider configuration.
    pub fn new(config: RiderConfig) -> Self {
        let decoder = CscDecoder::new(config.wheel_circumference_m);
        Self {
            config,
            phase: RidePhase::Idle,
            started_at: None,
            total_distance_km: 0.0,
            total_elapsed_ms: 0.0,
            current_latitude: None,
            current_longitude: None,
            previous_latitude: None,
            previous_longitude: None,
            current_altitude_m: None,
            previous_altitude_m: None,
            current_speed_kmh: 0.0,
            current_cadence_rpm: 0,
            current_bearing_deg: None,
            current_gear_ratio: None,
            previous_timestamp_ms: None,
            previous_speed_kmh: 0.0,
            last_processed_ms: 0.0,
            last_power_watts: 0.0,
            last_gradient_percent: 0.0,
            wind_speed_ms: 0.0,
            wind_direction_deg: None,
            decoder,
            sensor_connected: false,
            power_samples: Vec::new(),
            log: Vec::new(),
        }
    }

    /// Start a new ride, zeroing all ride state.
    ///
    /// Sensor connection state survives across rides; only ride-scoped
    /// state is reset.
    pub fn start(&mut self, now_ms: f64) -> Result<(), RideError> {
        if self.phase != RidePhase::Idle {
            return Err(RideError::AlreadyActive);
        }

        self.total_distance_km = 0.0;
        self.total_elapsed_ms = 0.0;
        self.current_latitude = None;
        self.current_longitude = None;
        self.previous_latitude = None;
        self.previous_longitude = None;
        self.current_altitude_m = None;
        self.previous_altitude_m = None;
        self.current_speed_kmh = 0.0;
        self.current_cadence_rpm = self.config.default_cadence_rpm;
        self.current_bearing_deg = None;
        self.current_gear_ratio = None;
        self.previous_timestamp_ms = None;
        self.previous_speed_kmh = 0.0;
        self.last_processed_ms = now_ms;
        self.last_power_watts = 0.0;
        self.last_gradient_percent = 0.0;
        self.wind_speed_ms = 0.0;
        self.wind_direction_deg = None;
        self.power_samples.clear();
        self.log.clear();

        self.started_at = Some(Utc::now());
        self.phase = RidePhase::Active;
        tracing::info!("Ride started");
        Ok(())
    }

    /// Pause the ride. Samples arriving while paused are dropped.
    pub fn pause(&mut self) -> Result<(), RideError> {
        if self.phase != RidePhase::Active {
            return Err(RideError::NotActive);
        }
        self.phase = RidePhase::Paused;
        tracing::info!("Ride paused");
        Ok(())
    }

    /// Resume a paused ride.
    ///
    /// Re-anchors the time-delta baseline to `now_ms` so the paused gap is
    /// not counted as elapsed time or distance.
    pub fn resume(&mut self, now_ms: f64) -> Result<(), RideError> {
        if self.phase != RidePhase::Paused {
            return Err(RideError::NotPaused);
        }
        self.previous_timestamp_ms = Some(now_ms);
        self.last_processed_ms = now_ms;
        self.phase = RidePhase::Active;
        tracing::info!("Ride resumed");
        Ok(())
    }

    /// Stop the ride, freezing the log into a [`FinalizedRide`].
    pub fn stop(&mut self) -> Result<FinalizedRide, RideError> {
        if self.phase == RidePhase::Idle {
            return Err(RideError::NotActive);
        }

        let summary = RideSummary {
            started_at: self.started_at.take().unwrap_or_else(Utc::now),
            ended_at: Utc::now(),
            distance_km: self.total_distance_km,
            elapsed_ms: self.total_elapsed_ms as u64,
            avg_speed_kmh: self.average_speed_kmh(),
            avg_power_watts: self.average_power_watts(),
        };

        let log = std::mem::take(&mut self.log);
        self.power_samples.clear();
        self.phase = RidePhase::Idle;

        tracing::info!(
            "Ride stopped: {:.2} km in {}, avg {:.0} W",
            summary.distance_km,
            summary.elapsed_hms(),
            summary.avg_power_watts
        );

        Ok(FinalizedRide { summary, log })
    }

    /// Process one position sample through the full tick pipeline.
    ///
    /// Does nothing unless the ride is Active; paused samples are dropped,
    /// not queued.
    pub fn process_position(&mut self, sample: &PositionSample) {
        if self.phase != RidePhase::Active {
            return;
        }

        let timestamp_ms = sample.timestamp_ms();
        self.last_processed_ms = timestamp_ms;

        let is_first = self.previous_timestamp_ms.is_none();
        let mut time_delta_s = match self.previous_timestamp_ms {
            Some(previous_ms) => (timestamp_ms - previous_ms) / 1000.0,
            None => 0.0,
        };

        // Redundant position callbacks: a sub-50ms non-synthetic sample that
        // is bit-identical to the previous one is dropped, but its timestamp
        // is still remembered.
        if !is_first && time_delta_s < DEDUP_WINDOW_S {
            if let PositionSample::Real(fix) = sample {
                let fix_speed_kmh = fix.speed_ms.map(|s| s * 3.6).unwrap_or(0.0);
                if Some(fix.latitude) == self.current_latitude
                    && Some(fix.longitude) == self.current_longitude
                    && fix.altitude_m == self.current_altitude_m
                    && fix_speed_kmh == self.current_speed_kmh
                {
                    self.previous_timestamp_ms = Some(timestamp_ms);
                    return;
                }
            }
        }

        // Degenerate deltas: distinct real samples are floored to 50 ms,
        // synthetic ones to a full second. The very first sample keeps a
        // zero delta so it contributes no elapsed time.
        if !is_first {
            if sample.is_synthetic() {
                if time_delta_s <= 0.0 {
                    time_delta_s = SYNTHETIC_TICK_S;
                }
            } else if time_delta_s < MIN_REAL_TICK_S {
                time_delta_s = MIN_REAL_TICK_S;
            }
        }

        if time_delta_s > 0.0 {
            self.total_elapsed_ms += time_delta_s * 1000.0;
        }
        self.previous_timestamp_ms = Some(timestamp_ms);

        // Synthetic ticks carry no position of their own: substitute the
        // last known coordinate and zero speed.
        let (new_latitude, new_longitude, new_altitude, gps_speed_ms, accuracy_m, device_ts) =
            match sample {
                PositionSample::Real(fix) => (
                    Some(fix.latitude),
                    Some(fix.longitude),
                    fix.altitude_m,
                    fix.speed_ms.unwrap_or(0.0),
                    fix.accuracy_m,
                    Some(fix.timestamp_ms),
                ),
                PositionSample::Synthetic { .. } => (
                    self.current_latitude,
                    self.current_longitude,
                    self.current_altitude_m,
                    0.0,
                    None,
                    None,
                ),
            };

        // Bearing from the previous point to the new one, only when both
        // exist and differ.
        if let (Some(cur_lat), Some(cur_lon), Some(new_lat), Some(new_lon)) = (
            self.current_latitude,
            self.current_longitude,
            new_latitude,
            new_longitude,
        ) {
            if new_lat != cur_lat || new_lon != cur_lon {
                self.current_bearing_deg =
                    Some(geo::initial_bearing_deg(cur_lat, cur_lon, new_lat, new_lon));
            }
        }

        if new_latitude.is_some() {
            self.current_latitude = new_latitude;
        }
        if new_longitude.is_some() {
            self.current_longitude = new_longitude;
        }

        // Altitude: the first fix that carries one seeds the baseline; the
        // current value falls back to the last known, then to a constant.
        if self.previous_altitude_m.is_none() && new_altitude.is_some() {
            self.previous_altitude_m = new_altitude;
        }
        self.current_altitude_m = Some(
            new_altitude
                .or(self.current_altitude_m)
                .unwrap_or(FALLBACK_ALTITUDE_M),
        );

        // Speed: a connected dedicated sensor overrides GPS.
        let sensor_speed_kmh = if self.sensor_connected {
            self.decoder.speed_kmh()
        } else {
            None
        };
        self.current_speed_kmh = sensor_speed_kmh.unwrap_or(gps_speed_ms * 3.6).max(0.0);

        // Cadence: sensor first, then the configured default while moving.
        let sensor_cadence_rpm = if self.sensor_connected {
            self.decoder.cadence_rpm()
        } else {
            None
        };
        let cadence = match sensor_cadence_rpm {
            Some(rpm) => rpm,
            None if self.current_speed_kmh > 1.0 => self.config.default_cadence_rpm as f64,
            None => 0.0,
        };
        self.current_cadence_rpm = cadence.round().max(0.0) as u16;

        // Gear ratio = wheel RPM / crank RPM.
        self.current_gear_ratio = if self.current_cadence_rpm > 5
            && self.current_speed_kmh > 0.1
            && self.config.wheel_circumference_m > 0.0
        {
            let speed_ms = self.current_speed_kmh / 3.6;
            let wheel_rpm = speed_ms / self.config.wheel_circumference_m * 60.0;
            Some(wheel_rpm / self.current_cadence_rpm as f64)
        } else {
            None
        };

        if time_delta_s > 0.0 {
            self.total_distance_km += (self.current_speed_kmh / 3600.0) * time_delta_s;
        }

        if self.current_latitude.is_some() {
            self.previous_latitude = self.current_latitude;
        }
        if self.current_longitude.is_some() {
            self.previous_longitude = self.current_longitude;
        }

        let snapshot = TelemetrySnapshot {
            speed_kmh: self.current_speed_kmh,
            previous_speed_kmh: self.previous_speed_kmh,
            altitude_m: self.current_altitude_m,
            previous_altitude_m: self.previous_altitude_m.or(self.current_altitude_m),
            cadence_rpm: self.current_cadence_rpm,
            time_delta_s: if time_delta_s > 0.0 { time_delta_s } else { 1.0 },
            bearing_deg: self.current_bearing_deg,
            wind_speed_ms: self.wind_speed_ms,
            wind_direction_deg: self.wind_direction_deg,
        };
        let estimate = physics::total_power(&snapshot, &self.config);

        self.previous_speed_kmh = self.current_speed_kmh;
        match sample {
            PositionSample::Real(fix) => {
                if fix.altitude_m.is_some() {
                    self.previous_altitude_m = fix.altitude_m;
                }
            }
            PositionSample::Synthetic { .. } => {
                self.previous_altitude_m = self.current_altitude_m;
            }
        }

        self.power_samples.push(estimate.power_watts);
        self.last_power_watts = estimate.power_watts;
        self.last_gradient_percent = estimate.gradient_percent;

        self.log.push(RideLogEntry {
            elapsed_seconds: (self.total_elapsed_ms / 1000.0).floor() as u64,
            device_timestamp_ms: device_ts,
            speed_kmh: self.current_speed_kmh,
            power_watts: estimate.power_watts.round(),
            longitude: self.current_longitude.map(round5),
            latitude: self.current_latitude.map(round5),
            altitude_m: self.current_altitude_m.unwrap_or(FALLBACK_ALTITUDE_M),
            gradient_percent: estimate.gradient_percent,
            cadence_rpm: self.current_cadence_rpm,
            gps_accuracy_m: accuracy_m,
            synthetic: sample.is_synthetic(),
            bearing_deg: self.current_bearing_deg,
            wind_speed_ms: self.wind_speed_ms,
            wind_direction_deg: self.wind_direction_deg,
            sensor_speed_kmh,
            sensor_cadence_rpm: sensor_cadence_rpm.map(|rpm| rpm.round().max(0.0) as u16),
            gear_ratio: self.current_gear_ratio,
            corrected_altitude_m: None,
            corrected_gradient_percent: None,
            corrected_power_watts: None,
            altitude_source: None,
        });
    }

    /// Apply a sensor event: measurements feed the decoder, disconnects
    /// reset it so reconnects cannot pair stale counters.
    pub fn handle_sensor_event(&mut self, event: &SensorEvent) {
        match event {
            SensorEvent::Measurement(measurement) => self.decoder.update(measurement),
            SensorEvent::ConnectionChanged { device_id, state } => match state {
                ConnectionState::Connected => {
                    self.sensor_connected = true;
                    tracing::info!("Speed/cadence sensor connected: {}", device_id);
                }
                ConnectionState::Disconnected => {
                    self.sensor_connected = false;
                    self.decoder.reset();
                    tracing::info!("Speed/cadence sensor disconnected: {}", device_id);
                }
                ConnectionState::Connecting => {}
            },
            SensorEvent::Error(message) => {
                tracing::warn!("Sensor error (ride continues on GPS): {}", message);
            }
            SensorEvent::Discovered(sensor) => {
                tracing::debug!("Discovered CSC sensor: {}", sensor.name);
            }
            SensorEvent::ScanStarted | SensorEvent::ScanStopped => {}
        }
    }

    /// Update current wind data.
    pub fn set_wind(&mut self, speed_ms: f64, direction_deg: Option<f64>) {
        self.wind_speed_ms = speed_ms;
        self.wind_direction_deg = direction_deg;
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> RidePhase {
        self.phase
    }

    /// When the last sample was processed, for staleness detection.
    pub fn last_processed_ms(&self) -> f64 {
        self.last_processed_ms
    }

    /// Latest known coordinate, if any.
    pub fn current_coordinates(&self) -> Option<(f64, f64)> {
        match (self.current_latitude, self.current_longitude) {
            (Some(lat), Some(lon)) => Some((lat, lon)),
            _ => None,
        }
    }

    /// The tick log recorded so far.
    pub fn log(&self) -> &[RideLogEntry] {
        &self.log
    }

    /// Live display aggregates for the latest tick.
    pub fn live_metrics(&self) -> LiveMetrics {
        LiveMetrics {
            current_speed_kmh: self.current_speed_kmh,
            current_power_watts: self.last_power_watts,
            avg_speed_kmh: self.average_speed_kmh(),
            avg_power_watts: self.average_power_watts(),
            distance_km: self.total_distance_km,
            elapsed_ms: self.total_elapsed_ms as u64,
            altitude_m: self.current_altitude_m,
            gradient_percent: self.last_gradient_percent,
            cadence_rpm: self.current_cadence_rpm,
            gear_ratio: self.current_gear_ratio,
            wind_speed_ms: self.wind_speed_ms,
            wind_direction_deg: self.wind_direction_deg,
        }
    }

    fn average_speed_kmh(&self) -> f64 {
        if self.total_elapsed_ms > 0.0 {
            self.total_distance_km / (self.total_elapsed_ms / 3_600_000.0)
        } else {
            0.0
        }
    }

    fn average_power_watts(&self) -> f64 {
        if self.power_samples.is_empty() {
            0.0
        } else {
            self.power_samples.iter().sum::<f64>() / self.power_samples.len() as f64
        }
    }
}
