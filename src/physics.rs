//! Power estimation physics model.
//!
//! Estimates rider power output from a single telemetry snapshot using four
//! independent terms: rolling resistance, aerodynamic drag with wind-vector
//! composition, gravity, and kinetic (acceleration). The model is a pure
//! function of the snapshot and the rider configuration; the same functions
//! serve both the live tick processor and the post-ride correction pass, so
//! a corrected replay reproduces the live formulas exactly.

use crate::config::RiderConfig;
use crate::geo::deg_to_rad;

/// Gravitational acceleration, m/s²
pub const GRAVITY: f64 = 9.80665;

/// Gradient clamp bound as a decimal slope (±30%)
pub const MAX_GRADIENT: f64 = 0.30;

/// Minimum horizontal distance per tick before the gradient degenerates, m
const MIN_HORIZONTAL_DISTANCE_M: f64 = 0.01;

/// Minimum altitude change recognized in the degenerate gradient case, m
const MIN_ALTITUDE_CHANGE_M: f64 = 0.001;

/// One telemetry sample with everything the power model needs.
///
/// Rebuilt on every tick by the fusion processor. All speed and altitude
/// values are post-precedence-resolution: a connected speed/cadence sensor
/// overrides GPS-derived values before the snapshot is built.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetrySnapshot {
    /// Resolved speed in km/h
    pub speed_kmh: f64,
    /// Resolved speed of the previous tick in km/h
    pub previous_speed_kmh: f64,
    /// Resolved altitude in meters
    pub altitude_m: Option<f64>,
    /// Resolved altitude of the previous tick in meters
    pub previous_altitude_m: Option<f64>,
    /// Resolved cadence in RPM
    pub cadence_rpm: u16,
    /// Time since the previous processed tick in seconds, always > 0
    pub time_delta_s: f64,
    /// Direction of travel in degrees, if known
    pub bearing_deg: Option<f64>,
    /// Wind speed in m/s
    pub wind_speed_ms: f64,
    /// Meteorological wind direction in degrees (direction the wind blows
    /// *from*), if known
    pub wind_direction_deg: Option<f64>,
}

/// Result of a full power computation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PowerEstimate {
    /// Estimated rider power output in watts, never negative
    pub power_watts: f64,
    /// Gradient for the tick in percent, clamped to ±30
    pub gradient_percent: f64,
}

/// Power absorbed by rolling resistance, watts.
///
/// Zero below 0.1 m/s. The normal force uses `cos(atan(gradient))`,
/// computed as `1/sqrt(1 + gradient²)`; `gradient` is a decimal slope.
pub fn rolling_resistance_power(speed_ms: f64, mass_kg: f64, crr: f64, gradient: f64) -> f64 {
    if speed_ms < 0.1 {
        return 0.0;
    }
    let cos_theta = 1.0 / (1.0 + gradient * gradient).sqrt();
    let normal_force = mass_kg * GRAVITY * cos_theta;
    crr * normal_force * speed_ms
}

/// Power absorbed by aerodynamic drag, watts.
///
/// Composes the bike velocity vector (from speed + bearing) with the wind
/// velocity vector (wind blows toward `direction + 180°`) and evaluates
/// `0.5 * rho * CdA * |v_app| * (v_app · v_bike)`. When bearing or wind
/// direction is unknown, or the wind is negligible, falls back to the
/// still-air `0.5 * rho * CdA * v³` form. The dot-product form can go
/// negative with a tailwind; the sign is kept here and only clamped at the
/// aggregate level.
pub fn aerodynamic_power(
    bike_speed_ms: f64,
    bike_bearing_deg: Option<f64>,
    wind_speed_ms: f64,
    wind_direction_deg: Option<f64>,
    cda_m2: f64,
    air_density_kgm3: f64,
) -> f64 {
    if bike_speed_ms < 0.01 && wind_speed_ms < 0.1 {
        return 0.0;
    }

    let (bearing_deg, wind_dir_deg) = match (bike_bearing_deg, wind_direction_deg) {
        (Some(b), Some(w)) if wind_speed_ms >= 0.01 => (b, w),
        _ => {
            return 0.5 * air_density_kgm3 * cda_m2 * bike_speed_ms.powi(3);
        }
    };

    let bearing_rad = deg_to_rad(bearing_deg);
    let v_bike_x = bike_speed_ms * bearing_rad.sin();
    let v_bike_y = bike_speed_ms * bearing_rad.cos();

    // Reported direction is where the wind comes from; it blows toward the
    // reciprocal heading.
    let wind_blows_to_rad = deg_to_rad((wind_dir_deg + 180.0) % 360.0);
    let v_wind_x = wind_speed_ms * wind_blows_to_rad.sin();
    let v_wind_y = wind_speed_ms * wind_blows_to_rad.cos();

    let v_app_x = v_bike_x - v_wind_x;
    let v_app_y = v_bike_y - v_wind_y;
    let v_app_magnitude = (v_app_x * v_app_x + v_app_y * v_app_y).sqrt();
    if v_app_magnitude < 0.01 {
        return 0.0;
    }

    let dot_app_bike = v_app_x * v_bike_x + v_app_y * v_bike_y;
    0.5 * air_density_kgm3 * cda_m2 * v_app_magnitude * dot_app_bike
}

/// Power against (or from) gravity, watts. Signed: descending is negative.
pub fn gravity_power(mass_kg: f64, altitude_change_m: f64, time_delta_s: f64) -> f64 {
    if time_delta_s <= 0.0 {
        return 0.0;
    }
    let vertical_speed_ms = altitude_change_m / time_delta_s;
    mass_kg * GRAVITY * vertical_speed_ms
}

/// Rate of change of kinetic energy, watts. Signed: decelerating is negative.
pub fn kinetic_power(
    mass_kg: f64,
    speed_ms: f64,
    previous_speed_ms: f64,
    time_delta_s: f64,
) -> f64 {
    if time_delta_s <= 0.0 {
        return 0.0;
    }
    let kinetic_energy_change =
        0.5 * mass_kg * (speed_ms * speed_ms - previous_speed_ms * previous_speed_ms);
    kinetic_energy_change / time_delta_s
}

/// Estimate total rider power output for one tick.
///
/// Derives the gradient from the altitude change over the horizontal
/// distance travelled during the tick (average of current and previous
/// speed times the time delta). When the horizontal distance is negligible
/// but the altitude still changed meaningfully, the gradient degenerates to
/// ±30% by the sign of the altitude change; it is always clamped to ±30%.
///
/// A cadence of zero forces the result to zero: coasting attributes no
/// pedaling power to the rider even when the terms sum positive. Otherwise
/// negative totals clamp to zero.
pub fn total_power(snapshot: &TelemetrySnapshot, config: &RiderConfig) -> PowerEstimate {
    let speed_ms = snapshot.speed_kmh / 3.6;
    let prev_speed_ms = snapshot.previous_speed_kmh / 3.6;
    let time_delta_s = snapshot.time_delta_s;

    let current_alt = snapshot
        .altitude_m
        .or(snapshot.previous_altitude_m)
        .unwrap_or(0.0);
    let prev_alt = snapshot.previous_altitude_m.unwrap_or(current_alt);
    let altitude_change_m = current_alt - prev_alt;

    let avg_speed_ms = (speed_ms + prev_speed_ms) / 2.0;
    let horizontal_distance_m = avg_speed_ms * time_delta_s;

    let mut gradient = 0.0;
    if horizontal_distance_m.abs() > MIN_HORIZONTAL_DISTANCE_M && time_delta_s > 0.0 {
        gradient = altitude_change_m / horizontal_distance_m;
    } else if altitude_change_m.abs() > MIN_ALTITUDE_CHANGE_M && time_delta_s > 0.0 {
        // Climbing in place: no horizontal movement but a real altitude
        // change resolves to the clamp bound by sign.
        gradient = if altitude_change_m > 0.0 {
            MAX_GRADIENT
        } else {
            -MAX_GRADIENT
        };
    }
    gradient = gradient.clamp(-MAX_GRADIENT, MAX_GRADIENT);

    let p_rolling =
        rolling_resistance_power(speed_ms, config.system_mass_kg, config.crr, gradient);
    let p_aero = aerodynamic_power(
        speed_ms,
        snapshot.bearing_deg,
        snapshot.wind_speed_ms,
        snapshot.wind_direction_deg,
        config.cda_m2,
        config.air_density_kgm3,
    );
    let p_gravity = gravity_power(config.system_mass_kg, altitude_change_m, time_delta_s);
    let p_kinetic = kinetic_power(config.system_mass_kg, speed_ms, prev_speed_ms, time_delta_s);

    let system_power = p_rolling + p_aero + p_gravity + p_kinetic;

    let rider_power = if snapshot.cadence_rpm == 0 {
        0.0
    } else {
        system_power.max(0.0)
    };

    PowerEstimate {
        power_watts: rider_power,
        gradient_percent: gradient * 100.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> RiderConfig {
        RiderConfig {
            system_mass_kg: 75.0,
            wheel_circumference_m: 2.105,
            crr: 0.005,
            cda_m2: 0.320,
            air_density_kgm3: 1.225,
            default_cadence_rpm: 80,
        }
    }

    fn flat_snapshot(speed_kmh: f64, cadence_rpm: u16) -> TelemetrySnapshot {
        TelemetrySnapshot {
            speed_kmh,
            previous_speed_kmh: speed_kmh,
            altitude_m: Some(100.0),
            previous_altitude_m: Some(100.0),
            cadence_rpm,
            time_delta_s: 1.0,
            bearing_deg: None,
            wind_speed_ms: 0.0,
            wind_direction_deg: None,
        }
    }

    #[test]
    fn test_rolling_power_zero_below_threshold() {
        assert_eq!(rolling_resistance_power(0.05, 75.0, 0.005, 0.0), 0.0);
        assert_eq!(rolling_resistance_power(0.05, 75.0, 0.005, 0.30), 0.0);
        assert_eq!(rolling_resistance_power(0.05, 75.0, 0.005, -0.30), 0.0);
    }

    #[test]
    fn test_rolling_power_flat_road() {
        // crr * m * g * v on a flat road
        let p = rolling_resistance_power(8.0, 75.0, 0.005, 0.0);
        let expected = 0.005 * 75.0 * GRAVITY * 8.0;
        assert!((p - expected).abs() < 1e-9);
    }

    #[test]
    fn test_rolling_power_gradient_reduces_normal_force() {
        let flat = rolling_resistance_power(8.0, 75.0, 0.005, 0.0);
        let steep = rolling_resistance_power(8.0, 75.0, 0.005, 0.30);
        assert!(steep < flat);
    }

    #[test]
    fn test_aero_power_still_air_fallback() {
        // Unknown wind direction falls back to the cubic form
        let p = aerodynamic_power(10.0, Some(90.0), 5.0, None, 0.320, 1.225);
        let expected = 0.5 * 1.225 * 0.320 * 10.0_f64.powi(3);
        assert!((p - expected).abs() < 1e-9);
    }

    #[test]
    fn test_aero_power_negligible_motion() {
        assert_eq!(aerodynamic_power(0.005, Some(0.0), 0.05, Some(180.0), 0.320, 1.225), 0.0);
    }

    #[test]
    fn test_aero_power_headwind_exceeds_still_air() {
        // Riding north into a wind reported from the north (blowing south)
        let still = aerodynamic_power(10.0, Some(0.0), 0.0, None, 0.320, 1.225);
        let head = aerodynamic_power(10.0, Some(0.0), 5.0, Some(0.0), 0.320, 1.225);
        assert!(head > still, "headwind {} <= still air {}", head, still);
    }

    #[test]
    fn test_aero_power_tailwind_can_go_negative() {
        // Riding north with a strong wind reported from the south
        let p = aerodynamic_power(3.0, Some(0.0), 10.0, Some(180.0), 0.320, 1.225);
        assert!(p < 0.0, "tailwind aero power was {}", p);
    }

    #[test]
    fn test_aero_power_matched_tailwind_is_zero() {
        // Apparent wind magnitude below threshold
        let p = aerodynamic_power(5.0, Some(0.0), 5.0, Some(180.0), 0.320, 1.225);
        assert_eq!(p, 0.0);
    }

    #[test]
    fn test_gravity_power_signs() {
        assert!(gravity_power(75.0, 2.0, 1.0) > 0.0);
        assert!(gravity_power(75.0, -2.0, 1.0) < 0.0);
        assert_eq!(gravity_power(75.0, 2.0, 0.0), 0.0);
    }

    #[test]
    fn test_kinetic_power_signs() {
        assert!(kinetic_power(75.0, 10.0, 8.0, 1.0) > 0.0);
        assert!(kinetic_power(75.0, 8.0, 10.0, 1.0) < 0.0);
        assert_eq!(kinetic_power(75.0, 10.0, 8.0, 0.0), 0.0);
    }

    #[test]
    fn test_total_power_zero_cadence_forces_zero() {
        let mut snapshot = flat_snapshot(20.0, 0);
        // Climbing hard: the four terms sum well above zero
        snapshot.altitude_m = Some(105.0);
        let estimate = total_power(&snapshot, &test_config());
        assert_eq!(estimate.power_watts, 0.0);
    }

    #[test]
    fn test_total_power_negative_total_clamps_to_zero() {
        let mut snapshot = flat_snapshot(20.0, 80);
        // Steep descent swamps the resistive terms
        snapshot.altitude_m = Some(80.0);
        let estimate = total_power(&snapshot, &test_config());
        assert_eq!(estimate.power_watts, 0.0);
    }

    #[test]
    fn test_total_power_gradient_clamped() {
        let mut snapshot = flat_snapshot(20.0, 80);
        snapshot.altitude_m = Some(150.0);
        snapshot.time_delta_s = 1.0;
        let estimate = total_power(&snapshot, &test_config());
        assert_eq!(estimate.gradient_percent, 30.0);

        snapshot.altitude_m = Some(50.0);
        let estimate = total_power(&snapshot, &test_config());
        assert_eq!(estimate.gradient_percent, -30.0);
    }

    #[test]
    fn test_total_power_degenerate_gradient_stationary_climb() {
        let snapshot = TelemetrySnapshot {
            speed_kmh: 0.0,
            previous_speed_kmh: 0.0,
            altitude_m: Some(100.5),
            previous_altitude_m: Some(100.0),
            cadence_rpm: 0,
            time_delta_s: 1.0,
            bearing_deg: None,
            wind_speed_ms: 0.0,
            wind_direction_deg: None,
        };
        let estimate = total_power(&snapshot, &test_config());
        assert_eq!(estimate.gradient_percent, 30.0);

        let snapshot = TelemetrySnapshot {
            altitude_m: Some(99.5),
            ..snapshot
        };
        let estimate = total_power(&snapshot, &test_config());
        assert_eq!(estimate.gradient_percent, -30.0);
    }

    #[test]
    fn test_total_power_flat_steady_state() {
        let estimate = total_power(&flat_snapshot(30.0, 90), &test_config());
        // 30 km/h on the flat in still air: rolling + aero only,
        // roughly 115 W for these parameters
        assert!(
            estimate.power_watts > 80.0 && estimate.power_watts < 160.0,
            "power was {} W",
            estimate.power_watts
        );
        assert_eq!(estimate.gradient_percent, 0.0);
    }

    #[test]
    fn test_total_power_climb_scenario() {
        // 20 km/h steady, 5 m gained over 5 s: gradient ≈ 18%, strictly
        // positive gravity term dominating
        let snapshot = TelemetrySnapshot {
            speed_kmh: 20.0,
            previous_speed_kmh: 20.0,
            altitude_m: Some(105.0),
            previous_altitude_m: Some(100.0),
            cadence_rpm: 80,
            time_delta_s: 5.0,
            bearing_deg: None,
            wind_speed_ms: 0.0,
            wind_direction_deg: None,
        };
        let config = test_config();
        let estimate = total_power(&snapshot, &config);

        assert!(
            (estimate.gradient_percent - 18.0).abs() < 0.5,
            "gradient was {}%",
            estimate.gradient_percent
        );
        assert!(estimate.gradient_percent <= 30.0);

        let p_gravity = gravity_power(config.system_mass_kg, 5.0, 5.0);
        assert!(p_gravity > 0.0);
        assert!(estimate.power_watts > p_gravity);
    }
}
