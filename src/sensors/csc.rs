//! BLE Cycling Speed and Cadence (CSC) protocol implementation.
//!
//! Parses CSC Measurement (0x2A5B) notifications and derives wheel speed
//! and crank cadence from the cumulative revolution counters. Both counters
//! wrap (the wheel counter at 2³², the crank counter at 2¹⁶, and both
//! event times at 65536 ticks of 1/1024 s, about 64 s), so deltas are
//! computed wrap-aware.

use uuid::Uuid;

/// Cycling Speed and Cadence Service UUID (0x1816)
pub const CSC_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000_1816_0000_1000_8000_0080_5f9b_34fb);

/// CSC Measurement Characteristic UUID (0x2A5B)
pub const CSC_MEASUREMENT_UUID: Uuid = Uuid::from_u128(0x0000_2a5b_0000_1000_8000_0080_5f9b_34fb);

/// Event time resolution: ticks per second
const EVENT_TIME_TICKS_PER_SECOND: f64 = 1024.0;

/// Event time wrap period in seconds (65536 ticks)
const EVENT_TIME_WRAP_S: f64 = 65536.0 / EVENT_TIME_TICKS_PER_SECOND;

/// Minimum event-time delta considered a distinct measurement, seconds
const MIN_EVENT_DELTA_S: f64 = 0.001;

/// Cumulative wheel revolution data from one measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WheelRevolutionData {
    /// Cumulative wheel revolutions (wraps at 2³²)
    pub revolutions: u32,
    /// Last wheel event time in 1/1024 s units (wraps at 65536)
    pub event_time_1024: u16,
}

/// Cumulative crank revolution data from one measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrankRevolutionData {
    /// Cumulative crank revolutions (wraps at 2¹⁶)
    pub revolutions: u16,
    /// Last crank event time in 1/1024 s units (wraps at 65536)
    pub event_time_1024: u16,
}

/// Parsed data from a CSC Measurement notification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CscMeasurement {
    /// Wheel revolution data (if present)
    pub wheel: Option<WheelRevolutionData>,
    /// Crank revolution data (if present)
    pub crank: Option<CrankRevolutionData>,
}

/// Parse a CSC Measurement notification.
///
/// The data format is:
/// - Byte 0: Flags (bit 0 = wheel data present, bit 1 = crank data present)
/// - If wheel present: u32 LE cumulative revolutions, u16 LE event time
/// - If crank present: u16 LE cumulative revolutions, u16 LE event time
pub fn parse_csc_measurement(data: &[u8]) -> Option<CscMeasurement> {
    if data.is_empty() {
        return None;
    }

    let flags = data[0];
    let wheel_present = (flags & 0x01) != 0;
    let crank_present = (flags & 0x02) != 0;

    let mut result = CscMeasurement::default();
    let mut offset = 1usize;

    if wheel_present {
        if offset + 6 > data.len() {
            return None;
        }
        let revolutions = u32::from_le_bytes([
            data[offset],
            data[offset + 1],
            data[offset + 2],
            data[offset + 3],
        ]);
        let event_time_1024 = u16::from_le_bytes([data[offset + 4], data[offset + 5]]);
        result.wheel = Some(WheelRevolutionData {
            revolutions,
            event_time_1024,
        });
        offset += 6;
    }

    if crank_present {
        if offset + 4 > data.len() {
            return None;
        }
        let revolutions = u16::from_le_bytes([data[offset], data[offset + 1]]);
        let event_time_1024 = u16::from_le_bytes([data[offset + 2], data[offset + 3]]);
        result.crank = Some(CrankRevolutionData {
            revolutions,
            event_time_1024,
        });
    }

    Some(result)
}

/// Derives speed and cadence from consecutive CSC measurements.
///
/// Each counter pair is retained only to compute the next delta, so the
/// first measurement after a connect or reconnect produces no derived
/// value. `reset` must be called on disconnect.
#[derive(Debug, Clone)]
pub struct CscDecoder {
    /// Wheel circumference in meters, for converting revolutions to distance
    wheel_circumference_m: f64,
    /// Last wheel revolution count + event time in seconds
    last_wheel: Option<(u32, f64)>,
    /// Last crank revolution count + event time in seconds
    last_crank: Option<(u16, f64)>,
    /// Most recent derived wheel speed
    speed_kmh: Option<f64>,
    /// Most recent derived cadence
    cadence_rpm: Option<f64>,
}

impl CscDecoder {
    /// Create a decoder for a wheel of the given circumference.
    pub fn new(wheel_circumference_m: f64) -> Self {
        Self {
            wheel_circumference_m,
            last_wheel: None,
            last_crank: None,
            speed_kmh: None,
            cadence_rpm: None,
        }
    }

    /// Update the decoder with one measurement.
    pub fn update(&mut self, measurement: &CscMeasurement) {
        if let Some(wheel) = measurement.wheel {
            let event_time_s = wheel.event_time_1024 as f64 / EVENT_TIME_TICKS_PER_SECOND;

            if let Some((last_revolutions, last_event_time_s)) = self.last_wheel {
                let mut time_delta_s = event_time_s - last_event_time_s;
                if time_delta_s < 0.0 {
                    time_delta_s += EVENT_TIME_WRAP_S;
                }
                if time_delta_s > MIN_EVENT_DELTA_S {
                    let mut revolutions_delta =
                        wheel.revolutions as i64 - last_revolutions as i64;
                    if revolutions_delta < 0 {
                        revolutions_delta += 1i64 << 32;
                    }
                    let distance_m = revolutions_delta as f64 * self.wheel_circumference_m;
                    let speed_ms = distance_m / time_delta_s;
                    self.speed_kmh = Some(speed_ms * 3.6);
                }
            }

            self.last_wheel = Some((wheel.revolutions, event_time_s));
        }

        if let Some(crank) = measurement.crank {
            let event_time_s = crank.event_time_1024 as f64 / EVENT_TIME_TICKS_PER_SECOND;

            if let Some((last_revolutions, last_event_time_s)) = self.last_crank {
                let mut time_delta_s = event_time_s - last_event_time_s;
                if time_delta_s < 0.0 {
                    time_delta_s += EVENT_TIME_WRAP_S;
                }
                if time_delta_s > MIN_EVENT_DELTA_S {
                    let mut revolutions_delta =
                        crank.revolutions as i64 - last_revolutions as i64;
                    if revolutions_delta < 0 {
                        revolutions_delta += 65536;
                    }
                    self.cadence_rpm = Some(revolutions_delta as f64 / time_delta_s * 60.0);
                }
            }

            self.last_crank = Some((crank.revolutions, event_time_s));
        }
    }

    /// Most recent derived wheel speed in km/h, if any.
    pub fn speed_kmh(&self) -> Option<f64> {
        self.speed_kmh
    }

    /// Most recent derived cadence in RPM, if any.
    pub fn cadence_rpm(&self) -> Option<f64> {
        self.cadence_rpm
    }

    /// Clear all counter state and derived values.
    ///
    /// Must be called on device disconnect so a reconnect cannot pair a
    /// stale counter with a fresh one.
    pub fn reset(&mut self) {
        self.last_wheel = None;
        self.last_crank = None;
        self.speed_kmh = None;
        self.cadence_rpm = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wheel_measurement(revolutions: u32, event_time_1024: u16) -> CscMeasurement {
        CscMeasurement {
            wheel: Some(WheelRevolutionData {
                revolutions,
                event_time_1024,
            }),
            crank: None,
        }
    }

    fn crank_measurement(revolutions: u16, event_time_1024: u16) -> CscMeasurement {
        CscMeasurement {
            wheel: None,
            crank: Some(CrankRevolutionData {
                revolutions,
                event_time_1024,
            }),
        }
    }

    #[test]
    fn test_parse_wheel_only() {
        // Flags 0x01, 100 revolutions, event time 512 (0.5 s)
        let data = [0x01, 0x64, 0x00, 0x00, 0x00, 0x00, 0x02];
        let m = parse_csc_measurement(&data).unwrap();
        let wheel = m.wheel.unwrap();
        assert_eq!(wheel.revolutions, 100);
        assert_eq!(wheel.event_time_1024, 512);
        assert!(m.crank.is_none());
    }

    #[test]
    fn test_parse_crank_only() {
        // Flags 0x02, 40 revolutions, event time 1024 (1.0 s)
        let data = [0x02, 0x28, 0x00, 0x00, 0x04];
        let m = parse_csc_measurement(&data).unwrap();
        let crank = m.crank.unwrap();
        assert_eq!(crank.revolutions, 40);
        assert_eq!(crank.event_time_1024, 1024);
        assert!(m.wheel.is_none());
    }

    #[test]
    fn test_parse_combined() {
        let data = [
            0x03, // wheel + crank
            0x0A, 0x00, 0x00, 0x00, 0x00, 0x02, // wheel: 10 revs @ 512
            0x05, 0x00, 0x00, 0x02, // crank: 5 revs @ 512
        ];
        let m = parse_csc_measurement(&data).unwrap();
        assert_eq!(m.wheel.unwrap().revolutions, 10);
        assert_eq!(m.crank.unwrap().revolutions, 5);
    }

    #[test]
    fn test_parse_truncated_frame() {
        let data = [0x01, 0x64, 0x00];
        assert!(parse_csc_measurement(&data).is_none());
        assert!(parse_csc_measurement(&[]).is_none());
    }

    #[test]
    fn test_first_measurement_yields_nothing() {
        let mut decoder = CscDecoder::new(2.105);
        decoder.update(&wheel_measurement(100, 0));
        assert!(decoder.speed_kmh().is_none());
        assert!(decoder.cadence_rpm().is_none());
    }

    #[test]
    fn test_wheel_speed_from_delta() {
        // 5 revolutions in 0.5 s with a 2.105 m wheel:
        // (5 * 2.105 / 0.5) * 3.6 = 75.78 km/h
        let mut decoder = CscDecoder::new(2.105);
        decoder.update(&wheel_measurement(100, 0));
        decoder.update(&wheel_measurement(105, 512));
        let speed = decoder.speed_kmh().unwrap();
        assert!((speed - 75.78).abs() < 0.01, "speed was {}", speed);
    }

    #[test]
    fn test_wheel_counter_wraparound() {
        // 4294967290 -> 5 must read as a forward delta of 11 revolutions
        let mut decoder = CscDecoder::new(2.105);
        decoder.update(&wheel_measurement(4_294_967_290, 0));
        decoder.update(&wheel_measurement(5, 1024));
        let speed = decoder.speed_kmh().unwrap();
        let expected = 11.0 * 2.105 * 3.6; // 11 revs in 1.0 s
        assert!((speed - expected).abs() < 0.01, "speed was {}", speed);
    }

    #[test]
    fn test_event_time_wraparound() {
        // Event time wraps at 65536 ticks; 65024 -> 512 is 1024 ticks = 1 s
        let mut decoder = CscDecoder::new(2.105);
        decoder.update(&wheel_measurement(100, 65024));
        decoder.update(&wheel_measurement(104, 512));
        let speed = decoder.speed_kmh().unwrap();
        let expected = 4.0 * 2.105 * 3.6;
        assert!((speed - expected).abs() < 0.01, "speed was {}", speed);
    }

    #[test]
    fn test_duplicate_event_time_ignored() {
        let mut decoder = CscDecoder::new(2.105);
        decoder.update(&wheel_measurement(100, 512));
        decoder.update(&wheel_measurement(105, 512));
        assert!(decoder.speed_kmh().is_none());
    }

    #[test]
    fn test_crank_cadence_from_delta() {
        // 1 revolution in 1024 ticks (1 s) = 60 RPM
        let mut decoder = CscDecoder::new(2.105);
        decoder.update(&crank_measurement(40, 0));
        decoder.update(&crank_measurement(41, 1024));
        let cadence = decoder.cadence_rpm().unwrap();
        assert!((cadence - 60.0).abs() < 0.01, "cadence was {}", cadence);
    }

    #[test]
    fn test_crank_counter_wraparound() {
        // 65534 -> 2 is a forward delta of 4 revolutions
        let mut decoder = CscDecoder::new(2.105);
        decoder.update(&crank_measurement(65534, 0));
        decoder.update(&crank_measurement(2, 2048));
        let cadence = decoder.cadence_rpm().unwrap();
        let expected = 4.0 / 2.0 * 60.0;
        assert!((cadence - expected).abs() < 0.01, "cadence was {}", cadence);
    }

    #[test]
    fn test_reset_clears_state() {
        let mut decoder = CscDecoder::new(2.105);
        decoder.update(&wheel_measurement(100, 0));
        decoder.update(&wheel_measurement(105, 512));
        assert!(decoder.speed_kmh().is_some());

        decoder.reset();
        assert!(decoder.speed_kmh().is_none());
        assert!(decoder.cadence_rpm().is_none());

        // After reset the next measurement is "first" again
        decoder.update(&wheel_measurement(200, 1024));
        assert!(decoder.speed_kmh().is_none());
    }
}
