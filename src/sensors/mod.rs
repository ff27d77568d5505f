//! Sensor module for BLE speed/cadence device communication.

pub mod csc;
pub mod manager;
pub mod types;

pub use csc::{
    parse_csc_measurement, CrankRevolutionData, CscDecoder, CscMeasurement, WheelRevolutionData,
    CSC_MEASUREMENT_UUID, CSC_SERVICE_UUID,
};
pub use manager::SensorManager;
pub use types::{ConnectionState, DiscoveredSensor, SensorError, SensorEvent};
