//! Sensor types and events for the BLE speed/cadence source.

use crate::sensors::csc::CscMeasurement;
use std::time::Instant;
use thiserror::Error;

/// Connection state of the speed/cadence sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Not connected
    #[default]
    Disconnected,
    /// Connection in progress
    Connecting,
    /// Active connection
    Connected,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "Disconnected"),
            ConnectionState::Connecting => write!(f, "Connecting..."),
            ConnectionState::Connected => write!(f, "Connected"),
        }
    }
}

/// A CSC sensor discovered during BLE scanning.
#[derive(Debug, Clone)]
pub struct DiscoveredSensor {
    /// BLE device address/identifier
    pub device_id: String,
    /// User-friendly name (from BLE advertisement)
    pub name: String,
    /// Signal strength (RSSI)
    pub signal_strength: Option<i16>,
    /// When the sensor was last seen
    pub last_seen: Instant,
}

/// Events from the sensor system.
#[derive(Debug, Clone)]
pub enum SensorEvent {
    /// A new CSC sensor was discovered during scanning
    Discovered(DiscoveredSensor),
    /// Sensor connection state changed
    ConnectionChanged {
        device_id: String,
        state: ConnectionState,
    },
    /// New measurement received from the sensor
    Measurement(CscMeasurement),
    /// Scan started
    ScanStarted,
    /// Scan stopped
    ScanStopped,
    /// Error occurred
    Error(String),
}

/// Errors from the sensor system.
///
/// Sensor failures are reported to the operator; the ride continues on
/// GPS-only data.
#[derive(Debug, Error)]
pub enum SensorError {
    /// BLE adapter not found or unavailable
    #[error("Bluetooth adapter not found")]
    AdapterNotFound,

    /// Failed to start BLE scanning
    #[error("Failed to start scanning: {0}")]
    ScanFailed(String),

    /// Sensor not found with given device ID
    #[error("Sensor not found: {0}")]
    SensorNotFound(String),

    /// Connection to sensor failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Failed to subscribe to measurement notifications
    #[error("Failed to subscribe to notifications: {0}")]
    SubscriptionFailed(String),

    /// Generic BLE error
    #[error("BLE error: {0}")]
    BleError(String),
}
