//! Sensor manager for BLE CSC device discovery and connection.
//!
//! Owns the BLE adapter, scans for Cycling Speed and Cadence peripherals,
//! subscribes to measurement notifications, and forwards raw measurements
//! to the ride dispatcher as [`SensorEvent`]s. The manager is the scoped
//! owner of the device connection: `shutdown` is called on every ride-stop
//! path so no notification can fire into a torn-down session.

use crate::sensors::csc::{parse_csc_measurement, CSC_MEASUREMENT_UUID, CSC_SERVICE_UUID};
use crate::sensors::types::{ConnectionState, DiscoveredSensor, SensorError, SensorEvent};
use btleplug::api::{Central, CentralEvent, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Mutex;

/// Manages BLE CSC sensor discovery, connection, and data streaming.
pub struct SensorManager {
    /// BLE adapter
    adapter: Option<Adapter>,
    /// Channel for sending sensor events to the dispatcher
    event_tx: Option<UnboundedSender<SensorEvent>>,
    /// Discovered sensors (device_id -> DiscoveredSensor)
    discovered: Arc<Mutex<HashMap<String, DiscoveredSensor>>>,
    /// Connected peripherals (device_id -> Peripheral)
    connected: Arc<Mutex<HashMap<String, Peripheral>>>,
    /// Whether currently scanning
    is_scanning: Arc<Mutex<bool>>,
}

impl SensorManager {
    /// Create a new sensor manager.
    pub fn new() -> Self {
        Self {
            adapter: None,
            event_tx: None,
            discovered: Arc::new(Mutex::new(HashMap::new())),
            connected: Arc::new(Mutex::new(HashMap::new())),
            is_scanning: Arc::new(Mutex::new(false)),
        }
    }

    /// Set the channel that receives sensor events.
    pub fn set_event_sender(&mut self, tx: UnboundedSender<SensorEvent>) {
        self.event_tx = Some(tx);
    }

    /// Send an event if the channel is available.
    fn send_event(&self, event: SensorEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(event);
        }
    }

    /// Initialize the BLE adapter.
    ///
    /// This must be called before any sensor operations.
    pub async fn initialize(&mut self) -> Result<(), SensorError> {
        tracing::info!("Initializing SensorManager");

        let manager = Manager::new()
            .await
            .map_err(|e| SensorError::BleError(e.to_string()))?;

        let adapters = manager
            .adapters()
            .await
            .map_err(|e| SensorError::BleError(e.to_string()))?;

        let adapter = adapters
            .into_iter()
            .next()
            .ok_or(SensorError::AdapterNotFound)?;

        tracing::info!("BLE adapter initialized");
        self.adapter = Some(adapter);

        Ok(())
    }

    /// Start scanning for CSC sensors.
    pub async fn start_discovery(&mut self) -> Result<(), SensorError> {
        let adapter = self.adapter.as_ref().ok_or(SensorError::AdapterNotFound)?;

        {
            let mut is_scanning = self.is_scanning.lock().await;
            if *is_scanning {
                return Ok(()); // Already scanning
            }
            *is_scanning = true;
        }

        tracing::info!("Starting CSC sensor discovery");

        self.discovered.lock().await.clear();

        let scan_filter = ScanFilter {
            services: vec![CSC_SERVICE_UUID],
        };

        adapter
            .start_scan(scan_filter)
            .await
            .map_err(|e| SensorError::ScanFailed(e.to_string()))?;

        self.send_event(SensorEvent::ScanStarted);

        let adapter_clone = adapter.clone();
        let discovered = self.discovered.clone();
        let event_tx = self.event_tx.clone();
        let is_scanning = self.is_scanning.clone();

        tokio::spawn(async move {
            Self::process_discovery_events(adapter_clone, discovered, event_tx, is_scanning).await;
        });

        Ok(())
    }

    /// Process discovery events from the adapter.
    async fn process_discovery_events(
        adapter: Adapter,
        discovered: Arc<Mutex<HashMap<String, DiscoveredSensor>>>,
        event_tx: Option<UnboundedSender<SensorEvent>>,
        is_scanning: Arc<Mutex<bool>>,
    ) {
        use futures::stream::StreamExt;

        let mut events = match adapter.events().await {
            Ok(events) => events,
            Err(e) => {
                tracing::error!("Failed to get adapter events: {}", e);
                return;
            }
        };

        while let Some(event) = events.next().await {
            if !*is_scanning.lock().await {
                break;
            }

            if let CentralEvent::DeviceDiscovered(id) = event {
                let peripherals = match adapter.peripherals().await {
                    Ok(p) => p,
                    Err(_) => continue,
                };

                for peripheral in peripherals {
                    if peripheral.id() == id {
                        if let Some(sensor) = Self::classify_peripheral(&peripheral).await {
                            let device_id = peripheral.id().to_string();

                            discovered
                                .lock()
                                .await
                                .insert(device_id.clone(), sensor.clone());

                            if let Some(tx) = &event_tx {
                                let _ = tx.send(SensorEvent::Discovered(sensor));
                            }
                        }
                    }
                }
            }
        }
    }

    /// Classify a peripheral: only CSC peripherals are of interest.
    async fn classify_peripheral(peripheral: &Peripheral) -> Option<DiscoveredSensor> {
        let properties = peripheral.properties().await.ok()??;

        if !properties.services.contains(&CSC_SERVICE_UUID) {
            return None;
        }

        let name = properties
            .local_name
            .unwrap_or_else(|| "Unknown Sensor".to_string());

        Some(DiscoveredSensor {
            device_id: peripheral.id().to_string(),
            name,
            signal_strength: properties.rssi,
            last_seen: Instant::now(),
        })
    }

    /// Stop scanning for sensors.
    pub async fn stop_discovery(&mut self) -> Result<(), SensorError> {
        let adapter = self.adapter.as_ref().ok_or(SensorError::AdapterNotFound)?;

        {
            let mut is_scanning = self.is_scanning.lock().await;
            if !*is_scanning {
                return Ok(()); // Not scanning
            }
            *is_scanning = false;
        }

        tracing::info!("Stopping sensor discovery");

        adapter
            .stop_scan()
            .await
            .map_err(|e| SensorError::ScanFailed(e.to_string()))?;

        self.send_event(SensorEvent::ScanStopped);

        Ok(())
    }

    /// Connect to a CSC sensor by device ID and subscribe to measurements.
    pub async fn connect(&mut self, device_id: &str) -> Result<(), SensorError> {
        let adapter = self.adapter.as_ref().ok_or(SensorError::AdapterNotFound)?;

        tracing::info!("Connecting to sensor: {}", device_id);

        self.send_event(SensorEvent::ConnectionChanged {
            device_id: device_id.to_string(),
            state: ConnectionState::Connecting,
        });

        let peripherals = adapter
            .peripherals()
            .await
            .map_err(|e| SensorError::BleError(e.to_string()))?;

        let peripheral = peripherals
            .into_iter()
            .find(|p| p.id().to_string() == device_id)
            .ok_or_else(|| SensorError::SensorNotFound(device_id.to_string()))?;

        peripheral
            .connect()
            .await
            .map_err(|e| SensorError::ConnectionFailed(e.to_string()))?;

        peripheral
            .discover_services()
            .await
            .map_err(|e| SensorError::ConnectionFailed(e.to_string()))?;

        // Subscribe to the CSC Measurement characteristic
        let characteristics = peripheral.characteristics();
        let measurement = characteristics
            .iter()
            .find(|c| c.uuid == CSC_MEASUREMENT_UUID)
            .ok_or_else(|| {
                SensorError::SubscriptionFailed("CSC Measurement characteristic not found".into())
            })?;

        peripheral
            .subscribe(measurement)
            .await
            .map_err(|e| SensorError::SubscriptionFailed(e.to_string()))?;

        self.connected
            .lock()
            .await
            .insert(device_id.to_string(), peripheral.clone());

        self.send_event(SensorEvent::ConnectionChanged {
            device_id: device_id.to_string(),
            state: ConnectionState::Connected,
        });

        let event_tx = self.event_tx.clone();
        let device_id_clone = device_id.to_string();

        tokio::spawn(async move {
            Self::handle_notifications(peripheral, event_tx, device_id_clone).await;
        });

        tracing::info!("Connected to sensor: {}", device_id);

        Ok(())
    }

    /// Handle measurement notifications from a connected peripheral.
    async fn handle_notifications(
        peripheral: Peripheral,
        event_tx: Option<UnboundedSender<SensorEvent>>,
        device_id: String,
    ) {
        use futures::stream::StreamExt;

        let mut notification_stream = match peripheral.notifications().await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::error!("Failed to get notification stream: {}", e);
                return;
            }
        };

        while let Some(notification) = notification_stream.next().await {
            if notification.uuid != CSC_MEASUREMENT_UUID {
                continue;
            }

            match parse_csc_measurement(&notification.value) {
                Some(measurement) => {
                    if let Some(tx) = &event_tx {
                        let _ = tx.send(SensorEvent::Measurement(measurement));
                    }
                }
                None => {
                    tracing::warn!("Malformed CSC measurement frame from {}", device_id);
                }
            }
        }

        // Stream ended - peripheral disconnected
        tracing::info!("Sensor notification stream ended: {}", device_id);
        if let Some(tx) = &event_tx {
            let _ = tx.send(SensorEvent::ConnectionChanged {
                device_id,
                state: ConnectionState::Disconnected,
            });
        }
    }

    /// Disconnect from a sensor.
    pub async fn disconnect(&mut self, device_id: &str) -> Result<(), SensorError> {
        tracing::info!("Disconnecting from sensor: {}", device_id);

        let mut connected = self.connected.lock().await;

        if let Some(peripheral) = connected.remove(device_id) {
            peripheral
                .disconnect()
                .await
                .map_err(|e| SensorError::BleError(e.to_string()))?;
        }

        self.send_event(SensorEvent::ConnectionChanged {
            device_id: device_id.to_string(),
            state: ConnectionState::Disconnected,
        });

        Ok(())
    }

    /// Get list of discovered sensors.
    pub async fn get_discovered(&self) -> Vec<DiscoveredSensor> {
        self.discovered.lock().await.values().cloned().collect()
    }

    /// Whether any sensor is currently connected.
    pub async fn has_connection(&self) -> bool {
        !self.connected.lock().await.is_empty()
    }

    /// Check if currently scanning.
    pub async fn is_scanning(&self) -> bool {
        *self.is_scanning.lock().await
    }

    /// Shutdown the sensor manager, releasing every held connection.
    pub async fn shutdown(&mut self) {
        tracing::info!("Shutting down SensorManager");

        let _ = self.stop_discovery().await;

        let device_ids: Vec<String> = self.connected.lock().await.keys().cloned().collect();

        for device_id in device_ids {
            let _ = self.disconnect(&device_id).await;
        }
    }
}

impl Default for SensorManager {
    fn default() -> Self {
        Self::new()
    }
}
