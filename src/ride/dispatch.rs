//! Single-threaded ride event dispatch.
//!
//! One loop owns the [`RideSession`] and consumes discrete events (position
//! samples, sensor events, wind results, control commands) one at a time,
//! interleaved with two periodic timers: the failsafe ticker (1 s) and the
//! wind refresh (5 min). Network fetches run as spawned tasks that post
//! their results back through the event queue, so tick processing never
//! blocks on I/O.

use crate::config::RiderConfig;
use crate::integrations::weather::{WindClient, WindSample};
use crate::ride::session::RideSession;
use crate::ride::types::{FinalizedRide, PositionSample, RideError, RidePhase};
use crate::sensors::manager::SensorManager;
use crate::sensors::types::SensorEvent;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Failsafe check period.
const FAILSAFE_PERIOD: Duration = Duration::from_secs(1);

/// A position source silent for longer than this is considered stale, ms.
const STALE_POSITION_THRESHOLD_MS: f64 = 2500.0;

/// Wind refresh period.
const WIND_REFRESH_PERIOD: Duration = Duration::from_secs(5 * 60);

/// Monotonic millisecond clock shared by the dispatcher and its position
/// sources.
///
/// Sample timestamps and the staleness reference must live in one time
/// domain; every producer should stamp samples with the same clock.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: tokio::time::Instant,
}

impl MonotonicClock {
    /// Create a clock anchored at "now".
    pub fn new() -> Self {
        Self {
            origin: tokio::time::Instant::now(),
        }
    }

    /// Milliseconds since the clock was created.
    pub fn now_ms(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Control commands for an active ride.
#[derive(Debug, Clone)]
pub enum RideCommand {
    /// Suppress tick processing; samples are dropped, not queued
    Pause,
    /// Resume tick processing, re-anchoring the time baseline
    Resume,
    /// Finalize the ride
    Stop,
    /// The position source reported a hard failure; the ride is stopped
    /// immediately and the log finalized as-is
    PositionError(String),
}

/// Everything the dispatch loop can receive.
#[derive(Debug, Clone)]
pub enum RideEvent {
    /// A position sample from the position source
    Position(PositionSample),
    /// An event from the sensor system
    Sensor(SensorEvent),
    /// A completed wind fetch
    Wind(WindSample),
    /// A control command
    Command(RideCommand),
}

/// Owns a ride from start to finalized log.
pub struct RideDispatcher {
    session: RideSession,
    clock: MonotonicClock,
    events: UnboundedReceiver<RideEvent>,
    event_tx: UnboundedSender<RideEvent>,
    wind_client: Option<WindClient>,
    sensor_manager: Option<SensorManager>,
    initial_wind_requested: bool,
}

impl RideDispatcher {
    /// Create a dispatcher and the sender its event producers use.
    pub fn new(config: RiderConfig) -> (Self, UnboundedSender<RideEvent>) {
        let (event_tx, events) = mpsc::unbounded_channel();
        let dispatcher = Self {
            session: RideSession::new(config),
            clock: MonotonicClock::new(),
            events,
            event_tx: event_tx.clone(),
            wind_client: None,
            sensor_manager: None,
            initial_wind_requested: false,
        };
        (dispatcher, event_tx)
    }

    /// Enable periodic wind refresh with the given client.
    pub fn with_wind_client(mut self, client: WindClient) -> Self {
        self.wind_client = Some(client);
        self
    }

    /// Attach a sensor manager whose events feed this ride.
    ///
    /// The manager's connection is released on every ride-stop path.
    /// Must be called from within a tokio runtime.
    pub fn with_sensor_manager(mut self, mut manager: SensorManager) -> Self {
        let (sensor_tx, mut sensor_rx) = mpsc::unbounded_channel();
        manager.set_event_sender(sensor_tx);

        let event_tx = self.event_tx.clone();
        tokio::spawn(async move {
            while let Some(event) = sensor_rx.recv().await {
                if event_tx.send(RideEvent::Sensor(event)).is_err() {
                    break;
                }
            }
        });

        self.sensor_manager = Some(manager);
        self
    }

    /// The clock position sources should stamp their samples with.
    pub fn clock(&self) -> MonotonicClock {
        self.clock
    }

    /// Run the ride to completion.
    ///
    /// Starts the session, processes events until a stop is requested or
    /// the position source fails fatally, then halts the timers, releases
    /// the sensor connection, and returns the finalized ride.
    pub async fn run(mut self) -> Result<FinalizedRide, RideError> {
        self.session.start(self.clock.now_ms())?;

        let mut failsafe = tokio::time::interval(FAILSAFE_PERIOD);
        let mut wind_refresh = tokio::time::interval(WIND_REFRESH_PERIOD);

        enum Step {
            Event(Option<RideEvent>),
            Failsafe,
            WindRefresh,
        }

        loop {
            let step = tokio::select! {
                maybe_event = self.events.recv() => Step::Event(maybe_event),
                _ = failsafe.tick() => Step::Failsafe,
                _ = wind_refresh.tick() => Step::WindRefresh,
            };

            match step {
                Step::Event(Some(event)) => {
                    if self.handle_event(event) {
                        break;
                    }
                }
                // All senders gone: nothing can arrive anymore
                Step::Event(None) => break,
                Step::Failsafe => self.check_staleness(),
                Step::WindRefresh => self.refresh_wind(),
            }
        }

        // Timers stop with the loop; the device connection is released
        // before the log is handed onward.
        if let Some(manager) = self.sensor_manager.as_mut() {
            manager.shutdown().await;
        }

        self.session.stop()
    }

    /// Apply one event. Returns `true` when the ride should stop.
    fn handle_event(&mut self, event: RideEvent) -> bool {
        match event {
            RideEvent::Position(sample) => {
                self.session.process_position(&sample);
                // First usable coordinate triggers the initial wind fetch
                if !self.initial_wind_requested && self.session.current_coordinates().is_some() {
                    self.initial_wind_requested = true;
                    self.refresh_wind();
                }
                false
            }
            RideEvent::Sensor(sensor_event) => {
                self.session.handle_sensor_event(&sensor_event);
                false
            }
            RideEvent::Wind(sample) => {
                tracing::info!(
                    "Wind updated: {:.2} m/s from {:.0}°",
                    sample.speed_ms,
                    sample.direction_deg
                );
                self.session.set_wind(sample.speed_ms, Some(sample.direction_deg));
                false
            }
            RideEvent::Command(command) => match command {
                RideCommand::Pause => {
                    if let Err(e) = self.session.pause() {
                        tracing::warn!("Pause ignored: {}", e);
                    }
                    false
                }
                RideCommand::Resume => {
                    if let Err(e) = self.session.resume(self.clock.now_ms()) {
                        tracing::warn!("Resume ignored: {}", e);
                    }
                    false
                }
                RideCommand::Stop => true,
                RideCommand::PositionError(message) => {
                    tracing::error!("Position source failed: {}; stopping ride", message);
                    true
                }
            },
        }
    }

    /// Synthesize a placeholder tick when the position source has been
    /// silent for longer than the staleness threshold.
    fn check_staleness(&mut self) {
        if self.session.phase() != RidePhase::Active {
            return;
        }
        let now_ms = self.clock.now_ms();
        if now_ms - self.session.last_processed_ms() > STALE_POSITION_THRESHOLD_MS {
            tracing::debug!("Position source stale, generating synthetic tick");
            self.session
                .process_position(&PositionSample::Synthetic { timestamp_ms: now_ms });
        }
    }

    /// Kick off a wind fetch; the result is posted back as an event so the
    /// loop never blocks on the network.
    fn refresh_wind(&self) {
        if self.session.phase() != RidePhase::Active {
            return;
        }
        let Some(client) = self.wind_client.clone() else {
            return;
        };
        let Some((latitude, longitude)) = self.session.current_coordinates() else {
            return;
        };
        let event_tx = self.event_tx.clone();

        tokio::spawn(async move {
            match client.fetch_wind(latitude, longitude).await {
                Ok(sample) => {
                    let _ = event_tx.send(RideEvent::Wind(sample));
                }
                Err(e) => {
                    tracing::warn!("Wind data unavailable: {}", e);
                }
            }
        });
    }
}
