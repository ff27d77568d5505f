//! VeloRide - Outdoor Cycling Power Estimation
//!
//! Replay entry point: feeds a recorded position stream through the full
//! estimation pipeline, paced by the recorded timestamps, then runs the
//! post-ride elevation correction and writes the final log as JSON.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use veloride::config::{self, RiderConfig};
use veloride::correction;
use veloride::integrations::{ElevationClient, WindClient};
use veloride::ride::{FinalizedRide, PositionFix, PositionSample, RideCommand, RideDispatcher, RideEvent};

/// One recorded position fix in a replay file.
#[derive(Debug, Clone, Deserialize)]
struct ReplaySample {
    /// Milliseconds from ride start
    offset_ms: f64,
    /// Latitude in degrees
    latitude: f64,
    /// Longitude in degrees
    longitude: f64,
    /// Altitude in meters, if recorded
    altitude_m: Option<f64>,
    /// Ground speed in m/s, if recorded
    speed_ms: Option<f64>,
    /// Horizontal accuracy in meters, if recorded
    accuracy_m: Option<f64>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting VeloRide v{}", env!("CARGO_PKG_VERSION"));

    let mut args = std::env::args().skip(1);
    let Some(input_path) = args.next() else {
        bail!("Usage: veloride <ride-samples.json> [output.json]");
    };
    let output_path = args.next().unwrap_or_else(|| "ride_log.json".to_string());

    let config_path = std::env::var("VELORIDE_CONFIG")
        .map(Into::into)
        .unwrap_or_else(|_| config::get_config_path());
    let rider_config = RiderConfig::load(&config_path).with_context(|| {
        format!(
            "Rider configuration is required before a ride; expected it at {}",
            config_path.display()
        )
    })?;

    // Skip all network integrations (wind refresh, elevation correction)
    let offline = std::env::var("VELORIDE_OFFLINE").is_ok();

    let content = std::fs::read_to_string(&input_path)
        .with_context(|| format!("Failed to read {}", input_path))?;
    let samples: Vec<ReplaySample> =
        serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", input_path))?;
    tracing::info!("Replaying {} position samples from {}", samples.len(), input_path);

    let (mut dispatcher, event_tx) = RideDispatcher::new(rider_config.clone());
    if !offline {
        dispatcher = dispatcher.with_wind_client(WindClient::new());
    }
    let clock = dispatcher.clock();

    // Feed samples paced by their recorded offsets, then stop the ride.
    // Gaps longer than the staleness threshold exercise the failsafe ticker
    // exactly as they did live.
    tokio::spawn(async move {
        let start = tokio::time::Instant::now();
        for sample in samples {
            tokio::time::sleep_until(start + Duration::from_millis(sample.offset_ms as u64)).await;
            let fix = PositionFix {
                latitude: sample.latitude,
                longitude: sample.longitude,
                altitude_m: sample.altitude_m,
                speed_ms: sample.speed_ms,
                accuracy_m: sample.accuracy_m,
                timestamp_ms: clock.now_ms(),
            };
            if event_tx
                .send(RideEvent::Position(PositionSample::Real(fix)))
                .is_err()
            {
                return;
            }
        }
        let _ = event_tx.send(RideEvent::Command(RideCommand::Stop));
    });

    let FinalizedRide { summary, log } = dispatcher.run().await?;
    tracing::info!(
        "Ride complete: {:.2} km in {}, avg {:.1} km/h, avg {:.0} W",
        summary.distance_km,
        summary.elapsed_hms(),
        summary.avg_speed_kmh,
        summary.avg_power_watts
    );

    let final_log = if offline {
        log
    } else {
        match correction::correct_ride(&log, &ElevationClient::new(), &rider_config).await {
            Ok(corrected) => {
                tracing::info!(
                    "Elevation corrected: ascent {:.1} m, descent {:.1} m, avg {:.0} W",
                    corrected.summary.total_ascent_m,
                    corrected.summary.total_descent_m,
                    corrected.summary.avg_power_watts
                );
                corrected.log
            }
            Err(e) => {
                tracing::warn!(
                    "Elevation correction failed ({}); keeping original GPS altitudes",
                    e
                );
                log
            }
        }
    };

    let json = serde_json::to_string_pretty(&final_log)?;
    std::fs::write(&output_path, json)
        .with_context(|| format!("Failed to write {}", output_path))?;
    tracing::info!("Ride log written to {}", output_path);

    Ok(())
}
