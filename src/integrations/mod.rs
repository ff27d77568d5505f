//! External service integrations: wind and elevation data.

pub mod elevation;
pub mod weather;

pub use elevation::{ElevationClient, ElevationError, ELEVATION_BATCH_SIZE};
pub use weather::{WeatherError, WindClient, WindSample};
