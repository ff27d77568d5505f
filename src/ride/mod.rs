//! Ride lifecycle: event dispatch, telemetry fusion, and the tick log.

pub mod dispatch;
pub mod session;
pub mod types;

pub use dispatch::{MonotonicClock, RideCommand, RideDispatcher, RideEvent};
pub use session::RideSession;
pub use types::{
    format_elapsed_hms, AltitudeSource, FinalizedRide, LiveMetrics, PositionFix, PositionSample,
    RideError, RideLogEntry, RidePhase, RideSummary,
};
