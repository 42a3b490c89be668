//! Arrival-time estimation.

use std::time::Duration;

use crate::geo::{self, GeoPoint};

use super::unit::SpeedProfile;

const DEFAULT_SPEED_KMH: f64 = 60.0;

/// Estimates time-to-scene for a unit.
///
/// A pure distance-over-speed model with a mobilization floor: crews need
/// time to gear up and roll out before covering any distance, so no
/// estimate is ever below the floor, including for zero distance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EtaEstimator {
    mobilization_floor: Duration,
    default_speed_kmh: f64,
}

impl EtaEstimator {
    /// Creates an estimator with the given mobilization floor.
    #[must_use]
    pub const fn new(mobilization_floor: Duration) -> Self {
        Self {
            mobilization_floor,
            default_speed_kmh: DEFAULT_SPEED_KMH,
        }
    }

    /// Sets the speed assumed for units without a usable profile.
    #[must_use]
    pub const fn with_default_speed(mut self, default_speed_kmh: f64) -> Self {
        self.default_speed_kmh = default_speed_kmh;
        self
    }

    /// The configured mobilization floor.
    #[must_use]
    pub const fn mobilization_floor(&self) -> Duration {
        self.mobilization_floor
    }

    /// Expected travel time from `unit` to `incident` under `profile`.
    ///
    /// Deterministic for identical inputs, no side effects, and total: a
    /// non-positive profile speed is replaced by the configured default
    /// speed, and degenerate fleet data (NaN coordinates, denormal speeds)
    /// yields the floor instead of panicking.
    #[must_use]
    pub fn estimate(&self, unit: GeoPoint, incident: GeoPoint, profile: SpeedProfile) -> Duration {
        let speed_kmh = if profile.average_speed_kmh > 0.0 {
            profile.average_speed_kmh
        } else {
            self.default_speed_kmh
        };
        if speed_kmh <= 0.0 {
            return self.mobilization_floor;
        }

        let distance_km = geo::distance_km(unit, incident);
        let travel_secs = distance_km / speed_kmh * 3600.0;
        // NaN or out-of-range travel times are unrepresentable; treat them
        // as the floor rather than trusting garbage fleet data.
        Duration::try_from_secs_f64(travel_secs)
            .map_or(self.mobilization_floor, |travel| {
                travel.max(self.mobilization_floor)
            })
    }

    /// Estimate for an incident whose coordinates are unknown.
    ///
    /// Without a distance there is nothing to model beyond mobilization,
    /// so the floor is the estimate.
    #[must_use]
    pub const fn estimate_without_position(&self) -> Duration {
        self.mobilization_floor
    }
}

impl Default for EtaEstimator {
    fn default() -> Self {
        // 90 seconds covers turnout time for a staffed station.
        Self::new(Duration::from_secs(90))
    }
}
