//! Surge engine
//!
//! Blends four factors derived from live telemetry and the pickup wall-clock
//! into one multiplier:
//!
//! ```text
//! surge = 1 + 0.6·(demand − 1) + 0.2·(time − 1) + 0.1·(day − 1) + 0.1·(zone − 1)
//! ```
//!
//! The composite is clamped to `[1, ceiling]` and then rounded to one decimal
//! place. Telemetry is best-effort: a missing demand ratio falls back to the
//! time factor alone, a missing density counts as zero rides.

use chrono::{DateTime, Datelike, FixedOffset, Timelike, Weekday};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::time::timeout;
use tracing::{debug, instrument, warn};

use ridefare_common::{decimal_from_f64, GeoPoint, Result};

use crate::collaborators::Telemetry;
use crate::config::SurgeSettings;
use crate::metrics::FareMetrics;

/// Cap on the demand factor
pub const MAX_DEMAND_SURGE: f64 = 4.0;

const DEMAND_WEIGHT: f64 = 0.6;
const TIME_WEIGHT: f64 = 0.2;
const DAY_WEIGHT: f64 = 0.1;
const ZONE_WEIGHT: f64 = 0.1;

/// Demand factor for an open-requests-per-driver ratio
pub fn demand_surge(ratio: f64) -> f64 {
    if ratio.is_nan() || ratio < 1.0 {
        1.0
    } else if ratio < 2.0 {
        1.0 + (ratio - 1.0)
    } else if ratio < 3.0 {
        2.0 + (ratio - 2.0)
    } else {
        (3.0 + (ratio - 2.0).log10()).min(MAX_DEMAND_SURGE)
    }
}

/// Time-of-day factor; ranges are inclusive of both hours
pub fn time_factor(hour: u32) -> f64 {
    match hour {
        7..=8 => 1.5,
        17..=19 => 1.8,
        23.. | 0..=4 => 1.4,
        12..=13 => 1.2,
        _ => 1.0,
    }
}

/// Day-of-week factor
pub fn day_factor(weekday: Weekday, hour: u32) -> f64 {
    match weekday {
        Weekday::Fri | Weekday::Sat if hour >= 20 => 1.3,
        Weekday::Fri | Weekday::Sat | Weekday::Sun => 1.2,
        Weekday::Mon if (7..=9).contains(&hour) => 1.2,
        _ => 1.0,
    }
}

/// Factor for rides completed nearby in the last 24 hours
pub fn zone_factor(density: u32) -> f64 {
    match density {
        51.. => 1.2,
        20..=50 => 1.1,
        _ => 1.0,
    }
}

/// Round to one decimal place
fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Individual factor values behind a surge reading
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SurgeFactors {
    pub demand: f64,
    pub time: f64,
    pub day: f64,
    pub zone: f64,
}

impl SurgeFactors {
    pub fn at(ratio: f64, density: u32, wall_clock: &DateTime<FixedOffset>) -> Self {
        let hour = wall_clock.hour();
        Self {
            demand: demand_surge(ratio),
            time: time_factor(hour),
            day: day_factor(wall_clock.weekday(), hour),
            zone: zone_factor(density),
        }
    }

    /// Weighted composite, clamped to `[1, ceiling]` then rounded to 0.1
    pub fn composite(&self, ceiling: f64) -> f64 {
        let raw = 1.0
            + DEMAND_WEIGHT * (self.demand - 1.0)
            + TIME_WEIGHT * (self.time - 1.0)
            + DAY_WEIGHT * (self.day - 1.0)
            + ZONE_WEIGHT * (self.zone - 1.0);
        round_tenth(raw.clamp(1.0, ceiling.max(1.0)))
    }
}

/// Output of one surge computation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurgeReading {
    /// Multiplier before policy clamping
    pub multiplier: Decimal,
    pub factors: SurgeFactors,
    pub demand_ratio: Option<f64>,
    pub ride_density: Option<u32>,
    /// The demand ratio was unavailable and only the time factor was used
    pub fallback: bool,
}

/// Derives surge multipliers from telemetry
pub struct SurgeEngine {
    telemetry: Arc<dyn Telemetry>,
    settings: SurgeSettings,
    metrics: Option<Arc<FareMetrics>>,
}

impl SurgeEngine {
    pub fn new(telemetry: Arc<dyn Telemetry>, settings: SurgeSettings) -> Self {
        Self {
            telemetry,
            settings,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<FareMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Compute the surge at `point` for its local wall-clock.
    ///
    /// A caller-observed ratio is used instead of querying telemetry for it.
    #[instrument(skip(self))]
    pub async fn compute(
        &self,
        point: GeoPoint,
        wall_clock: DateTime<FixedOffset>,
        observed_ratio: Option<f64>,
    ) -> SurgeReading {
        let (ratio, density) = match observed_ratio {
            Some(ratio) => (Some(ratio), self.ride_density(point).await),
            None => futures::join!(self.demand_ratio(point), self.ride_density(point)),
        };

        let hour = wall_clock.hour();
        let factors = SurgeFactors::at(ratio.unwrap_or(1.0), density.unwrap_or(0), &wall_clock);

        let (value, fallback) = match ratio {
            Some(_) => (factors.composite(self.settings.surge_ceiling), false),
            None => {
                let ceiling = self.settings.surge_ceiling.max(1.0);
                (round_tenth(time_factor(hour).clamp(1.0, ceiling)), true)
            }
        };

        debug!(surge = value, fallback, ?factors, "Computed surge");
        SurgeReading {
            multiplier: decimal_from_f64(value).round_dp(1),
            factors,
            demand_ratio: ratio,
            ride_density: density,
            fallback,
        }
    }

    async fn demand_ratio(&self, point: GeoPoint) -> Option<f64> {
        let call = self.telemetry.demand_ratio(
            point,
            self.settings.demand_radius_km,
            self.settings.demand_window_minutes,
        );
        let ratio = self.bounded("demand_ratio", call).await?;
        if ratio.is_nan() {
            warn!("Telemetry returned a NaN demand ratio");
            self.degraded("demand_ratio");
            return None;
        }
        Some(ratio.max(0.0))
    }

    async fn ride_density(&self, point: GeoPoint) -> Option<u32> {
        let call = self
            .telemetry
            .ride_density(point, self.settings.density_radius_km);
        self.bounded("ride_density", call).await
    }

    /// Await a telemetry call under the configured timeout
    async fn bounded<T>(
        &self,
        signal: &'static str,
        call: impl std::future::Future<Output = Result<T>>,
    ) -> Option<T> {
        match timeout(self.settings.telemetry_timeout(), call).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(e)) => {
                warn!(signal, error = %e, "Telemetry unavailable, using fallback");
                self.degraded(signal);
                None
            }
            Err(_) => {
                warn!(
                    signal,
                    timeout_ms = self.settings.telemetry_timeout_ms,
                    "Telemetry timed out, using fallback"
                );
                self.degraded(signal);
                None
            }
        }
    }

    fn degraded(&self, factor: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.degraded(factor);
        }
    }
}
