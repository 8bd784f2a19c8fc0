//! Multiplier resolution
//!
//! Looks up the time, weather, event and threshold-tier multipliers of a
//! version. Each lookup degrades to a neutral 1.0 when the store fails so a
//! fare can always be produced.

use chrono::{DateTime, FixedOffset, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use ridefare_common::{decimal_from_f64, GeoLocation, WeatherCondition};

use crate::metrics::FareMetrics;
use crate::store::ConfigStore;

/// The four factors applied to the base sum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Multipliers {
    pub time: Decimal,
    pub weather: Decimal,
    pub event: Decimal,
    pub surge: Decimal,
}

impl Multipliers {
    pub fn neutral() -> Self {
        Self {
            time: Decimal::ONE,
            weather: Decimal::ONE,
            event: Decimal::ONE,
            surge: Decimal::ONE,
        }
    }

    /// Product of every factor, unrounded
    pub fn total(&self) -> Decimal {
        self.time * self.weather * self.event * self.surge
    }
}

impl Default for Multipliers {
    fn default() -> Self {
        Self::neutral()
    }
}

/// Store-backed multiplier lookups for one version snapshot
pub struct Modulator {
    store: Arc<dyn ConfigStore>,
    metrics: Option<Arc<FareMetrics>>,
}

impl Modulator {
    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        Self {
            store,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<FareMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Nearest-scope, highest-priority window matching the pickup wall-clock
    pub async fn time_multiplier(
        &self,
        version_id: i64,
        location: &GeoLocation,
        wall_clock: DateTime<FixedOffset>,
    ) -> Decimal {
        match self
            .store
            .time_multiplier_for(version_id, location, wall_clock)
            .await
        {
            Ok(Some(row)) => {
                debug!(name = %row.name, multiplier = %row.multiplier, "Time window applies");
                row.multiplier
            }
            Ok(None) => Decimal::ONE,
            Err(e) => self.neutral("time", e),
        }
    }

    /// Nearest-scope row for the condition; no condition or clear skies is neutral
    pub async fn weather_multiplier(
        &self,
        version_id: i64,
        location: &GeoLocation,
        condition: Option<WeatherCondition>,
    ) -> Decimal {
        let condition = match condition {
            None | Some(WeatherCondition::Clear) => return Decimal::ONE,
            Some(condition) => condition,
        };
        match self
            .store
            .weather_multiplier_for(version_id, location, condition)
            .await
        {
            Ok(Some(row)) => row.multiplier,
            Ok(None) => Decimal::ONE,
            Err(e) => self.neutral("weather", e),
        }
    }

    /// Highest multiplier among events active at the pickup
    pub async fn event_multiplier(
        &self,
        version_id: i64,
        city_id: Option<i64>,
        zone_id: Option<i64>,
        at: DateTime<Utc>,
    ) -> Decimal {
        match self
            .store
            .event_multipliers_active(version_id, city_id, zone_id, at)
            .await
        {
            Ok(events) => match events.into_iter().max_by_key(|e| e.multiplier) {
                Some(event) => {
                    debug!(event = %event.event_name, multiplier = %event.multiplier, "Event active");
                    event.multiplier
                }
                None => Decimal::ONE,
            },
            Err(e) => self.neutral("event", e),
        }
    }

    /// Multiplier of the configured tier containing `ratio`, if any
    pub async fn threshold_surge(
        &self,
        version_id: i64,
        location: &GeoLocation,
        ratio: f64,
    ) -> Option<Decimal> {
        let tiers = match self.store.surge_thresholds_for(version_id, location).await {
            Ok(tiers) => tiers,
            Err(e) => {
                warn!(error = %e, "Surge tier lookup failed, using surge engine");
                self.degraded("surge_threshold");
                return None;
            }
        };
        let ratio = decimal_from_f64(ratio);
        tiers
            .into_iter()
            .find(|tier| tier.contains(ratio))
            .map(|tier| tier.multiplier)
    }

    fn neutral(&self, factor: &'static str, error: impl std::fmt::Display) -> Decimal {
        warn!(factor, error = %error, "Multiplier lookup failed, treating as 1.0");
        self.degraded(factor);
        Decimal::ONE
    }

    fn degraded(&self, factor: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.degraded(factor);
        }
    }
}
