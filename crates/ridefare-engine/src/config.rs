//! Engine configuration

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use ridefare_common::{FareError, Result, DEFAULT_AVERAGE_SPEED_KMH, DEFAULT_CURRENCY, SURGE_CEILING};

/// Pricing engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Currency used when the pickup cannot be mapped to one
    pub default_currency: String,
    /// Speed used to estimate trip duration (km/h)
    pub average_speed_kmh: f64,
    /// Negotiated price band
    pub negotiation: NegotiationSettings,
    /// Surge engine settings
    pub surge: SurgeSettings,
    /// Resolved-pricing cache settings
    pub cache: CacheSettings,
    /// Clock used to evaluate zone fee schedules
    pub zone_fee_schedule_clock: ScheduleClock,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_currency: DEFAULT_CURRENCY.to_string(),
            average_speed_kmh: DEFAULT_AVERAGE_SPEED_KMH,
            negotiation: NegotiationSettings::default(),
            surge: SurgeSettings::default(),
            cache: CacheSettings::default(),
            zone_fee_schedule_clock: ScheduleClock::PickupLocal,
        }
    }
}

impl EngineConfig {
    /// Load configuration from `.env` and `RIDEFARE__*` environment variables
    pub fn load() -> Result<Self> {
        // Try to load .env file
        let _ = dotenvy::dotenv();

        let cfg: Self = config::Config::builder()
            .add_source(
                config::Environment::with_prefix("RIDEFARE")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| FareError::Config(e.to_string()))?;

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.average_speed_kmh.is_finite() && self.average_speed_kmh > 0.0) {
            return Err(FareError::Config(format!(
                "average_speed_kmh must be positive, got {}",
                self.average_speed_kmh
            )));
        }
        let band = &self.negotiation;
        if band.lower_ratio <= Decimal::ZERO || band.lower_ratio > band.upper_ratio {
            return Err(FareError::Config(format!(
                "negotiation band [{}, {}] is empty",
                band.lower_ratio, band.upper_ratio
            )));
        }
        if self.surge.surge_ceiling < 1.0 {
            return Err(FareError::Config("surge_ceiling must be at least 1.0".into()));
        }
        if self.default_currency.trim().is_empty() {
            return Err(FareError::Config("default_currency must not be empty".into()));
        }
        Ok(())
    }
}

/// Acceptable negotiated fare as a ratio of the estimate
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NegotiationSettings {
    pub lower_ratio: Decimal,
    pub upper_ratio: Decimal,
}

impl Default for NegotiationSettings {
    fn default() -> Self {
        Self {
            lower_ratio: dec!(0.70),
            upper_ratio: dec!(1.50),
        }
    }
}

/// Surge engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SurgeSettings {
    /// Upper bound on each telemetry call
    pub telemetry_timeout_ms: u64,
    /// Radius of the demand/supply window
    pub demand_radius_km: f64,
    /// Lookback of the demand/supply window
    pub demand_window_minutes: u32,
    /// Radius of the ride density lookup
    pub density_radius_km: f64,
    /// Clamp applied to the composite before policy clamping
    pub surge_ceiling: f64,
}

impl SurgeSettings {
    pub fn telemetry_timeout(&self) -> Duration {
        Duration::from_millis(self.telemetry_timeout_ms)
    }
}

impl Default for SurgeSettings {
    fn default() -> Self {
        Self {
            telemetry_timeout_ms: 250,
            demand_radius_km: 10.0,
            demand_window_minutes: 15,
            density_radius_km: 2.0,
            surge_ceiling: SURGE_CEILING,
        }
    }
}

/// Resolved-pricing cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub enabled: bool,
    pub max_entries: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 10_000,
        }
    }
}

/// Which wall-clock a zone fee schedule is evaluated against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleClock {
    /// Local time at the pickup
    PickupLocal,
    /// The server's UTC clock
    Server,
}
