//! Fare calculation request and result

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::geo::GeoPoint;
use super::modifiers::WeatherCondition;
use crate::error::ValidationError;

/// Longest route accepted, roughly the Earth's circumference
pub const MAX_DISTANCE_KM: f64 = 40_075.0;

/// Largest caller-supplied surge accepted before policy clamping
pub const MAX_SURGE_MULTIPLIER: Decimal = Decimal::ONE_HUNDRED;

/// Largest negotiated fare accepted, in currency units
pub const MAX_NEGOTIATED_FARE: Decimal = Decimal::from_parts(100_000_000, 0, 0, false, 0);

/// Input to a fare calculation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FareRequest {
    pub pickup: GeoPoint,
    pub dropoff: GeoPoint,
    /// Precomputed route distance; great-circle distance when absent
    pub distance_km: Option<f64>,
    /// Precomputed duration; estimated from distance when absent
    pub duration_min: Option<u32>,
    pub ride_type_id: Option<i64>,
    pub weather: Option<WeatherCondition>,
    /// Live demand/supply ratio; zero means no signal
    pub demand_supply_ratio: f64,
    /// Surge already quoted to the rider; bypasses the surge engine
    pub surge_multiplier: Option<Decimal>,
    pub negotiated_fare: Option<Decimal>,
    /// Target currency; resolved from the pickup when absent
    pub currency: Option<String>,
}

impl FareRequest {
    pub fn new(pickup: GeoPoint, dropoff: GeoPoint) -> Self {
        Self {
            pickup,
            dropoff,
            distance_km: None,
            duration_min: None,
            ride_type_id: None,
            weather: None,
            demand_supply_ratio: 0.0,
            surge_multiplier: None,
            negotiated_fare: None,
            currency: None,
        }
    }

    pub fn with_distance(mut self, distance_km: f64) -> Self {
        self.distance_km = Some(distance_km);
        self
    }

    pub fn with_duration(mut self, duration_min: u32) -> Self {
        self.duration_min = Some(duration_min);
        self
    }

    pub fn with_ride_type(mut self, ride_type_id: i64) -> Self {
        self.ride_type_id = Some(ride_type_id);
        self
    }

    pub fn with_weather(mut self, weather: WeatherCondition) -> Self {
        self.weather = Some(weather);
        self
    }

    pub fn with_demand_supply_ratio(mut self, ratio: f64) -> Self {
        self.demand_supply_ratio = ratio;
        self
    }

    pub fn with_surge(mut self, surge: Decimal) -> Self {
        self.surge_multiplier = Some(surge);
        self
    }

    pub fn with_negotiated_fare(mut self, fare: Decimal) -> Self {
        self.negotiated_fare = Some(fare);
        self
    }

    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = Some(currency.into());
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.pickup.validate()?;
        self.dropoff.validate()?;
        if let Some(distance) = self.distance_km {
            if !distance.is_finite() || distance < 0.0 {
                return Err(ValidationError::Negative { field: "distance_km" });
            }
            if distance > MAX_DISTANCE_KM {
                return Err(ValidationError::OutOfRange {
                    field: "distance_km",
                    reason: format!("{distance} exceeds {MAX_DISTANCE_KM}"),
                });
            }
        }
        if !self.demand_supply_ratio.is_finite() || self.demand_supply_ratio < 0.0 {
            return Err(ValidationError::Negative {
                field: "demand_supply_ratio",
            });
        }
        if matches!(self.surge_multiplier, Some(s) if s <= Decimal::ZERO) {
            return Err(ValidationError::NotPositive {
                field: "surge_multiplier",
            });
        }
        if let Some(surge) = self.surge_multiplier.filter(|s| *s > MAX_SURGE_MULTIPLIER) {
            return Err(ValidationError::OutOfRange {
                field: "surge_multiplier",
                reason: format!("{surge} exceeds {MAX_SURGE_MULTIPLIER}"),
            });
        }
        if matches!(self.negotiated_fare, Some(f) if f < Decimal::ZERO) {
            return Err(ValidationError::Negative {
                field: "negotiated_fare",
            });
        }
        if let Some(fare) = self.negotiated_fare.filter(|f| *f > MAX_NEGOTIATED_FARE) {
            return Err(ValidationError::OutOfRange {
                field: "negotiated_fare",
                reason: format!("{fare} exceeds {MAX_NEGOTIATED_FARE}"),
            });
        }
        if matches!(self.ride_type_id, Some(id) if id <= 0) {
            return Err(ValidationError::Other(format!(
                "malformed ride_type_id {}",
                self.ride_type_id.unwrap_or_default()
            )));
        }
        Ok(())
    }
}

/// Side of the trip a zone fee was charged on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeeSide {
    Pickup,
    Dropoff,
}

/// One line of the zone fee breakdown
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneFeeCharge {
    pub zone_fee_id: i64,
    pub zone_id: i64,
    pub fee_type: String,
    pub side: FeeSide,
    pub amount: Decimal,
}

/// Immutable fare breakdown
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FareCalculation {
    pub id: Uuid,
    /// Version the calculation was priced against; zero for defaults
    pub pricing_version_id: i64,
    pub pickup: GeoPoint,
    pub dropoff: GeoPoint,
    pub country_id: Option<i64>,
    pub region_id: Option<i64>,
    pub city_id: Option<i64>,
    pub pickup_zone_id: Option<i64>,
    pub dropoff_zone_id: Option<i64>,
    pub ride_type_id: Option<i64>,
    pub distance_km: f64,
    pub duration_min: u32,

    pub base_fare: Decimal,
    pub distance_charge: Decimal,
    pub time_charge: Decimal,
    pub booking_fee: Decimal,
    pub zone_fees_total: Decimal,
    pub zone_fees_breakdown: Vec<ZoneFeeCharge>,

    pub time_multiplier: Decimal,
    pub weather_multiplier: Decimal,
    pub event_multiplier: Decimal,
    pub surge_multiplier: Decimal,
    pub total_multiplier: Decimal,

    pub subtotal: Decimal,
    pub minimum_fare: Decimal,
    pub minimum_fare_applied: bool,
    pub tax_rate_pct: Decimal,
    pub tax_inclusive: bool,
    pub tax_amount: Decimal,
    pub total_fare: Decimal,
    pub was_negotiated: bool,

    pub platform_commission_pct: Decimal,
    pub platform_commission: Decimal,
    pub driver_earnings: Decimal,

    pub currency: String,
    pub inheritance_chain: Vec<String>,
    pub calculated_at: DateTime<Utc>,
}
