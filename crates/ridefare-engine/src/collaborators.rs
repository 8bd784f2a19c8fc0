//! External collaborators consumed by the pricing core
//!
//! Geographic resolution, currency formatting, the ride-type catalog and
//! live telemetry sit behind traits so deployments can plug in real services.
//! The static implementations here are used for wiring and tests.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use ridefare_common::{
    round_money, FareError, GeoLocation, GeoPoint, Result, Scope, ScopeLevel, ValidationError,
};

#[cfg(test)]
use mockall::automock;

/// Maps coordinates onto the pricing hierarchy
#[cfg_attr(test, automock)]
#[async_trait]
pub trait GeoResolver: Send + Sync {
    /// Hierarchy ids and timezone for a point; unmatched levels are `None`
    async fn resolve(&self, point: GeoPoint) -> Result<GeoLocation>;

    /// Currency code used at a point
    async fn currency_for(&self, point: GeoPoint) -> Result<String>;
}

/// Renders amounts for display
#[cfg_attr(test, automock)]
pub trait CurrencyFormatter: Send + Sync {
    fn format(&self, amount: Decimal, currency: &str) -> Result<String>;
}

/// Plain `"12.34 USD"` rendering used when a formatter fails
pub fn fallback_format(amount: Decimal, currency: &str) -> String {
    format!("{:.2} {}", round_money(amount), currency)
}

/// A bookable product
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RideType {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub capacity: u32,
    pub icon_url: Option<String>,
}

/// Ride types offered at a location
#[cfg_attr(test, automock)]
#[async_trait]
pub trait RideTypeCatalog: Send + Sync {
    async fn available_at(&self, point: GeoPoint) -> Result<Vec<RideType>>;
}

/// Best-effort live marketplace signals
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Telemetry: Send + Sync {
    /// Open requests per available driver around `point`
    async fn demand_ratio(&self, point: GeoPoint, radius_km: f64, window_minutes: u32)
        -> Result<f64>;

    /// Completed rides in the last 24 hours around `point`
    async fn ride_density(&self, point: GeoPoint, radius_km: f64) -> Result<u32>;
}

// ---------------------------------------------------------------------------
// Static implementations
// ---------------------------------------------------------------------------

/// Axis-aligned lat/lng rectangle, bounds inclusive
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl BoundingBox {
    pub fn new(min_lat: f64, max_lat: f64, min_lng: f64, max_lng: f64) -> Self {
        Self {
            min_lat,
            max_lat,
            min_lng,
            max_lng,
        }
    }

    pub fn contains(&self, point: &GeoPoint) -> bool {
        (self.min_lat..=self.max_lat).contains(&point.lat)
            && (self.min_lng..=self.max_lng).contains(&point.lng)
    }
}

/// A named area of the hierarchy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoArea {
    pub bounds: BoundingBox,
    pub location: GeoLocation,
    pub currency: String,
}

/// Resolves points against a fixed list of areas; the most specific match wins
#[derive(Debug, Clone, Default)]
pub struct StaticGeoResolver {
    areas: Vec<GeoArea>,
    default_currency: String,
}

impl StaticGeoResolver {
    pub fn new(default_currency: impl Into<String>) -> Self {
        Self {
            areas: Vec::new(),
            default_currency: default_currency.into(),
        }
    }

    pub fn with_area(mut self, area: GeoArea) -> Self {
        self.areas.push(area);
        self
    }

    fn best_match(&self, point: &GeoPoint) -> Option<&GeoArea> {
        let mut best: Option<(&GeoArea, ScopeLevel)> = None;
        for area in self.areas.iter().filter(|a| a.bounds.contains(point)) {
            let level = Scope::of_location(&area.location).level();
            if best.map_or(true, |(_, l)| level > l) {
                best = Some((area, level));
            }
        }
        best.map(|(area, _)| area)
    }
}

#[async_trait]
impl GeoResolver for StaticGeoResolver {
    async fn resolve(&self, point: GeoPoint) -> Result<GeoLocation> {
        point.validate()?;
        Ok(self
            .best_match(&point)
            .map(|area| area.location.clone())
            .unwrap_or_else(GeoLocation::unresolved))
    }

    async fn currency_for(&self, point: GeoPoint) -> Result<String> {
        Ok(self
            .best_match(&point)
            .map(|area| area.currency.clone())
            .unwrap_or_else(|| self.default_currency.clone()))
    }
}

/// Formats with a currency symbol for common codes
#[derive(Debug, Clone, Copy, Default)]
pub struct SymbolCurrencyFormatter;

impl SymbolCurrencyFormatter {
    fn symbol(code: &str) -> Option<&'static str> {
        let symbol = match code {
            "USD" => "$",
            "EUR" => "€",
            "GBP" => "£",
            "JPY" => "¥",
            "INR" => "₹",
            "NGN" => "₦",
            "KES" => "KSh ",
            "ZAR" => "R",
            "BRL" => "R$",
            "MXN" => "MX$",
            "CAD" => "CA$",
            "AUD" => "A$",
            _ => return None,
        };
        Some(symbol)
    }
}

impl CurrencyFormatter for SymbolCurrencyFormatter {
    fn format(&self, amount: Decimal, currency: &str) -> Result<String> {
        let code = currency.trim().to_ascii_uppercase();
        let symbol = Self::symbol(&code).ok_or_else(|| {
            FareError::Validation(ValidationError::Other(format!(
                "no symbol for currency {currency}"
            )))
        })?;
        let amount = round_money(amount);
        if amount.is_sign_negative() {
            Ok(format!("-{}{:.2}", symbol, amount.abs()))
        } else {
            Ok(format!("{}{:.2}", symbol, amount))
        }
    }
}

/// Fixed catalog served everywhere
#[derive(Debug, Clone, Default)]
pub struct StaticRideTypeCatalog {
    ride_types: Vec<RideType>,
}

impl StaticRideTypeCatalog {
    pub fn new(ride_types: Vec<RideType>) -> Self {
        Self { ride_types }
    }
}

#[async_trait]
impl RideTypeCatalog for StaticRideTypeCatalog {
    async fn available_at(&self, _point: GeoPoint) -> Result<Vec<RideType>> {
        Ok(self.ride_types.clone())
    }
}

/// Constant telemetry readings
#[derive(Debug, Clone, Copy)]
pub struct StaticTelemetry {
    pub demand_ratio: f64,
    pub ride_density: u32,
}

impl StaticTelemetry {
    pub fn new(demand_ratio: f64, ride_density: u32) -> Self {
        Self {
            demand_ratio,
            ride_density,
        }
    }
}

#[async_trait]
impl Telemetry for StaticTelemetry {
    async fn demand_ratio(&self, _point: GeoPoint, _radius_km: f64, _window: u32) -> Result<f64> {
        Ok(self.demand_ratio)
    }

    async fn ride_density(&self, _point: GeoPoint, _radius_km: f64) -> Result<u32> {
        Ok(self.ride_density)
    }
}

/// Telemetry that always fails, for deployments without a feed
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableTelemetry;

#[async_trait]
impl Telemetry for UnavailableTelemetry {
    async fn demand_ratio(&self, _point: GeoPoint, _radius_km: f64, _window: u32) -> Result<f64> {
        Err(FareError::Dependency("telemetry feed not configured".into()))
    }

    async fn ride_density(&self, _point: GeoPoint, _radius_km: f64) -> Result<u32> {
        Err(FareError::Dependency("telemetry feed not configured".into()))
    }
}
