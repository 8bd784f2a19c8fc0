//! End-to-end fare estimates through the wired engine

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use ridefare_common::{
    ErrorKind, FareError, FareRequest, GeoPoint, NegotiationError, NewVersion, PricingConfig,
    Scope, DEFAULTS_VERSION_ID,
};
use ridefare_engine::{
    collaborators::{StaticGeoResolver, StaticRideTypeCatalog, StaticTelemetry, SymbolCurrencyFormatter},
    Collaborators, EngineConfig, InMemoryConfigStore, PolicyRow, RideFare,
};

/// Tuesday 10:00 UTC: no time-of-day or day-of-week surge
fn quiet_hour() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 5, 10, 0, 0).unwrap()
}

fn manhattan_trip() -> FareRequest {
    FareRequest::new(GeoPoint::new(40.7128, -74.0060), GeoPoint::new(40.7580, -73.9855))
        .with_distance(5.9)
        .with_duration(9)
}

fn engine(demand_ratio: f64) -> RideFare {
    let collaborators = Collaborators {
        geo: Arc::new(StaticGeoResolver::new("USD")),
        formatter: Arc::new(SymbolCurrencyFormatter),
        catalog: Arc::new(StaticRideTypeCatalog::default()),
        telemetry: Arc::new(StaticTelemetry::new(demand_ratio, 0)),
    };
    RideFare::new(
        EngineConfig::default(),
        Arc::new(InMemoryConfigStore::new()),
        collaborators,
    )
    .unwrap()
}

/// Activate a version holding one global config
async fn activate_global(ridefare: &RideFare, config: PricingConfig) -> i64 {
    let version = ridefare
        .versions
        .create(NewVersion::new("scenario", "ops"))
        .await
        .unwrap();
    ridefare
        .versions
        .add_row(PolicyRow::Config(config).with_ids(0, version.id), "ops")
        .await
        .unwrap();
    ridefare
        .versions
        .activate(version.id, "lead", None)
        .await
        .unwrap();
    version.id
}

fn flat_fare(base_fare: Decimal, booking_fee: Decimal) -> PricingConfig {
    let mut config = PricingConfig::at(Scope::global());
    config.base_fare = Some(base_fare);
    config.booking_fee = Some(booking_fee);
    config.per_km_rate = Some(Decimal::ZERO);
    config.per_minute_rate = Some(Decimal::ZERO);
    config
}

#[tokio::test]
async fn test_standard_ride_on_defaults() {
    let ridefare = engine(1.0);
    let estimate = ridefare
        .service
        .get_estimate_at(&manhattan_trip(), quiet_hour())
        .await
        .unwrap();
    let fare = &estimate.fare_breakdown;

    assert_eq!(fare.pricing_version_id, DEFAULTS_VERSION_ID);
    assert_eq!(fare.base_fare, dec!(3.00));
    assert_eq!(fare.distance_charge, dec!(8.85));
    assert_eq!(fare.time_charge, dec!(2.25));
    assert_eq!(fare.booking_fee, dec!(1.00));
    assert_eq!(fare.time_multiplier, Decimal::ONE);
    assert_eq!(fare.weather_multiplier, Decimal::ONE);
    assert_eq!(fare.event_multiplier, Decimal::ONE);
    assert_eq!(fare.surge_multiplier, Decimal::ONE);
    assert_eq!(fare.subtotal, dec!(15.10));
    assert_eq!(fare.tax_amount, dec!(0));
    assert_eq!(fare.total_fare, dec!(15.10));
    assert_eq!(fare.platform_commission, dec!(3.02));
    assert_eq!(fare.driver_earnings, dec!(12.08));
    assert_eq!(estimate.formatted_fare, "$15.10");
}

#[tokio::test]
async fn test_supplied_surge_multiplies_subtotal() {
    let ridefare = engine(1.0);
    let request = manhattan_trip().with_surge(dec!(1.8));
    let fare = ridefare
        .service
        .get_estimate_at(&request, quiet_hour())
        .await
        .unwrap()
        .fare_breakdown;

    assert_eq!(fare.surge_multiplier, dec!(1.8));
    assert_eq!(fare.subtotal, dec!(27.18));
    assert_eq!(fare.total_fare, dec!(27.18));
    assert_eq!(fare.platform_commission, dec!(5.44));
    assert_eq!(fare.driver_earnings, dec!(21.74));
}

#[tokio::test]
async fn test_minimum_fare_floor() {
    let ridefare = engine(1.0);
    let spot = GeoPoint::new(0.001, 0.001);
    let request = FareRequest::new(spot, spot).with_duration(1);
    let fare = ridefare
        .service
        .get_estimate_at(&request, quiet_hour())
        .await
        .unwrap()
        .fare_breakdown;

    assert_eq!(fare.distance_charge, dec!(0));
    assert_eq!(fare.time_charge, dec!(0.25));
    assert!(fare.minimum_fare_applied);
    assert_eq!(fare.total_fare, dec!(5.00));
}

#[tokio::test]
async fn test_tax_inclusive_carves_out_tax() {
    let ridefare = engine(1.0);
    let mut config = flat_fare(dec!(20), dec!(2));
    config.tax_rate_pct = Some(dec!(10));
    config.tax_inclusive = Some(true);
    let version_id = activate_global(&ridefare, config).await;

    let fare = ridefare
        .service
        .get_estimate_at(&manhattan_trip(), quiet_hour())
        .await
        .unwrap()
        .fare_breakdown;

    assert_eq!(fare.pricing_version_id, version_id);
    assert_eq!(fare.subtotal, dec!(22.00));
    assert_eq!(fare.tax_amount, dec!(2.00));
    assert_eq!(fare.total_fare, dec!(22.00));
    assert_eq!(fare.platform_commission + fare.driver_earnings, fare.total_fare);
}

#[tokio::test]
async fn test_negotiation_band_boundaries() {
    let ridefare = engine(1.0);
    activate_global(&ridefare, flat_fare(dec!(20), dec!(0))).await;
    let service = &ridefare.service;
    let trip = manhattan_trip();

    let estimate = service
        .validate_negotiated_price_at(&trip, dec!(14.00), quiet_hour())
        .await
        .unwrap();
    assert_eq!(estimate.estimated_fare, dec!(20.00));
    assert!(service
        .validate_negotiated_price_at(&trip, dec!(30.00), quiet_hour())
        .await
        .is_ok());

    let below = service
        .validate_negotiated_price_at(&trip, dec!(13.99), quiet_hour())
        .await
        .unwrap_err();
    assert_eq!(below.kind(), ErrorKind::PreconditionFailed);
    assert!(matches!(
        below,
        FareError::Negotiation(NegotiationError::BelowMinimum { minimum, .. }) if minimum == dec!(14.00)
    ));

    let above = service
        .validate_negotiated_price_at(&trip, dec!(30.01), quiet_hour())
        .await
        .unwrap_err();
    assert!(matches!(
        above,
        FareError::Negotiation(NegotiationError::AboveMaximum { maximum, .. }) if maximum == dec!(30.00)
    ));
}

#[tokio::test]
async fn test_surge_clamped_to_policy_range() {
    // Heavy demand: the composite lands above the 2.5 ceiling
    let busy = engine(10.0);
    let mut capped = PricingConfig::at(Scope::global());
    capped.surge_max_multiplier = Some(dec!(2.5));
    activate_global(&busy, capped).await;

    let computed = busy
        .service
        .get_estimate_at(&manhattan_trip(), quiet_hour())
        .await
        .unwrap();
    assert_eq!(computed.surge_multiplier, dec!(2.5));

    let locked = busy
        .service
        .get_estimate_at(&manhattan_trip().with_surge(dec!(3.1)), quiet_hour())
        .await
        .unwrap();
    assert_eq!(locked.surge_multiplier, dec!(2.5));

    // Quiet market: the composite of 1.0 is lifted to the 1.2 floor
    let quiet = engine(1.0);
    let mut floored = PricingConfig::at(Scope::global());
    floored.surge_min_multiplier = Some(dec!(1.2));
    activate_global(&quiet, floored).await;

    let computed = quiet
        .service
        .get_estimate_at(&manhattan_trip(), quiet_hour())
        .await
        .unwrap();
    assert_eq!(computed.surge_multiplier, dec!(1.2));

    let info = quiet
        .service
        .get_surge_info_at(GeoPoint::new(40.7128, -74.0060), quiet_hour())
        .await
        .unwrap();
    assert_eq!(info.surge_multiplier, dec!(1.2));
    assert!(info.surge_active);
}

#[tokio::test]
async fn test_metrics_track_calculations() {
    let ridefare = engine(1.0);
    for _ in 0..3 {
        ridefare
            .service
            .get_estimate_at(&manhattan_trip(), quiet_hour())
            .await
            .unwrap();
    }
    assert_eq!(ridefare.metrics.calculations_total.get(), 3);
}

#[tokio::test]
async fn test_cache_is_cleared_by_activation() {
    let ridefare = engine(1.0);
    activate_global(&ridefare, flat_fare(dec!(20), dec!(0))).await;
    let first = ridefare
        .service
        .get_estimate_at(&manhattan_trip(), quiet_hour())
        .await
        .unwrap();
    assert_eq!(first.estimated_fare, dec!(20.00));
    let cache = ridefare.cache.as_ref().unwrap();
    assert!(!cache.is_empty());

    activate_global(&ridefare, flat_fare(dec!(25), dec!(0))).await;
    assert!(cache.is_empty());
    let second = ridefare
        .service
        .get_estimate_at(&manhattan_trip(), quiet_hour())
        .await
        .unwrap();
    assert_eq!(second.estimated_fare, dec!(25.00));
}
