//! Fare service
//!
//! Transport-neutral facade over the calculator exposing the rider-facing
//! operations: estimates, bulk estimates, negotiation checks, surge info,
//! resolved pricing and cancellation fees.

use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};

use ridefare_common::{
    FareCalculation, FareError, FareRequest, GeoPoint, ResolvedPricing, Result,
    ValidationError,
};

use crate::collaborators::{fallback_format, CurrencyFormatter, RideType, RideTypeCatalog};
use crate::pricing::{FareCalculator, SurgeFactors};

/// Answer to an estimate request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstimateResponse {
    pub currency: String,
    pub estimated_fare: Decimal,
    pub minimum_fare: Decimal,
    pub surge_multiplier: Decimal,
    pub distance_km: f64,
    pub estimated_minutes: u32,
    pub fare_breakdown: FareCalculation,
    pub formatted_fare: String,
}

/// One entry of a bulk estimate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RideTypeEstimate {
    pub ride_type: RideType,
    pub estimate: EstimateResponse,
}

/// Current surge at a point
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurgeInfo {
    pub surge_multiplier: Decimal,
    pub surge_min: Decimal,
    pub surge_max: Decimal,
    pub factors: SurgeFactors,
    pub surge_active: bool,
    pub message: String,
}

impl SurgeInfo {
    fn message_for(multiplier: Decimal) -> String {
        if multiplier > Decimal::ONE {
            format!(
                "Fares are {}x higher due to increased demand",
                multiplier.normalize()
            )
        } else {
            "Normal pricing".to_string()
        }
    }
}

/// Rider-facing pricing operations
pub struct FareService {
    calculator: Arc<FareCalculator>,
    catalog: Arc<dyn RideTypeCatalog>,
    formatter: Arc<dyn CurrencyFormatter>,
}

impl FareService {
    pub fn new(
        calculator: Arc<FareCalculator>,
        catalog: Arc<dyn RideTypeCatalog>,
        formatter: Arc<dyn CurrencyFormatter>,
    ) -> Self {
        Self {
            calculator,
            catalog,
            formatter,
        }
    }

    pub fn calculator(&self) -> &FareCalculator {
        &self.calculator
    }

    pub async fn get_estimate(&self, request: &FareRequest) -> Result<EstimateResponse> {
        self.get_estimate_at(request, Utc::now()).await
    }

    #[instrument(skip(self, request), fields(ride_type = ?request.ride_type_id))]
    pub async fn get_estimate_at(
        &self,
        request: &FareRequest,
        now: DateTime<Utc>,
    ) -> Result<EstimateResponse> {
        let calculation = self.calculator.calculate_at(request, now).await?;
        Ok(self.respond(calculation))
    }

    pub async fn get_bulk_estimate(&self, request: &FareRequest) -> Result<Vec<RideTypeEstimate>> {
        self.get_bulk_estimate_at(request, Utc::now()).await
    }

    /// One estimate per ride type offered at the pickup
    #[instrument(skip(self, request))]
    pub async fn get_bulk_estimate_at(
        &self,
        request: &FareRequest,
        now: DateTime<Utc>,
    ) -> Result<Vec<RideTypeEstimate>> {
        request.validate()?;
        let ride_types = self
            .catalog
            .available_at(request.pickup)
            .await
            .map_err(|e| FareError::Dependency(format!("ride type catalog: {e}")))?;

        let estimates = ride_types.into_iter().map(|ride_type| {
            let request = request.clone().with_ride_type(ride_type.id);
            async move {
                let estimate = self.get_estimate_at(&request, now).await?;
                Ok::<_, FareError>(RideTypeEstimate {
                    ride_type,
                    estimate,
                })
            }
        });
        try_join_all(estimates).await
    }

    pub async fn validate_negotiated_price(
        &self,
        request: &FareRequest,
        proposed: Decimal,
    ) -> Result<EstimateResponse> {
        self.validate_negotiated_price_at(request, proposed, Utc::now())
            .await
    }

    /// Check `proposed` against the band around a fresh estimate.
    ///
    /// Any negotiated fare already on the request is ignored so the band is
    /// always computed from the system price.
    #[instrument(skip(self, request))]
    pub async fn validate_negotiated_price_at(
        &self,
        request: &FareRequest,
        proposed: Decimal,
        now: DateTime<Utc>,
    ) -> Result<EstimateResponse> {
        if proposed <= Decimal::ZERO {
            return Err(ValidationError::NotPositive {
                field: "proposed_price",
            }
            .into());
        }
        let mut request = request.clone();
        request.negotiated_fare = None;

        let estimate = self.get_estimate_at(&request, now).await?;
        self.calculator
            .validate_negotiated(estimate.estimated_fare, proposed)?;
        info!(%proposed, estimated = %estimate.estimated_fare, "Negotiated price accepted");
        Ok(estimate)
    }

    pub async fn get_surge_info(&self, point: GeoPoint) -> Result<SurgeInfo> {
        self.get_surge_info_at(point, Utc::now()).await
    }

    /// Live surge for a point, clamped to the policy range in force there
    #[instrument(skip(self))]
    pub async fn get_surge_info_at(&self, point: GeoPoint, now: DateTime<Utc>) -> Result<SurgeInfo> {
        let location = self.calculator.locate(point).await?;
        let pricing = self
            .calculator
            .resolver()
            .resolve_at(&location, None, now)
            .await;

        let reading = self
            .calculator
            .surge_engine()
            .compute(point, location.local_time(now), None)
            .await;
        let multiplier = pricing.clamp_surge(reading.multiplier);

        Ok(SurgeInfo {
            surge_multiplier: multiplier,
            surge_min: pricing.surge_min_multiplier,
            surge_max: pricing.surge_max_multiplier,
            factors: reading.factors,
            surge_active: multiplier > Decimal::ONE,
            message: SurgeInfo::message_for(multiplier),
        })
    }

    pub async fn get_pricing(
        &self,
        point: GeoPoint,
        ride_type_id: Option<i64>,
    ) -> Result<ResolvedPricing> {
        self.get_pricing_at(point, ride_type_id, Utc::now()).await
    }

    /// Resolved configuration in force at a point
    pub async fn get_pricing_at(
        &self,
        point: GeoPoint,
        ride_type_id: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<ResolvedPricing> {
        let location = self.calculator.locate(point).await?;
        Ok(self
            .calculator
            .resolver()
            .resolve_at(&location, ride_type_id, now)
            .await)
    }

    pub async fn get_cancellation_fee(
        &self,
        point: GeoPoint,
        minutes_since_request: u32,
        estimated_fare: Decimal,
    ) -> Result<Decimal> {
        self.get_cancellation_fee_at(point, minutes_since_request, estimated_fare, Utc::now())
            .await
    }

    /// Fee charged for cancelling `minutes_since_request` after booking
    pub async fn get_cancellation_fee_at(
        &self,
        point: GeoPoint,
        minutes_since_request: u32,
        estimated_fare: Decimal,
        now: DateTime<Utc>,
    ) -> Result<Decimal> {
        if estimated_fare < Decimal::ZERO {
            return Err(ValidationError::Negative {
                field: "estimated_fare",
            }
            .into());
        }
        let pricing = self.get_pricing_at(point, None, now).await?;
        Ok(pricing.cancellation_fee(minutes_since_request, estimated_fare))
    }

    fn respond(&self, calculation: FareCalculation) -> EstimateResponse {
        let formatted_fare = match self
            .formatter
            .format(calculation.total_fare, &calculation.currency)
        {
            Ok(formatted) => formatted,
            Err(e) => {
                warn!(currency = %calculation.currency, error = %e, "Currency formatting failed");
                fallback_format(calculation.total_fare, &calculation.currency)
            }
        };

        EstimateResponse {
            currency: calculation.currency.clone(),
            estimated_fare: calculation.total_fare,
            minimum_fare: calculation.minimum_fare,
            surge_multiplier: calculation.surge_multiplier,
            distance_km: calculation.distance_km,
            estimated_minutes: calculation.duration_min,
            formatted_fare,
            fare_breakdown: calculation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{
        MockCurrencyFormatter, MockRideTypeCatalog, StaticGeoResolver, StaticRideTypeCatalog,
        StaticTelemetry, SymbolCurrencyFormatter,
    };
    use crate::config::EngineConfig;
    use crate::pricing::{PricingResolver, SurgeEngine};
    use crate::store::InMemoryConfigStore;
    use chrono::TimeZone;
    use ridefare_common::{ErrorKind, NegotiationError};
    use rust_decimal_macros::dec;

    fn quiet_hour() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 5, 10, 0, 0).unwrap()
    }

    fn pickup() -> GeoPoint {
        GeoPoint::new(40.7128, -74.0060)
    }

    fn request() -> FareRequest {
        FareRequest::new(pickup(), GeoPoint::new(40.7580, -73.9855))
            .with_distance(5.9)
            .with_duration(9)
    }

    fn calculator(telemetry: StaticTelemetry) -> Arc<FareCalculator> {
        let store = Arc::new(InMemoryConfigStore::new());
        let config = EngineConfig::default();
        Arc::new(FareCalculator::new(
            Arc::new(StaticGeoResolver::new("USD")),
            store.clone(),
            Arc::new(PricingResolver::new(store)),
            Arc::new(SurgeEngine::new(Arc::new(telemetry), config.surge.clone())),
            config,
        ))
    }

    fn service() -> FareService {
        FareService::new(
            calculator(StaticTelemetry::new(1.0, 0)),
            Arc::new(StaticRideTypeCatalog::new(vec![
                RideType {
                    id: 1,
                    name: "Economy".into(),
                    description: "Everyday rides".into(),
                    capacity: 4,
                    icon_url: None,
                },
                RideType {
                    id: 2,
                    name: "XL".into(),
                    description: "Six seats".into(),
                    capacity: 6,
                    icon_url: None,
                },
            ])),
            Arc::new(SymbolCurrencyFormatter),
        )
    }

    #[tokio::test]
    async fn test_estimate_response_mirrors_breakdown() {
        let estimate = service()
            .get_estimate_at(&request(), quiet_hour())
            .await
            .unwrap();
        assert_eq!(estimate.estimated_fare, dec!(15.10));
        assert_eq!(estimate.minimum_fare, dec!(5.00));
        assert_eq!(estimate.estimated_minutes, 9);
        assert_eq!(estimate.currency, "USD");
        assert_eq!(estimate.formatted_fare, "$15.10");
        assert_eq!(estimate.fare_breakdown.total_fare, estimate.estimated_fare);
    }

    #[tokio::test]
    async fn test_formatter_failure_uses_fallback() {
        let mut formatter = MockCurrencyFormatter::new();
        formatter
            .expect_format()
            .returning(|_, _| Err(FareError::Internal("no locale data".into())));
        let service = FareService::new(
            calculator(StaticTelemetry::new(1.0, 0)),
            Arc::new(StaticRideTypeCatalog::default()),
            Arc::new(formatter),
        );
        let estimate = service
            .get_estimate_at(&request(), quiet_hour())
            .await
            .unwrap();
        assert_eq!(estimate.formatted_fare, "15.10 USD");
    }

    #[tokio::test]
    async fn test_bulk_estimate_one_per_ride_type() {
        let estimates = service()
            .get_bulk_estimate_at(&request(), quiet_hour())
            .await
            .unwrap();
        assert_eq!(estimates.len(), 2);
        assert_eq!(estimates[0].ride_type.name, "Economy");
        assert_eq!(estimates[0].estimate.fare_breakdown.ride_type_id, Some(1));
        assert_eq!(estimates[1].estimate.fare_breakdown.ride_type_id, Some(2));
    }

    #[tokio::test]
    async fn test_bulk_estimate_catalog_failure_is_dependency_error() {
        let mut catalog = MockRideTypeCatalog::new();
        catalog
            .expect_available_at()
            .returning(|_| Err(FareError::Internal("catalog offline".into())));
        let service = FareService::new(
            calculator(StaticTelemetry::new(1.0, 0)),
            Arc::new(catalog),
            Arc::new(SymbolCurrencyFormatter),
        );
        let err = service
            .get_bulk_estimate_at(&request(), quiet_hour())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DependencyUnavailable);
    }

    #[tokio::test]
    async fn test_negotiated_price_band() {
        let service = service();
        // Estimate is 15.10: band is [10.57, 22.65]
        let ok = service
            .validate_negotiated_price_at(&request(), dec!(10.57), quiet_hour())
            .await;
        assert!(ok.is_ok());

        let low = service
            .validate_negotiated_price_at(&request(), dec!(10.56), quiet_hour())
            .await
            .unwrap_err();
        assert_eq!(low.kind(), ErrorKind::PreconditionFailed);
        assert!(matches!(
            low,
            FareError::Negotiation(NegotiationError::BelowMinimum { .. })
        ));

        let high = service
            .validate_negotiated_price_at(&request(), dec!(22.66), quiet_hour())
            .await
            .unwrap_err();
        assert!(matches!(
            high,
            FareError::Negotiation(NegotiationError::AboveMaximum { .. })
        ));
    }

    #[tokio::test]
    async fn test_negotiated_override_on_request_is_ignored() {
        let request = request().with_negotiated_fare(dec!(100));
        let estimate = service()
            .validate_negotiated_price_at(&request, dec!(15), quiet_hour())
            .await
            .unwrap();
        assert!(!estimate.fare_breakdown.was_negotiated);
    }

    #[tokio::test]
    async fn test_surge_info_messages() {
        let quiet = service().get_surge_info_at(pickup(), quiet_hour()).await.unwrap();
        assert!(!quiet.surge_active);
        assert_eq!(quiet.message, "Normal pricing");
        assert_eq!(quiet.surge_min, dec!(1.0));
        assert_eq!(quiet.surge_max, dec!(5.0));

        let busy = FareService::new(
            calculator(StaticTelemetry::new(2.0, 0)),
            Arc::new(StaticRideTypeCatalog::default()),
            Arc::new(SymbolCurrencyFormatter),
        );
        let info = busy.get_surge_info_at(pickup(), quiet_hour()).await.unwrap();
        assert!(info.surge_active);
        assert!(info.message.starts_with("Fares are "));
        assert!(info.message.ends_with("x higher due to increased demand"));
    }

    #[tokio::test]
    async fn test_cancellation_fee_tiers() {
        let service = service();
        let at = |minutes| service.get_cancellation_fee_at(pickup(), minutes, dec!(20), quiet_hour());
        assert_eq!(at(0).await.unwrap(), dec!(0));
        assert_eq!(at(3).await.unwrap(), dec!(5.00));
        assert_eq!(at(12).await.unwrap(), dec!(10.00));

        let err = service
            .get_cancellation_fee_at(pickup(), 3, dec!(-1), quiet_hour())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn test_pricing_defaults_without_active_version() {
        let pricing = service()
            .get_pricing_at(pickup(), Some(1), quiet_hour())
            .await
            .unwrap();
        assert_eq!(pricing.version_id, 0);
        assert_eq!(pricing.base_fare, dec!(3.00));
    }

    #[test]
    fn test_surge_message_format() {
        assert_eq!(
            SurgeInfo::message_for(dec!(1.50)),
            "Fares are 1.5x higher due to increased demand"
        );
        assert_eq!(SurgeInfo::message_for(dec!(1.0)), "Normal pricing");
    }
}
