//! Fare calculator
//!
//! Produces the full `FareCalculation` breakdown. Step order is fixed:
//! locate, resolve, charges and zone fees, multipliers, subtotal, minimum
//! floor, tax, negotiated override, commission split. Every store read goes
//! through one version id captured at the start of the calculation.

use chrono::{DateTime, FixedOffset, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use ridefare_common::{
    decimal_to_f64, round_money, try_decimal_from_f64, FareCalculation, FareError, FareRequest,
    FeeSide, GeoLocation, GeoPoint, NegotiationError, ResolvedPricing, Result, ValidationError,
    ZoneFee, ZoneFeeCharge, DEFAULTS_VERSION_ID,
};

use super::modulator::{Modulator, Multipliers};
use super::resolver::PricingResolver;
use super::surge::SurgeEngine;
use crate::collaborators::GeoResolver;
use crate::config::{EngineConfig, ScheduleClock};
use crate::metrics::FareMetrics;
use crate::store::ConfigStore;

/// Trip duration at `speed_kmh`, rounded up, at least one minute
pub fn estimate_duration_min(distance_km: f64, speed_kmh: f64) -> u32 {
    let minutes = (distance_km / speed_kmh * 60.0).ceil();
    if minutes.is_finite() {
        minutes.max(1.0) as u32
    } else {
        1
    }
}

/// Multiply two money terms, reporting overflow as invalid input
fn checked_product(a: Decimal, b: Decimal, step: &'static str) -> Result<Decimal> {
    a.checked_mul(b).ok_or_else(|| {
        ValidationError::OutOfRange {
            field: step,
            reason: format!("{a} x {b} overflows"),
        }
        .into()
    })
}

fn checked_sum(a: Decimal, b: Decimal, step: &'static str) -> Result<Decimal> {
    a.checked_add(b).ok_or_else(|| {
        ValidationError::OutOfRange {
            field: step,
            reason: format!("{a} + {b} overflows"),
        }
        .into()
    })
}

/// Zone fee lines for a trip.
///
/// A row is charged at most once: on the pickup side when it covers the
/// pickup zone and applies to pickups, otherwise on the dropoff side.
/// Percentage rows are a share of `base_sum`.
pub fn zone_fee_charges(
    fees: &[ZoneFee],
    pickup_zone: Option<i64>,
    dropoff_zone: Option<i64>,
    base_sum: Decimal,
    wall_clock: &DateTime<FixedOffset>,
) -> Vec<ZoneFeeCharge> {
    fees.iter()
        .filter(|fee| fee.schedule.as_ref().map_or(true, |s| s.is_open(wall_clock)))
        .filter_map(|fee| {
            let side = if Some(fee.zone_id) == pickup_zone && fee.applies_pickup {
                FeeSide::Pickup
            } else if Some(fee.zone_id) == dropoff_zone && fee.applies_dropoff {
                FeeSide::Dropoff
            } else {
                return None;
            };
            let amount = if fee.is_percentage {
                base_sum * fee.amount / dec!(100)
            } else {
                fee.amount
            };
            Some(ZoneFeeCharge {
                zone_fee_id: fee.id,
                zone_id: fee.zone_id,
                fee_type: fee.fee_type.clone(),
                side,
                amount: round_money(amount),
            })
        })
        .collect()
}

/// Computes fares against the active pricing version
pub struct FareCalculator {
    geo: Arc<dyn GeoResolver>,
    store: Arc<dyn ConfigStore>,
    resolver: Arc<PricingResolver>,
    modulator: Modulator,
    surge: Arc<SurgeEngine>,
    config: EngineConfig,
    metrics: Option<Arc<FareMetrics>>,
}

impl FareCalculator {
    pub fn new(
        geo: Arc<dyn GeoResolver>,
        store: Arc<dyn ConfigStore>,
        resolver: Arc<PricingResolver>,
        surge: Arc<SurgeEngine>,
        config: EngineConfig,
    ) -> Self {
        Self {
            geo,
            modulator: Modulator::new(store.clone()),
            store,
            resolver,
            surge,
            config,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<FareMetrics>) -> Self {
        self.modulator = Modulator::new(self.store.clone()).with_metrics(metrics.clone());
        self.metrics = Some(metrics);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn resolver(&self) -> &PricingResolver {
        &self.resolver
    }

    pub fn surge_engine(&self) -> &SurgeEngine {
        &self.surge
    }

    /// Resolve a point, pricing it globally when the resolver is down
    pub async fn locate(&self, point: GeoPoint) -> Result<GeoLocation> {
        point.validate()?;
        match self.geo.resolve(point).await {
            Ok(location) => Ok(location),
            Err(FareError::Validation(e)) => Err(e.into()),
            Err(e) => {
                warn!(lat = point.lat, lng = point.lng, error = %e, "Geo resolution failed, using global scope");
                self.degraded("geo");
                Ok(GeoLocation::unresolved())
            }
        }
    }

    /// Currency for a request: explicit, resolved from the pickup, or the default
    pub async fn currency_for(&self, request: &FareRequest) -> String {
        if let Some(currency) = request.currency.as_deref().filter(|c| !c.trim().is_empty()) {
            return currency.trim().to_ascii_uppercase();
        }
        match self.geo.currency_for(request.pickup).await {
            Ok(currency) => currency,
            Err(e) => {
                warn!(error = %e, "Currency lookup failed, using default");
                self.config.default_currency.clone()
            }
        }
    }

    pub async fn calculate(&self, request: &FareRequest) -> Result<FareCalculation> {
        self.calculate_at(request, Utc::now()).await
    }

    /// Calculate as of `now`
    #[instrument(skip(self, request), fields(ride_type = ?request.ride_type_id))]
    pub async fn calculate_at(
        &self,
        request: &FareRequest,
        now: DateTime<Utc>,
    ) -> Result<FareCalculation> {
        request.validate()?;

        // 1. Hierarchy of both ends
        let pickup = self.locate(request.pickup).await?;
        let dropoff = self.locate(request.dropoff).await?;

        // 2-3. One version snapshot for the whole calculation
        let version_id = self.resolver.active_version_id(now).await;
        let pricing = self
            .resolver
            .resolve(version_id, &pickup, request.ride_type_id)
            .await;

        // 4. Base charges
        let distance_km = request
            .distance_km
            .unwrap_or_else(|| request.pickup.distance_km(&request.dropoff));
        let duration_min = request.duration_min.unwrap_or_else(|| {
            estimate_duration_min(distance_km, self.config.average_speed_kmh)
        });

        let base_fare = pricing.base_fare;
        let distance_charge = checked_product(
            try_decimal_from_f64(distance_km, "distance_km")?,
            pricing.per_km_rate,
            "distance_charge",
        )?;
        let time_charge = checked_product(
            Decimal::from(duration_min),
            pricing.per_minute_rate,
            "time_charge",
        )?;
        let booking_fee = pricing.booking_fee;
        let base_sum = [distance_charge, time_charge, booking_fee]
            .into_iter()
            .try_fold(base_fare, |sum, term| checked_sum(sum, term, "base_sum"))?;

        let local_clock = pickup.local_time(now);
        let zone_fees = if version_id == DEFAULTS_VERSION_ID {
            Vec::new()
        } else {
            self.zone_fees(version_id, &pickup, &dropoff, request, base_sum, now)
                .await
        };
        let zone_fees_total: Decimal = zone_fees.iter().map(|c| c.amount).sum();

        // 5. Multipliers
        let multipliers = if version_id == DEFAULTS_VERSION_ID {
            Multipliers {
                surge: pricing.clamp_surge(request.surge_multiplier.unwrap_or(Decimal::ONE)),
                ..Multipliers::neutral()
            }
        } else {
            Multipliers {
                time: self
                    .modulator
                    .time_multiplier(version_id, &pickup, local_clock)
                    .await,
                weather: self
                    .modulator
                    .weather_multiplier(version_id, &pickup, request.weather)
                    .await,
                event: self
                    .modulator
                    .event_multiplier(version_id, pickup.city_id, pickup.zone_id, now)
                    .await,
                surge: self
                    .surge_multiplier(version_id, &pickup, &pricing, request, local_clock)
                    .await,
            }
        };
        let total_multiplier = multipliers.total();

        // 6-8. Subtotal and minimum floor
        let mut subtotal = checked_sum(
            checked_product(base_sum, total_multiplier, "subtotal")?,
            zone_fees_total,
            "subtotal",
        )?;
        let minimum_fare_applied = subtotal < pricing.minimum_fare;
        if minimum_fare_applied {
            subtotal = pricing.minimum_fare;
        }
        let subtotal = round_money(subtotal);

        // 9. Tax
        let rate = pricing.tax_rate_pct / dec!(100);
        let (tax_amount, mut total_fare) = if pricing.tax_inclusive {
            let tax = round_money(subtotal - subtotal / (Decimal::ONE + rate));
            (tax, subtotal)
        } else {
            let tax = round_money(checked_product(subtotal, rate, "tax_amount")?);
            (tax, checked_sum(subtotal, tax, "total_fare")?)
        };

        // 10. Negotiated override
        let was_negotiated = request.negotiated_fare.is_some();
        if let Some(negotiated) = request.negotiated_fare {
            total_fare = round_money(negotiated);
        }

        // 11. Commission on the final total; driver takes the remainder
        let platform_commission = round_money(
            checked_product(total_fare, pricing.platform_commission_pct, "platform_commission")?
                / dec!(100),
        );
        let driver_earnings = total_fare - platform_commission;

        let currency = self.currency_for(request).await;

        if let Some(metrics) = &self.metrics {
            metrics.calculations_total.inc();
            metrics
                .surge_multiplier
                .observe(decimal_to_f64(multipliers.surge));
        }
        debug!(
            version_id,
            %subtotal,
            %total_fare,
            %total_multiplier,
            minimum_fare_applied,
            "Calculated fare"
        );

        Ok(FareCalculation {
            id: Uuid::new_v4(),
            pricing_version_id: version_id,
            pickup: request.pickup,
            dropoff: request.dropoff,
            country_id: pickup.country_id,
            region_id: pickup.region_id,
            city_id: pickup.city_id,
            pickup_zone_id: pickup.zone_id,
            dropoff_zone_id: dropoff.zone_id,
            ride_type_id: request.ride_type_id,
            distance_km,
            duration_min,
            base_fare: round_money(base_fare),
            distance_charge: round_money(distance_charge),
            time_charge: round_money(time_charge),
            booking_fee: round_money(booking_fee),
            zone_fees_total: round_money(zone_fees_total),
            zone_fees_breakdown: zone_fees,
            time_multiplier: multipliers.time,
            weather_multiplier: multipliers.weather,
            event_multiplier: multipliers.event,
            surge_multiplier: multipliers.surge,
            total_multiplier,
            subtotal,
            minimum_fare: round_money(pricing.minimum_fare),
            minimum_fare_applied,
            tax_rate_pct: pricing.tax_rate_pct,
            tax_inclusive: pricing.tax_inclusive,
            tax_amount,
            total_fare,
            was_negotiated,
            platform_commission_pct: pricing.platform_commission_pct,
            platform_commission,
            driver_earnings,
            currency,
            inheritance_chain: pricing.inheritance_chain,
            calculated_at: now,
        })
    }

    /// Check a proposed price against the band around `estimated_total`.
    ///
    /// Bounds are compared unrounded; the error carries them rounded to cents.
    pub fn validate_negotiated(
        &self,
        estimated_total: Decimal,
        proposed: Decimal,
    ) -> std::result::Result<(), NegotiationError> {
        let band = &self.config.negotiation;
        let lower = estimated_total * band.lower_ratio;
        let upper = estimated_total * band.upper_ratio;
        if proposed < lower {
            return Err(NegotiationError::BelowMinimum {
                proposed,
                minimum: round_money(lower),
            });
        }
        if proposed > upper {
            return Err(NegotiationError::AboveMaximum {
                proposed,
                maximum: round_money(upper),
            });
        }
        Ok(())
    }

    /// Surge lock, then a matching threshold tier, then the surge engine; clamped to policy
    async fn surge_multiplier(
        &self,
        version_id: i64,
        pickup: &GeoLocation,
        pricing: &ResolvedPricing,
        request: &FareRequest,
        local_clock: DateTime<FixedOffset>,
    ) -> Decimal {
        if let Some(locked) = request.surge_multiplier {
            return pricing.clamp_surge(locked);
        }

        let observed = Some(request.demand_supply_ratio).filter(|r| *r > 0.0);
        if let Some(ratio) = observed {
            if let Some(tier) = self.modulator.threshold_surge(version_id, pickup, ratio).await {
                return pricing.clamp_surge(tier);
            }
        }

        let reading = self
            .surge
            .compute(request.pickup, local_clock, observed)
            .await;
        pricing.clamp_surge(reading.multiplier)
    }

    async fn zone_fees(
        &self,
        version_id: i64,
        pickup: &GeoLocation,
        dropoff: &GeoLocation,
        request: &FareRequest,
        base_sum: Decimal,
        now: DateTime<Utc>,
    ) -> Vec<ZoneFeeCharge> {
        if pickup.zone_id.is_none() && dropoff.zone_id.is_none() {
            return Vec::new();
        }
        let rows = match self
            .store
            .zone_fees_for(version_id, pickup.zone_id, dropoff.zone_id, request.ride_type_id)
            .await
        {
            Ok(rows) => rows,
            Err(e) => {
                warn!(version_id, error = %e, "Zone fee lookup failed, charging none");
                self.degraded("zone_fees");
                return Vec::new();
            }
        };
        let clock = match self.config.zone_fee_schedule_clock {
            ScheduleClock::PickupLocal => pickup.local_time(now),
            ScheduleClock::Server => now.fixed_offset(),
        };
        zone_fee_charges(&rows, pickup.zone_id, dropoff.zone_id, base_sum, &clock)
    }

    fn degraded(&self, factor: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.degraded(factor);
        }
    }
}
