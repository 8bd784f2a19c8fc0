//! Fully-resolved pricing record
//!
//! Produced by folding hierarchy layers over the built-in defaults. Every
//! numeric field is populated.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use super::config::{CancellationFee, FeeType, PricingConfig};
use super::money::round_money;

/// Version id reported when no version is active
pub const DEFAULTS_VERSION_ID: i64 = 0;

/// Pricing with every layer applied
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedPricing {
    pub version_id: i64,
    pub base_fare: Decimal,
    pub per_km_rate: Decimal,
    pub per_minute_rate: Decimal,
    pub minimum_fare: Decimal,
    pub booking_fee: Decimal,
    pub platform_commission_pct: Decimal,
    pub driver_incentive_pct: Decimal,
    pub surge_min_multiplier: Decimal,
    pub surge_max_multiplier: Decimal,
    pub tax_rate_pct: Decimal,
    pub tax_inclusive: bool,
    pub cancellation_fees: Vec<CancellationFee>,
    /// Provenance of every applied layer, least specific first
    pub inheritance_chain: Vec<String>,
}

impl ResolvedPricing {
    /// Built-in defaults used when nothing more specific is configured
    pub fn defaults() -> Self {
        Self {
            version_id: DEFAULTS_VERSION_ID,
            base_fare: dec!(3.00),
            per_km_rate: dec!(1.50),
            per_minute_rate: dec!(0.25),
            minimum_fare: dec!(5.00),
            booking_fee: dec!(1.00),
            platform_commission_pct: dec!(20),
            driver_incentive_pct: Decimal::ZERO,
            surge_min_multiplier: dec!(1.0),
            surge_max_multiplier: dec!(5.0),
            tax_rate_pct: Decimal::ZERO,
            tax_inclusive: false,
            cancellation_fees: vec![
                CancellationFee::fixed(0, dec!(0)),
                CancellationFee::fixed(2, dec!(5)),
                CancellationFee::fixed(5, dec!(10)),
            ],
            inheritance_chain: vec!["defaults".to_string()],
        }
    }

    /// Overlay every set field of `layer`, recording its provenance
    pub fn overlay(&mut self, layer: &PricingConfig) {
        fn set<T: Clone>(target: &mut T, value: &Option<T>) {
            if let Some(v) = value {
                *target = v.clone();
            }
        }

        set(&mut self.base_fare, &layer.base_fare);
        set(&mut self.per_km_rate, &layer.per_km_rate);
        set(&mut self.per_minute_rate, &layer.per_minute_rate);
        set(&mut self.minimum_fare, &layer.minimum_fare);
        set(&mut self.booking_fee, &layer.booking_fee);
        set(&mut self.platform_commission_pct, &layer.platform_commission_pct);
        set(&mut self.driver_incentive_pct, &layer.driver_incentive_pct);
        set(&mut self.surge_min_multiplier, &layer.surge_min_multiplier);
        set(&mut self.surge_max_multiplier, &layer.surge_max_multiplier);
        set(&mut self.tax_rate_pct, &layer.tax_rate_pct);
        set(&mut self.tax_inclusive, &layer.tax_inclusive);
        set(&mut self.cancellation_fees, &layer.cancellation_fees);

        self.inheritance_chain.push(layer.provenance());
    }

    /// Clamp a surge multiplier into the policy range
    pub fn clamp_surge(&self, surge: Decimal) -> Decimal {
        surge
            .max(self.surge_min_multiplier)
            .min(self.surge_max_multiplier)
    }

    /// Fee for cancelling `elapsed_minutes` after the request.
    ///
    /// The effective tier is the one with the greatest `after_minutes` not
    /// exceeding the elapsed time; later entries win ties.
    pub fn cancellation_fee(&self, elapsed_minutes: u32, estimated_fare: Decimal) -> Decimal {
        let tier = self
            .cancellation_fees
            .iter()
            .filter(|tier| tier.after_minutes <= elapsed_minutes)
            .max_by_key(|tier| tier.after_minutes);

        match tier {
            None => Decimal::ZERO,
            Some(tier) => match tier.fee_type {
                FeeType::Fixed => round_money(tier.fee),
                FeeType::Percentage => round_money(estimated_fare * tier.fee / dec!(100)),
            },
        }
    }
}

impl Default for ResolvedPricing {
    fn default() -> Self {
        Self::defaults()
    }
}
