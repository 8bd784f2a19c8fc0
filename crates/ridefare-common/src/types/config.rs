//! Hierarchical pricing configuration rows
//!
//! Every value column is nullable: an unset field inherits from the next
//! less specific layer, and ultimately from the built-in defaults.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::scope::Scope;
use crate::error::ValidationError;

/// How a cancellation fee tier is charged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeeType {
    Fixed,
    Percentage,
}

/// One tier of the cancellation policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancellationFee {
    /// Tier applies once this many minutes have elapsed since the request
    pub after_minutes: u32,
    pub fee: Decimal,
    pub fee_type: FeeType,
}

impl CancellationFee {
    pub fn fixed(after_minutes: u32, fee: Decimal) -> Self {
        Self {
            after_minutes,
            fee,
            fee_type: FeeType::Fixed,
        }
    }

    pub fn percentage(after_minutes: u32, fee: Decimal) -> Self {
        Self {
            after_minutes,
            fee,
            fee_type: FeeType::Percentage,
        }
    }
}

/// A pricing row at one hierarchy level, optionally ride-type specific
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PricingConfig {
    pub id: i64,
    pub version_id: i64,
    #[serde(flatten)]
    pub scope: Scope,
    pub ride_type_id: Option<i64>,
    pub base_fare: Option<Decimal>,
    pub per_km_rate: Option<Decimal>,
    pub per_minute_rate: Option<Decimal>,
    pub minimum_fare: Option<Decimal>,
    pub booking_fee: Option<Decimal>,
    pub platform_commission_pct: Option<Decimal>,
    pub driver_incentive_pct: Option<Decimal>,
    pub surge_min_multiplier: Option<Decimal>,
    pub surge_max_multiplier: Option<Decimal>,
    pub tax_rate_pct: Option<Decimal>,
    pub tax_inclusive: Option<bool>,
    /// Ordered tiers; insertion order is preserved
    pub cancellation_fees: Option<Vec<CancellationFee>>,
}

impl PricingConfig {
    /// Empty row at the given scope; every value inherits
    pub fn at(scope: Scope) -> Self {
        Self {
            scope,
            ..Self::default()
        }
    }

    pub fn for_ride_type(mut self, ride_type_id: i64) -> Self {
        self.ride_type_id = Some(ride_type_id);
        self
    }

    /// Provenance tag used in the inheritance chain
    pub fn provenance(&self) -> String {
        match self.ride_type_id {
            Some(ride_type) => format!("{}/ride_type:{}", self.scope, ride_type),
            None => self.scope.to_string(),
        }
    }

    /// Validate scope consistency and value ranges
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.scope.validate()?;

        let money = [
            ("base_fare", self.base_fare),
            ("per_km_rate", self.per_km_rate),
            ("per_minute_rate", self.per_minute_rate),
            ("minimum_fare", self.minimum_fare),
            ("booking_fee", self.booking_fee),
            ("driver_incentive_pct", self.driver_incentive_pct),
        ];
        for (field, value) in money {
            if matches!(value, Some(v) if v < Decimal::ZERO) {
                return Err(ValidationError::Negative { field });
            }
        }

        let percent = [
            ("platform_commission_pct", self.platform_commission_pct),
            ("tax_rate_pct", self.tax_rate_pct),
        ];
        for (field, value) in percent {
            if let Some(v) = value {
                if v < Decimal::ZERO || v > Decimal::ONE_HUNDRED {
                    return Err(ValidationError::OutOfRange {
                        field,
                        reason: format!("{v} not in [0, 100]"),
                    });
                }
            }
        }

        for (field, value) in [
            ("surge_min_multiplier", self.surge_min_multiplier),
            ("surge_max_multiplier", self.surge_max_multiplier),
        ] {
            if matches!(value, Some(v) if v <= Decimal::ZERO) {
                return Err(ValidationError::NotPositive { field });
            }
        }
        if let (Some(min), Some(max)) = (self.surge_min_multiplier, self.surge_max_multiplier) {
            if min > max {
                return Err(ValidationError::OutOfRange {
                    field: "surge_min_multiplier",
                    reason: format!("{min} exceeds surge_max_multiplier {max}"),
                });
            }
        }

        if let Some(tiers) = &self.cancellation_fees {
            for tier in tiers {
                if tier.fee < Decimal::ZERO {
                    return Err(ValidationError::Negative {
                        field: "cancellation_fees.fee",
                    });
                }
                if tier.fee_type == FeeType::Percentage && tier.fee > Decimal::ONE_HUNDRED {
                    return Err(ValidationError::OutOfRange {
                        field: "cancellation_fees.fee",
                        reason: format!("{}% exceeds 100%", tier.fee),
                    });
                }
            }
        }

        Ok(())
    }

    /// True when both rows target the same scope and ride type
    pub fn same_target(&self, other: &PricingConfig) -> bool {
        self.scope == other.scope && self.ride_type_id == other.ride_type_id
    }
}
