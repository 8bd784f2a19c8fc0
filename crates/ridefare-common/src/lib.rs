//! # RideFare Common
//!
//! Shared types, errors, and audit primitives for the RideFare pricing core.
//!
//! ## Core Types
//!
//! - [`PricingVersion`]: numbered, atomically-activated snapshot of pricing policy
//! - [`PricingConfig`]: one hierarchy layer (global → country → region → city → zone)
//! - [`ResolvedPricing`]: every layer folded over the built-in defaults
//! - [`ZoneFee`], [`TimeMultiplier`], [`WeatherMultiplier`], [`EventMultiplier`],
//!   [`SurgeThreshold`]: fare modifiers
//! - [`FareRequest`]/[`FareCalculation`]: calculation input and breakdown
//!
//! ## Audit
//!
//! - [`audit`]: append-only change trail and sinks

pub mod audit;
pub mod error;
pub mod types;

// Re-export commonly used types at crate root
pub use audit::{AuditAction, AuditLogEntry, AuditSink, TracingAuditSink};
pub use error::{ErrorKind, FareError, NegotiationError, Result, StoreError, ValidationError};
pub use types::{
    config::{CancellationFee, FeeType, PricingConfig},
    fare::{FareCalculation, FareRequest, FeeSide, ZoneFeeCharge},
    geo::{GeoLocation, GeoPoint},
    modifiers::{
        EventMultiplier, SurgeThreshold, TimeMultiplier, WeatherCondition, WeatherMultiplier,
        ZoneFee, ZoneFeeSchedule,
    },
    money::{decimal_from_f64, decimal_to_f64, round_money, try_decimal_from_f64},
    resolved::{ResolvedPricing, DEFAULTS_VERSION_ID},
    scope::{select_nearest, Scope, ScopeLevel},
    version::{NewVersion, PricingVersion, VersionPatch, VersionStatus},
};

/// RideFare version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Currency used when none can be resolved
pub const DEFAULT_CURRENCY: &str = "USD";

/// Average speed used to estimate trip duration (km/h)
pub const DEFAULT_AVERAGE_SPEED_KMH: f64 = 40.0;

/// Ceiling of the composite telemetry surge before policy clamping
pub const SURGE_CEILING: f64 = 5.0;
