//! Fare pricing
//!
//! Hierarchy resolution, multiplier modulation, telemetry surge and the fare
//! calculator that composes them.

pub mod cache;
pub mod calculator;
pub mod modulator;
pub mod resolver;
pub mod surge;

pub use cache::{CacheKey, CacheStats, ResolvedPricingCache};
pub use calculator::{estimate_duration_min, zone_fee_charges, FareCalculator};
pub use modulator::{Modulator, Multipliers};
pub use resolver::{fold_layers, PricingResolver};
pub use surge::{SurgeEngine, SurgeFactors, SurgeReading};
