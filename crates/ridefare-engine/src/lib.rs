//! # RideFare Engine
//!
//! Hierarchical fare resolution, multiplier modulation, telemetry surge and
//! pricing-version lifecycle for a ride-hailing marketplace.
//!
//! ## Fare Formula
//!
//! ```text
//! base     = base_fare + distance_km × per_km + minutes × per_minute + booking_fee
//! subtotal = max(base × time × weather × event × surge + zone_fees, minimum_fare)
//! total    = subtotal + tax        (tax-exclusive)
//!          = subtotal              (tax-inclusive, tax carved out)
//! ```
//!
//! Where:
//! - Every rate comes from the most specific pricing config (zone → city →
//!   region → country → global) of the active version
//! - Surge is a caller lock, a configured threshold tier, or the telemetry
//!   composite, always clamped to the resolved `[surge_min, surge_max]`

pub mod collaborators;
pub mod config;
pub mod lifecycle;
pub mod metrics;
pub mod pricing;
pub mod service;
pub mod store;

use std::sync::Arc;

use ridefare_common::Result;

pub use collaborators::{
    CurrencyFormatter, GeoResolver, RideType, RideTypeCatalog, Telemetry,
};
pub use config::EngineConfig;
pub use lifecycle::VersionManager;
pub use metrics::FareMetrics;
pub use pricing::{FareCalculator, PricingResolver, ResolvedPricingCache, SurgeEngine};
pub use service::{EstimateResponse, FareService, RideTypeEstimate, SurgeInfo};
pub use store::{ConfigStore, InMemoryConfigStore, PolicyRow, RowKind};

/// External services the engine consumes
#[derive(Clone)]
pub struct Collaborators {
    pub geo: Arc<dyn GeoResolver>,
    pub formatter: Arc<dyn CurrencyFormatter>,
    pub catalog: Arc<dyn RideTypeCatalog>,
    pub telemetry: Arc<dyn Telemetry>,
}

/// Fully wired pricing core sharing one store, cache and metrics set
pub struct RideFare {
    pub service: FareService,
    pub versions: VersionManager,
    pub metrics: Arc<FareMetrics>,
    pub cache: Option<Arc<ResolvedPricingCache>>,
}

impl RideFare {
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn ConfigStore>,
        collaborators: Collaborators,
    ) -> Result<Self> {
        config.validate()?;
        let metrics = Arc::new(FareMetrics::new()?);
        let cache = config
            .cache
            .enabled
            .then(|| Arc::new(ResolvedPricingCache::new(config.cache.max_entries)));

        let mut resolver = PricingResolver::new(store.clone()).with_metrics(metrics.clone());
        if let Some(cache) = &cache {
            resolver = resolver.with_cache(cache.clone());
        }
        let surge = SurgeEngine::new(collaborators.telemetry, config.surge.clone())
            .with_metrics(metrics.clone());

        let calculator = FareCalculator::new(
            collaborators.geo,
            store.clone(),
            Arc::new(resolver),
            Arc::new(surge),
            config,
        )
        .with_metrics(metrics.clone());

        let service = FareService::new(
            Arc::new(calculator),
            collaborators.catalog,
            collaborators.formatter,
        );

        let mut versions = VersionManager::new(store).with_metrics(metrics.clone());
        if let Some(cache) = &cache {
            versions = versions.with_cache(cache.clone());
        }

        Ok(Self {
            service,
            versions,
            metrics,
            cache,
        })
    }
}
