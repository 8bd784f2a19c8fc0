//! Hierarchy resolver
//!
//! Folds the applicable pricing layers over the built-in defaults, least
//! specific first, so each field ends up with the value of the most specific
//! layer that declares it. Resolution never fails: a missing version or an
//! unreachable store yields the defaults.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use ridefare_common::{GeoLocation, PricingConfig, ResolvedPricing, DEFAULTS_VERSION_ID};

use super::cache::{CacheKey, ResolvedPricingCache};
use crate::metrics::FareMetrics;
use crate::store::ConfigStore;

/// Resolves `ResolvedPricing` for a location and ride type
pub struct PricingResolver {
    store: Arc<dyn ConfigStore>,
    cache: Option<Arc<ResolvedPricingCache>>,
    metrics: Option<Arc<FareMetrics>>,
}

impl PricingResolver {
    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        Self {
            store,
            cache: None,
            metrics: None,
        }
    }

    pub fn with_cache(mut self, cache: Arc<ResolvedPricingCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<FareMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Id of the version in effect at `at`, or [`DEFAULTS_VERSION_ID`]
    #[instrument(skip(self))]
    pub async fn active_version_id(&self, at: DateTime<Utc>) -> i64 {
        match self.store.active_version(at).await {
            Ok(Some(version)) => version.id,
            Ok(None) => DEFAULTS_VERSION_ID,
            Err(e) => {
                warn!(error = %e, "Active version lookup failed, pricing from defaults");
                self.degraded("active_version");
                DEFAULTS_VERSION_ID
            }
        }
    }

    /// Resolve against the version in effect at `at`
    pub async fn resolve_at(
        &self,
        location: &GeoLocation,
        ride_type_id: Option<i64>,
        at: DateTime<Utc>,
    ) -> ResolvedPricing {
        let version_id = self.active_version_id(at).await;
        self.resolve(version_id, location, ride_type_id).await
    }

    /// Resolve against an explicit version snapshot
    #[instrument(skip(self, location), fields(city = ?location.city_id, zone = ?location.zone_id))]
    pub async fn resolve(
        &self,
        version_id: i64,
        location: &GeoLocation,
        ride_type_id: Option<i64>,
    ) -> ResolvedPricing {
        if version_id == DEFAULTS_VERSION_ID {
            return ResolvedPricing::defaults();
        }

        let key = CacheKey::new(version_id, location, ride_type_id);
        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.get(&key) {
                if let Some(metrics) = &self.metrics {
                    metrics.cache_hits_total.inc();
                }
                return hit;
            }
            if let Some(metrics) = &self.metrics {
                metrics.cache_misses_total.inc();
            }
        }

        let layers = match self.store.configs_for(version_id, location, ride_type_id).await {
            Ok(layers) => layers,
            Err(e) => {
                warn!(version_id, error = %e, "Config lookup failed, pricing from defaults");
                self.degraded("configs");
                return ResolvedPricing::defaults();
            }
        };

        let resolved = fold_layers(version_id, &layers);
        debug!(version_id, chain = ?resolved.inheritance_chain, "Resolved pricing");

        if let Some(cache) = &self.cache {
            cache.set(key, resolved.clone());
        }
        resolved
    }

    fn degraded(&self, factor: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.degraded(factor);
        }
    }
}

/// Overlay `layers` (most specific first) onto the defaults
pub fn fold_layers(version_id: i64, layers: &[PricingConfig]) -> ResolvedPricing {
    let mut resolved = ResolvedPricing::defaults();
    resolved.version_id = version_id;
    for layer in layers.iter().rev() {
        resolved.overlay(layer);
    }

    // Layers validate individually, but a specific min can still cross an inherited max
    if resolved.surge_min_multiplier > resolved.surge_max_multiplier {
        warn!(
            version_id,
            min = %resolved.surge_min_multiplier,
            max = %resolved.surge_max_multiplier,
            "Resolved surge range is inverted, lowering min to max"
        );
        resolved.surge_min_multiplier = resolved.surge_max_multiplier;
    }
    resolved
}
