//! Prometheus metrics for the pricing engine

use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry};

use ridefare_common::{FareError, Result};

/// Engine-wide counters and histograms
#[derive(Clone)]
pub struct FareMetrics {
    pub calculations_total: IntCounter,
    pub degradations_total: IntCounterVec,
    pub surge_multiplier: Histogram,
    pub activations_total: IntCounter,
    pub cache_hits_total: IntCounter,
    pub cache_misses_total: IntCounter,
}

impl FareMetrics {
    pub fn new() -> Result<Self> {
        Ok(Self {
            calculations_total: IntCounter::new(
                "ridefare_calculations_total",
                "Total fare calculations produced",
            )
            .map_err(metric_error)?,
            degradations_total: IntCounterVec::new(
                Opts::new(
                    "ridefare_degradations_total",
                    "Factors that fell back to a neutral value",
                ),
                &["factor"],
            )
            .map_err(metric_error)?,
            surge_multiplier: Histogram::with_opts(
                HistogramOpts::new("ridefare_surge_multiplier", "Applied surge multipliers")
                    .buckets(vec![1.0, 1.2, 1.5, 1.8, 2.0, 2.5, 3.0, 4.0, 5.0]),
            )
            .map_err(metric_error)?,
            activations_total: IntCounter::new(
                "ridefare_version_activations_total",
                "Total pricing version activations",
            )
            .map_err(metric_error)?,
            cache_hits_total: IntCounter::new(
                "ridefare_pricing_cache_hits_total",
                "Resolved pricing served from cache",
            )
            .map_err(metric_error)?,
            cache_misses_total: IntCounter::new(
                "ridefare_pricing_cache_misses_total",
                "Resolved pricing folded from the store",
            )
            .map_err(metric_error)?,
        })
    }

    pub fn register(&self, registry: &Registry) -> Result<()> {
        registry
            .register(Box::new(self.calculations_total.clone()))
            .map_err(metric_error)?;
        registry
            .register(Box::new(self.degradations_total.clone()))
            .map_err(metric_error)?;
        registry
            .register(Box::new(self.surge_multiplier.clone()))
            .map_err(metric_error)?;
        registry
            .register(Box::new(self.activations_total.clone()))
            .map_err(metric_error)?;
        registry
            .register(Box::new(self.cache_hits_total.clone()))
            .map_err(metric_error)?;
        registry
            .register(Box::new(self.cache_misses_total.clone()))
            .map_err(metric_error)?;
        Ok(())
    }

    /// Record a factor that degraded to its fallback
    pub fn degraded(&self, factor: &str) {
        self.degradations_total.with_label_values(&[factor]).inc();
    }
}

fn metric_error(err: prometheus::Error) -> FareError {
    FareError::Internal(format!("metrics: {err}"))
}
