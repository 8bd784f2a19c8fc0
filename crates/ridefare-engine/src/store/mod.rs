//! Config store
//!
//! Versioned persistence for every pricing artifact, with transactional clone
//! and activation. Every read used during a fare calculation takes an explicit
//! `version_id` so one calculation observes one snapshot.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

use ridefare_common::{
    AuditLogEntry, EventMultiplier, GeoLocation, NewVersion, PricingConfig, PricingVersion,
    StoreError, SurgeThreshold, TimeMultiplier, ValidationError, VersionStatus, WeatherCondition,
    WeatherMultiplier, ZoneFee,
};

pub use memory::{InMemoryConfigStore, StoreOp};

/// Result type for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Kinds of version-scoped policy rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowKind {
    Config,
    ZoneFee,
    TimeMultiplier,
    WeatherMultiplier,
    EventMultiplier,
    SurgeThreshold,
}

impl RowKind {
    /// Entity name used in errors and the audit log
    pub fn entity(&self) -> &'static str {
        match self {
            RowKind::Config => "pricing_config",
            RowKind::ZoneFee => "zone_fee",
            RowKind::TimeMultiplier => "time_multiplier",
            RowKind::WeatherMultiplier => "weather_multiplier",
            RowKind::EventMultiplier => "event_multiplier",
            RowKind::SurgeThreshold => "surge_threshold",
        }
    }
}

/// Any row that belongs to a pricing version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PolicyRow {
    Config(PricingConfig),
    ZoneFee(ZoneFee),
    TimeMultiplier(TimeMultiplier),
    WeatherMultiplier(WeatherMultiplier),
    EventMultiplier(EventMultiplier),
    SurgeThreshold(SurgeThreshold),
}

impl PolicyRow {
    pub fn kind(&self) -> RowKind {
        match self {
            PolicyRow::Config(_) => RowKind::Config,
            PolicyRow::ZoneFee(_) => RowKind::ZoneFee,
            PolicyRow::TimeMultiplier(_) => RowKind::TimeMultiplier,
            PolicyRow::WeatherMultiplier(_) => RowKind::WeatherMultiplier,
            PolicyRow::EventMultiplier(_) => RowKind::EventMultiplier,
            PolicyRow::SurgeThreshold(_) => RowKind::SurgeThreshold,
        }
    }

    pub fn id(&self) -> i64 {
        match self {
            PolicyRow::Config(r) => r.id,
            PolicyRow::ZoneFee(r) => r.id,
            PolicyRow::TimeMultiplier(r) => r.id,
            PolicyRow::WeatherMultiplier(r) => r.id,
            PolicyRow::EventMultiplier(r) => r.id,
            PolicyRow::SurgeThreshold(r) => r.id,
        }
    }

    pub fn version_id(&self) -> i64 {
        match self {
            PolicyRow::Config(r) => r.version_id,
            PolicyRow::ZoneFee(r) => r.version_id,
            PolicyRow::TimeMultiplier(r) => r.version_id,
            PolicyRow::WeatherMultiplier(r) => r.version_id,
            PolicyRow::EventMultiplier(r) => r.version_id,
            PolicyRow::SurgeThreshold(r) => r.version_id,
        }
    }

    /// Re-key the row, as done when minting or cloning
    pub fn with_ids(mut self, id: i64, version_id: i64) -> Self {
        match &mut self {
            PolicyRow::Config(r) => (r.id, r.version_id) = (id, version_id),
            PolicyRow::ZoneFee(r) => (r.id, r.version_id) = (id, version_id),
            PolicyRow::TimeMultiplier(r) => (r.id, r.version_id) = (id, version_id),
            PolicyRow::WeatherMultiplier(r) => (r.id, r.version_id) = (id, version_id),
            PolicyRow::EventMultiplier(r) => (r.id, r.version_id) = (id, version_id),
            PolicyRow::SurgeThreshold(r) => (r.id, r.version_id) = (id, version_id),
        }
        self
    }

    /// Row-level invariants
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            PolicyRow::Config(r) => r.validate(),
            PolicyRow::ZoneFee(r) => r.validate(),
            PolicyRow::TimeMultiplier(r) => r.validate(),
            PolicyRow::WeatherMultiplier(r) => r.validate(),
            PolicyRow::EventMultiplier(r) => r.validate(),
            PolicyRow::SurgeThreshold(r) => r.validate(),
        }
    }
}

/// Trait for config store backends
#[async_trait]
pub trait ConfigStore: Send + Sync {
    // ---- versions ----

    /// Create a draft with the next version number
    async fn create_version(&self, new: NewVersion) -> StoreResult<PricingVersion>;

    /// Get a version by ID
    async fn get_version(&self, id: i64) -> StoreResult<PricingVersion>;

    /// All versions, newest number first, optionally filtered by status
    async fn list_versions(&self, status: Option<VersionStatus>) -> StoreResult<Vec<PricingVersion>>;

    /// Replace the mutable fields of a draft
    async fn update_version(&self, version: PricingVersion) -> StoreResult<PricingVersion>;

    /// Deep-copy a version and all its rows into a new draft, atomically
    async fn clone_version(
        &self,
        source_id: i64,
        name: &str,
        created_by: &str,
    ) -> StoreResult<PricingVersion>;

    /// Archive every active version and promote the draft target, atomically
    async fn activate_version(
        &self,
        id: i64,
        approver: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<PricingVersion>;

    /// Soft-archive; archiving an archived version is a no-op
    async fn archive_version(&self, id: i64) -> StoreResult<PricingVersion>;

    /// The active version effective at `at`, if any
    async fn active_version(&self, at: DateTime<Utc>) -> StoreResult<Option<PricingVersion>>;

    // ---- rows ----

    /// Insert into a draft version, minting a fresh id
    async fn insert_row(&self, row: PolicyRow) -> StoreResult<PolicyRow>;

    /// Replace a row of a draft version
    async fn update_row(&self, row: PolicyRow) -> StoreResult<PolicyRow>;

    /// Get a row by kind and ID
    async fn get_row(&self, kind: RowKind, id: i64) -> StoreResult<PolicyRow>;

    /// Physically delete a row of a draft version, returning it
    async fn delete_row(&self, kind: RowKind, id: i64) -> StoreResult<PolicyRow>;

    /// Every row of one kind in a version, in id order
    async fn rows(&self, version_id: i64, kind: RowKind) -> StoreResult<Vec<PolicyRow>>;

    // ---- calculation queries ----

    /// Applicable configs, most specific scope first, ride-type rows before generic ones
    async fn configs_for(
        &self,
        version_id: i64,
        location: &GeoLocation,
        ride_type_id: Option<i64>,
    ) -> StoreResult<Vec<PricingConfig>>;

    /// Fees on the pickup or dropoff zone for the ride type
    async fn zone_fees_for(
        &self,
        version_id: i64,
        pickup_zone: Option<i64>,
        dropoff_zone: Option<i64>,
        ride_type_id: Option<i64>,
    ) -> StoreResult<Vec<ZoneFee>>;

    /// Nearest-scope, highest-priority window matching the wall-clock
    async fn time_multiplier_for(
        &self,
        version_id: i64,
        location: &GeoLocation,
        wall_clock: DateTime<FixedOffset>,
    ) -> StoreResult<Option<TimeMultiplier>>;

    /// Nearest-scope row for the condition
    async fn weather_multiplier_for(
        &self,
        version_id: i64,
        location: &GeoLocation,
        condition: WeatherCondition,
    ) -> StoreResult<Option<WeatherMultiplier>>;

    /// Events whose widened window contains `at`, highest multiplier first
    async fn event_multipliers_active(
        &self,
        version_id: i64,
        city_id: Option<i64>,
        zone_id: Option<i64>,
        at: DateTime<Utc>,
    ) -> StoreResult<Vec<EventMultiplier>>;

    /// Tiers of the nearest scope that defines any, by ascending `ratio_min`
    async fn surge_thresholds_for(
        &self,
        version_id: i64,
        location: &GeoLocation,
    ) -> StoreResult<Vec<SurgeThreshold>>;

    // ---- audit ----

    /// Append an audit entry, assigning its id
    async fn append_audit(&self, entry: AuditLogEntry) -> StoreResult<AuditLogEntry>;

    /// Audit entries in insertion order, optionally filtered
    async fn audit_entries(
        &self,
        entity_type: Option<&str>,
        entity_id: Option<i64>,
    ) -> StoreResult<Vec<AuditLogEntry>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use ridefare_common::Scope;

    #[test]
    fn test_with_ids_rekeys_row() {
        let row = PolicyRow::Config(PricingConfig::at(Scope::global())).with_ids(12, 3);
        assert_eq!(row.id(), 12);
        assert_eq!(row.version_id(), 3);
        assert_eq!(row.kind(), RowKind::Config);
        assert_eq!(row.kind().entity(), "pricing_config");
    }

    #[test]
    fn test_row_serializes_with_kind_tag() {
        let row = PolicyRow::Config(PricingConfig::at(Scope::country(4)));
        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json["kind"], "config");
        assert_eq!(json["country_id"], 4);
    }
}
