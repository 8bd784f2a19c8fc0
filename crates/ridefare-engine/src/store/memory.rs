//! In-memory config store
//!
//! A single `RwLock` guards the whole state; every mutating operation runs
//! under the write lock, which gives clone and activation the same
//! all-or-nothing semantics a serializable transaction would.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use dashmap::DashSet;
use parking_lot::RwLock;
use tracing::{debug, info};

use ridefare_common::{
    select_nearest, AuditLogEntry, EventMultiplier, GeoLocation, NewVersion, PricingConfig,
    PricingVersion, StoreError, SurgeThreshold, TimeMultiplier, VersionStatus, WeatherCondition,
    WeatherMultiplier, ZoneFee,
};

use super::{ConfigStore, PolicyRow, RowKind, StoreResult};

const VERSION_ENTITY: &str = "pricing_version";

/// Store operations that can be made to fail, for degradation testing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    ActiveVersion,
    Configs,
    ZoneFees,
    TimeMultipliers,
    WeatherMultipliers,
    EventMultipliers,
    SurgeThresholds,
    AuditAppend,
}

#[derive(Default)]
struct StoreState {
    versions: BTreeMap<i64, PricingVersion>,
    configs: BTreeMap<i64, PricingConfig>,
    zone_fees: BTreeMap<i64, ZoneFee>,
    time_multipliers: BTreeMap<i64, TimeMultiplier>,
    weather_multipliers: BTreeMap<i64, WeatherMultiplier>,
    event_multipliers: BTreeMap<i64, EventMultiplier>,
    surge_thresholds: BTreeMap<i64, SurgeThreshold>,
    audit: Vec<AuditLogEntry>,
    last_id: i64,
}

impl StoreState {
    fn mint_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }

    fn next_version_number(&self) -> i64 {
        self.versions
            .values()
            .map(|v| v.version_number)
            .max()
            .unwrap_or(0)
            + 1
    }

    fn version(&self, id: i64) -> StoreResult<&PricingVersion> {
        self.versions
            .get(&id)
            .ok_or_else(|| StoreError::not_found(VERSION_ENTITY, id))
    }

    /// The version must exist and still be a draft
    fn require_draft(&self, version_id: i64) -> StoreResult<()> {
        let version = self.version(version_id)?;
        if version.status != VersionStatus::Draft {
            return Err(StoreError::Conflict(format!(
                "version {} is {}, only drafts can be modified",
                version_id, version.status
            )));
        }
        Ok(())
    }

    fn put(&mut self, row: PolicyRow) {
        match row {
            PolicyRow::Config(r) => {
                self.configs.insert(r.id, r);
            }
            PolicyRow::ZoneFee(r) => {
                self.zone_fees.insert(r.id, r);
            }
            PolicyRow::TimeMultiplier(r) => {
                self.time_multipliers.insert(r.id, r);
            }
            PolicyRow::WeatherMultiplier(r) => {
                self.weather_multipliers.insert(r.id, r);
            }
            PolicyRow::EventMultiplier(r) => {
                self.event_multipliers.insert(r.id, r);
            }
            PolicyRow::SurgeThreshold(r) => {
                self.surge_thresholds.insert(r.id, r);
            }
        }
    }

    fn get(&self, kind: RowKind, id: i64) -> Option<PolicyRow> {
        match kind {
            RowKind::Config => self.configs.get(&id).cloned().map(PolicyRow::Config),
            RowKind::ZoneFee => self.zone_fees.get(&id).cloned().map(PolicyRow::ZoneFee),
            RowKind::TimeMultiplier => self
                .time_multipliers
                .get(&id)
                .cloned()
                .map(PolicyRow::TimeMultiplier),
            RowKind::WeatherMultiplier => self
                .weather_multipliers
                .get(&id)
                .cloned()
                .map(PolicyRow::WeatherMultiplier),
            RowKind::EventMultiplier => self
                .event_multipliers
                .get(&id)
                .cloned()
                .map(PolicyRow::EventMultiplier),
            RowKind::SurgeThreshold => self
                .surge_thresholds
                .get(&id)
                .cloned()
                .map(PolicyRow::SurgeThreshold),
        }
    }

    fn remove(&mut self, kind: RowKind, id: i64) -> Option<PolicyRow> {
        match kind {
            RowKind::Config => self.configs.remove(&id).map(PolicyRow::Config),
            RowKind::ZoneFee => self.zone_fees.remove(&id).map(PolicyRow::ZoneFee),
            RowKind::TimeMultiplier => self
                .time_multipliers
                .remove(&id)
                .map(PolicyRow::TimeMultiplier),
            RowKind::WeatherMultiplier => self
                .weather_multipliers
                .remove(&id)
                .map(PolicyRow::WeatherMultiplier),
            RowKind::EventMultiplier => self
                .event_multipliers
                .remove(&id)
                .map(PolicyRow::EventMultiplier),
            RowKind::SurgeThreshold => self
                .surge_thresholds
                .remove(&id)
                .map(PolicyRow::SurgeThreshold),
        }
    }

    fn rows_of(&self, version_id: i64, kind: RowKind) -> Vec<PolicyRow> {
        fn collect<T: Clone>(
            map: &BTreeMap<i64, T>,
            version_of: impl Fn(&T) -> i64,
            wrap: impl Fn(T) -> PolicyRow,
            version_id: i64,
        ) -> Vec<PolicyRow> {
            map.values()
                .filter(|r| version_of(r) == version_id)
                .cloned()
                .map(wrap)
                .collect()
        }

        match kind {
            RowKind::Config => collect(&self.configs, |r| r.version_id, PolicyRow::Config, version_id),
            RowKind::ZoneFee => {
                collect(&self.zone_fees, |r| r.version_id, PolicyRow::ZoneFee, version_id)
            }
            RowKind::TimeMultiplier => collect(
                &self.time_multipliers,
                |r| r.version_id,
                PolicyRow::TimeMultiplier,
                version_id,
            ),
            RowKind::WeatherMultiplier => collect(
                &self.weather_multipliers,
                |r| r.version_id,
                PolicyRow::WeatherMultiplier,
                version_id,
            ),
            RowKind::EventMultiplier => collect(
                &self.event_multipliers,
                |r| r.version_id,
                PolicyRow::EventMultiplier,
                version_id,
            ),
            RowKind::SurgeThreshold => collect(
                &self.surge_thresholds,
                |r| r.version_id,
                PolicyRow::SurgeThreshold,
                version_id,
            ),
        }
    }

    /// Uniqueness constraints within a version; `row` itself is excluded by id
    fn check_constraints(&self, row: &PolicyRow) -> StoreResult<()> {
        match row {
            PolicyRow::Config(cfg) => {
                let duplicate = self.configs.values().any(|other| {
                    other.id != cfg.id
                        && other.version_id == cfg.version_id
                        && other.same_target(cfg)
                });
                if duplicate {
                    return Err(StoreError::Conflict(format!(
                        "a config for {} already exists in version {}",
                        cfg.provenance(),
                        cfg.version_id
                    )));
                }
            }
            PolicyRow::WeatherMultiplier(w) => {
                let duplicate = self.weather_multipliers.values().any(|other| {
                    other.id != w.id
                        && other.version_id == w.version_id
                        && other.scope == w.scope
                        && other.weather_condition == w.weather_condition
                });
                if duplicate {
                    return Err(StoreError::Conflict(format!(
                        "weather multiplier for {} at {} already exists",
                        w.weather_condition, w.scope
                    )));
                }
            }
            PolicyRow::SurgeThreshold(tier) => {
                let overlapping = self.surge_thresholds.values().any(|other| {
                    other.id != tier.id
                        && other.version_id == tier.version_id
                        && other.scope == tier.scope
                        && other.overlaps(tier)
                });
                if overlapping {
                    return Err(StoreError::Conflict(format!(
                        "surge tier overlaps an existing tier at {}",
                        tier.scope
                    )));
                }
            }
            PolicyRow::ZoneFee(_) | PolicyRow::TimeMultiplier(_) | PolicyRow::EventMultiplier(_) => {}
        }
        Ok(())
    }
}

/// In-memory storage implementation
pub struct InMemoryConfigStore {
    state: RwLock<StoreState>,
    faults: DashSet<StoreOp>,
}

impl InMemoryConfigStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            state: RwLock::new(StoreState::default()),
            faults: DashSet::new(),
        }
    }

    /// Make an operation fail with `StoreError::Unavailable` until cleared
    pub fn inject_fault(&self, op: StoreOp) {
        self.faults.insert(op);
    }

    /// Clear every injected fault
    pub fn clear_faults(&self) {
        self.faults.clear();
    }

    fn check(&self, op: StoreOp) -> StoreResult<()> {
        if self.faults.contains(&op) {
            return Err(StoreError::Unavailable(format!("{op:?} query failed")));
        }
        Ok(())
    }
}

impl Default for InMemoryConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConfigStore for InMemoryConfigStore {
    async fn create_version(&self, new: NewVersion) -> StoreResult<PricingVersion> {
        let mut state = self.state.write();
        let now = Utc::now();
        let version = PricingVersion {
            id: state.mint_id(),
            version_number: state.next_version_number(),
            name: new.name,
            description: new.description,
            status: VersionStatus::Draft,
            ab_test_traffic_pct: 0,
            effective_from: new.effective_from,
            effective_until: new.effective_until,
            created_by: new.created_by,
            approved_by: None,
            approved_at: None,
            created_at: now,
            updated_at: now,
        };
        state.versions.insert(version.id, version.clone());
        debug!(version_id = version.id, number = version.version_number, "Created draft version");
        Ok(version)
    }

    async fn get_version(&self, id: i64) -> StoreResult<PricingVersion> {
        self.state.read().version(id).cloned()
    }

    async fn list_versions(
        &self,
        status: Option<VersionStatus>,
    ) -> StoreResult<Vec<PricingVersion>> {
        let state = self.state.read();
        let mut versions: Vec<PricingVersion> = state
            .versions
            .values()
            .filter(|v| status.map_or(true, |s| v.status == s))
            .cloned()
            .collect();
        versions.sort_by(|a, b| b.version_number.cmp(&a.version_number));
        Ok(versions)
    }

    async fn update_version(&self, version: PricingVersion) -> StoreResult<PricingVersion> {
        let mut state = self.state.write();
        state.require_draft(version.id)?;
        let stored = state
            .versions
            .get_mut(&version.id)
            .ok_or_else(|| StoreError::not_found(VERSION_ENTITY, version.id))?;

        stored.name = version.name;
        stored.description = version.description;
        stored.effective_from = version.effective_from;
        stored.effective_until = version.effective_until;
        stored.ab_test_traffic_pct = version.ab_test_traffic_pct;
        stored.updated_at = Utc::now();
        Ok(stored.clone())
    }

    async fn clone_version(
        &self,
        source_id: i64,
        name: &str,
        created_by: &str,
    ) -> StoreResult<PricingVersion> {
        let mut state = self.state.write();
        let source = state.version(source_id)?.clone();

        let now = Utc::now();
        let copy = PricingVersion {
            id: state.mint_id(),
            version_number: state.next_version_number(),
            name: name.to_string(),
            description: source.description.clone(),
            status: VersionStatus::Draft,
            ab_test_traffic_pct: 0,
            effective_from: source.effective_from,
            effective_until: source.effective_until,
            created_by: created_by.to_string(),
            approved_by: None,
            approved_at: None,
            created_at: now,
            updated_at: now,
        };

        let kinds = [
            RowKind::Config,
            RowKind::ZoneFee,
            RowKind::TimeMultiplier,
            RowKind::WeatherMultiplier,
            RowKind::EventMultiplier,
            RowKind::SurgeThreshold,
        ];
        let children: Vec<PolicyRow> = kinds
            .iter()
            .flat_map(|kind| state.rows_of(source_id, *kind))
            .collect();
        let copied = children.len();
        for row in children {
            let id = state.mint_id();
            state.put(row.with_ids(id, copy.id));
        }
        state.versions.insert(copy.id, copy.clone());

        info!(
            source_id,
            version_id = copy.id,
            number = copy.version_number,
            rows = copied,
            "Cloned pricing version"
        );
        Ok(copy)
    }

    async fn activate_version(
        &self,
        id: i64,
        approver: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<PricingVersion> {
        let mut state = self.state.write();
        // Validate before touching anything so a rejected activation changes nothing
        state.require_draft(id)?;

        let mut demoted = Vec::new();
        for version in state.versions.values_mut() {
            if version.status == VersionStatus::Active {
                version.status = VersionStatus::Archived;
                version.updated_at = at;
                demoted.push(version.id);
            }
        }

        let target = state
            .versions
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found(VERSION_ENTITY, id))?;
        target.status = VersionStatus::Active;
        target.approved_by = Some(approver.to_string());
        target.approved_at = Some(at);
        target.updated_at = at;

        info!(version_id = id, ?demoted, approver, "Activated pricing version");
        Ok(target.clone())
    }

    async fn archive_version(&self, id: i64) -> StoreResult<PricingVersion> {
        let mut state = self.state.write();
        let version = state
            .versions
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found(VERSION_ENTITY, id))?;
        if version.status != VersionStatus::Archived {
            version.status = VersionStatus::Archived;
            version.updated_at = Utc::now();
        }
        Ok(version.clone())
    }

    async fn active_version(&self, at: DateTime<Utc>) -> StoreResult<Option<PricingVersion>> {
        self.check(StoreOp::ActiveVersion)?;
        let state = self.state.read();
        Ok(state
            .versions
            .values()
            .filter(|v| v.is_effective_at(at))
            .max_by_key(|v| v.version_number)
            .cloned())
    }

    async fn insert_row(&self, row: PolicyRow) -> StoreResult<PolicyRow> {
        let mut state = self.state.write();
        state.require_draft(row.version_id())?;
        let version_id = row.version_id();
        let id = state.mint_id();
        let row = row.with_ids(id, version_id);
        state.check_constraints(&row)?;
        state.put(row.clone());
        debug!(entity = row.kind().entity(), id, version_id, "Inserted row");
        Ok(row)
    }

    async fn update_row(&self, row: PolicyRow) -> StoreResult<PolicyRow> {
        let mut state = self.state.write();
        let kind = row.kind();
        let existing = state
            .get(kind, row.id())
            .ok_or_else(|| StoreError::not_found(kind.entity(), row.id()))?;
        state.require_draft(existing.version_id())?;
        let row = row.with_ids(existing.id(), existing.version_id());
        state.check_constraints(&row)?;
        state.put(row.clone());
        Ok(row)
    }

    async fn get_row(&self, kind: RowKind, id: i64) -> StoreResult<PolicyRow> {
        self.state
            .read()
            .get(kind, id)
            .ok_or_else(|| StoreError::not_found(kind.entity(), id))
    }

    async fn delete_row(&self, kind: RowKind, id: i64) -> StoreResult<PolicyRow> {
        let mut state = self.state.write();
        let existing = state
            .get(kind, id)
            .ok_or_else(|| StoreError::not_found(kind.entity(), id))?;
        state.require_draft(existing.version_id())?;
        state
            .remove(kind, id)
            .ok_or_else(|| StoreError::not_found(kind.entity(), id))
    }

    async fn rows(&self, version_id: i64, kind: RowKind) -> StoreResult<Vec<PolicyRow>> {
        let state = self.state.read();
        state.version(version_id)?;
        Ok(state.rows_of(version_id, kind))
    }

    async fn configs_for(
        &self,
        version_id: i64,
        location: &GeoLocation,
        ride_type_id: Option<i64>,
    ) -> StoreResult<Vec<PricingConfig>> {
        self.check(StoreOp::Configs)?;
        let state = self.state.read();
        let mut rows: Vec<PricingConfig> = state
            .configs
            .values()
            .filter(|c| c.version_id == version_id)
            .filter(|c| c.scope.applies_to(location))
            .filter(|c| c.ride_type_id.is_none() || c.ride_type_id == ride_type_id)
            .cloned()
            .collect();
        // Most specific first; within a level, ride-type rows first
        rows.sort_by(|a, b| {
            (b.scope.level(), b.ride_type_id.is_some())
                .cmp(&(a.scope.level(), a.ride_type_id.is_some()))
        });
        Ok(rows)
    }

    async fn zone_fees_for(
        &self,
        version_id: i64,
        pickup_zone: Option<i64>,
        dropoff_zone: Option<i64>,
        ride_type_id: Option<i64>,
    ) -> StoreResult<Vec<ZoneFee>> {
        self.check(StoreOp::ZoneFees)?;
        let state = self.state.read();
        Ok(state
            .zone_fees
            .values()
            .filter(|f| f.version_id == version_id)
            .filter(|f| Some(f.zone_id) == pickup_zone || Some(f.zone_id) == dropoff_zone)
            .filter(|f| f.ride_type_id.is_none() || f.ride_type_id == ride_type_id)
            .cloned()
            .collect())
    }

    async fn time_multiplier_for(
        &self,
        version_id: i64,
        location: &GeoLocation,
        wall_clock: DateTime<FixedOffset>,
    ) -> StoreResult<Option<TimeMultiplier>> {
        self.check(StoreOp::TimeMultipliers)?;
        let state = self.state.read();
        let candidates: Vec<&TimeMultiplier> = state
            .time_multipliers
            .values()
            .filter(|t| t.version_id == version_id && t.matches(&wall_clock))
            .collect();
        Ok(
            select_nearest(candidates.iter().copied(), location, |t| &t.scope, |t| t.priority)
                .cloned(),
        )
    }

    async fn weather_multiplier_for(
        &self,
        version_id: i64,
        location: &GeoLocation,
        condition: WeatherCondition,
    ) -> StoreResult<Option<WeatherMultiplier>> {
        self.check(StoreOp::WeatherMultipliers)?;
        let state = self.state.read();
        let candidates = state
            .weather_multipliers
            .values()
            .filter(|w| w.version_id == version_id && w.weather_condition == condition);
        Ok(select_nearest(candidates, location, |w| &w.scope, |_| 0).cloned())
    }

    async fn event_multipliers_active(
        &self,
        version_id: i64,
        city_id: Option<i64>,
        zone_id: Option<i64>,
        at: DateTime<Utc>,
    ) -> StoreResult<Vec<EventMultiplier>> {
        self.check(StoreOp::EventMultipliers)?;
        let state = self.state.read();
        let mut events: Vec<EventMultiplier> = state
            .event_multipliers
            .values()
            .filter(|e| e.version_id == version_id)
            .filter(|e| e.applies_to(city_id, zone_id) && e.is_active_at(at))
            .cloned()
            .collect();
        events.sort_by(|a, b| b.multiplier.cmp(&a.multiplier));
        Ok(events)
    }

    async fn surge_thresholds_for(
        &self,
        version_id: i64,
        location: &GeoLocation,
    ) -> StoreResult<Vec<SurgeThreshold>> {
        self.check(StoreOp::SurgeThresholds)?;
        let state = self.state.read();
        let in_version: Vec<&SurgeThreshold> = state
            .surge_thresholds
            .values()
            .filter(|t| t.version_id == version_id)
            .collect();
        let Some(nearest) =
            select_nearest(in_version.iter().copied(), location, |t| &t.scope, |_| 0)
        else {
            return Ok(Vec::new());
        };
        let scope = nearest.scope;
        let mut tiers: Vec<SurgeThreshold> = in_version
            .into_iter()
            .filter(|t| t.scope == scope)
            .cloned()
            .collect();
        tiers.sort_by(|a, b| a.demand_supply_ratio_min.cmp(&b.demand_supply_ratio_min));
        Ok(tiers)
    }

    async fn append_audit(&self, entry: AuditLogEntry) -> StoreResult<AuditLogEntry> {
        self.check(StoreOp::AuditAppend)?;
        let mut state = self.state.write();
        let mut entry = entry;
        entry.id = state.audit.len() as i64 + 1;
        state.audit.push(entry.clone());
        Ok(entry)
    }

    async fn audit_entries(
        &self,
        entity_type: Option<&str>,
        entity_id: Option<i64>,
    ) -> StoreResult<Vec<AuditLogEntry>> {
        let state = self.state.read();
        Ok(state
            .audit
            .iter()
            .filter(|e| entity_type.map_or(true, |t| e.entity_type == t))
            .filter(|e| entity_id.map_or(true, |id| e.entity_id == id))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use ridefare_common::{Scope, ScopeLevel};
    use rust_decimal_macros::dec;

    fn location() -> GeoLocation {
        GeoLocation {
            country_id: Some(1),
            region_id: Some(10),
            city_id: Some(100),
            zone_id: Some(1000),
            timezone: "UTC".into(),
            utc_offset_minutes: 0,
        }
    }

    async fn draft(store: &InMemoryConfigStore) -> PricingVersion {
        store
            .create_version(NewVersion::new("draft", "ops"))
            .await
            .unwrap()
    }

    fn config(version_id: i64, scope: Scope) -> PolicyRow {
        let mut cfg = PricingConfig::at(scope);
        cfg.version_id = version_id;
        PolicyRow::Config(cfg)
    }

    #[tokio::test]
    async fn test_version_numbers_increase() {
        let store = InMemoryConfigStore::new();
        let a = draft(&store).await;
        let b = draft(&store).await;
        assert_eq!(a.version_number, 1);
        assert_eq!(b.version_number, 2);
        assert_eq!(a.status, VersionStatus::Draft);
    }

    #[tokio::test]
    async fn test_configs_for_orders_most_specific_first() {
        let store = InMemoryConfigStore::new();
        let v = draft(&store).await;
        store.insert_row(config(v.id, Scope::global())).await.unwrap();
        store.insert_row(config(v.id, Scope::city(1, 10, 100))).await.unwrap();
        store.insert_row(config(v.id, Scope::country(1))).await.unwrap();
        store.insert_row(config(v.id, Scope::country(2))).await.unwrap();
        let mut ride = PricingConfig::at(Scope::city(1, 10, 100)).for_ride_type(7);
        ride.version_id = v.id;
        store.insert_row(PolicyRow::Config(ride)).await.unwrap();
        let mut other_ride = PricingConfig::at(Scope::global()).for_ride_type(8);
        other_ride.version_id = v.id;
        store.insert_row(PolicyRow::Config(other_ride)).await.unwrap();

        let rows = store.configs_for(v.id, &location(), Some(7)).await.unwrap();
        let levels: Vec<(ScopeLevel, Option<i64>)> = rows
            .iter()
            .map(|c| (c.scope.level(), c.ride_type_id))
            .collect();
        assert_eq!(
            levels,
            vec![
                (ScopeLevel::City, Some(7)),
                (ScopeLevel::City, None),
                (ScopeLevel::Country, None),
                (ScopeLevel::Global, None),
            ]
        );
    }

    #[tokio::test]
    async fn test_duplicate_config_scope_conflicts() {
        let store = InMemoryConfigStore::new();
        let v = draft(&store).await;
        store.insert_row(config(v.id, Scope::country(1))).await.unwrap();
        let err = store
            .insert_row(config(v.id, Scope::country(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_overlapping_surge_tiers_conflict() {
        let store = InMemoryConfigStore::new();
        let v = draft(&store).await;
        let tier = |min, max| {
            PolicyRow::SurgeThreshold(SurgeThreshold {
                id: 0,
                version_id: v.id,
                scope: Scope::city(1, 10, 100),
                demand_supply_ratio_min: min,
                demand_supply_ratio_max: max,
                multiplier: dec!(1.5),
            })
        };
        store.insert_row(tier(dec!(1), Some(dec!(2)))).await.unwrap();
        store.insert_row(tier(dec!(2), None)).await.unwrap();
        assert!(store.insert_row(tier(dec!(1.5), Some(dec!(3)))).await.is_err());

        let tiers = store.surge_thresholds_for(v.id, &location()).await.unwrap();
        assert_eq!(tiers.len(), 2);
        assert_eq!(tiers[0].demand_supply_ratio_min, dec!(1));
    }

    #[tokio::test]
    async fn test_activation_demotes_previous_active() {
        let store = InMemoryConfigStore::new();
        let a = draft(&store).await;
        let b = draft(&store).await;
        let now = Utc::now();

        store.activate_version(a.id, "lead", now).await.unwrap();
        let active = store.activate_version(b.id, "lead", now).await.unwrap();
        assert_eq!(active.status, VersionStatus::Active);
        assert_eq!(active.approved_by.as_deref(), Some("lead"));

        let a = store.get_version(a.id).await.unwrap();
        assert_eq!(a.status, VersionStatus::Archived);
        let actives = store
            .list_versions(Some(VersionStatus::Active))
            .await
            .unwrap();
        assert_eq!(actives.len(), 1);
    }

    #[tokio::test]
    async fn test_activating_non_draft_is_a_rolled_back_conflict() {
        let store = InMemoryConfigStore::new();
        let a = draft(&store).await;
        let b = draft(&store).await;
        let now = Utc::now();
        store.activate_version(a.id, "lead", now).await.unwrap();
        store.archive_version(b.id).await.unwrap();

        let err = store.activate_version(b.id, "lead", now).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        // Previous active untouched
        let a = store.get_version(a.id).await.unwrap();
        assert_eq!(a.status, VersionStatus::Active);
    }

    #[tokio::test]
    async fn test_clone_copies_children_with_new_ids() {
        let store = InMemoryConfigStore::new();
        let v = draft(&store).await;
        let original = store.insert_row(config(v.id, Scope::country(1))).await.unwrap();
        let mut fee = ZoneFee::fixed(1000, "airport", dec!(4));
        fee.version_id = v.id;
        store.insert_row(PolicyRow::ZoneFee(fee)).await.unwrap();
        store.activate_version(v.id, "lead", Utc::now()).await.unwrap();

        let copy = store.clone_version(v.id, "next", "ops").await.unwrap();
        assert_eq!(copy.status, VersionStatus::Draft);
        assert_eq!(copy.version_number, 2);

        let configs = store.rows(copy.id, RowKind::Config).await.unwrap();
        assert_eq!(configs.len(), 1);
        assert_ne!(configs[0].id(), original.id());
        assert_eq!(configs[0].version_id(), copy.id);
        assert_eq!(store.rows(copy.id, RowKind::ZoneFee).await.unwrap().len(), 1);
        // Source rows untouched
        assert_eq!(store.rows(v.id, RowKind::Config).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rows_of_active_version_are_immutable() {
        let store = InMemoryConfigStore::new();
        let v = draft(&store).await;
        let row = store.insert_row(config(v.id, Scope::global())).await.unwrap();
        store.activate_version(v.id, "lead", Utc::now()).await.unwrap();

        assert!(matches!(
            store.update_row(row.clone()).await,
            Err(StoreError::Conflict(_))
        ));
        assert!(matches!(
            store.delete_row(RowKind::Config, row.id()).await,
            Err(StoreError::Conflict(_))
        ));
        assert!(matches!(
            store.insert_row(config(v.id, Scope::country(1))).await,
            Err(StoreError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_active_version_respects_window() {
        let store = InMemoryConfigStore::new();
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let v = store
            .create_version(
                NewVersion::new("windowed", "ops")
                    .with_window(start, Some(start + Duration::days(7))),
            )
            .await
            .unwrap();
        store.activate_version(v.id, "lead", start).await.unwrap();

        assert!(store.active_version(start).await.unwrap().is_some());
        assert!(store
            .active_version(start + Duration::days(7))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_not_found_sentinel() {
        let store = InMemoryConfigStore::new();
        assert_eq!(
            store.get_version(99).await.unwrap_err(),
            StoreError::not_found("pricing_version", 99)
        );
        assert!(matches!(
            store.get_row(RowKind::ZoneFee, 5).await,
            Err(StoreError::NotFound { entity: "zone_fee", id: 5 })
        ));
    }

    #[tokio::test]
    async fn test_injected_fault() {
        let store = InMemoryConfigStore::new();
        store.inject_fault(StoreOp::Configs);
        assert!(matches!(
            store.configs_for(1, &location(), None).await,
            Err(StoreError::Unavailable(_))
        ));
        store.clear_faults();
        assert!(store.configs_for(1, &location(), None).await.is_ok());
    }
}
