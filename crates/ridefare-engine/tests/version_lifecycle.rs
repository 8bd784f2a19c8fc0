//! Version lifecycle through the version manager and the in-memory store

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use rust_decimal_macros::dec;

use ridefare_common::{
    AuditAction, ErrorKind, NewVersion, PricingConfig, Scope, SurgeThreshold, VersionPatch,
    VersionStatus, WeatherCondition, WeatherMultiplier, ZoneFee,
};
use ridefare_engine::{
    ConfigStore, InMemoryConfigStore, PolicyRow, ResolvedPricingCache, RowKind, VersionManager,
};

fn manager() -> (VersionManager, Arc<InMemoryConfigStore>) {
    let store = Arc::new(InMemoryConfigStore::new());
    let manager = VersionManager::new(store.clone())
        .with_cache(Arc::new(ResolvedPricingCache::new(64)));
    (manager, store)
}

fn city_config(version_id: i64) -> PolicyRow {
    let mut config = PricingConfig::at(Scope::city(1, 10, 100));
    config.base_fare = Some(dec!(2.75));
    config.per_km_rate = Some(dec!(1.80));
    PolicyRow::Config(config).with_ids(0, version_id)
}

#[tokio::test]
async fn test_exactly_one_active_after_each_activation() {
    let (manager, _) = manager();
    let mut ids = Vec::new();
    for name in ["q1", "q2", "q3"] {
        let version = manager.create(NewVersion::new(name, "ops")).await.unwrap();
        ids.push(version.id);
    }

    for id in &ids {
        manager.activate(*id, "lead", None).await.unwrap();
        let active = manager.list(Some(VersionStatus::Active)).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, *id);
        assert_eq!(active[0].approved_by.as_deref(), Some("lead"));
    }

    let archived = manager.list(Some(VersionStatus::Archived)).await.unwrap();
    assert_eq!(archived.len(), 2);
}

#[tokio::test]
async fn test_version_numbers_increase() {
    let (manager, _) = manager();
    let a = manager.create(NewVersion::new("a", "ops")).await.unwrap();
    let b = manager.create(NewVersion::new("b", "ops")).await.unwrap();
    let c = manager.clone_version(a.id, "a-copy", "ops").await.unwrap();
    assert!(a.version_number < b.version_number);
    assert!(b.version_number < c.version_number);
    assert_eq!(c.status, VersionStatus::Draft);
}

#[tokio::test]
async fn test_only_drafts_are_mutable() {
    let (manager, _) = manager();
    let version = manager.create(NewVersion::new("live", "ops")).await.unwrap();
    let row = manager.add_row(city_config(version.id), "ops").await.unwrap();
    manager.activate(version.id, "lead", None).await.unwrap();

    let patch = VersionPatch {
        description: Some("too late".into()),
        ..VersionPatch::default()
    };
    let err = manager.update(version.id, patch, "ops").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    let err = manager.add_row(city_config(version.id), "ops").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    let err = manager
        .delete_row(RowKind::Config, row.id(), "ops")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    let err = manager.activate(version.id, "lead", None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
}

#[tokio::test]
async fn test_clone_copies_every_row_kind() {
    let (manager, _) = manager();
    let source = manager.create(NewVersion::new("source", "ops")).await.unwrap();
    let rows = vec![
        city_config(source.id),
        PolicyRow::ZoneFee(ZoneFee::fixed(1000, "airport", dec!(4))).with_ids(0, source.id),
        PolicyRow::WeatherMultiplier(WeatherMultiplier {
            id: 0,
            version_id: source.id,
            scope: Scope::country(1),
            weather_condition: WeatherCondition::Snow,
            multiplier: dec!(1.3),
        }),
        PolicyRow::SurgeThreshold(SurgeThreshold {
            id: 0,
            version_id: source.id,
            scope: Scope::city(1, 10, 100),
            demand_supply_ratio_min: dec!(2),
            demand_supply_ratio_max: None,
            multiplier: dec!(1.9),
        }),
    ];
    for row in rows {
        manager.add_row(row, "ops").await.unwrap();
    }

    let copy = manager.clone_version(source.id, "copy", "ops").await.unwrap();
    for kind in [
        RowKind::Config,
        RowKind::ZoneFee,
        RowKind::WeatherMultiplier,
        RowKind::SurgeThreshold,
    ] {
        let original = manager.rows(source.id, kind).await.unwrap();
        let copied = manager.rows(copy.id, kind).await.unwrap();
        assert_eq!(original.len(), 1, "{kind:?}");
        assert_eq!(copied.len(), 1, "{kind:?}");
        assert_ne!(original[0].id(), copied[0].id());
        assert_eq!(copied[0].version_id(), copy.id);
    }
}

#[tokio::test]
async fn test_duplicate_config_scope_conflicts() {
    let (manager, _) = manager();
    let version = manager.create(NewVersion::new("draft", "ops")).await.unwrap();
    manager.add_row(city_config(version.id), "ops").await.unwrap();
    let err = manager
        .add_row(city_config(version.id), "ops")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
}

#[tokio::test]
async fn test_overlapping_surge_tiers_conflict() {
    let (manager, _) = manager();
    let version = manager.create(NewVersion::new("draft", "ops")).await.unwrap();
    let tier = |min, max| {
        PolicyRow::SurgeThreshold(SurgeThreshold {
            id: 0,
            version_id: version.id,
            scope: Scope::city(1, 10, 100),
            demand_supply_ratio_min: min,
            demand_supply_ratio_max: max,
            multiplier: dec!(1.5),
        })
    };
    manager.add_row(tier(dec!(1.5), Some(dec!(2.5))), "ops").await.unwrap();
    manager.add_row(tier(dec!(2.5), None), "ops").await.unwrap();
    let err = manager
        .add_row(tier(dec!(2.0), Some(dec!(3.0))), "ops")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
}

#[tokio::test]
async fn test_effective_window_gates_active_version() {
    let (manager, store) = manager();
    let start = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
    let version = manager
        .create(NewVersion::new("summer", "ops").with_window(start, Some(start + Duration::days(90))))
        .await
        .unwrap();
    manager.activate(version.id, "lead", None).await.unwrap();

    assert!(store
        .active_version(start - Duration::seconds(1))
        .await
        .unwrap()
        .is_none());
    assert_eq!(
        store.active_version(start).await.unwrap().map(|v| v.id),
        Some(version.id)
    );
    assert!(store
        .active_version(start + Duration::days(90))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_audit_trail_is_ordered() {
    let (manager, _) = manager();
    let version = manager.create(NewVersion::new("draft", "ops")).await.unwrap();
    manager
        .update(
            version.id,
            VersionPatch {
                name: Some("renamed".into()),
                ..VersionPatch::default()
            },
            "ops",
        )
        .await
        .unwrap();
    manager.activate(version.id, "lead", Some("go live")).await.unwrap();
    manager.archive(version.id, "lead", Some("rollback")).await.unwrap();

    let trail = manager
        .audit_log(Some("pricing_version"), Some(version.id))
        .await
        .unwrap();
    let actions: Vec<AuditAction> = trail.iter().map(|e| e.action).collect();
    assert_eq!(
        actions,
        vec![
            AuditAction::Create,
            AuditAction::Update,
            AuditAction::Activate,
            AuditAction::Archive
        ]
    );
    assert!(trail.windows(2).all(|w| w[0].id < w[1].id));
    assert_eq!(trail[1].old_values.as_ref().unwrap()["name"], "draft");
    assert_eq!(trail[1].new_values.as_ref().unwrap()["name"], "renamed");
    assert_eq!(trail[3].reason.as_deref(), Some("rollback"));
}
