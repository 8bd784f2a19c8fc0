//! Version lifecycle manager
//!
//! Administrative operations on pricing versions and their rows. Every
//! successful mutation appends an audit entry with before and after
//! snapshots; a failed audit write is logged and never undoes the mutation.

use chrono::Utc;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use ridefare_common::{
    AuditAction, AuditLogEntry, AuditSink, FareError, NewVersion, PricingVersion, Result,
    StoreError, TracingAuditSink, ValidationError, VersionPatch, VersionStatus,
};

use crate::metrics::FareMetrics;
use crate::pricing::ResolvedPricingCache;
use crate::store::{ConfigStore, PolicyRow, RowKind};

const VERSION_ENTITY: &str = "pricing_version";

/// Creates, edits, clones, activates and archives pricing versions
pub struct VersionManager {
    store: Arc<dyn ConfigStore>,
    cache: Option<Arc<ResolvedPricingCache>>,
    audit_sink: Arc<dyn AuditSink>,
    metrics: Option<Arc<FareMetrics>>,
}

impl VersionManager {
    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        Self {
            store,
            cache: None,
            audit_sink: Arc::new(TracingAuditSink),
            metrics: None,
        }
    }

    /// Cache to clear whenever the active version changes
    pub fn with_cache(mut self, cache: Arc<ResolvedPricingCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit_sink = sink;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<FareMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    // ---- versions ----

    #[instrument(skip(self, new), fields(name = %new.name))]
    pub async fn create(&self, new: NewVersion) -> Result<PricingVersion> {
        new.validate()?;
        let admin = new.created_by.clone();
        let version = self.store.create_version(new).await?;

        info!(version_id = version.id, number = version.version_number, "Created pricing version");
        self.audit(
            AuditLogEntry::new(&admin, AuditAction::Create, VERSION_ENTITY, version.id)
                .with_new(&version),
        )
        .await;
        Ok(version)
    }

    pub async fn get(&self, id: i64) -> Result<PricingVersion> {
        Ok(self.store.get_version(id).await?)
    }

    pub async fn list(&self, status: Option<VersionStatus>) -> Result<Vec<PricingVersion>> {
        Ok(self.store.list_versions(status).await?)
    }

    /// Apply `patch` to a draft
    #[instrument(skip(self, patch))]
    pub async fn update(&self, id: i64, patch: VersionPatch, admin: &str) -> Result<PricingVersion> {
        let old = self.store.get_version(id).await?;
        ensure_draft(&old)?;

        let mut updated = old.clone();
        patch.apply(&mut updated)?;
        let updated = self.store.update_version(updated).await?;

        self.audit(
            AuditLogEntry::new(admin, AuditAction::Update, VERSION_ENTITY, id)
                .with_old(&old)
                .with_new(&updated),
        )
        .await;
        Ok(updated)
    }

    /// Deep-copy a version and its rows into a new draft
    #[instrument(skip(self))]
    pub async fn clone_version(
        &self,
        source_id: i64,
        name: &str,
        admin: &str,
    ) -> Result<PricingVersion> {
        if name.trim().is_empty() {
            return Err(ValidationError::Other("version name must not be empty".into()).into());
        }
        let copy = self.store.clone_version(source_id, name, admin).await?;

        self.audit(
            AuditLogEntry::new(admin, AuditAction::Clone, VERSION_ENTITY, copy.id)
                .with_new(&copy)
                .with_reason(&format!("cloned from version {source_id}")),
        )
        .await;
        Ok(copy)
    }

    /// Promote a draft, archiving whatever was active
    #[instrument(skip(self))]
    pub async fn activate(
        &self,
        id: i64,
        approver: &str,
        reason: Option<&str>,
    ) -> Result<PricingVersion> {
        let previous = self.store.list_versions(Some(VersionStatus::Active)).await?;
        let old = self.store.get_version(id).await?;
        let activated = self.store.activate_version(id, approver, Utc::now()).await?;

        self.invalidate_cache();
        if let Some(metrics) = &self.metrics {
            metrics.activations_total.inc();
        }
        info!(
            version_id = id,
            number = activated.version_number,
            approver,
            "Activated pricing version"
        );

        for demoted in previous.iter().filter(|v| v.id != id) {
            let mut archived = demoted.clone();
            archived.status = VersionStatus::Archived;
            self.audit(
                AuditLogEntry::new(approver, AuditAction::Archive, VERSION_ENTITY, demoted.id)
                    .with_old(demoted)
                    .with_new(&archived)
                    .with_reason(&format!("superseded by version {id}")),
            )
            .await;
        }

        let mut entry = AuditLogEntry::new(approver, AuditAction::Activate, VERSION_ENTITY, id)
            .with_old(&old)
            .with_new(&activated);
        if let Some(reason) = reason {
            entry = entry.with_reason(reason);
        }
        self.audit(entry).await;
        Ok(activated)
    }

    /// Soft-archive; archiving twice changes nothing and records nothing
    #[instrument(skip(self))]
    pub async fn archive(&self, id: i64, admin: &str, reason: Option<&str>) -> Result<PricingVersion> {
        let old = self.store.get_version(id).await?;
        if old.status == VersionStatus::Archived {
            return Ok(old);
        }
        let archived = self.store.archive_version(id).await?;
        if old.status == VersionStatus::Active {
            self.invalidate_cache();
        }

        let mut entry = AuditLogEntry::new(admin, AuditAction::Archive, VERSION_ENTITY, id)
            .with_old(&old)
            .with_new(&archived);
        if let Some(reason) = reason {
            entry = entry.with_reason(reason);
        }
        self.audit(entry).await;
        Ok(archived)
    }

    // ---- rows ----

    /// Insert a row into a draft version
    #[instrument(skip(self, row), fields(entity = row.kind().entity(), version_id = row.version_id()))]
    pub async fn add_row(&self, row: PolicyRow, admin: &str) -> Result<PolicyRow> {
        row.validate()?;
        let created = self.store.insert_row(row).await?;

        self.audit(
            AuditLogEntry::new(admin, AuditAction::Create, created.kind().entity(), created.id())
                .with_new(&created),
        )
        .await;
        Ok(created)
    }

    /// Replace a row of a draft version
    #[instrument(skip(self, row), fields(entity = row.kind().entity(), id = row.id()))]
    pub async fn update_row(&self, row: PolicyRow, admin: &str) -> Result<PolicyRow> {
        row.validate()?;
        let old = self.store.get_row(row.kind(), row.id()).await?;
        let updated = self.store.update_row(row).await?;

        self.audit(
            AuditLogEntry::new(admin, AuditAction::Update, updated.kind().entity(), updated.id())
                .with_old(&old)
                .with_new(&updated),
        )
        .await;
        Ok(updated)
    }

    /// Delete a row of a draft version
    #[instrument(skip(self))]
    pub async fn delete_row(&self, kind: RowKind, id: i64, admin: &str) -> Result<PolicyRow> {
        let deleted = self.store.delete_row(kind, id).await?;

        self.audit(AuditLogEntry::new(admin, AuditAction::Delete, kind.entity(), id).with_old(&deleted))
            .await;
        Ok(deleted)
    }

    pub async fn rows(&self, version_id: i64, kind: RowKind) -> Result<Vec<PolicyRow>> {
        Ok(self.store.rows(version_id, kind).await?)
    }

    // ---- audit ----

    /// Audit trail in insertion order, optionally filtered
    pub async fn audit_log(
        &self,
        entity_type: Option<&str>,
        entity_id: Option<i64>,
    ) -> Result<Vec<AuditLogEntry>> {
        Ok(self.store.audit_entries(entity_type, entity_id).await?)
    }

    /// Record an entry; failures are logged, never propagated
    async fn audit(&self, entry: AuditLogEntry) {
        match self.store.append_audit(entry.clone()).await {
            Ok(stored) => self.audit_sink.write(&stored),
            Err(e) => {
                warn!(
                    action = %entry.action,
                    entity_type = %entry.entity_type,
                    entity_id = entry.entity_id,
                    error = %e,
                    "Audit write failed"
                );
                if let Some(metrics) = &self.metrics {
                    metrics.degraded("audit");
                }
                self.audit_sink.write(&entry);
            }
        }
    }

    fn invalidate_cache(&self) {
        if let Some(cache) = &self.cache {
            let removed = cache.invalidate_all();
            if removed > 0 {
                info!(removed, "Invalidated resolved pricing cache");
            }
        }
    }
}

fn ensure_draft(version: &PricingVersion) -> Result<()> {
    if version.status != VersionStatus::Draft {
        return Err(FareError::Store(StoreError::Conflict(format!(
            "version {} is {}, only drafts can be updated",
            version.id, version.status
        ))));
    }
    Ok(())
}
