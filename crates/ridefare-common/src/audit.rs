//! Pricing Audit Logging
//!
//! Append-only trail of administrative changes to pricing versions and their
//! rows:
//! - Version creation, updates, clones
//! - Activation and archival
//! - Row inserts, updates and deletes inside drafts

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

/// Audited administrative action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
    Activate,
    Archive,
    Clone,
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditAction::Create => write!(f, "create"),
            AuditAction::Update => write!(f, "update"),
            AuditAction::Delete => write!(f, "delete"),
            AuditAction::Activate => write!(f, "activate"),
            AuditAction::Archive => write!(f, "archive"),
            AuditAction::Clone => write!(f, "clone"),
        }
    }
}

/// Audit log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    /// Assigned by the store on append
    pub id: i64,

    /// Administrator who performed the change
    pub admin: String,

    pub action: AuditAction,

    /// Entity table name, e.g. `pricing_version`
    pub entity_type: String,

    pub entity_id: i64,

    /// Snapshot before the change
    pub old_values: Option<Value>,

    /// Snapshot after the change
    pub new_values: Option<Value>,

    pub reason: Option<String>,

    pub created_at: DateTime<Utc>,
}

impl AuditLogEntry {
    /// Create a new audit entry
    pub fn new(admin: &str, action: AuditAction, entity_type: &str, entity_id: i64) -> Self {
        Self {
            id: 0,
            admin: admin.to_string(),
            action,
            entity_type: entity_type.to_string(),
            entity_id,
            old_values: None,
            new_values: None,
            reason: None,
            created_at: Utc::now(),
        }
    }

    /// Set the before snapshot
    pub fn with_old<T: Serialize>(mut self, old: &T) -> Self {
        self.old_values = serde_json::to_value(old).ok();
        self
    }

    /// Set the after snapshot
    pub fn with_new<T: Serialize>(mut self, new: &T) -> Self {
        self.new_values = serde_json::to_value(new).ok();
        self
    }

    /// Set reason
    pub fn with_reason(mut self, reason: &str) -> Self {
        self.reason = Some(reason.to_string());
        self
    }

    /// Convert to JSON string
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Audit log sink
pub trait AuditSink: Send + Sync {
    /// Write an audit entry
    fn write(&self, entry: &AuditLogEntry);
}

/// Emits every entry as a structured tracing event
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn write(&self, entry: &AuditLogEntry) {
        info!(
            target: "ridefare::audit",
            audit_id = entry.id,
            admin = %entry.admin,
            action = %entry.action,
            entity_type = %entry.entity_type,
            entity_id = entry.entity_id,
            reason = entry.reason.as_deref().unwrap_or("-"),
            "pricing change recorded"
        );
    }
}
