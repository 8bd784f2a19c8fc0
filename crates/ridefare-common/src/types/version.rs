//! Pricing versions
//!
//! A version is a numbered snapshot of every pricing row. Only drafts are
//! mutable; activation promotes one draft and archives the previous active.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ValidationError;

/// Lifecycle status of a pricing version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionStatus {
    Draft,
    Active,
    Archived,
    /// Stored and listed like any other status. No operation moves a version
    /// here and the calculator never routes traffic to it.
    AbTest,
}

impl fmt::Display for VersionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionStatus::Draft => write!(f, "draft"),
            VersionStatus::Active => write!(f, "active"),
            VersionStatus::Archived => write!(f, "archived"),
            VersionStatus::AbTest => write!(f, "ab_test"),
        }
    }
}

/// Numbered snapshot of a full pricing configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingVersion {
    pub id: i64,
    pub version_number: i64,
    pub name: String,
    pub description: Option<String>,
    pub status: VersionStatus,
    /// Intended traffic share while in `ab_test`. Carried data only: it is
    /// range-checked on update and persisted, but nothing reads it.
    pub ab_test_traffic_pct: u8,
    pub effective_from: DateTime<Utc>,
    pub effective_until: Option<DateTime<Utc>>,
    pub created_by: String,
    pub approved_by: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PricingVersion {
    pub fn is_draft(&self) -> bool {
        self.status == VersionStatus::Draft
    }

    /// Active and `effective_from <= now < effective_until`
    pub fn is_effective_at(&self, now: DateTime<Utc>) -> bool {
        self.status == VersionStatus::Active
            && self.effective_from <= now
            && self.effective_until.map_or(true, |until| now < until)
    }
}

/// Request to create a draft version
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewVersion {
    pub name: String,
    pub description: Option<String>,
    pub effective_from: DateTime<Utc>,
    pub effective_until: Option<DateTime<Utc>>,
    pub created_by: String,
}

impl NewVersion {
    pub fn new(name: impl Into<String>, created_by: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            effective_from: DateTime::<Utc>::MIN_UTC,
            effective_until: None,
            created_by: created_by.into(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_window(
        mut self,
        effective_from: DateTime<Utc>,
        effective_until: Option<DateTime<Utc>>,
    ) -> Self {
        self.effective_from = effective_from;
        self.effective_until = effective_until;
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::Other("version name must not be empty".into()));
        }
        validate_window(self.effective_from, self.effective_until)
    }
}

/// Partial update of a draft version
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VersionPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub effective_from: Option<DateTime<Utc>>,
    pub effective_until: Option<Option<DateTime<Utc>>>,
    pub ab_test_traffic_pct: Option<u8>,
}

impl VersionPatch {
    /// Apply onto a version, validating the result
    pub fn apply(&self, version: &mut PricingVersion) -> Result<(), ValidationError> {
        if let Some(name) = &self.name {
            if name.trim().is_empty() {
                return Err(ValidationError::Other("version name must not be empty".into()));
            }
            version.name = name.clone();
        }
        if let Some(description) = &self.description {
            version.description = Some(description.clone());
        }
        if let Some(from) = self.effective_from {
            version.effective_from = from;
        }
        if let Some(until) = self.effective_until {
            version.effective_until = until;
        }
        if let Some(pct) = self.ab_test_traffic_pct {
            if pct > 100 {
                return Err(ValidationError::OutOfRange {
                    field: "ab_test_traffic_pct",
                    reason: format!("{pct} not in 0..=100"),
                });
            }
            version.ab_test_traffic_pct = pct;
        }
        validate_window(version.effective_from, version.effective_until)
    }
}

fn validate_window(
    from: DateTime<Utc>,
    until: Option<DateTime<Utc>>,
) -> Result<(), ValidationError> {
    match until {
        Some(until) if until <= from => Err(ValidationError::OutOfRange {
            field: "effective_until",
            reason: "must be after effective_from".to_string(),
        }),
        _ => Ok(()),
    }
}
