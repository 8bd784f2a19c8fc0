//! Error types for RideFare
//!
//! Provides a unified error type and domain-specific error variants. Business
//! rule violations are typed distinctly from infrastructure failures so a
//! transport layer can map them onto status codes via [`ErrorKind`].

use rust_decimal::Decimal;
use thiserror::Error;

/// Result type alias using FareError
pub type Result<T> = std::result::Result<T, FareError>;

/// Unified error type for RideFare operations
#[derive(Debug, Error)]
pub enum FareError {
    // Store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    // Validation errors
    #[error("Invalid input: {0}")]
    Validation(#[from] ValidationError),

    // Negotiated price outside the allowed band
    #[error("Negotiation rejected: {0}")]
    Negotiation(#[from] NegotiationError),

    // External collaborator failures (geo, catalog, telemetry)
    #[error("Dependency unavailable: {0}")]
    Dependency(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Transport-neutral error classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvalidInput,
    Conflict,
    PreconditionFailed,
    DependencyUnavailable,
}

impl ErrorKind {
    /// HTTP-equivalent status code for this kind
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorKind::NotFound => 404,
            ErrorKind::InvalidInput => 400,
            ErrorKind::Conflict => 409,
            ErrorKind::PreconditionFailed => 412,
            ErrorKind::DependencyUnavailable => 503,
        }
    }
}

impl FareError {
    /// Classify this error for the transport layer
    pub fn kind(&self) -> ErrorKind {
        match self {
            FareError::Store(StoreError::NotFound { .. }) => ErrorKind::NotFound,
            FareError::Store(StoreError::Conflict(_)) => ErrorKind::Conflict,
            FareError::Store(StoreError::Unavailable(_)) => ErrorKind::DependencyUnavailable,
            FareError::Validation(_) => ErrorKind::InvalidInput,
            FareError::Negotiation(_) => ErrorKind::PreconditionFailed,
            FareError::Dependency(_) => ErrorKind::DependencyUnavailable,
            FareError::Config(_) | FareError::Serialization(_) | FareError::Internal(_) => {
                ErrorKind::DependencyUnavailable
            }
        }
    }

    /// True when the error is the store's not-found sentinel
    pub fn is_not_found(&self) -> bool {
        matches!(self, FareError::Store(StoreError::NotFound { .. }))
    }
}

/// Config store errors
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: i64) -> Self {
        StoreError::NotFound { entity, id }
    }
}

/// Input validation failures
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValidationError {
    #[error("Coordinate out of range: lat={lat}, lng={lng}")]
    CoordinateOutOfRange { lat: f64, lng: f64 },

    #[error("Field {field} must not be negative")]
    Negative { field: &'static str },

    #[error("Field {field} must be greater than zero")]
    NotPositive { field: &'static str },

    #[error("Field {field} out of range: {reason}")]
    OutOfRange { field: &'static str, reason: String },

    #[error("Invalid scope: {0}")]
    Scope(String),

    #[error("Unknown weather condition: {0}")]
    UnknownWeather(String),

    #[error("Invalid time of day: {0}")]
    TimeOfDay(String),

    #[error("{0}")]
    Other(String),
}

/// Negotiated price outside the allowed band around the estimate
#[derive(Debug, Clone, Error, PartialEq)]
pub enum NegotiationError {
    #[error("below minimum: {proposed} < {minimum}")]
    BelowMinimum { proposed: Decimal, minimum: Decimal },

    #[error("above maximum: {proposed} > {maximum}")]
    AboveMaximum { proposed: Decimal, maximum: Decimal },
}

// Implement From for common external error types
impl From<serde_json::Error> for FareError {
    fn from(err: serde_json::Error) -> Self {
        FareError::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for FareError {
    fn from(err: anyhow::Error) -> Self {
        FareError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_error_display() {
        let err = FareError::Store(StoreError::not_found("pricing_version", 42));
        assert!(err.to_string().contains("pricing_version 42"));
        assert!(err.is_not_found());
    }

    #[test]
    fn test_kind_mapping() {
        let conflict = FareError::from(StoreError::Conflict("version is active".into()));
        assert_eq!(conflict.kind(), ErrorKind::Conflict);
        assert_eq!(conflict.kind().status_code(), 409);

        let below = FareError::from(NegotiationError::BelowMinimum {
            proposed: dec!(13.99),
            minimum: dec!(14.00),
        });
        assert_eq!(below.kind(), ErrorKind::PreconditionFailed);
        assert!(below.to_string().contains("below minimum"));

        let invalid = FareError::from(ValidationError::Negative { field: "base_fare" });
        assert_eq!(invalid.kind().status_code(), 400);

        let down = FareError::from(StoreError::Unavailable("timeout".into()));
        assert_eq!(down.kind(), ErrorKind::DependencyUnavailable);
        assert!(!down.is_not_found());
    }
}
