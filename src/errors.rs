use sea_orm::error::DbErr;
use serde::Serialize;
use uuid::Uuid;

/// Unified error type for every engine operation.
///
/// The variants map onto the failure classes callers are expected to
/// distinguish: validation failures, missing records, uniqueness/state
/// conflicts, insufficient stock, branch-scope violations, and store
/// failures. `DatabaseError` is the only class that is safe to retry at
/// the caller's discretion; the engine itself never retries a unit of
/// work, so a debit or credit can never be applied twice.
#[derive(Debug, thiserror::Error, Serialize)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(
        #[from]
        #[serde(skip)]
        sea_orm::error::DbErr,
    ),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Insufficient stock: {0}")]
    InsufficientStock(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Event error: {0}")]
    EventError(String),

    #[error("Concurrent modification: {0}")]
    ConcurrentModification(Uuid),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Other error: {0}")]
    Other(
        #[from]
        #[serde(skip)]
        anyhow::Error,
    ),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

pub trait IntoDbErr {
    fn into_db_err(self) -> DbErr;
}

impl IntoDbErr for DbErr {
    fn into_db_err(self) -> DbErr {
        self
    }
}

impl IntoDbErr for String {
    fn into_db_err(self) -> DbErr {
        DbErr::Custom(self)
    }
}

impl IntoDbErr for &str {
    fn into_db_err(self) -> DbErr {
        DbErr::Custom(self.to_string())
    }
}

impl ServiceError {
    /// Generic constructor that normalizes any supported database error input.
    pub fn db_error<E: IntoDbErr>(error: E) -> Self {
        ServiceError::DatabaseError(error.into_db_err())
    }

    /// True for the transient store-failure class that a caller may retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ServiceError::DatabaseError(_) | ServiceError::ConcurrentModification(_)
        )
    }

    /// Stable machine-readable code for subscribers and API layers.
    pub fn code(&self) -> &'static str {
        match self {
            Self::DatabaseError(_) => "store_failure",
            Self::NotFound(_) => "not_found",
            Self::ValidationError(_) => "validation_failure",
            Self::Conflict(_) => "conflict",
            Self::InsufficientStock(_) => "insufficient_stock",
            Self::Unauthorized(_) => "unauthorized",
            Self::EventError(_) => "event_error",
            Self::ConcurrentModification(_) => "concurrent_modification",
            Self::InternalError(_) | Self::Other(_) => "internal_error",
        }
    }
}

// Result extension for easier error conversion at module boundaries.
pub trait ResultExt<T> {
    fn map_err_to_service(self) -> Result<T, ServiceError>;
}

impl<T, E> ResultExt<T> for Result<T, E>
where
    E: Into<ServiceError>,
{
    fn map_err_to_service(self) -> Result<T, ServiceError> {
        self.map_err(|e| e.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_are_stable() {
        assert_eq!(ServiceError::NotFound("x".into()).code(), "not_found");
        assert_eq!(
            ServiceError::ValidationError("x".into()).code(),
            "validation_failure"
        );
        assert_eq!(ServiceError::Conflict("x".into()).code(), "conflict");
        assert_eq!(
            ServiceError::InsufficientStock("x".into()).code(),
            "insufficient_stock"
        );
        assert_eq!(
            ServiceError::Unauthorized("x".into()).code(),
            "unauthorized"
        );
        assert_eq!(
            ServiceError::db_error("boom").code(),
            "store_failure"
        );
    }

    #[test]
    fn only_store_failures_are_retryable() {
        assert!(ServiceError::db_error("timeout").is_retryable());
        assert!(ServiceError::ConcurrentModification(Uuid::new_v4()).is_retryable());
        assert!(!ServiceError::InsufficientStock("x".into()).is_retryable());
        assert!(!ServiceError::Conflict("x".into()).is_retryable());
        assert!(!ServiceError::ValidationError("x".into()).is_retryable());
    }

    #[test]
    fn validation_errors_convert() {
        use validator::Validate;

        #[derive(Validate)]
        struct Probe {
            #[validate(range(min = 1))]
            qty: i32,
        }

        let err = Probe { qty: 0 }.validate().unwrap_err();
        let service: ServiceError = err.into();
        assert_eq!(service.code(), "validation_failure");
    }
}
