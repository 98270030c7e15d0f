//! Infrastructure and application-service errors.

use thiserror::Error;

use gstkit_core::DomainError;

/// Repository operation error.
///
/// These are storage concerns (uniqueness, isolation, IO) as opposed to domain
/// errors (validation, invariants).
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// A uniqueness constraint rejected the write (concurrent writer won).
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),

    #[error("storage error: {0}")]
    Storage(String),

    /// A stored record could not be turned back into a domain value.
    #[error("decode error: {0}")]
    Decode(String),
}

/// Error returned by the application services.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// The filing was already generated; callers treat this as "already done".
    #[error("duplicate filing: {0}")]
    DuplicateFiling(String),

    #[error("missing prerequisite: {0}")]
    MissingPrerequisite(String),

    /// Retry the read-then-decide step.
    #[error("concurrency conflict: {0}")]
    ConcurrencyConflict(String),

    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),

    #[error(transparent)]
    Store(RepositoryError),
}

impl From<RepositoryError> for ServiceError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::Conflict(msg) => ServiceError::ConcurrencyConflict(msg),
            RepositoryError::TenantIsolation(msg) => ServiceError::TenantIsolation(msg),
            other => ServiceError::Store(other),
        }
    }
}

impl From<DomainError> for ServiceError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => ServiceError::Validation(msg),
            DomainError::InvalidId(msg) => ServiceError::Validation(msg),
            DomainError::InvariantViolation(msg) => ServiceError::InvariantViolation(msg),
            DomainError::NotFound => ServiceError::NotFound("record not found".to_string()),
            DomainError::DuplicateFiling(msg) => ServiceError::DuplicateFiling(msg),
            DomainError::MissingPrerequisite(msg) => ServiceError::MissingPrerequisite(msg),
            DomainError::ConcurrencyConflict(msg) => ServiceError::ConcurrencyConflict(msg),
        }
    }
}

/// Map sqlx errors by Postgres SQLSTATE.
pub(crate) fn map_sqlx_error(operation: &str, err: sqlx::Error) -> RepositoryError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                // unique violation
                Some("23505") => RepositoryError::Conflict(msg),
                _ => RepositoryError::Storage(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            RepositoryError::Storage(format!("connection pool closed in {}", operation))
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            RepositoryError::Decode(format!("failed to decode row in {}: {}", operation, err))
        }
        _ => RepositoryError::Storage(format!("sqlx error in {}: {}", operation, err)),
    }
}
