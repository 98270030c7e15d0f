//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// invariants, filing lifecycle conflicts). Infrastructure concerns belong elsewhere.
/// Every variant is recoverable by the caller; none of them signal an engine bug.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (malformed period, negative amounts, empty line list).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A domain invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested resource was not found (domain-level).
    #[error("not found")]
    NotFound,

    /// A filing already exists for the (tenant, period). Treat as "already generated".
    #[error("filing already exists: {0}")]
    DuplicateFiling(String),

    /// An operation was requested before the data it derives from exists.
    #[error("missing prerequisite: {0}")]
    MissingPrerequisite(String),

    /// A uniqueness constraint was hit by a concurrent writer.
    ///
    /// Callers should repeat the read-then-decide step, not blindly retry the write.
    #[error("concurrency conflict: {0}")]
    ConcurrencyConflict(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn duplicate_filing(msg: impl Into<String>) -> Self {
        Self::DuplicateFiling(msg.into())
    }

    pub fn missing_prerequisite(msg: impl Into<String>) -> Self {
        Self::MissingPrerequisite(msg.into())
    }

    pub fn concurrency_conflict(msg: impl Into<String>) -> Self {
        Self::ConcurrencyConflict(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }
}
