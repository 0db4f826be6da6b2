//! Common error types for tasting experiments

use thiserror::Error;

/// Common result type for tasex operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across tasex services
///
/// Variants follow the panel error taxonomy: validation problems are
/// recoverable form errors, lifecycle and access violations are rejected
/// outright, invariant violations indicate corrupt data or a programming bug.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Operation not allowed in the panel's current lifecycle state
    #[error("Lifecycle violation: {0}")]
    Lifecycle(String),

    /// Caller may not see the requested resource
    #[error("Access denied: {0}")]
    AccessDenied(String),

    /// A Result already exists for this sample set
    #[error("A result for sample set {sample_set_id} already exists")]
    DuplicateResult { sample_set_id: i64 },

    /// Answers were already recorded for this result
    #[error("Answers for result {result_id} were already recorded")]
    AnswersAlreadyRecorded { result_id: i64 },

    /// Not enough free sample codes left to allocate a panel
    #[error("Cannot allocate {requested} sample codes, only {available} available")]
    CodeRangeExhausted { requested: usize, available: usize },

    /// Stored data breaks a structural invariant
    #[error("Invariant violation: {0}")]
    Invariant(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}
