//! Data access for panels, samples, questions and results
//!
//! Queries run against the shared SQLite pool. Anything that must be atomic
//! (panel + sample allocation, result + used flag, answer batches) runs
//! inside a transaction; race-sensitive rules lean on schema constraints
//! rather than check-then-act.

use tasex_common::{Error, Result};
use uuid::Uuid;

pub mod catalog;
pub mod panels;
pub mod questions;
pub mod results;
pub mod samples;

/// Parse a UUID stored as TEXT
pub(crate) fn parse_uuid(value: &str) -> Result<Uuid> {
    Uuid::parse_str(value)
        .map_err(|e| Error::Invariant(format!("Malformed UUID '{}' in database: {}", value, e)))
}

/// True when the error is a UNIQUE constraint failure
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.is_unique_violation(),
        _ => false,
    }
}
