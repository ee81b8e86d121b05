//! Store Error Types
//!
//! All persistence operations return `Result<T>` aliased to
//! `Result<T, StoreError>`, so callers propagate with `?` and background
//! workers can log-and-continue on `Database` failures.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(String),

    /// A uniqueness violation that the operation does not suppress.
    /// Idempotent inserts (follows, fans, inbox) never surface this.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),
}

impl From<sqlx::migrate::MigrateError> for StoreError {
    fn from(e: sqlx::migrate::MigrateError) -> Self {
        StoreError::Migration(e.to_string())
    }
}
