//! Database errors

use thiserror::Error;

/// Database errors
#[derive(Error, Debug)]
pub enum DbError {
    /// SQLx error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Migration error
    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    /// Record not found
    #[error("record not found")]
    NotFound,

    /// A stored row could not be mapped to a domain value
    #[error("invalid row: {0}")]
    InvalidRow(String),
}

/// Result type for database operations
pub type DbResult<T> = Result<T, DbError>;
