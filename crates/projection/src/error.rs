//! Projection store error types.

use thiserror::Error;

/// Errors that can occur in the projection store.
#[derive(Debug, Error)]
pub enum ProjectionError {
    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A stored row could not be mapped back into its domain type.
    #[error("Projection data corrupt: {0}")]
    Corrupt(String),
}

/// Result type for projection store operations.
pub type Result<T> = std::result::Result<T, ProjectionError>;
