//! Synchronizer error types.

use thiserror::Error;

/// Errors that can occur while synchronizing.
///
/// Everything here is transient after startup: a failed pass leaves the
/// cursor where it was and the heal loop retries. Only the first backfill
/// at startup treats these as fatal (refusing to run against an
/// unreachable log or store).
#[derive(Debug, Error)]
pub enum SyncError {
    /// The event log transport failed.
    #[error("Event log error: {0}")]
    EventLog(#[from] event_log::EventLogError),

    /// The projection store failed.
    #[error("Projection store error: {0}")]
    Projection(#[from] projection::ProjectionError),

    /// An operation exceeded its bounded timeout.
    #[error("Operation timed out: {op}")]
    Timeout { op: &'static str },
}

/// Result type for synchronizer operations.
pub type Result<T> = std::result::Result<T, SyncError>;
