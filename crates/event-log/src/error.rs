use thiserror::Error;

/// Errors surfaced by an event-log transport.
///
/// Everything except `Decode` is transient: the synchronizer retries on
/// its next pass rather than treating these as permanent failures.
#[derive(Debug, Error)]
pub enum EventLogError {
    /// The log endpoint could not be reached.
    #[error("Event log unavailable: {0}")]
    Unavailable(String),

    /// A transport-level request failed.
    #[error("Event log request failed: {0}")]
    Rpc(String),

    /// A live subscription fell behind and skipped entries.
    /// The skipped range is reconciled by the next backfill pass.
    #[error("Live subscription lagged, skipped {skipped} entries")]
    Lagged { skipped: u64 },

    /// The live subscription was closed by the transport.
    #[error("Live subscription closed")]
    SubscriptionClosed,

    /// An envelope payload could not be decoded.
    #[error("Payload decode error: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Result type for event-log operations.
pub type Result<T> = std::result::Result<T, EventLogError>;
