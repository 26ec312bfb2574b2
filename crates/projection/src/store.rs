use async_trait::async_trait;
use common::{DriverAddress, LogPosition, ViolationId};
use ledger::{DriverAggregate, ViolationRecord};

use crate::{Result, SyncCursor};

/// Durable keyed storage for the ledger projection.
///
/// All implementations must be thread-safe and all upserts idempotent:
/// writing the same aggregate or record twice changes nothing observable
/// beyond the modification timestamp. Violation records are keyed by their
/// ledger-assigned id, never by log position, so redelivery of the same
/// chain event deduplicates naturally.
#[async_trait]
pub trait ProjectionStore: Send + Sync {
    /// Creates or replaces the aggregate row for a driver.
    async fn upsert_driver(&self, aggregate: &DriverAggregate) -> Result<()>;

    /// Creates or replaces a violation record.
    async fn upsert_violation(&self, record: &ViolationRecord) -> Result<()>;

    /// Fetches a driver's aggregate, if one exists.
    async fn get_driver(&self, address: DriverAddress) -> Result<Option<DriverAggregate>>;

    /// Fetches a single violation record by ledger id.
    async fn get_violation(&self, violation_id: ViolationId) -> Result<Option<ViolationRecord>>;

    /// Lists a driver's violations, most recent violation id first.
    async fn violations_for_driver(&self, address: DriverAddress) -> Result<Vec<ViolationRecord>>;

    /// Reads the singleton synchronization cursor.
    async fn get_cursor(&self) -> Result<SyncCursor>;

    /// Advances the cursor to `position` and refreshes the sync time.
    ///
    /// Monotonic: a position behind the current cursor is ignored (the
    /// sync time still refreshes). The cursor therefore never decreases,
    /// across restarts included.
    async fn advance_cursor(&self, position: LogPosition) -> Result<()>;

    /// Refreshes the sync time without moving the cursor.
    ///
    /// Called by empty backfill passes so staleness stays observable.
    async fn touch_sync_time(&self) -> Result<()>;
}
