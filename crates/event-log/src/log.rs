use std::pin::Pin;

use async_trait::async_trait;
use common::LogPosition;
use futures_core::Stream;

use crate::{LogEnvelope, Result};

/// A stream of live log entries.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<LogEnvelope>> + Send>>;

/// Read-side contract over the external ordered event log.
///
/// Implementations wrap whatever transport actually holds the log. The
/// synchronizer only relies on two properties: `fetch_range` returns
/// entries ordered by position, and positions never change once appended.
#[async_trait]
pub trait EventLog: Send + Sync {
    /// Returns the position of the newest entry, or `None` for an empty log.
    async fn head(&self) -> Result<Option<LogPosition>>;

    /// Fetches all entries in `[from, to]`, ordered by position.
    ///
    /// An inverted range (`from > to`) is an empty result, not an error.
    async fn fetch_range(&self, from: LogPosition, to: LogPosition) -> Result<Vec<LogEnvelope>>;

    /// Subscribes to entries appended after the subscription is created.
    ///
    /// The stream may lag or close on transport trouble; consumers fall
    /// back to `fetch_range` to reconcile.
    async fn subscribe(&self) -> Result<EventStream>;
}
