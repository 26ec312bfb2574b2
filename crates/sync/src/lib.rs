//! The synchronization engine between the event log and the projection.
//!
//! One logical process per deployment: a [`Synchronizer`] backfills the
//! historical range past the durable cursor, subscribes to live entries,
//! and re-runs backfill on a fixed interval to self-heal anything a lapsed
//! subscription missed. Idempotent application makes every one of those
//! paths safe to overlap in time, so there is no gap-detection machinery.

pub mod config;
pub mod error;
pub mod synchronizer;

pub use config::SyncConfig;
pub use error::{Result, SyncError};
pub use synchronizer::{BackfillReport, SyncState, Synchronizer};
