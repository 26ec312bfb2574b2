//! Durable projection of ledger state.
//!
//! The projection is the queryable, secondary copy of the ledger: driver
//! aggregates, violation records, and the single synchronization cursor.
//! All writes are idempotent upserts keyed by stable ledger identifiers
//! (driver address, violation id), so redelivered events collapse into
//! no-ops at the storage layer as well.

pub mod cursor;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use cursor::SyncCursor;
pub use error::{ProjectionError, Result};
pub use memory::InMemoryProjectionStore;
pub use postgres::PostgresProjectionStore;
pub use store::ProjectionStore;
