//! The event-log contract consumed by the synchronizer.
//!
//! The ordered, append-only log of ledger facts lives outside this system
//! (behind node connectivity and ABI decoding we do not reimplement). This
//! crate defines what the synchronizer needs from it: a typed envelope, a
//! [`EventLog`] trait covering historical range fetches and live
//! subscription, and an in-memory implementation for wiring and tests.

pub mod envelope;
pub mod error;
pub mod log;
pub mod memory;

pub use envelope::{EventId, LogEnvelope};
pub use error::{EventLogError, Result};
pub use log::{EventLog, EventStream};
pub use memory::InMemoryEventLog;
