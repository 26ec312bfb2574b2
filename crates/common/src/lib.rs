//! Shared identifier types for the driver violation ledger.
//!
//! These newtypes prevent mixing up the various fixed-format identifiers
//! that flow between the event log, the state machine, and the projection.

mod types;

pub use types::{DriverAddress, LogPosition, ParseIdError, TxHash, ViolationId};
