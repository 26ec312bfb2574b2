//! Pure ledger state machine for the driver violation system.
//!
//! This crate encodes the transition rules of the ledger: how violation and
//! revocation events transform a driver's aggregate state (points, suspension)
//! and the violation records derived from them. It performs no I/O; the
//! synchronizer feeds it events and persists what it returns.
//!
//! Events from the log are treated as already-validated fact. Application is
//! therefore infallible: anomalies (duplicate delivery, a revocation arriving
//! before its recording) are reported as [`ApplyOutcome`] variants for the
//! caller to handle, never as errors.

pub mod aggregate;
pub mod event;
pub mod machine;

pub use aggregate::{DriverAggregate, PointsPolicy, ViolationRecord};
pub use event::{
    LedgerEvent, MaxPointsUpdatedData, PointsRevokedData, ViolationRecordedData,
};
pub use machine::{ApplyOutcome, LedgerMachine, Signal, Transition};
