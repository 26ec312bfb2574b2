//! The transition function mapping events onto driver state.

use common::{DriverAddress, LogPosition, TxHash, ViolationId};

use crate::aggregate::{DriverAggregate, PointsPolicy, ViolationRecord};
use crate::event::LedgerEvent;

/// A derived fact emitted when a transition crosses the suspension threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    DriverSuspended(DriverAddress),
    DriverReinstated(DriverAddress),
}

/// The result of applying a state-bearing event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// Updated aggregate for the affected driver.
    pub aggregate: DriverAggregate,
    /// The violation record created or mutated by this event.
    pub record: ViolationRecord,
    /// Threshold crossing, if this event caused one.
    pub signal: Option<Signal>,
}

/// Outcome of [`LedgerMachine::apply`].
///
/// Application never fails: the log is trusted fact, so anomalies are
/// outcomes the caller routes, not errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The event changed state; persist the transition.
    Applied(Transition),

    /// A `MaxPointsUpdated` event changed the policy. No aggregate changed.
    PolicyUpdated { new_max: u32 },

    /// Duplicate delivery of an already-applied event; nothing to persist.
    ///
    /// Both backfill and live subscription may redeliver events; treating
    /// duplicates as no-ops is what makes replay idempotent.
    AlreadyApplied,

    /// A revocation arrived before its matching recording. The caller
    /// defers it and retries on a later pass.
    MissingRecording { violation_id: ViolationId },
}

/// The ledger state machine: a policy plus the pure transition function.
///
/// Holds no driver state itself; current aggregates and records are passed
/// in by the caller and updated copies handed back.
#[derive(Debug, Clone, Default)]
pub struct LedgerMachine {
    policy: PointsPolicy,
}

impl LedgerMachine {
    pub fn new(policy: PointsPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> PointsPolicy {
        self.policy
    }

    /// Applies one event against the current state for its driver.
    ///
    /// `aggregate` is the driver's current aggregate if one exists, and
    /// `existing` the violation record referenced by the event, if any.
    /// `position` and `tx_hash` identify the log entry carrying the event.
    pub fn apply(
        &mut self,
        aggregate: Option<&DriverAggregate>,
        existing: Option<&ViolationRecord>,
        event: &LedgerEvent,
        position: LogPosition,
        tx_hash: TxHash,
    ) -> ApplyOutcome {
        match event {
            LedgerEvent::ViolationRecorded(data) => {
                if existing.is_some() {
                    return ApplyOutcome::AlreadyApplied;
                }

                let mut agg = aggregate
                    .cloned()
                    .unwrap_or_else(|| DriverAggregate::new(data.driver));
                let was_suspended = agg.is_suspended;

                agg.total_points += data.points;
                agg.violation_count += 1;
                agg.is_suspended = self.policy.suspends(agg.total_points);

                let signal = (!was_suspended && agg.is_suspended)
                    .then_some(Signal::DriverSuspended(data.driver));

                let record = ViolationRecord {
                    violation_id: data.violation_id,
                    driver_address: data.driver,
                    points: data.points,
                    violation_type: data.violation_type.clone(),
                    occurred_at: data.occurred_at,
                    is_revoked: false,
                    position,
                    tx_hash,
                };

                ApplyOutcome::Applied(Transition {
                    aggregate: agg,
                    record,
                    signal,
                })
            }

            LedgerEvent::PointsRevoked(data) => {
                let Some(record) = existing else {
                    return ApplyOutcome::MissingRecording {
                        violation_id: data.violation_id,
                    };
                };
                if record.is_revoked {
                    return ApplyOutcome::AlreadyApplied;
                }
                // The aggregate exists whenever the recording was applied.
                let Some(current) = aggregate else {
                    return ApplyOutcome::MissingRecording {
                        violation_id: data.violation_id,
                    };
                };

                let mut agg = current.clone();
                let was_suspended = agg.is_suspended;

                agg.total_points = agg.total_points.saturating_sub(data.points);
                agg.violation_count = agg.violation_count.saturating_sub(1);
                agg.is_suspended = self.policy.suspends(agg.total_points);

                let signal = (was_suspended && !agg.is_suspended)
                    .then_some(Signal::DriverReinstated(data.driver));

                let mut record = record.clone();
                record.is_revoked = true;

                ApplyOutcome::Applied(Transition {
                    aggregate: agg,
                    record,
                    signal,
                })
            }

            LedgerEvent::MaxPointsUpdated(data) => {
                self.policy = PointsPolicy::new(data.new_max);
                ApplyOutcome::PolicyUpdated {
                    new_max: data.new_max,
                }
            }
        }
    }
}
