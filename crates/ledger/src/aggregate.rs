//! Driver aggregate and violation record types.

use chrono::{DateTime, Utc};
use common::{DriverAddress, LogPosition, TxHash, ViolationId};
use serde::{Deserialize, Serialize};

/// Suspension policy: the point threshold at which a driver is suspended.
///
/// Mutable only via a `MaxPointsUpdated` event. Changing the threshold does
/// not eagerly recompute existing aggregates; each driver's suspension flag
/// is refreshed on their next applied event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointsPolicy {
    pub max_points: u32,
}

impl Default for PointsPolicy {
    fn default() -> Self {
        Self { max_points: 12 }
    }
}

impl PointsPolicy {
    pub fn new(max_points: u32) -> Self {
        Self { max_points }
    }

    /// Whether a driver with the given point total is suspended.
    pub fn suspends(&self, total_points: u32) -> bool {
        total_points >= self.max_points
    }
}

/// Per-driver aggregate state derived from the event log.
///
/// `total_points` and `violation_count` cover non-revoked violations only;
/// both are always reproducible by replaying the driver's events in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverAggregate {
    pub address: DriverAddress,
    pub total_points: u32,
    pub violation_count: u32,
    pub is_suspended: bool,
}

impl DriverAggregate {
    /// A fresh aggregate, created lazily on a driver's first violation.
    pub fn new(address: DriverAddress) -> Self {
        Self {
            address,
            total_points: 0,
            violation_count: 0,
            is_suspended: false,
        }
    }
}

/// A single violation as projected from the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViolationRecord {
    pub violation_id: ViolationId,
    pub driver_address: DriverAddress,
    pub points: u32,
    pub violation_type: String,
    pub occurred_at: DateTime<Utc>,
    /// One-way transition: false -> true, never back.
    pub is_revoked: bool,
    /// Position of the recording event, kept for ordering and audit.
    pub position: LogPosition,
    pub tx_hash: TxHash,
}
