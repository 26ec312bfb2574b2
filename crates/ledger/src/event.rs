//! Ledger events consumed from the event log.

use chrono::{DateTime, Utc};
use common::{DriverAddress, ViolationId};
use serde::{Deserialize, Serialize};

/// State-bearing events appended to the ledger.
///
/// The log also carries informational `DriverSuspended` / `DriverReinstated`
/// entries; those are derived facts and are not represented here — the state
/// machine re-derives them as [`crate::Signal`]s at threshold crossings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum LedgerEvent {
    /// A violation was recorded against a driver.
    ViolationRecorded(ViolationRecordedData),

    /// A previously recorded violation was revoked.
    PointsRevoked(PointsRevokedData),

    /// The suspension threshold was reconfigured.
    MaxPointsUpdated(MaxPointsUpdatedData),
}

impl LedgerEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            LedgerEvent::ViolationRecorded(_) => "ViolationRecorded",
            LedgerEvent::PointsRevoked(_) => "PointsRevoked",
            LedgerEvent::MaxPointsUpdated(_) => "MaxPointsUpdated",
        }
    }

    /// The driver this event concerns, if any.
    pub fn driver(&self) -> Option<DriverAddress> {
        match self {
            LedgerEvent::ViolationRecorded(data) => Some(data.driver),
            LedgerEvent::PointsRevoked(data) => Some(data.driver),
            LedgerEvent::MaxPointsUpdated(_) => None,
        }
    }
}

/// Data for a ViolationRecorded event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViolationRecordedData {
    /// Ledger-assigned identifier, monotonically assigned, never reused.
    pub violation_id: ViolationId,

    /// The driver the violation was recorded against.
    pub driver: DriverAddress,

    /// Points assessed. Bounded by the policy maximum at recording time;
    /// validated at the point the event entered the log.
    pub points: u32,

    /// Free-text violation category, e.g. "Speeding".
    pub violation_type: String,

    /// Event time as recorded by the ledger.
    pub occurred_at: DateTime<Utc>,
}

/// Data for a PointsRevoked event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointsRevokedData {
    /// The violation being revoked.
    pub violation_id: ViolationId,

    /// The driver the violation belongs to.
    pub driver: DriverAddress,

    /// Points being returned to the driver.
    pub points: u32,
}

/// Data for a MaxPointsUpdated event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaxPointsUpdatedData {
    /// The new suspension threshold.
    pub new_max: u32,
}

// Convenience constructors
impl LedgerEvent {
    pub fn violation_recorded(
        violation_id: ViolationId,
        driver: DriverAddress,
        points: u32,
        violation_type: impl Into<String>,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        LedgerEvent::ViolationRecorded(ViolationRecordedData {
            violation_id,
            driver,
            points,
            violation_type: violation_type.into(),
            occurred_at,
        })
    }

    pub fn points_revoked(violation_id: ViolationId, driver: DriverAddress, points: u32) -> Self {
        LedgerEvent::PointsRevoked(PointsRevokedData {
            violation_id,
            driver,
            points,
        })
    }

    pub fn max_points_updated(new_max: u32) -> Self {
        LedgerEvent::MaxPointsUpdated(MaxPointsUpdatedData { new_max })
    }
}
