//! The synchronization cursor.

use chrono::{DateTime, Utc};
use common::LogPosition;
use serde::{Deserialize, Serialize};

/// Singleton marker of how far synchronization has progressed.
///
/// `position` is the last durably processed log position; `None` means no
/// event has ever been applied and backfill starts from genesis.
/// `last_sync_time` moves on every pass, including empty ones, so staleness
/// is observable even when the log is quiet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCursor {
    pub position: Option<LogPosition>,
    pub last_sync_time: DateTime<Utc>,
}

impl SyncCursor {
    /// The cursor of a store that has never synced.
    pub fn unset(now: DateTime<Utc>) -> Self {
        Self {
            position: None,
            last_sync_time: now,
        }
    }

    /// The position backfill should resume from.
    pub fn resume_from(&self) -> LogPosition {
        self.position
            .map(|p| p.successor())
            .unwrap_or_else(LogPosition::genesis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_cursor_resumes_from_genesis() {
        let cursor = SyncCursor::unset(Utc::now());
        assert_eq!(cursor.resume_from(), LogPosition::genesis());
    }

    #[test]
    fn set_cursor_resumes_from_successor() {
        let cursor = SyncCursor {
            position: Some(LogPosition::new(7, 2)),
            last_sync_time: Utc::now(),
        };
        assert_eq!(cursor.resume_from(), LogPosition::new(7, 3));
    }
}
