//! Synchronizer tuning knobs.

use std::time::Duration;

/// Configuration for the synchronizer loops.
#[derive(Debug, Clone, Copy)]
pub struct SyncConfig {
    /// How often the self-heal backfill re-runs.
    pub heal_interval: Duration,

    /// Bounded timeout applied to every log query and store write.
    pub op_timeout: Duration,

    /// Pause before re-subscribing after the live stream drops.
    pub resubscribe_delay: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            heal_interval: Duration::from_secs(30),
            op_timeout: Duration::from_secs(10),
            resubscribe_delay: Duration::from_secs(5),
        }
    }
}
