pub mod drivers;
pub mod health;
pub mod metrics;
pub mod sync_status;
