use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::{DriverAddress, LogPosition, ViolationId};
use ledger::{DriverAggregate, ViolationRecord};
use tokio::sync::RwLock;

use crate::{Result, SyncCursor, store::ProjectionStore};

struct Inner {
    drivers: HashMap<DriverAddress, DriverAggregate>,
    violations: HashMap<ViolationId, ViolationRecord>,
    cursor: SyncCursor,
}

/// In-memory projection store for wiring and tests.
///
/// Mirrors the semantics of the PostgreSQL implementation, including the
/// monotonic cursor guard.
#[derive(Clone)]
pub struct InMemoryProjectionStore {
    inner: Arc<RwLock<Inner>>,
}

impl Default for InMemoryProjectionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryProjectionStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner {
                drivers: HashMap::new(),
                violations: HashMap::new(),
                cursor: SyncCursor::unset(Utc::now()),
            })),
        }
    }

    /// Number of driver aggregates held.
    pub async fn driver_count(&self) -> usize {
        self.inner.read().await.drivers.len()
    }

    /// Number of violation records held.
    pub async fn violation_count(&self) -> usize {
        self.inner.read().await.violations.len()
    }
}

#[async_trait]
impl ProjectionStore for InMemoryProjectionStore {
    async fn upsert_driver(&self, aggregate: &DriverAggregate) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.drivers.insert(aggregate.address, aggregate.clone());
        Ok(())
    }

    async fn upsert_violation(&self, record: &ViolationRecord) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.violations.insert(record.violation_id, record.clone());
        Ok(())
    }

    async fn get_driver(&self, address: DriverAddress) -> Result<Option<DriverAggregate>> {
        Ok(self.inner.read().await.drivers.get(&address).cloned())
    }

    async fn get_violation(&self, violation_id: ViolationId) -> Result<Option<ViolationRecord>> {
        Ok(self.inner.read().await.violations.get(&violation_id).cloned())
    }

    async fn violations_for_driver(&self, address: DriverAddress) -> Result<Vec<ViolationRecord>> {
        let inner = self.inner.read().await;
        let mut records: Vec<_> = inner
            .violations
            .values()
            .filter(|r| r.driver_address == address)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.violation_id.cmp(&a.violation_id));
        Ok(records)
    }

    async fn get_cursor(&self) -> Result<SyncCursor> {
        Ok(self.inner.read().await.cursor)
    }

    async fn advance_cursor(&self, position: LogPosition) -> Result<()> {
        let mut inner = self.inner.write().await;
        let advanced = match inner.cursor.position {
            Some(current) => current.max(position),
            None => position,
        };
        inner.cursor.position = Some(advanced);
        inner.cursor.last_sync_time = Utc::now();
        Ok(())
    }

    async fn touch_sync_time(&self) -> Result<()> {
        self.inner.write().await.cursor.last_sync_time = Utc::now();
        Ok(())
    }
}
